//! Text command protocol.
//!
//! Each message is an ASCII verb followed by arguments separated by spaces
//! (commas are tolerated), terminated by NUL or newline:
//!
//! ```text
//! GHDL name            create a source from a file       -> handle
//! WAVE shape f ph dur  create a source from a waveform   -> handle
//! RHDL h               delete a source
//! PLAY h | STOP h | PAUS h
//! SSPO h x y z         position         SSVE h x y z     velocity
//! SSDI h x y z         direction        SSDI h angle     direction (radians)
//! SSPD h speed         speed along direction
//! SSVO h gain          gain             SPIT h pitch     pitch
//! FADE h gain secs     fade             SSLP h 0|1       loop
//! SSEC h secs          playback position
//! SPAR h code value    per-source rendering parameter
//! STAT h               playback state code                -> code
//! GAIN g | SLPO x y z | SLVE x y z | SLOR ax ay az ux uy uz   listener
//! PARA code value      global rendering parameter
//! PTFI name size       upload `size` raw bytes into the cache directory
//! QUIT                 close the connection
//! ```
//!
//! Replies are a decimal number followed by NUL.

use auralis_audio::{AudioHandler, SourceState, WaveShape, WaveformSpec};
use auralis_common::Handle;
use glam::Vec3;

use crate::error::{CommandError, CommandResult};

/// A decoded client request.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Create a source from a file.
    CreateFromFile(String),
    /// Create a source from a waveform.
    CreateWaveform(WaveformSpec),
    /// Delete a source.
    Delete(Handle),
    /// Start playback.
    Play(Handle),
    /// Stop playback.
    Stop(Handle),
    /// Pause playback.
    Pause(Handle),
    /// Set source position.
    SetPosition(Handle, Vec3),
    /// Set source velocity.
    SetVelocity(Handle, Vec3),
    /// Set source direction.
    SetDirection(Handle, Vec3),
    /// Set source direction from an XZ-plane angle in radians.
    SetDirectionAngle(Handle, f32),
    /// Set velocity along the direction.
    SetSpeed(Handle, f32),
    /// Set source gain.
    SetGain(Handle, f32),
    /// Set source pitch.
    SetPitch(Handle, f32),
    /// Fade source gain.
    Fade {
        /// Source.
        handle: Handle,
        /// Target gain.
        gain: f32,
        /// Duration in seconds.
        seconds: f64,
    },
    /// Enable or disable looping.
    SetLoop(Handle, bool),
    /// Seek within the buffer.
    SetPlaybackPosition(Handle, f32),
    /// Per-source rendering parameter.
    SetSourceParameter {
        /// Source.
        handle: Handle,
        /// Parameter code.
        code: u32,
        /// New value.
        value: f32,
    },
    /// Query playback state.
    QueryState(Handle),
    /// Set listener gain.
    ListenerGain(f32),
    /// Set listener position.
    ListenerPosition(Vec3),
    /// Set listener velocity.
    ListenerVelocity(Vec3),
    /// Set listener orientation.
    ListenerOrientation {
        /// Look-at vector.
        at: Vec3,
        /// Up vector.
        up: Vec3,
    },
    /// Global rendering parameter.
    SetParameter {
        /// Parameter code.
        code: u32,
        /// New value.
        value: f32,
    },
    /// Upload a file; the payload follows the message.
    PutFile {
        /// File name.
        name: String,
        /// Payload length in bytes.
        size: u64,
    },
    /// Close the connection.
    Quit,
}

/// A reply to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// A created handle, or `-1` on failure.
    Handle(Option<Handle>),
    /// A playback state code, `0` if unknown.
    State(u32),
}

impl Reply {
    /// Wire encoding: decimal value then NUL.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let text = match self {
            Self::Handle(handle) => Handle::to_wire(*handle).to_string(),
            Self::State(code) => code.to_string(),
        };
        let mut bytes = text.into_bytes();
        bytes.push(0);
        bytes
    }
}

struct Args<'a> {
    verb: &'static str,
    tokens: Vec<&'a str>,
}

impl<'a> Args<'a> {
    fn new(verb: &'static str, rest: &'a str) -> Self {
        let tokens = rest
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|t| !t.is_empty())
            .collect();
        Self { verb, tokens }
    }

    fn len(&self) -> usize {
        self.tokens.len()
    }

    fn token(&self, index: usize) -> CommandResult<&'a str> {
        self.tokens
            .get(index)
            .copied()
            .ok_or(CommandError::MissingArgument {
                verb: self.verb,
                index,
            })
    }

    fn invalid(&self, value: &str) -> CommandError {
        CommandError::InvalidArgument {
            verb: self.verb,
            value: value.to_string(),
        }
    }

    fn parse<T: std::str::FromStr>(&self, index: usize) -> CommandResult<T> {
        let token = self.token(index)?;
        token.parse().map_err(|_| self.invalid(token))
    }

    fn f32(&self, index: usize) -> CommandResult<f32> {
        let value: f32 = self.parse(index)?;
        if value.is_finite() {
            Ok(value)
        } else {
            Err(self.invalid(self.tokens[index]))
        }
    }

    fn handle(&self, index: usize) -> CommandResult<Handle> {
        let raw: i64 = self.parse(index)?;
        Handle::from_wire(raw).ok_or_else(|| self.invalid(self.tokens[index]))
    }

    fn vec3(&self, index: usize) -> CommandResult<Vec3> {
        Ok(Vec3::new(
            self.f32(index)?,
            self.f32(index + 1)?,
            self.f32(index + 2)?,
        ))
    }
}

impl Command {
    /// Decode one message.
    pub fn parse(message: &str) -> CommandResult<Self> {
        let message = message.trim_matches(|c: char| c == '\0' || c.is_whitespace());
        let (verb, rest) = match message.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (message, ""),
        };

        let command = match verb {
            "" => return Err(CommandError::Empty),
            "GHDL" => {
                if rest.is_empty() {
                    return Err(CommandError::MissingArgument {
                        verb: "GHDL",
                        index: 0,
                    });
                }
                Self::CreateFromFile(rest.to_string())
            },
            "WAVE" => {
                let a = Args::new("WAVE", rest);
                let code: u32 = a.parse(0)?;
                let shape = WaveShape::from_code(code).ok_or_else(|| a.invalid(a.tokens[0]))?;
                Self::CreateWaveform(WaveformSpec::new(shape, a.f32(1)?, a.f32(2)?, a.f32(3)?))
            },
            "RHDL" => Self::Delete(Args::new("RHDL", rest).handle(0)?),
            "PLAY" => Self::Play(Args::new("PLAY", rest).handle(0)?),
            "STOP" => Self::Stop(Args::new("STOP", rest).handle(0)?),
            "PAUS" => Self::Pause(Args::new("PAUS", rest).handle(0)?),
            "SSPO" => {
                let a = Args::new("SSPO", rest);
                Self::SetPosition(a.handle(0)?, a.vec3(1)?)
            },
            "SSVE" => {
                let a = Args::new("SSVE", rest);
                Self::SetVelocity(a.handle(0)?, a.vec3(1)?)
            },
            "SSDI" => {
                let a = Args::new("SSDI", rest);
                if a.len() >= 4 {
                    Self::SetDirection(a.handle(0)?, a.vec3(1)?)
                } else {
                    Self::SetDirectionAngle(a.handle(0)?, a.f32(1)?)
                }
            },
            "SSPD" => {
                let a = Args::new("SSPD", rest);
                Self::SetSpeed(a.handle(0)?, a.f32(1)?)
            },
            "SSVO" => {
                let a = Args::new("SSVO", rest);
                Self::SetGain(a.handle(0)?, a.f32(1)?)
            },
            "SPIT" => {
                let a = Args::new("SPIT", rest);
                Self::SetPitch(a.handle(0)?, a.f32(1)?)
            },
            "FADE" => {
                let a = Args::new("FADE", rest);
                Self::Fade {
                    handle: a.handle(0)?,
                    gain: a.f32(1)?,
                    seconds: f64::from(a.f32(2)?),
                }
            },
            "SSLP" => {
                let a = Args::new("SSLP", rest);
                let flag: i64 = a.parse(1)?;
                Self::SetLoop(a.handle(0)?, flag != 0)
            },
            "SSEC" => {
                let a = Args::new("SSEC", rest);
                Self::SetPlaybackPosition(a.handle(0)?, a.f32(1)?)
            },
            "SPAR" => {
                let a = Args::new("SPAR", rest);
                Self::SetSourceParameter {
                    handle: a.handle(0)?,
                    code: a.parse(1)?,
                    value: a.f32(2)?,
                }
            },
            "STAT" => Self::QueryState(Args::new("STAT", rest).handle(0)?),
            "GAIN" => Self::ListenerGain(Args::new("GAIN", rest).f32(0)?),
            "SLPO" => Self::ListenerPosition(Args::new("SLPO", rest).vec3(0)?),
            "SLVE" => Self::ListenerVelocity(Args::new("SLVE", rest).vec3(0)?),
            "SLOR" => {
                let a = Args::new("SLOR", rest);
                Self::ListenerOrientation {
                    at: a.vec3(0)?,
                    up: a.vec3(3)?,
                }
            },
            "PARA" => {
                let a = Args::new("PARA", rest);
                Self::SetParameter {
                    code: a.parse(0)?,
                    value: a.f32(1)?,
                }
            },
            "PTFI" => {
                let (name, size) = rest
                    .rsplit_once(char::is_whitespace)
                    .map(|(name, size)| (name.trim(), size.trim()))
                    .ok_or(CommandError::MissingArgument {
                        verb: "PTFI",
                        index: 1,
                    })?;
                let size = size.parse().map_err(|_| CommandError::InvalidArgument {
                    verb: "PTFI",
                    value: size.to_string(),
                })?;
                Self::PutFile {
                    name: name.to_string(),
                    size,
                }
            },
            "QUIT" => Self::Quit,
            other => return Err(CommandError::UnknownVerb(other.to_string())),
        };
        Ok(command)
    }

    /// Reply owed to a client whose message for `verb` could not be parsed,
    /// so that callers waiting on a value are not left blocked.
    #[must_use]
    pub fn fallback_reply(message: &str) -> Option<Reply> {
        let verb = message
            .trim_matches(|c: char| c == '\0' || c.is_whitespace())
            .split(char::is_whitespace)
            .next()?;
        match verb {
            "GHDL" | "WAVE" => Some(Reply::Handle(None)),
            "STAT" => Some(Reply::State(0)),
            _ => None,
        }
    }

    /// Execute against the handler. Transport commands (`PutFile`, `Quit`)
    /// are no-ops here.
    pub fn apply(&self, handler: &AudioHandler) -> Option<Reply> {
        match *self {
            Self::CreateFromFile(ref name) => {
                Some(Reply::Handle(handler.create_source_from_file(name)))
            },
            Self::CreateWaveform(spec) => {
                Some(Reply::Handle(handler.create_source_from_waveform(spec)))
            },
            Self::QueryState(h) => Some(Reply::State(
                handler.source_state(h).map_or(0, SourceState::code),
            )),
            Self::Delete(h) => {
                handler.delete_source(h);
                None
            },
            Self::Play(h) => {
                handler.play_source(h);
                None
            },
            Self::Stop(h) => {
                handler.stop_source(h);
                None
            },
            Self::Pause(h) => {
                handler.pause_source(h);
                None
            },
            Self::SetPosition(h, v) => {
                handler.set_source_position(h, v);
                None
            },
            Self::SetVelocity(h, v) => {
                handler.set_source_velocity(h, v);
                None
            },
            Self::SetDirection(h, v) => {
                handler.set_source_direction(h, v);
                None
            },
            Self::SetDirectionAngle(h, angle) => {
                handler.set_source_direction_angle(h, angle);
                None
            },
            Self::SetSpeed(h, speed) => {
                handler.set_source_speed(h, speed);
                None
            },
            Self::SetGain(h, gain) => {
                handler.set_source_gain(h, gain);
                None
            },
            Self::SetPitch(h, pitch) => {
                handler.set_source_pitch(h, pitch);
                None
            },
            Self::Fade {
                handle,
                gain,
                seconds,
            } => {
                handler.fade_source(handle, gain, seconds);
                None
            },
            Self::SetLoop(h, looping) => {
                handler.set_source_loop(h, looping);
                None
            },
            Self::SetPlaybackPosition(h, seconds) => {
                handler.set_source_playback_position(h, seconds);
                None
            },
            Self::SetSourceParameter {
                handle,
                code,
                value,
            } => {
                handler.set_sound_rendering_parameter(handle, code, value);
                None
            },
            Self::ListenerGain(gain) => {
                handler.set_listener_gain(gain);
                None
            },
            Self::ListenerPosition(v) => {
                handler.set_listener_position(v);
                None
            },
            Self::ListenerVelocity(v) => {
                handler.set_listener_velocity(v);
                None
            },
            Self::ListenerOrientation { at, up } => {
                handler.set_listener_orientation(at, up);
                None
            },
            Self::SetParameter { code, value } => {
                handler.set_rendering_parameter(code, value);
                None
            },
            Self::PutFile { .. } | Self::Quit => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use auralis_audio::SimulatedEngine;

    #[test]
    fn test_parse_waveform_with_commas() {
        let command = Command::parse("WAVE 1, 440.000000, 0.000000, 2.000000\0").expect("parse");
        assert_eq!(
            command,
            Command::CreateWaveform(WaveformSpec::new(WaveShape::Sine, 440.0, 0.0, 2.0))
        );
    }

    #[test]
    fn test_parse_direction_forms() {
        assert_eq!(
            Command::parse("SSDI 3 0.5").expect("angle"),
            Command::SetDirectionAngle(Handle::new(3), 0.5)
        );
        assert_eq!(
            Command::parse("SSDI 3 0 0 1").expect("vector"),
            Command::SetDirection(Handle::new(3), Vec3::Z)
        );
    }

    #[test]
    fn test_parse_file_names() {
        assert_eq!(
            Command::parse("GHDL sounds/my clip.wav").expect("ghdl"),
            Command::CreateFromFile("sounds/my clip.wav".to_string())
        );
        assert_eq!(
            Command::parse("PTFI boom.wav 1024").expect("ptfi"),
            Command::PutFile {
                name: "boom.wav".to_string(),
                size: 1024
            }
        );
    }

    #[test]
    fn test_parse_listener_orientation() {
        assert_eq!(
            Command::parse("SLOR 0 0 -1 0 1 0").expect("slor"),
            Command::ListenerOrientation {
                at: Vec3::NEG_Z,
                up: Vec3::Y
            }
        );
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(Command::parse("  \0"), Err(CommandError::Empty));
        assert_eq!(
            Command::parse("NOPE 1"),
            Err(CommandError::UnknownVerb("NOPE".to_string()))
        );
        assert_eq!(
            Command::parse("SSPO 1 2 3"),
            Err(CommandError::MissingArgument {
                verb: "SSPO",
                index: 3
            })
        );
        assert!(matches!(
            Command::parse("PLAY -1"),
            Err(CommandError::InvalidArgument { .. })
        ));
        assert!(matches!(
            Command::parse("WAVE 9 440 0 1"),
            Err(CommandError::InvalidArgument { .. })
        ));
        assert!(matches!(
            Command::parse("SSVO 1 nan"),
            Err(CommandError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_fallback_replies() {
        assert_eq!(Command::fallback_reply("GHDL"), Some(Reply::Handle(None)));
        assert_eq!(Command::fallback_reply("STAT x"), Some(Reply::State(0)));
        assert_eq!(Command::fallback_reply("PLAY x"), None);
    }

    #[test]
    fn test_reply_encoding() {
        assert_eq!(Reply::Handle(Some(Handle::new(12))).encode(), b"12\0".to_vec());
        assert_eq!(Reply::Handle(None).encode(), b"-1\0".to_vec());
        assert_eq!(Reply::State(4).encode(), b"4\0".to_vec());
    }

    #[test]
    fn test_apply_sequence() {
        let handler = AudioHandler::new(SimulatedEngine::new());
        let reply = Command::parse("WAVE 1 440 0 2")
            .expect("parse")
            .apply(&handler);
        let Some(Reply::Handle(Some(handle))) = reply else {
            panic!("expected a handle, got {reply:?}");
        };

        Command::Play(handle).apply(&handler);
        assert_eq!(
            Command::QueryState(handle).apply(&handler),
            Some(Reply::State(2))
        );
        Command::Delete(handle).apply(&handler);
        assert_eq!(
            Command::QueryState(handle).apply(&handler),
            Some(Reply::State(5))
        );
        assert_eq!(
            Command::QueryState(Handle::new(77)).apply(&handler),
            Some(Reply::State(0))
        );
    }
}
