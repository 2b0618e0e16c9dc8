//! Rendering Engine Contract
//!
//! The resource manager never mixes audio itself. It drives an external
//! rendering engine that owns the real buffers, voices and device, and
//! treats it as an opaque provider of:
//!
//! - handle issuance for buffers and sources
//! - attribute application (`apply_source`, `apply_listener`)
//! - playback control and playback-state queries
//!
//! Two engines ship with the crate: [`SimulatedEngine`](crate::SimulatedEngine)
//! (deterministic, headless) and [`RodioEngine`](crate::RodioEngine)
//! (device output through rodio).

use std::time::Duration;

use auralis_common::Handle;
use glam::Vec3;

/// Decoded or synthesised PCM data handed to the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleData {
    /// Interleaved samples.
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Number of interleaved channels.
    pub channels: u16,
}

impl SampleData {
    /// Create sample data.
    #[must_use]
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples,
            sample_rate,
            channels,
        }
    }

    /// Number of frames (samples per channel).
    #[must_use]
    pub fn frame_count(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / usize::from(self.channels)
        }
    }

    /// Playback length at normal pitch.
    #[must_use]
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frame_count() as f64 / f64::from(self.sample_rate))
    }

    /// Whether the data can back a buffer.
    #[must_use]
    pub fn is_playable(&self) -> bool {
        self.sample_rate > 0 && self.channels > 0 && self.frame_count() > 0
    }
}

/// A single source attribute to apply in the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SourceAttribute {
    /// Linear gain.
    Gain(f32),
    /// World position.
    Position(Vec3),
    /// Velocity, used only for doppler.
    Velocity(Vec3),
    /// Facing direction; zero means omnidirectional.
    Direction(Vec3),
    /// Pitch multiplier.
    Pitch(f32),
    /// Loop at end of buffer.
    Looping(bool),
    /// Playback offset in seconds.
    PlaybackPosition(f32),
    /// Distance rolloff factor.
    RolloffFactor(f32),
    /// Distance under which no attenuation is applied.
    ReferenceDistance(f32),
    /// Inner cone angle in degrees.
    ConeInnerAngle(f32),
    /// Outer cone angle in degrees.
    ConeOuterAngle(f32),
    /// Gain applied outside the outer cone.
    ConeOuterGain(f32),
}

/// A single listener attribute to apply in the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ListenerAttribute {
    /// Master gain.
    Gain(f32),
    /// World position.
    Position(Vec3),
    /// Velocity, used only for doppler.
    Velocity(Vec3),
    /// Look-at and up vectors.
    Orientation {
        /// Look-at vector.
        at: Vec3,
        /// Up vector.
        up: Vec3,
    },
    /// Speed of sound in world units per second.
    SpeedOfSound(f32),
    /// Doppler exaggeration factor.
    DopplerFactor(f32),
}

/// Playback state as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EngineState {
    /// Never played.
    #[default]
    Initial,
    /// Playing.
    Playing,
    /// Paused at a saved offset.
    Paused,
    /// Stopped or reached the end of the buffer.
    Stopped,
}

/// The external audio rendering engine.
pub trait RenderEngine: Send {
    /// Short engine name for logging.
    fn name(&self) -> &'static str;

    /// Upload sample data into a new buffer.
    fn create_buffer(&mut self, data: &SampleData) -> Option<Handle>;

    /// Whether a buffer handle is still backed by engine storage.
    fn is_buffer_valid(&self, buffer: Handle) -> bool;

    /// Free a buffer.
    fn delete_buffer(&mut self, buffer: Handle) -> bool;

    /// Create a source bound to a buffer. Source handles start at 1 and are
    /// never reused while the source is live.
    fn create_source(&mut self, buffer: Handle) -> Option<Handle>;

    /// Free a source, stopping it first.
    fn delete_source(&mut self, source: Handle) -> bool;

    /// Apply an attribute to a source.
    fn apply_source(&mut self, source: Handle, attribute: SourceAttribute) -> bool;

    /// Start playback, resuming from a pause point or restarting otherwise.
    fn play(&mut self, source: Handle) -> bool;

    /// Stop playback and rewind.
    fn stop(&mut self, source: Handle) -> bool;

    /// Pause playback, keeping the offset.
    fn pause(&mut self, source: Handle) -> bool;

    /// Current playback state, `None` for unknown handles.
    fn query_state(&self, source: Handle) -> Option<EngineState>;

    /// Apply a listener attribute.
    fn apply_listener(&mut self, attribute: ListenerAttribute) -> bool;
}
