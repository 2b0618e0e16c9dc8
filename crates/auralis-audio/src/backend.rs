//! Rodio Rendering Engine
//!
//! Device-backed [`RenderEngine`] using rodio:
//!
//! - one `SamplesBuffer` per engine buffer, cloned into a voice on play
//! - one `Sink` per playing source
//! - positional attributes rendered through the [`SpatialModel`] into an
//!   effective sink volume and speed, plus constant-power left/right gains
//!   applied by a [`Panned`] wrapper around the voice's samples
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐   OutputStreamHandle    ┌──────────────────┐
//! │ auralis-output thread│ ──────────────────────▶ │   RodioEngine    │
//! │  owns OutputStream   │ ◀────── shutdown ────── │  Sink per voice  │
//! └──────────────────────┘    (crossbeam-channel)  └──────────────────┘
//! ```
//!
//! The output stream is not `Send`, so it lives on a dedicated thread for the
//! lifetime of the engine. Dropping the engine stops that thread.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use ahash::AHashMap;
use auralis_common::{EngineError, EngineResult, Handle};
use crossbeam_channel::{bounded, Sender};
use rodio::buffer::SamplesBuffer;
use rodio::cpal::traits::{DeviceTrait, HostTrait};
use rodio::source::SeekError;
use rodio::{OutputStream, OutputStreamHandle, Sink, Source, StreamError};
use tracing::{debug, info, warn};

use crate::engine::{EngineState, ListenerAttribute, RenderEngine, SampleData, SourceAttribute};
use crate::spatial::{pan_gains, EmitterData, SpatialModel};

/// Left and right gains shared between the engine and a playing voice.
#[derive(Debug)]
pub struct StereoGains {
    left: AtomicU32,
    right: AtomicU32,
}

impl Default for StereoGains {
    fn default() -> Self {
        let gains = Self {
            left: AtomicU32::new(0),
            right: AtomicU32::new(0),
        };
        gains.set_pan(0.0);
        gains
    }
}

impl StereoGains {
    /// Place the voice between -1 (full left) and 1 (full right).
    pub fn set_pan(&self, pan: f32) {
        let (left, right) = pan_gains(pan);
        self.left.store(left.to_bits(), Ordering::Relaxed);
        self.right.store(right.to_bits(), Ordering::Relaxed);
    }

    /// Current left channel gain.
    #[must_use]
    pub fn left(&self) -> f32 {
        f32::from_bits(self.left.load(Ordering::Relaxed))
    }

    /// Current right channel gain.
    #[must_use]
    pub fn right(&self) -> f32 {
        f32::from_bits(self.right.load(Ordering::Relaxed))
    }
}

/// Source wrapper applying [`StereoGains`] to the first two channels.
///
/// Mono input is spread to two channels so it can be placed.
pub struct Panned<S> {
    input: S,
    gains: Arc<StereoGains>,
    input_channels: u16,
    channel: u16,
    held: Option<f32>,
}

impl<S> Panned<S>
where
    S: Source<Item = f32>,
{
    /// Wrap `input`, reading gains from `gains` on every sample.
    pub fn new(input: S, gains: Arc<StereoGains>) -> Self {
        let input_channels = input.channels().max(1);
        Self {
            input,
            gains,
            input_channels,
            channel: 0,
            held: None,
        }
    }
}

impl<S> Iterator for Panned<S>
where
    S: Source<Item = f32>,
{
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.input_channels == 1 {
            if let Some(sample) = self.held.take() {
                return Some(sample * self.gains.right());
            }
            let sample = self.input.next()?;
            self.held = Some(sample);
            return Some(sample * self.gains.left());
        }

        let sample = self.input.next()?;
        let gain = match self.channel {
            0 => self.gains.left(),
            1 => self.gains.right(),
            _ => 1.0,
        };
        self.channel = (self.channel + 1) % self.input_channels;
        Some(sample * gain)
    }
}

impl<S> Source for Panned<S>
where
    S: Source<Item = f32>,
{
    fn current_frame_len(&self) -> Option<usize> {
        let len = self.input.current_frame_len()?;
        if self.input_channels == 1 {
            Some(len * 2 + usize::from(self.held.is_some()))
        } else {
            Some(len)
        }
    }

    fn channels(&self) -> u16 {
        self.input_channels.max(2)
    }

    fn sample_rate(&self) -> u32 {
        self.input.sample_rate()
    }

    fn total_duration(&self) -> Option<Duration> {
        self.input.total_duration()
    }

    fn try_seek(&mut self, pos: Duration) -> Result<(), SeekError> {
        self.channel = 0;
        self.held = None;
        self.input.try_seek(pos)
    }
}

/// A source as held by the rodio engine.
struct Voice {
    buffer: Handle,
    emitter: EmitterData,
    pan: Arc<StereoGains>,
    looping: bool,
    sink: Option<Sink>,
    pending_seek: Option<f32>,
    started: bool,
}

impl Voice {
    fn new(buffer: Handle) -> Self {
        Self {
            buffer,
            emitter: EmitterData::default(),
            pan: Arc::new(StereoGains::default()),
            looping: false,
            sink: None,
            pending_seek: None,
            started: false,
        }
    }
}

fn open_stream(device: Option<&str>) -> EngineResult<(OutputStream, OutputStreamHandle)> {
    let Some(name) = device else {
        return OutputStream::try_default().map_err(|e| match e {
            StreamError::NoDevice => EngineError::NoDevice,
            other => EngineError::DeviceInitFailed(other.to_string()),
        });
    };

    let host = rodio::cpal::default_host();
    let mut devices = host
        .output_devices()
        .map_err(|e| EngineError::DeviceInitFailed(e.to_string()))?;
    let device = devices
        .find(|d| d.name().is_ok_and(|n| n == name))
        .ok_or_else(|| EngineError::DeviceNotFound(name.to_string()))?;
    OutputStream::try_from_device(&device).map_err(|e| EngineError::DeviceInitFailed(e.to_string()))
}

/// Rendering engine that plays through an audio output device.
pub struct RodioEngine {
    stream: OutputStreamHandle,
    shutdown: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
    next_buffer: u32,
    next_source: u32,
    buffers: AHashMap<Handle, Arc<SampleData>>,
    voices: AHashMap<Handle, Voice>,
    model: SpatialModel,
}

impl std::fmt::Debug for RodioEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RodioEngine")
            .field("buffers", &self.buffers.len())
            .field("voices", &self.voices.len())
            .finish_non_exhaustive()
    }
}

impl RodioEngine {
    /// Open the named output device, or the system default when `None`.
    pub fn open(device: Option<&str>) -> EngineResult<Self> {
        let (stream_tx, stream_rx) = bounded(1);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let device = device.map(str::to_string);

        let thread = std::thread::Builder::new()
            .name("auralis-output".to_string())
            .spawn(move || match open_stream(device.as_deref()) {
                Ok((stream, handle)) => {
                    if stream_tx.send(Ok(handle)).is_ok() {
                        // Blocks until the engine is dropped.
                        let _ = shutdown_rx.recv();
                    }
                    drop(stream);
                },
                Err(e) => {
                    let _ = stream_tx.send(Err(e));
                },
            })?;

        let stream = stream_rx
            .recv()
            .map_err(|_| EngineError::DeviceInitFailed("output thread exited".to_string()))??;

        info!("Audio device initialized");
        Ok(Self {
            stream,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
            next_buffer: 0,
            next_source: 0,
            buffers: AHashMap::new(),
            voices: AHashMap::new(),
            model: SpatialModel::default(),
        })
    }

    /// Names of the available output devices.
    pub fn device_names() -> EngineResult<Vec<String>> {
        let host = rodio::cpal::default_host();
        let devices = host
            .output_devices()
            .map_err(|e| EngineError::DeviceInitFailed(e.to_string()))?;
        Ok(devices.filter_map(|d| d.name().ok()).collect())
    }

    fn render(model: &SpatialModel, voice: &Voice) {
        let params = model.calculate(&voice.emitter);
        voice.pan.set_pan(params.pan);
        let Some(sink) = &voice.sink else {
            return;
        };
        sink.set_volume(if params.audible { params.gain } else { 0.0 });
        sink.set_speed(params.pitch.max(f32::EPSILON));
    }

    fn render_all(&self) {
        for voice in self.voices.values() {
            Self::render(&self.model, voice);
        }
    }

    fn start_voice(&mut self, source: Handle) -> bool {
        let Some(voice) = self.voices.get_mut(&source) else {
            return false;
        };
        let Some(data) = self.buffers.get(&voice.buffer) else {
            return false;
        };

        let sink = match Sink::try_new(&self.stream) {
            Ok(sink) => sink,
            Err(e) => {
                warn!("Failed to create sink for source {}: {}", source, e);
                return false;
            },
        };
        let samples = SamplesBuffer::new(data.channels, data.sample_rate, data.samples.clone());
        if voice.looping {
            sink.append(Panned::new(samples.repeat_infinite(), Arc::clone(&voice.pan)));
        } else {
            sink.append(Panned::new(samples, Arc::clone(&voice.pan)));
        }
        if let Some(offset) = voice.pending_seek.take() {
            if let Err(e) = sink.try_seek(Duration::from_secs_f32(offset)) {
                debug!("Seek on source {} failed: {}", source, e);
            }
        }

        voice.sink = Some(sink);
        voice.started = true;
        Self::render(&self.model, voice);
        true
    }
}

impl Drop for RodioEngine {
    fn drop(&mut self) {
        self.voices.clear();
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Audio output thread panicked");
            }
        }
        debug!("Audio device closed");
    }
}

impl RenderEngine for RodioEngine {
    fn name(&self) -> &'static str {
        "rodio"
    }

    fn create_buffer(&mut self, data: &SampleData) -> Option<Handle> {
        if !data.is_playable() {
            return None;
        }
        self.next_buffer += 1;
        let handle = Handle::new(self.next_buffer);
        self.buffers.insert(handle, Arc::new(data.clone()));
        Some(handle)
    }

    fn is_buffer_valid(&self, buffer: Handle) -> bool {
        self.buffers.contains_key(&buffer)
    }

    fn delete_buffer(&mut self, buffer: Handle) -> bool {
        self.buffers.remove(&buffer).is_some()
    }

    fn create_source(&mut self, buffer: Handle) -> Option<Handle> {
        if !self.buffers.contains_key(&buffer) {
            return None;
        }
        self.next_source += 1;
        let handle = Handle::new(self.next_source);
        self.voices.insert(handle, Voice::new(buffer));
        Some(handle)
    }

    fn delete_source(&mut self, source: Handle) -> bool {
        self.voices.remove(&source).is_some()
    }

    fn apply_source(&mut self, source: Handle, attribute: SourceAttribute) -> bool {
        let Some(voice) = self.voices.get_mut(&source) else {
            return false;
        };
        let emitter = &mut voice.emitter;
        match attribute {
            SourceAttribute::Gain(v) => emitter.gain = v,
            SourceAttribute::Position(v) => emitter.position = v,
            SourceAttribute::Velocity(v) => emitter.velocity = v,
            SourceAttribute::Direction(v) => emitter.direction = v,
            SourceAttribute::Pitch(v) => emitter.pitch = v,
            // Takes effect the next time the voice starts.
            SourceAttribute::Looping(v) => voice.looping = v,
            SourceAttribute::PlaybackPosition(seconds) => {
                let duration = self
                    .buffers
                    .get(&voice.buffer)
                    .map_or(0.0, |b| b.duration().as_secs_f32());
                if seconds < 0.0 || seconds > duration {
                    return false;
                }
                match &voice.sink {
                    Some(sink) => {
                        if let Err(e) = sink.try_seek(Duration::from_secs_f32(seconds)) {
                            debug!("Seek on source {} failed: {}", source, e);
                            return false;
                        }
                    },
                    None => voice.pending_seek = Some(seconds),
                }
            },
            SourceAttribute::RolloffFactor(v) => emitter.rolloff_factor = v,
            SourceAttribute::ReferenceDistance(v) => emitter.reference_distance = v,
            SourceAttribute::ConeInnerAngle(v) => emitter.cone_inner_angle = v,
            SourceAttribute::ConeOuterAngle(v) => emitter.cone_outer_angle = v,
            SourceAttribute::ConeOuterGain(v) => emitter.cone_outer_gain = v,
        }
        Self::render(&self.model, voice);
        true
    }

    fn play(&mut self, source: Handle) -> bool {
        let Some(voice) = self.voices.get(&source) else {
            return false;
        };
        if let Some(sink) = &voice.sink {
            if sink.is_paused() && !sink.empty() {
                sink.play();
                return true;
            }
        }
        self.start_voice(source)
    }

    fn stop(&mut self, source: Handle) -> bool {
        let Some(voice) = self.voices.get_mut(&source) else {
            return false;
        };
        voice.sink = None;
        voice.pending_seek = None;
        true
    }

    fn pause(&mut self, source: Handle) -> bool {
        let Some(voice) = self.voices.get(&source) else {
            return false;
        };
        if let Some(sink) = &voice.sink {
            sink.pause();
        }
        true
    }

    fn query_state(&self, source: Handle) -> Option<EngineState> {
        let voice = self.voices.get(&source)?;
        let state = match &voice.sink {
            None if voice.started => EngineState::Stopped,
            None => EngineState::Initial,
            Some(sink) if sink.empty() => EngineState::Stopped,
            Some(sink) if sink.is_paused() => EngineState::Paused,
            Some(_) => EngineState::Playing,
        };
        Some(state)
    }

    fn apply_listener(&mut self, attribute: ListenerAttribute) -> bool {
        let listener = self.model.listener_mut();
        match attribute {
            ListenerAttribute::Gain(v) => listener.gain = v,
            ListenerAttribute::Position(v) => listener.position = v,
            ListenerAttribute::Velocity(v) => listener.velocity = v,
            ListenerAttribute::Orientation { at, up } => {
                listener.at = at;
                listener.up = up;
            },
            ListenerAttribute::SpeedOfSound(v) => listener.speed_of_sound = v,
            ListenerAttribute::DopplerFactor(v) => listener.doppler_factor = v,
        }
        self.render_all();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_mono_is_spread_to_stereo() {
        let gains = Arc::new(StereoGains::default());
        let input = SamplesBuffer::new(1, 44100, vec![1.0_f32, 0.5]);
        let panned = Panned::new(input, Arc::clone(&gains));
        assert_eq!(panned.channels(), 2);

        let out: Vec<f32> = panned.collect();
        let centre = std::f32::consts::FRAC_1_SQRT_2;
        assert_eq!(out.len(), 4);
        assert!((out[0] - centre).abs() < 1e-5);
        assert!((out[1] - centre).abs() < 1e-5);
        assert!((out[2] - 0.5 * centre).abs() < 1e-5);
        assert!((out[3] - 0.5 * centre).abs() < 1e-5);
    }

    #[test]
    fn test_pan_changes_apply_while_playing() {
        let gains = Arc::new(StereoGains::default());
        let input = SamplesBuffer::new(2, 44100, vec![1.0_f32; 6]);
        let mut panned = Panned::new(input, Arc::clone(&gains));

        assert!((panned.next().expect("left") - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-5);
        assert!((panned.next().expect("right") - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-5);

        gains.set_pan(1.0);
        assert!(panned.next().expect("left").abs() < 1e-5);
        assert!((panned.next().expect("right") - 1.0).abs() < 1e-5);

        gains.set_pan(-1.0);
        assert!((panned.next().expect("left") - 1.0).abs() < 1e-5);
        assert!(panned.next().expect("right").abs() < 1e-5);
        assert!(panned.next().is_none());
    }

    #[test]
    fn test_render_places_voice() {
        let mut model = SpatialModel::default();
        let mut voice = Voice::new(Handle::new(1));
        voice.emitter.position = Vec3::new(5.0, 0.0, 0.0);

        RodioEngine::render(&model, &voice);
        assert!(voice.pan.left() < 1e-3);
        assert!((voice.pan.right() - 1.0).abs() < 1e-3);

        model.listener_mut().position = Vec3::new(10.0, 0.0, 0.0);
        RodioEngine::render(&model, &voice);
        assert!((voice.pan.left() - 1.0).abs() < 1e-3);
    }
}
