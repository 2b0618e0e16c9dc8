//! Simulated Rendering Engine
//!
//! A deterministic in-memory engine that records every applied attribute and
//! tracks playback state without touching an audio device. Used for headless
//! servers and throughout the test suite.
//!
//! Clones share state, so a test can keep one clone for inspection while the
//! resource manager owns another. Playback never completes on its own; call
//! [`SimulatedEngine::finish_playback`] to emulate the end of a buffer.

use std::sync::Arc;

use ahash::AHashMap;
use auralis_common::Handle;
use glam::Vec3;
use parking_lot::Mutex;
use tracing::debug;

use crate::engine::{EngineState, ListenerAttribute, RenderEngine, SampleData, SourceAttribute};

/// A buffer held by the simulated engine.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedBuffer {
    /// Duration at normal pitch in seconds.
    pub duration: f32,
    /// Number of interleaved channels.
    pub channels: u16,
    /// Whether the buffer is still backed by storage.
    pub valid: bool,
}

/// Engine-side view of a source.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedSource {
    /// Bound buffer.
    pub buffer: Handle,
    /// Playback state.
    pub state: EngineState,
    /// Gain.
    pub gain: f32,
    /// Position.
    pub position: Vec3,
    /// Velocity.
    pub velocity: Vec3,
    /// Direction.
    pub direction: Vec3,
    /// Pitch.
    pub pitch: f32,
    /// Looping flag.
    pub looping: bool,
    /// Playback offset in seconds.
    pub offset: f32,
    /// Rolloff factor.
    pub rolloff_factor: f32,
    /// Reference distance.
    pub reference_distance: f32,
    /// Cone inner angle.
    pub cone_inner_angle: f32,
    /// Cone outer angle.
    pub cone_outer_angle: f32,
    /// Cone outer gain.
    pub cone_outer_gain: f32,
}

impl SimulatedSource {
    fn new(buffer: Handle) -> Self {
        Self {
            buffer,
            state: EngineState::Initial,
            gain: 1.0,
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            direction: Vec3::ZERO,
            pitch: 1.0,
            looping: false,
            offset: 0.0,
            rolloff_factor: 1.0,
            reference_distance: 1.0,
            cone_inner_angle: 360.0,
            cone_outer_angle: 360.0,
            cone_outer_gain: 0.0,
        }
    }
}

/// Engine-side view of the listener.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedListener {
    /// Gain.
    pub gain: f32,
    /// Position.
    pub position: Vec3,
    /// Velocity.
    pub velocity: Vec3,
    /// Look-at vector.
    pub at: Vec3,
    /// Up vector.
    pub up: Vec3,
    /// Speed of sound.
    pub speed_of_sound: f32,
    /// Doppler factor.
    pub doppler_factor: f32,
}

impl Default for SimulatedListener {
    fn default() -> Self {
        Self {
            gain: 1.0,
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            at: Vec3::NEG_Z,
            up: Vec3::Y,
            speed_of_sound: crate::spatial::SPEED_OF_SOUND,
            doppler_factor: 1.0,
        }
    }
}

#[derive(Debug, Default)]
struct SimState {
    next_buffer: u32,
    next_source: u32,
    buffers: AHashMap<Handle, SimulatedBuffer>,
    sources: AHashMap<Handle, SimulatedSource>,
    listener: SimulatedListener,
    fail_next_source: bool,
    fail_next_buffer: bool,
}

/// Deterministic in-memory rendering engine.
#[derive(Debug, Clone, Default)]
pub struct SimulatedEngine {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedEngine {
    /// Create an empty simulated engine.
    #[must_use]
    pub fn new() -> Self {
        debug!("Created simulated rendering engine");
        Self::default()
    }

    /// Emulate the end of a non-looping buffer. Returns whether the source
    /// transitioned to stopped.
    pub fn finish_playback(&self, source: Handle) -> bool {
        let mut state = self.state.lock();
        match state.sources.get_mut(&source) {
            Some(s) if s.state == EngineState::Playing && !s.looping => {
                s.state = EngineState::Stopped;
                s.offset = 0.0;
                true
            },
            _ => false,
        }
    }

    /// Make the next `create_source` call fail.
    pub fn fail_next_source(&self) {
        self.state.lock().fail_next_source = true;
    }

    /// Make the next `create_buffer` call fail.
    pub fn fail_next_buffer(&self) {
        self.state.lock().fail_next_buffer = true;
    }

    /// Mark a buffer as no longer backed by storage.
    pub fn invalidate_buffer(&self, buffer: Handle) {
        if let Some(b) = self.state.lock().buffers.get_mut(&buffer) {
            b.valid = false;
        }
    }

    /// Engine-side copy of a source.
    #[must_use]
    pub fn source(&self, source: Handle) -> Option<SimulatedSource> {
        self.state.lock().sources.get(&source).cloned()
    }

    /// Engine-side copy of a buffer.
    #[must_use]
    pub fn buffer(&self, buffer: Handle) -> Option<SimulatedBuffer> {
        self.state.lock().buffers.get(&buffer).cloned()
    }

    /// Engine-side copy of the listener.
    #[must_use]
    pub fn listener(&self) -> SimulatedListener {
        self.state.lock().listener.clone()
    }

    /// Number of live sources.
    #[must_use]
    pub fn source_count(&self) -> usize {
        self.state.lock().sources.len()
    }

    /// Number of live buffers.
    #[must_use]
    pub fn buffer_count(&self) -> usize {
        self.state.lock().buffers.len()
    }
}

impl RenderEngine for SimulatedEngine {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn create_buffer(&mut self, data: &SampleData) -> Option<Handle> {
        let mut state = self.state.lock();
        if std::mem::take(&mut state.fail_next_buffer) || !data.is_playable() {
            return None;
        }
        state.next_buffer += 1;
        let handle = Handle::new(state.next_buffer);
        state.buffers.insert(
            handle,
            SimulatedBuffer {
                duration: data.duration().as_secs_f32(),
                channels: data.channels,
                valid: true,
            },
        );
        Some(handle)
    }

    fn is_buffer_valid(&self, buffer: Handle) -> bool {
        self.state.lock().buffers.get(&buffer).is_some_and(|b| b.valid)
    }

    fn delete_buffer(&mut self, buffer: Handle) -> bool {
        let mut state = self.state.lock();
        state.buffers.remove(&buffer).is_some()
    }

    fn create_source(&mut self, buffer: Handle) -> Option<Handle> {
        let mut state = self.state.lock();
        if std::mem::take(&mut state.fail_next_source) {
            return None;
        }
        if !state.buffers.get(&buffer).is_some_and(|b| b.valid) {
            return None;
        }
        state.next_source += 1;
        let handle = Handle::new(state.next_source);
        state.sources.insert(handle, SimulatedSource::new(buffer));
        Some(handle)
    }

    fn delete_source(&mut self, source: Handle) -> bool {
        let mut state = self.state.lock();
        state.sources.remove(&source).is_some()
    }

    fn apply_source(&mut self, source: Handle, attribute: SourceAttribute) -> bool {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let Some(s) = state.sources.get_mut(&source) else {
            return false;
        };
        match attribute {
            SourceAttribute::Gain(v) => s.gain = v,
            SourceAttribute::Position(v) => s.position = v,
            SourceAttribute::Velocity(v) => s.velocity = v,
            SourceAttribute::Direction(v) => s.direction = v,
            SourceAttribute::Pitch(v) => s.pitch = v,
            SourceAttribute::Looping(v) => s.looping = v,
            SourceAttribute::PlaybackPosition(seconds) => {
                let duration = state.buffers.get(&s.buffer).map_or(0.0, |b| b.duration);
                if seconds < 0.0 || seconds > duration {
                    return false;
                }
                s.offset = seconds;
            },
            SourceAttribute::RolloffFactor(v) => s.rolloff_factor = v,
            SourceAttribute::ReferenceDistance(v) => s.reference_distance = v,
            SourceAttribute::ConeInnerAngle(v) => s.cone_inner_angle = v,
            SourceAttribute::ConeOuterAngle(v) => s.cone_outer_angle = v,
            SourceAttribute::ConeOuterGain(v) => s.cone_outer_gain = v,
        }
        true
    }

    fn play(&mut self, source: Handle) -> bool {
        let mut state = self.state.lock();
        let Some(s) = state.sources.get_mut(&source) else {
            return false;
        };
        if s.state == EngineState::Playing {
            // Playing an already playing source restarts it.
            s.offset = 0.0;
        }
        s.state = EngineState::Playing;
        true
    }

    fn stop(&mut self, source: Handle) -> bool {
        let mut state = self.state.lock();
        let Some(s) = state.sources.get_mut(&source) else {
            return false;
        };
        s.state = EngineState::Stopped;
        s.offset = 0.0;
        true
    }

    fn pause(&mut self, source: Handle) -> bool {
        let mut state = self.state.lock();
        let Some(s) = state.sources.get_mut(&source) else {
            return false;
        };
        if s.state == EngineState::Playing {
            s.state = EngineState::Paused;
        }
        true
    }

    fn query_state(&self, source: Handle) -> Option<EngineState> {
        let mut state = self.state.lock();
        state.sources.get(&source).map(|s| s.state)
    }

    fn apply_listener(&mut self, attribute: ListenerAttribute) -> bool {
        let mut state = self.state.lock();
        let listener = &mut state.listener;
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
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_second() -> SampleData {
        SampleData::new(vec![0.0; 44100], 44100, 1)
    }

    #[test]
    fn test_source_handles_start_at_one_and_increase() {
        let mut engine = SimulatedEngine::new();
        let buffer = engine.create_buffer(&one_second()).expect("buffer");
        let a = engine.create_source(buffer).expect("source");
        let b = engine.create_source(buffer).expect("source");
        assert_eq!(a.raw(), 1);
        assert_eq!(b.raw(), 2);
    }

    #[test]
    fn test_source_requires_valid_buffer() {
        let mut engine = SimulatedEngine::new();
        assert!(engine.create_source(Handle::new(99)).is_none());

        let buffer = engine.create_buffer(&one_second()).expect("buffer");
        engine.invalidate_buffer(buffer);
        assert!(!engine.is_buffer_valid(buffer));
        assert!(engine.create_source(buffer).is_none());
    }

    #[test]
    fn test_playback_lifecycle() {
        let mut engine = SimulatedEngine::new();
        let buffer = engine.create_buffer(&one_second()).expect("buffer");
        let source = engine.create_source(buffer).expect("source");

        assert_eq!(engine.query_state(source), Some(EngineState::Initial));
        assert!(engine.play(source));
        assert!(engine.pause(source));
        assert_eq!(engine.query_state(source), Some(EngineState::Paused));
        assert!(engine.play(source));
        assert!(engine.finish_playback(source));
        assert_eq!(engine.query_state(source), Some(EngineState::Stopped));
    }

    #[test]
    fn test_looping_source_never_finishes() {
        let mut engine = SimulatedEngine::new();
        let buffer = engine.create_buffer(&one_second()).expect("buffer");
        let source = engine.create_source(buffer).expect("source");
        engine.apply_source(source, SourceAttribute::Looping(true));
        engine.play(source);
        assert!(!engine.finish_playback(source));
        assert_eq!(engine.query_state(source), Some(EngineState::Playing));
    }

    #[test]
    fn test_playback_position_bounds() {
        let mut engine = SimulatedEngine::new();
        let buffer = engine.create_buffer(&one_second()).expect("buffer");
        let source = engine.create_source(buffer).expect("source");
        assert!(engine.apply_source(source, SourceAttribute::PlaybackPosition(0.5)));
        assert!(!engine.apply_source(source, SourceAttribute::PlaybackPosition(2.0)));
        assert!(!engine.apply_source(source, SourceAttribute::PlaybackPosition(-1.0)));
        let view = engine.source(source).expect("view");
        assert!((view.offset - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_failure_injection_is_one_shot() {
        let mut engine = SimulatedEngine::new();
        engine.fail_next_buffer();
        assert!(engine.create_buffer(&one_second()).is_none());
        let buffer = engine.create_buffer(&one_second()).expect("buffer");

        engine.fail_next_source();
        assert!(engine.create_source(buffer).is_none());
        assert!(engine.create_source(buffer).is_some());
    }

    #[test]
    fn test_clones_share_state() {
        let engine = SimulatedEngine::new();
        let mut owner = engine.clone();
        let buffer = owner.create_buffer(&one_second()).expect("buffer");
        owner.create_source(buffer).expect("source");
        assert_eq!(engine.source_count(), 1);
        assert_eq!(engine.buffer_count(), 1);
    }
}
