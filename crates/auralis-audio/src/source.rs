//! Audio Sources
//!
//! A source is one playable, positionable emitter bound to a buffer. It
//! mirrors the attributes it has pushed into the rendering engine and owns
//! the playback and fade state machine:
//!
//! ```text
//!            play              pause
//! Stopped ─────────▶ Playing ─────────▶ Paused
//!    ▲                │  ▲                │
//!    └──── stop ──────┘  └───── play ─────┘
//!
//! any state ── delete ──▶ PendingDelete (terminal)
//! ```
//!
//! Engine-side changes that happen without a command, such as reaching the
//! end of a non-looping buffer, are reconciled by [`AudioSource::update`].

use std::fmt;

use auralis_common::{Handle, Time};
use glam::Vec3;
use tracing::debug;

use crate::engine::{EngineState, RenderEngine, SourceAttribute};
use crate::unit::{format_vec3, AudioUnit, UnitAttributes, UnitKind};

/// Playback state of a source as seen by clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SourceState {
    /// Not playing; playback starts from the beginning.
    #[default]
    Stopped,
    /// Playing.
    Playing,
    /// Paused; playback resumes from the saved position.
    Paused,
    /// Deleted and awaiting reclamation.
    PendingDelete,
}

impl SourceState {
    /// Numeric state code used on the wire.
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::Playing => 2,
            Self::Paused => 3,
            Self::Stopped => 4,
            Self::PendingDelete => 5,
        }
    }

    /// Get a human-readable name for this state.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Playing => "playing",
            Self::Paused => "paused",
            Self::PendingDelete => "deleted",
        }
    }
}

impl From<EngineState> for SourceState {
    fn from(state: EngineState) -> Self {
        match state {
            EngineState::Initial | EngineState::Stopped => Self::Stopped,
            EngineState::Playing => Self::Playing,
            EngineState::Paused => Self::Paused,
        }
    }
}

impl fmt::Display for SourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-source rendering parameter codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum SourceParameter {
    /// Distance rolloff factor, non-negative.
    RolloffFactor = 1,
    /// Reference distance, non-negative.
    ReferenceDistance = 2,
    /// Inner cone angle in degrees, 0 to 360.
    ConeInnerAngle = 3,
    /// Outer cone angle in degrees, 0 to 360.
    ConeOuterAngle = 4,
    /// Gain outside the outer cone, 0 to 1.
    ConeOuterGain = 5,
}

impl SourceParameter {
    /// Parse from the numeric wire code.
    #[must_use]
    pub const fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(Self::RolloffFactor),
            2 => Some(Self::ReferenceDistance),
            3 => Some(Self::ConeInnerAngle),
            4 => Some(Self::ConeOuterAngle),
            5 => Some(Self::ConeOuterGain),
            _ => None,
        }
    }

    fn accepts(self, value: f32) -> bool {
        if !value.is_finite() {
            return false;
        }
        match self {
            Self::RolloffFactor | Self::ReferenceDistance => value >= 0.0,
            Self::ConeInnerAngle | Self::ConeOuterAngle => (0.0..=360.0).contains(&value),
            Self::ConeOuterGain => (0.0..=1.0).contains(&value),
        }
    }

    const fn attribute(self, value: f32) -> SourceAttribute {
        match self {
            Self::RolloffFactor => SourceAttribute::RolloffFactor(value),
            Self::ReferenceDistance => SourceAttribute::ReferenceDistance(value),
            Self::ConeInnerAngle => SourceAttribute::ConeInnerAngle(value),
            Self::ConeOuterAngle => SourceAttribute::ConeOuterAngle(value),
            Self::ConeOuterGain => SourceAttribute::ConeOuterGain(value),
        }
    }
}

/// Per-source distance and cone parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderingParameters {
    /// Distance rolloff factor.
    pub rolloff_factor: f32,
    /// Reference distance.
    pub reference_distance: f32,
    /// Inner cone angle in degrees.
    pub cone_inner_angle: f32,
    /// Outer cone angle in degrees.
    pub cone_outer_angle: f32,
    /// Gain outside the outer cone.
    pub cone_outer_gain: f32,
}

impl Default for RenderingParameters {
    fn default() -> Self {
        Self {
            rolloff_factor: 1.0,
            reference_distance: 1.0,
            cone_inner_angle: 360.0,
            cone_outer_angle: 360.0,
            cone_outer_gain: 0.0,
        }
    }
}

impl RenderingParameters {
    /// Current value of a parameter.
    #[must_use]
    pub const fn get(&self, parameter: SourceParameter) -> f32 {
        match parameter {
            SourceParameter::RolloffFactor => self.rolloff_factor,
            SourceParameter::ReferenceDistance => self.reference_distance,
            SourceParameter::ConeInnerAngle => self.cone_inner_angle,
            SourceParameter::ConeOuterAngle => self.cone_outer_angle,
            SourceParameter::ConeOuterGain => self.cone_outer_gain,
        }
    }

    fn set(&mut self, parameter: SourceParameter, value: f32) {
        match parameter {
            SourceParameter::RolloffFactor => self.rolloff_factor = value,
            SourceParameter::ReferenceDistance => self.reference_distance = value,
            SourceParameter::ConeInnerAngle => self.cone_inner_angle = value,
            SourceParameter::ConeOuterAngle => self.cone_outer_angle = value,
            SourceParameter::ConeOuterGain => self.cone_outer_gain = value,
        }
    }
}

/// An armed linear gain fade.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fade {
    /// Gain when the fade was armed.
    pub start_gain: f32,
    /// Gain reached at the end of the fade.
    pub target_gain: f32,
    /// When the fade was armed.
    pub start: Time,
    /// Length of the fade in seconds, always positive.
    pub duration: f64,
}

impl Fade {
    /// Completed fraction at `now`, clamped to `0..=1`.
    #[must_use]
    pub fn fraction(&self, now: Time) -> f64 {
        let elapsed = (now - self.start).as_secs_f64();
        (elapsed / self.duration).clamp(0.0, 1.0)
    }

    /// Interpolated gain at `now`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn gain_at(&self, now: Time) -> f32 {
        let fraction = self.fraction(now);
        if fraction >= 1.0 {
            return self.target_gain;
        }
        let start = f64::from(self.start_gain);
        let target = f64::from(self.target_gain);
        (start + fraction * (target - start)) as f32
    }
}

/// A playable emitter bound to one buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSource {
    handle: Handle,
    buffer: Handle,
    attrs: UnitAttributes,
    direction: Vec3,
    pitch: f32,
    looping: bool,
    state: SourceState,
    fade: Option<Fade>,
    params: RenderingParameters,
}

impl AudioSource {
    /// Create a source in the engine bound to `buffer` and push the given
    /// distance defaults.
    pub fn create(
        engine: &mut dyn RenderEngine,
        buffer: Handle,
        rolloff_factor: f32,
        reference_distance: f32,
    ) -> Option<Self> {
        let handle = engine.create_source(buffer)?;
        engine.apply_source(handle, SourceAttribute::RolloffFactor(rolloff_factor));
        engine.apply_source(handle, SourceAttribute::ReferenceDistance(reference_distance));
        debug!("Created source {} on buffer {}", handle, buffer);

        Some(Self {
            handle,
            buffer,
            attrs: UnitAttributes::default(),
            direction: Vec3::ZERO,
            pitch: 1.0,
            looping: false,
            state: SourceState::Stopped,
            fade: None,
            params: RenderingParameters {
                rolloff_factor,
                reference_distance,
                ..RenderingParameters::default()
            },
        })
    }

    /// Engine handle of this source.
    #[must_use]
    pub const fn source_handle(&self) -> Handle {
        self.handle
    }

    /// Buffer this source plays.
    #[must_use]
    pub const fn buffer(&self) -> Handle {
        self.buffer
    }

    /// Facing direction; zero means omnidirectional.
    #[must_use]
    pub const fn direction(&self) -> Vec3 {
        self.direction
    }

    /// Pitch multiplier.
    #[must_use]
    pub const fn pitch(&self) -> f32 {
        self.pitch
    }

    /// Whether the source loops.
    #[must_use]
    pub const fn is_looping(&self) -> bool {
        self.looping
    }

    /// Playback state.
    #[must_use]
    pub const fn state(&self) -> SourceState {
        self.state
    }

    /// The armed fade, if any.
    #[must_use]
    pub const fn fade_state(&self) -> Option<&Fade> {
        self.fade.as_ref()
    }

    /// Whether a fade is armed.
    #[must_use]
    pub const fn is_fading(&self) -> bool {
        self.fade.is_some()
    }

    /// Distance and cone parameters.
    #[must_use]
    pub const fn rendering_parameters(&self) -> &RenderingParameters {
        &self.params
    }

    /// Whether mutators may change audible state.
    #[must_use]
    pub fn is_mutable(&self) -> bool {
        self.attrs.valid && self.state != SourceState::PendingDelete
    }

    fn push(&self, engine: &mut dyn RenderEngine, attribute: SourceAttribute) -> bool {
        engine.apply_source(self.handle, attribute)
    }

    fn apply_gain(&mut self, engine: &mut dyn RenderEngine, gain: f32) -> bool {
        if !self.push(engine, SourceAttribute::Gain(gain)) {
            return false;
        }
        self.attrs.gain = gain;
        true
    }

    /// Start playback. Restarts from the beginning unless paused.
    pub fn play(&mut self, engine: &mut dyn RenderEngine) -> bool {
        if !self.is_mutable() || !engine.play(self.handle) {
            return false;
        }
        self.state = SourceState::Playing;
        true
    }

    /// Stop playback. Fails if already stopped.
    pub fn stop(&mut self, engine: &mut dyn RenderEngine) -> bool {
        if !self.is_mutable() || self.state == SourceState::Stopped {
            return false;
        }
        if !engine.stop(self.handle) {
            return false;
        }
        self.state = SourceState::Stopped;
        true
    }

    /// Pause playback. Only a playing source can be paused.
    pub fn pause(&mut self, engine: &mut dyn RenderEngine) -> bool {
        if !self.is_mutable() || self.state != SourceState::Playing {
            return false;
        }
        if !engine.pause(self.handle) {
            return false;
        }
        self.state = SourceState::Paused;
        true
    }

    /// Set the facing direction.
    pub fn set_direction(&mut self, engine: &mut dyn RenderEngine, direction: Vec3) -> bool {
        if !self.is_mutable() || !direction.is_finite() {
            return false;
        }
        if !self.push(engine, SourceAttribute::Direction(direction)) {
            return false;
        }
        self.direction = direction;
        true
    }

    /// Set the facing direction from an angle in the XZ plane, in radians.
    pub fn set_direction_angle(&mut self, engine: &mut dyn RenderEngine, angle: f32) -> bool {
        let (sin, cos) = angle.sin_cos();
        self.set_direction(engine, Vec3::new(sin, 0.0, cos))
    }

    /// Set the velocity to `speed` along the current direction.
    pub fn set_speed(&mut self, engine: &mut dyn RenderEngine, speed: f32) -> bool {
        if !speed.is_finite() {
            return false;
        }
        self.set_velocity(engine, self.direction * speed)
    }

    /// Set the pitch multiplier. Pitch must be positive.
    pub fn set_pitch(&mut self, engine: &mut dyn RenderEngine, pitch: f32) -> bool {
        if !self.is_mutable() || !pitch.is_finite() || pitch <= 0.0 {
            return false;
        }
        if !self.push(engine, SourceAttribute::Pitch(pitch)) {
            return false;
        }
        self.pitch = pitch;
        true
    }

    /// Enable or disable looping.
    pub fn set_loop(&mut self, engine: &mut dyn RenderEngine, looping: bool) -> bool {
        if !self.is_mutable() || !self.push(engine, SourceAttribute::Looping(looping)) {
            return false;
        }
        self.looping = looping;
        true
    }

    /// Seek to `seconds` into the buffer.
    pub fn set_playback_position(&mut self, engine: &mut dyn RenderEngine, seconds: f32) -> bool {
        if !self.is_mutable() || !seconds.is_finite() || seconds < 0.0 {
            return false;
        }
        self.push(engine, SourceAttribute::PlaybackPosition(seconds))
    }

    /// Set a distance or cone parameter.
    pub fn set_parameter(
        &mut self,
        engine: &mut dyn RenderEngine,
        parameter: SourceParameter,
        value: f32,
    ) -> bool {
        if !self.is_mutable() || !parameter.accepts(value) {
            return false;
        }
        if !self.push(engine, parameter.attribute(value)) {
            return false;
        }
        self.params.set(parameter, value);
        true
    }

    /// Fade the gain linearly to `target` over `duration` seconds starting
    /// at `now`. A non-positive duration sets the gain immediately.
    pub fn fade(
        &mut self,
        engine: &mut dyn RenderEngine,
        target: f32,
        duration: f64,
        now: Time,
    ) -> bool {
        if !self.is_mutable() || !target.is_finite() || target < 0.0 || duration.is_nan() {
            return false;
        }
        if duration <= 0.0 {
            self.fade = None;
            return self.apply_gain(engine, target);
        }
        self.fade = Some(Fade {
            start_gain: self.attrs.gain,
            target_gain: target,
            start: now,
            duration,
        });
        true
    }

    /// Advance the fade and reconcile playback state with the engine.
    ///
    /// The engine is queried when `force` is set or the source believes it
    /// is playing. Returns whether a visible attribute changed, or `force`.
    pub fn update(&mut self, engine: &mut dyn RenderEngine, now: Time, force: bool) -> bool {
        if !self.is_mutable() {
            return false;
        }
        let mut changed = false;

        if let Some(fade) = self.fade {
            let fraction = fade.fraction(now);
            let gain = fade.gain_at(now);
            if (gain - self.attrs.gain).abs() > f32::EPSILON || fraction >= 1.0 {
                changed |= self.apply_gain(engine, gain);
            }
            if fraction >= 1.0 {
                self.attrs.gain = fade.target_gain;
                self.fade = None;
            }
        }

        if force || self.state == SourceState::Playing {
            if let Some(reported) = engine.query_state(self.handle).map(SourceState::from) {
                if reported != self.state {
                    debug!("Source {} is now {}", self.handle, reported);
                    self.state = reported;
                    changed = true;
                }
            }
        }

        changed || force
    }

    /// Enter the terminal pending-delete state and release the engine
    /// source. Attributes stay readable.
    pub fn delete(&mut self, engine: &mut dyn RenderEngine) -> bool {
        if self.state == SourceState::PendingDelete {
            return false;
        }
        self.state = SourceState::PendingDelete;
        self.fade = None;
        engine.delete_source(self.handle)
    }

    /// Invalidated deep copy.
    #[must_use]
    pub fn snapshot(&self) -> Self {
        let mut copy = self.clone();
        copy.invalidate();
        copy
    }
}

impl AudioUnit for AudioSource {
    fn kind(&self) -> UnitKind {
        UnitKind::Source
    }

    fn handle(&self) -> Option<Handle> {
        Some(self.handle)
    }

    fn attributes(&self) -> &UnitAttributes {
        &self.attrs
    }

    fn invalidate(&mut self) {
        self.attrs.valid = false;
    }

    fn set_gain(&mut self, engine: &mut dyn RenderEngine, gain: f32) -> bool {
        if !self.is_mutable() || !gain.is_finite() || gain < 0.0 {
            return false;
        }
        if !self.apply_gain(engine, gain) {
            return false;
        }
        self.fade = None;
        true
    }

    fn set_position(&mut self, engine: &mut dyn RenderEngine, position: Vec3) -> bool {
        if !self.is_mutable() || !position.is_finite() {
            return false;
        }
        if !self.push(engine, SourceAttribute::Position(position)) {
            return false;
        }
        self.attrs.position = position;
        true
    }

    fn set_velocity(&mut self, engine: &mut dyn RenderEngine, velocity: Vec3) -> bool {
        if !self.is_mutable() || !velocity.is_finite() {
            return false;
        }
        if !self.push(engine, SourceAttribute::Velocity(velocity)) {
            return false;
        }
        self.attrs.velocity = velocity;
        true
    }

    fn fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("handle", self.handle.to_string()),
            ("buffer", self.buffer.to_string()),
            ("state", self.state.to_string()),
            ("gain", self.attrs.gain.to_string()),
            ("position", format_vec3(self.attrs.position)),
            ("velocity", format_vec3(self.attrs.velocity)),
            ("direction", format_vec3(self.direction)),
            ("pitch", self.pitch.to_string()),
            ("loop", self.looping.to_string()),
            (
                "fade",
                self.fade
                    .map_or_else(|| "none".to_string(), |f| format!("{}/{}s", f.target_gain, f.duration)),
            ),
            ("rolloff", self.params.rolloff_factor.to_string()),
            ("reference", self.params.reference_distance.to_string()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SampleData;
    use crate::simulated::SimulatedEngine;
    use proptest::prelude::*;

    fn setup() -> (SimulatedEngine, AudioSource) {
        let mut engine = SimulatedEngine::new();
        let buffer = engine
            .create_buffer(&SampleData::new(vec![0.0; 44100], 44100, 1))
            .expect("buffer");
        let source = AudioSource::create(&mut engine, buffer, 1.0, 1.0).expect("source");
        (engine, source)
    }

    #[test]
    fn test_defaults() {
        let (engine, source) = setup();
        assert_eq!(source.state(), SourceState::Stopped);
        assert!((source.gain() - 1.0).abs() < f32::EPSILON);
        assert!((source.pitch() - 1.0).abs() < f32::EPSILON);
        assert_eq!(source.direction(), Vec3::ZERO);
        assert!(!source.is_looping());
        assert!(source.is_valid());
        assert!(engine.source(source.source_handle()).is_some());
    }

    #[test]
    fn test_pitch_validation() {
        let (mut engine, mut source) = setup();
        assert!(!source.set_pitch(&mut engine, 0.0));
        assert!(!source.set_pitch(&mut engine, -1.0));
        assert!((source.pitch() - 1.0).abs() < f32::EPSILON);
        assert!(source.set_pitch(&mut engine, 2.0));
        assert!((source.pitch() - 2.0).abs() < f32::EPSILON);
        let view = engine.source(source.source_handle()).expect("view");
        assert!((view.pitch - 2.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_state_transitions() {
        let (mut engine, mut source) = setup();
        assert!(!source.stop(&mut engine));
        assert!(!source.pause(&mut engine));
        assert!(source.play(&mut engine));
        assert!(source.pause(&mut engine));
        assert_eq!(source.state(), SourceState::Paused);
        assert!(source.play(&mut engine));
        assert!(source.stop(&mut engine));
        assert_eq!(source.state(), SourceState::Stopped);
    }

    #[test]
    fn test_direction_angle() {
        let (mut engine, mut source) = setup();
        assert!(source.set_direction_angle(&mut engine, std::f32::consts::FRAC_PI_2));
        let d = source.direction();
        assert!((d.x - 1.0).abs() < 1e-6);
        assert!(d.y.abs() < f32::EPSILON);
        assert!(d.z.abs() < 1e-6);
    }

    #[test]
    fn test_speed_follows_direction() {
        let (mut engine, mut source) = setup();
        assert!(source.set_direction(&mut engine, Vec3::new(0.0, 0.0, -1.0)));
        assert!(source.set_speed(&mut engine, 3.0));
        assert_eq!(source.velocity(), Vec3::new(0.0, 0.0, -3.0));
    }

    #[test]
    fn test_rendering_parameters() {
        let (mut engine, mut source) = setup();
        assert!(source.set_parameter(&mut engine, SourceParameter::ConeInnerAngle, 90.0));
        assert!(!source.set_parameter(&mut engine, SourceParameter::ConeOuterAngle, 400.0));
        assert!(!source.set_parameter(&mut engine, SourceParameter::ConeOuterGain, 1.5));
        assert!(!source.set_parameter(&mut engine, SourceParameter::RolloffFactor, -1.0));
        let params = source.rendering_parameters();
        assert!((params.cone_inner_angle - 90.0).abs() < f32::EPSILON);
        assert!((params.cone_outer_angle - 360.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_zero_duration_fade_is_immediate() {
        let (mut engine, mut source) = setup();
        assert!(source.fade(&mut engine, 0.25, 0.0, Time::ZERO));
        assert!(!source.is_fading());
        assert!((source.gain() - 0.25).abs() < f32::EPSILON);

        assert!(source.fade(&mut engine, 0.75, -1.0, Time::ZERO));
        assert!(!source.is_fading());
        assert!((source.gain() - 0.75).abs() < f32::EPSILON);
        assert!(!source.fade(&mut engine, 0.5, f64::NAN, Time::ZERO));
    }

    #[test]
    fn test_fade_reaches_target_and_disarms() {
        let (mut engine, mut source) = setup();
        let start = Time::new(10, 0);
        assert!(source.fade(&mut engine, 0.0, 2.0, start));

        assert!(source.update(&mut engine, start + Time::new(1, 0), false));
        assert!((source.gain() - 0.5).abs() < 1e-6);

        assert!(source.update(&mut engine, start + Time::new(3, 0), false));
        assert!(source.gain().abs() < f32::EPSILON);
        assert!(!source.is_fading());

        // Disarmed: nothing further changes.
        assert!(!source.update(&mut engine, start + Time::new(4, 0), false));
        assert!(source.gain().abs() < f32::EPSILON);
        let view = engine.source(source.source_handle()).expect("view");
        assert!(view.gain.abs() < f32::EPSILON);
    }

    #[test]
    fn test_explicit_gain_cancels_fade() {
        let (mut engine, mut source) = setup();
        source.fade(&mut engine, 0.0, 5.0, Time::ZERO);
        assert!(source.set_gain(&mut engine, 0.8));
        assert!(!source.is_fading());
        assert!(!source.update(&mut engine, Time::new(10, 0), false));
        assert!((source.gain() - 0.8).abs() < f32::EPSILON);
    }

    #[test]
    fn test_forced_update_reconciles_completion() {
        let (mut engine, mut source) = setup();
        source.play(&mut engine);
        engine.finish_playback(source.source_handle());
        assert!(source.update(&mut engine, Time::ZERO, true));
        assert_eq!(source.state(), SourceState::Stopped);
    }

    #[test]
    fn test_deleted_source_rejects_mutators() {
        let (mut engine, mut source) = setup();
        assert!(source.delete(&mut engine));
        assert_eq!(source.state(), SourceState::PendingDelete);
        assert!(!source.set_gain(&mut engine, 0.5));
        assert!(!source.play(&mut engine));
        assert!(!source.set_position(&mut engine, Vec3::ONE));
        assert!(!source.update(&mut engine, Time::ZERO, true));
        assert!(!source.delete(&mut engine));
        assert_eq!(engine.source_count(), 0);
    }

    #[test]
    fn test_snapshot_is_read_only() {
        let (mut engine, source) = setup();
        let mut copy = source.snapshot();
        assert!(!copy.is_valid());
        assert!(!copy.set_gain(&mut engine, 0.1));
        assert!(!copy.set_pitch(&mut engine, 2.0));
        assert!(!copy.set_loop(&mut engine, true));
        assert!(!copy.fade(&mut engine, 0.0, 1.0, Time::ZERO));
        assert_eq!(copy.source_handle(), source.source_handle());
    }

    #[test]
    fn test_state_codes() {
        assert_eq!(SourceState::Playing.code(), 2);
        assert_eq!(SourceState::Paused.code(), 3);
        assert_eq!(SourceState::Stopped.code(), 4);
        assert_eq!(SourceState::PendingDelete.code(), 5);
        assert_eq!(SourceState::from(EngineState::Initial), SourceState::Stopped);
    }

    proptest! {
        #[test]
        fn prop_fade_is_monotonic(
            start_gain in 0.0f32..4.0,
            target in 0.0f32..4.0,
            duration in 0.01f64..30.0,
            steps in prop::collection::vec(0.0f64..5.0, 1..20),
        ) {
            let (mut engine, mut source) = setup();
            prop_assert!(source.set_gain(&mut engine, start_gain));
            prop_assert!(source.fade(&mut engine, target, duration, Time::ZERO));

            let mut elapsed = 0.0;
            let mut last_distance = (start_gain - target).abs();
            for step in steps {
                elapsed += step;
                source.update(&mut engine, Time::from_secs_f64(elapsed), false);
                let distance = (source.gain() - target).abs();
                prop_assert!(distance <= last_distance + 1e-5);
                last_distance = distance;
            }

            source.update(&mut engine, Time::from_secs_f64(elapsed + duration), false);
            prop_assert!((source.gain() - target).abs() < f32::EPSILON);
            prop_assert!(!source.is_fading());
        }
    }
}
