//! The listener: the receiving ear of the scene.
//!
//! There is exactly one listener per handler. It shares the unit mutator
//! contract with sources, adds an orientation, and owns the process-wide
//! speed of sound and doppler factor.

use auralis_common::Handle;
use glam::Vec3;

use crate::engine::{ListenerAttribute, RenderEngine};
use crate::spatial::{ListenerPose, SPEED_OF_SOUND};
use crate::unit::{format_vec3, AudioUnit, UnitAttributes, UnitKind};

/// Default look-at vector.
pub const DEFAULT_AT: Vec3 = Vec3::NEG_Z;

/// Default up vector.
pub const DEFAULT_UP: Vec3 = Vec3::Y;

/// Default doppler factor.
pub const DEFAULT_DOPPLER_FACTOR: f32 = 1.0;

/// The listener.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioListener {
    attrs: UnitAttributes,
    at: Vec3,
    up: Vec3,
    speed_of_sound: f32,
    doppler_factor: f32,
}

impl Default for AudioListener {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioListener {
    /// Listener with factory defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            attrs: UnitAttributes::default(),
            at: DEFAULT_AT,
            up: DEFAULT_UP,
            speed_of_sound: SPEED_OF_SOUND,
            doppler_factor: DEFAULT_DOPPLER_FACTOR,
        }
    }

    /// Look-at vector.
    #[must_use]
    pub const fn at(&self) -> Vec3 {
        self.at
    }

    /// Up vector.
    #[must_use]
    pub const fn up(&self) -> Vec3 {
        self.up
    }

    /// Speed of sound.
    #[must_use]
    pub const fn speed_of_sound(&self) -> f32 {
        self.speed_of_sound
    }

    /// Doppler factor.
    #[must_use]
    pub const fn doppler_factor(&self) -> f32 {
        self.doppler_factor
    }

    /// State as consumed by the spatial model.
    #[must_use]
    pub fn pose(&self) -> ListenerPose {
        ListenerPose {
            position: self.attrs.position,
            velocity: self.attrs.velocity,
            at: self.at,
            up: self.up,
            gain: self.attrs.gain,
            speed_of_sound: self.speed_of_sound,
            doppler_factor: self.doppler_factor,
        }
    }

    /// Set the orientation. Both vectors must be finite and non-zero.
    pub fn set_orientation(&mut self, engine: &mut dyn RenderEngine, at: Vec3, up: Vec3) -> bool {
        if !self.attrs.valid || !at.is_finite() || !up.is_finite() {
            return false;
        }
        if at.length_squared() <= f32::EPSILON || up.length_squared() <= f32::EPSILON {
            return false;
        }
        if !engine.apply_listener(ListenerAttribute::Orientation { at, up }) {
            return false;
        }
        self.at = at;
        self.up = up;
        true
    }

    /// Set the speed of sound. Must be positive.
    pub fn set_speed_of_sound(&mut self, engine: &mut dyn RenderEngine, speed: f32) -> bool {
        if !self.attrs.valid || !speed.is_finite() || speed <= 0.0 {
            return false;
        }
        if !engine.apply_listener(ListenerAttribute::SpeedOfSound(speed)) {
            return false;
        }
        self.speed_of_sound = speed;
        true
    }

    /// Set the doppler factor. Must be non-negative.
    pub fn set_doppler_factor(&mut self, engine: &mut dyn RenderEngine, factor: f32) -> bool {
        if !self.attrs.valid || !factor.is_finite() || factor < 0.0 {
            return false;
        }
        if !engine.apply_listener(ListenerAttribute::DopplerFactor(factor)) {
            return false;
        }
        self.doppler_factor = factor;
        true
    }

    /// Restore factory defaults locally and in the engine.
    pub fn reset(&mut self, engine: &mut dyn RenderEngine) {
        *self = Self::new();
        engine.apply_listener(ListenerAttribute::Gain(self.attrs.gain));
        engine.apply_listener(ListenerAttribute::Position(self.attrs.position));
        engine.apply_listener(ListenerAttribute::Velocity(self.attrs.velocity));
        engine.apply_listener(ListenerAttribute::Orientation {
            at: self.at,
            up: self.up,
        });
        engine.apply_listener(ListenerAttribute::SpeedOfSound(self.speed_of_sound));
        engine.apply_listener(ListenerAttribute::DopplerFactor(self.doppler_factor));
    }

    /// Invalidated deep copy.
    #[must_use]
    pub fn snapshot(&self) -> Self {
        let mut copy = self.clone();
        copy.invalidate();
        copy
    }
}

impl AudioUnit for AudioListener {
    fn kind(&self) -> UnitKind {
        UnitKind::Listener
    }

    fn handle(&self) -> Option<Handle> {
        None
    }

    fn attributes(&self) -> &UnitAttributes {
        &self.attrs
    }

    fn invalidate(&mut self) {
        self.attrs.valid = false;
    }

    fn set_gain(&mut self, engine: &mut dyn RenderEngine, gain: f32) -> bool {
        if !self.attrs.valid || !gain.is_finite() || gain < 0.0 {
            return false;
        }
        if !engine.apply_listener(ListenerAttribute::Gain(gain)) {
            return false;
        }
        self.attrs.gain = gain;
        true
    }

    fn set_position(&mut self, engine: &mut dyn RenderEngine, position: Vec3) -> bool {
        if !self.attrs.valid || !position.is_finite() {
            return false;
        }
        if !engine.apply_listener(ListenerAttribute::Position(position)) {
            return false;
        }
        self.attrs.position = position;
        true
    }

    fn set_velocity(&mut self, engine: &mut dyn RenderEngine, velocity: Vec3) -> bool {
        if !self.attrs.valid || !velocity.is_finite() {
            return false;
        }
        if !engine.apply_listener(ListenerAttribute::Velocity(velocity)) {
            return false;
        }
        self.attrs.velocity = velocity;
        true
    }

    fn fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("gain", self.attrs.gain.to_string()),
            ("position", format_vec3(self.attrs.position)),
            ("velocity", format_vec3(self.attrs.velocity)),
            ("at", format_vec3(self.at)),
            ("up", format_vec3(self.up)),
            ("speed_of_sound", self.speed_of_sound.to_string()),
            ("doppler", self.doppler_factor.to_string()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulated::SimulatedEngine;
    use crate::spatial::{EmitterData, SpatialModel};

    #[test]
    fn test_factory_defaults() {
        let listener = AudioListener::new();
        assert!((listener.gain() - 1.0).abs() < f32::EPSILON);
        assert_eq!(listener.position(), Vec3::ZERO);
        assert_eq!(listener.at(), Vec3::new(0.0, 0.0, -1.0));
        assert_eq!(listener.up(), Vec3::new(0.0, 1.0, 0.0));
        assert!((listener.speed_of_sound() - 343.3).abs() < 1e-4);
        assert!(listener.handle().is_none());
    }

    #[test]
    fn test_speed_of_sound_must_be_positive() {
        let mut engine = SimulatedEngine::new();
        let mut listener = AudioListener::new();
        assert!(!listener.set_speed_of_sound(&mut engine, 0.0));
        assert!(!listener.set_speed_of_sound(&mut engine, -10.0));
        assert!((listener.speed_of_sound() - SPEED_OF_SOUND).abs() < f32::EPSILON);
        assert!(listener.set_speed_of_sound(&mut engine, 500.0));
        assert!((engine.listener().speed_of_sound - 500.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_orientation_rejects_zero_vectors() {
        let mut engine = SimulatedEngine::new();
        let mut listener = AudioListener::new();
        assert!(!listener.set_orientation(&mut engine, Vec3::ZERO, Vec3::Y));
        assert!(listener.set_orientation(&mut engine, Vec3::X, Vec3::Y));
        assert_eq!(engine.listener().at, Vec3::X);
    }

    #[test]
    fn test_reset_restores_defaults() {
        let mut engine = SimulatedEngine::new();
        let mut listener = AudioListener::new();
        listener.set_gain(&mut engine, 0.2);
        listener.set_position(&mut engine, Vec3::new(4.0, 5.0, 6.0));
        listener.set_doppler_factor(&mut engine, 2.0);

        listener.reset(&mut engine);
        assert_eq!(listener, AudioListener::new());
        assert!((engine.listener().gain - 1.0).abs() < f32::EPSILON);
        assert_eq!(engine.listener().position, Vec3::ZERO);
    }

    #[test]
    fn test_pose_drives_spatial_model() {
        let mut engine = SimulatedEngine::new();
        let mut listener = AudioListener::new();
        listener.set_position(&mut engine, Vec3::new(10.0, 0.0, 0.0));
        listener.set_gain(&mut engine, 0.5);

        let model = SpatialModel::new(listener.pose());
        let params = model.calculate(&EmitterData::at(Vec3::new(10.0, 0.0, -1.0)));
        assert!((params.gain - 0.5).abs() < 1e-6);
        assert!(params.pan.abs() < 1e-6);

        // Source to the listener's right after moving.
        let params = model.calculate(&EmitterData::at(Vec3::new(12.0, 0.0, 0.0)));
        assert!(params.pan > 0.99);
    }

    #[test]
    fn test_snapshot_rejects_mutators() {
        let mut engine = SimulatedEngine::new();
        let mut copy = AudioListener::new().snapshot();
        assert!(!copy.set_gain(&mut engine, 0.5));
        assert!(!copy.set_position(&mut engine, Vec3::ONE));
        assert!(!copy.set_orientation(&mut engine, Vec3::X, Vec3::Y));
        assert!(!copy.set_speed_of_sound(&mut engine, 100.0));
    }
}
