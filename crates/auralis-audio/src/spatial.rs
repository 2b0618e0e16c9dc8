//! 3D Spatial Model
//!
//! Computes how a positioned source is heard by the listener:
//!
//! - **Distance attenuation**: inverse distance, clamped at the reference
//!   distance and scaled by the per-source rolloff factor
//! - **Directional cones**: sources with a facing direction fade from full
//!   gain inside the inner cone to the outer gain beyond the outer cone
//! - **Doppler effect**: pitch shifts from the relative velocity along the
//!   source-listener axis
//! - **Panning**: left/right placement relative to the listener orientation
//!
//! The simulated engine only records attributes; device-backed engines feed
//! the result of [`SpatialModel::calculate`] into their voices.

use glam::Vec3;

/// Default speed of sound in world units per second.
pub const SPEED_OF_SOUND: f32 = 343.3;

/// Minimum volume threshold for audibility.
pub const MIN_AUDIBLE_VOLUME: f32 = 0.001;

/// Listener state used for spatial calculations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ListenerPose {
    /// World position.
    pub position: Vec3,
    /// Velocity for doppler.
    pub velocity: Vec3,
    /// Look-at vector.
    pub at: Vec3,
    /// Up vector.
    pub up: Vec3,
    /// Master gain.
    pub gain: f32,
    /// Speed of sound.
    pub speed_of_sound: f32,
    /// Doppler exaggeration factor; zero disables doppler.
    pub doppler_factor: f32,
}

impl Default for ListenerPose {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            at: Vec3::NEG_Z,
            up: Vec3::Y,
            gain: 1.0,
            speed_of_sound: SPEED_OF_SOUND,
            doppler_factor: 1.0,
        }
    }
}

impl ListenerPose {
    /// Unit vector pointing to the listener's right, if the orientation is
    /// well formed.
    #[must_use]
    pub fn right(&self) -> Option<Vec3> {
        self.at.cross(self.up).try_normalize()
    }
}

/// Emitter state used for spatial calculations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmitterData {
    /// World position.
    pub position: Vec3,
    /// Velocity for doppler.
    pub velocity: Vec3,
    /// Facing direction; zero means omnidirectional.
    pub direction: Vec3,
    /// Source gain.
    pub gain: f32,
    /// Base pitch multiplier.
    pub pitch: f32,
    /// Distance rolloff factor.
    pub rolloff_factor: f32,
    /// Distance under which no attenuation is applied.
    pub reference_distance: f32,
    /// Inner cone angle in degrees.
    pub cone_inner_angle: f32,
    /// Outer cone angle in degrees.
    pub cone_outer_angle: f32,
    /// Gain applied outside the outer cone.
    pub cone_outer_gain: f32,
}

impl Default for EmitterData {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            direction: Vec3::ZERO,
            gain: 1.0,
            pitch: 1.0,
            rolloff_factor: 1.0,
            reference_distance: 1.0,
            cone_inner_angle: 360.0,
            cone_outer_angle: 360.0,
            cone_outer_gain: 0.0,
        }
    }
}

impl EmitterData {
    /// Emitter at a position with default parameters.
    #[must_use]
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    /// Set velocity for doppler.
    #[must_use]
    pub const fn with_velocity(mut self, velocity: Vec3) -> Self {
        self.velocity = velocity;
        self
    }

    /// Set facing direction and cone.
    #[must_use]
    pub const fn with_cone(mut self, direction: Vec3, inner: f32, outer: f32, outer_gain: f32) -> Self {
        self.direction = direction;
        self.cone_inner_angle = inner;
        self.cone_outer_angle = outer;
        self.cone_outer_gain = outer_gain;
        self
    }

    /// Set distance attenuation parameters.
    #[must_use]
    pub const fn with_attenuation(mut self, reference_distance: f32, rolloff_factor: f32) -> Self {
        self.reference_distance = reference_distance;
        self.rolloff_factor = rolloff_factor;
        self
    }
}

/// Calculated parameters for playback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpatialParams {
    /// Combined gain: source, listener, distance and cone.
    pub gain: f32,
    /// Final pitch multiplier including doppler.
    pub pitch: f32,
    /// Distance from listener.
    pub distance: f32,
    /// Pan position (-1.0 = full left, 0.0 = center, 1.0 = full right).
    pub pan: f32,
    /// Whether the sound is audible at all.
    pub audible: bool,
}

/// Constant-power left and right channel gains for a pan position.
#[must_use]
pub fn pan_gains(pan: f32) -> (f32, f32) {
    let angle = (pan.clamp(-1.0, 1.0) + 1.0) * std::f32::consts::FRAC_PI_4;
    (angle.cos(), angle.sin())
}

/// Inverse distance attenuation clamped at the reference distance.
#[must_use]
pub fn distance_gain(distance: f32, reference_distance: f32, rolloff_factor: f32) -> f32 {
    let d = distance.max(reference_distance);
    let denominator = reference_distance + rolloff_factor * (d - reference_distance);
    if denominator <= f32::EPSILON {
        return 1.0;
    }
    (reference_distance / denominator).clamp(0.0, 1.0)
}

/// Gain contributed by the emitter's directional cone for a listener at
/// `listener_position`.
#[must_use]
pub fn cone_gain(emitter: &EmitterData, listener_position: Vec3) -> f32 {
    let Some(facing) = emitter.direction.try_normalize() else {
        return 1.0;
    };
    let Some(to_listener) = (listener_position - emitter.position).try_normalize() else {
        return 1.0;
    };
    let angle = facing.dot(to_listener).clamp(-1.0, 1.0).acos().to_degrees();
    let inner = emitter.cone_inner_angle * 0.5;
    let outer = emitter.cone_outer_angle * 0.5;

    if angle <= inner {
        1.0
    } else if angle >= outer {
        emitter.cone_outer_gain
    } else {
        let t = (angle - inner) / (outer - inner);
        1.0 + (emitter.cone_outer_gain - 1.0) * t
    }
}

/// Spatial calculator for a single listener.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpatialModel {
    listener: ListenerPose,
}

impl SpatialModel {
    /// Create a model for the given listener.
    #[must_use]
    pub const fn new(listener: ListenerPose) -> Self {
        Self { listener }
    }

    /// Current listener state.
    #[must_use]
    pub const fn listener(&self) -> &ListenerPose {
        &self.listener
    }

    /// Mutable listener state.
    pub fn listener_mut(&mut self) -> &mut ListenerPose {
        &mut self.listener
    }

    /// Calculate playback parameters for an emitter.
    #[must_use]
    pub fn calculate(&self, emitter: &EmitterData) -> SpatialParams {
        let offset = emitter.position - self.listener.position;
        let distance = offset.length();

        let attenuation =
            distance_gain(distance, emitter.reference_distance, emitter.rolloff_factor);
        let cone = cone_gain(emitter, self.listener.position);
        let gain = emitter.gain * self.listener.gain * attenuation * cone;

        let pan = match (offset.try_normalize(), self.listener.right()) {
            (Some(to_source), Some(right)) => to_source.dot(right).clamp(-1.0, 1.0),
            _ => 0.0,
        };

        SpatialParams {
            gain,
            pitch: emitter.pitch * self.doppler_shift(emitter),
            distance,
            pan,
            audible: gain >= MIN_AUDIBLE_VOLUME,
        }
    }

    /// Doppler pitch multiplier for an emitter.
    #[must_use]
    pub fn doppler_shift(&self, emitter: &EmitterData) -> f32 {
        let c = self.listener.speed_of_sound;
        let factor = self.listener.doppler_factor;
        if factor <= 0.0 || c <= 0.0 {
            return 1.0;
        }
        // Axis from source to listener.
        let Some(axis) = (self.listener.position - emitter.position).try_normalize() else {
            return 1.0;
        };

        let limit = c / factor;
        let vls = self.listener.velocity.dot(axis).min(limit);
        let vss = emitter.velocity.dot(axis).min(limit);

        let denominator = c - factor * vss;
        if denominator.abs() <= 0.01 {
            return 1.0;
        }
        (c - factor * vls) / denominator
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_gain_clamped_inside_reference() {
        assert!((distance_gain(0.0, 1.0, 1.0) - 1.0).abs() < f32::EPSILON);
        assert!((distance_gain(0.5, 1.0, 1.0) - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_distance_gain_inverse_falloff() {
        assert!((distance_gain(2.0, 1.0, 1.0) - 0.5).abs() < 1e-6);
        assert!((distance_gain(4.0, 1.0, 1.0) - 0.25).abs() < 1e-6);
        // Zero rolloff disables attenuation.
        assert!((distance_gain(100.0, 1.0, 0.0) - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_distance_gain_zero_reference() {
        assert!((distance_gain(10.0, 0.0, 1.0)).abs() < f32::EPSILON);
        assert!((distance_gain(0.0, 0.0, 1.0) - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_omnidirectional_cone() {
        let emitter = EmitterData::at(Vec3::ZERO);
        assert!((cone_gain(&emitter, Vec3::new(0.0, 0.0, -5.0)) - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_cone_inside_and_outside() {
        let emitter = EmitterData::at(Vec3::ZERO).with_cone(Vec3::Z, 60.0, 120.0, 0.2);

        // Directly in front.
        assert!((cone_gain(&emitter, Vec3::new(0.0, 0.0, 5.0)) - 1.0).abs() < 1e-6);
        // Directly behind.
        assert!((cone_gain(&emitter, Vec3::new(0.0, 0.0, -5.0)) - 0.2).abs() < 1e-6);
        // Halfway between the cone edges at 45 degrees.
        let g = cone_gain(&emitter, Vec3::new(1.0, 0.0, 1.0));
        assert!((g - 0.6).abs() < 1e-4);
    }

    #[test]
    fn test_pan_follows_orientation() {
        let model = SpatialModel::default();
        let right = model.calculate(&EmitterData::at(Vec3::new(5.0, 0.0, 0.0)));
        let left = model.calculate(&EmitterData::at(Vec3::new(-5.0, 0.0, 0.0)));
        let front = model.calculate(&EmitterData::at(Vec3::new(0.0, 0.0, -5.0)));

        assert!(right.pan > 0.99);
        assert!(left.pan < -0.99);
        assert!(front.pan.abs() < 1e-6);
    }

    #[test]
    fn test_doppler_approaching_source_raises_pitch() {
        let model = SpatialModel::default();
        let approaching = EmitterData::at(Vec3::new(0.0, 0.0, -10.0))
            .with_velocity(Vec3::new(0.0, 0.0, 20.0));
        let receding = EmitterData::at(Vec3::new(0.0, 0.0, -10.0))
            .with_velocity(Vec3::new(0.0, 0.0, -20.0));

        assert!(model.calculate(&approaching).pitch > 1.0);
        assert!(model.calculate(&receding).pitch < 1.0);
    }

    #[test]
    fn test_doppler_disabled_by_zero_factor() {
        let mut model = SpatialModel::default();
        model.listener_mut().doppler_factor = 0.0;
        let emitter = EmitterData::at(Vec3::new(0.0, 0.0, -10.0))
            .with_velocity(Vec3::new(0.0, 0.0, 50.0));
        assert!((model.doppler_shift(&emitter) - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_calculate_applies_attenuation() {
        let model = SpatialModel::default();
        let near = EmitterData::at(Vec3::new(0.0, 0.0, -2.0)).with_attenuation(2.0, 1.0);
        let far = EmitterData::at(Vec3::new(0.0, 0.0, -8.0)).with_attenuation(2.0, 1.0);
        let flat = EmitterData::at(Vec3::new(0.0, 0.0, -8.0)).with_attenuation(2.0, 0.0);

        assert!((model.calculate(&near).gain - 1.0).abs() < 1e-6);
        assert!((model.calculate(&far).gain - 0.25).abs() < 1e-6);
        assert!((model.calculate(&flat).gain - 1.0).abs() < 1e-6);
        assert!((model.calculate(&far).distance - 8.0).abs() < 1e-5);
    }

    #[test]
    fn test_pan_gains_constant_power() {
        let (left, right) = pan_gains(0.0);
        assert!((left - right).abs() < 1e-6);
        assert!((left * left + right * right - 1.0).abs() < 1e-5);

        let (left, right) = pan_gains(1.0);
        assert!(left.abs() < 1e-6);
        assert!((right - 1.0).abs() < 1e-6);

        let (left, right) = pan_gains(-1.0);
        assert!((left - 1.0).abs() < 1e-6);
        assert!(right.abs() < 1e-6);
    }

    #[test]
    fn test_listener_gain_scales_output() {
        let mut model = SpatialModel::default();
        model.listener_mut().gain = 0.0;
        let params = model.calculate(&EmitterData::at(Vec3::ZERO));
        assert!(!params.audible);
    }
}
