//! Audio Unit Capability
//!
//! Sources and the listener share a common attribute set (gain, position,
//! velocity, validity) and the same mutator contract. Once a unit is
//! invalidated it becomes a read-only snapshot and every mutator fails.
//!
//! Snapshots handed to observers are [`UnitSnapshot`] values: invalidated
//! deep copies tagged with their variant.

use auralis_common::Handle;
use glam::Vec3;

use crate::engine::RenderEngine;
use crate::listener::AudioListener;
use crate::source::AudioSource;

/// Attributes shared by every unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitAttributes {
    /// Linear gain.
    pub gain: f32,
    /// World position.
    pub position: Vec3,
    /// Velocity, used only for doppler and never integrated into position.
    pub velocity: Vec3,
    /// Whether mutators are accepted.
    pub valid: bool,
}

impl Default for UnitAttributes {
    fn default() -> Self {
        Self {
            gain: 1.0,
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            valid: true,
        }
    }
}

/// Which variant a unit is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitKind {
    /// A sound source.
    Source,
    /// The listener.
    Listener,
}

impl UnitKind {
    /// Display name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Listener => "listener",
        }
    }
}

/// Capability shared by sources and the listener.
pub trait AudioUnit {
    /// Which variant this is.
    fn kind(&self) -> UnitKind;

    /// Engine handle, `None` for the listener.
    fn handle(&self) -> Option<Handle>;

    /// Shared attributes.
    fn attributes(&self) -> &UnitAttributes;

    /// Mark this unit as a read-only snapshot.
    fn invalidate(&mut self);

    /// Set the gain. Gain must be finite and non-negative.
    fn set_gain(&mut self, engine: &mut dyn RenderEngine, gain: f32) -> bool;

    /// Set the position.
    fn set_position(&mut self, engine: &mut dyn RenderEngine, position: Vec3) -> bool;

    /// Set the velocity.
    fn set_velocity(&mut self, engine: &mut dyn RenderEngine, velocity: Vec3) -> bool;

    /// Labelled attribute values for display.
    fn fields(&self) -> Vec<(&'static str, String)>;

    /// Current gain.
    fn gain(&self) -> f32 {
        self.attributes().gain
    }

    /// Current position.
    fn position(&self) -> Vec3 {
        self.attributes().position
    }

    /// Current velocity.
    fn velocity(&self) -> Vec3 {
        self.attributes().velocity
    }

    /// Whether mutators are accepted.
    fn is_valid(&self) -> bool {
        self.attributes().valid
    }
}

/// An invalidated point-in-time copy of a unit.
#[derive(Debug, Clone, PartialEq)]
pub enum UnitSnapshot {
    /// Snapshot of a source.
    Source(AudioSource),
    /// Snapshot of the listener.
    Listener(AudioListener),
}

impl UnitSnapshot {
    /// Access the snapshot through the shared capability.
    #[must_use]
    pub fn as_unit(&self) -> &dyn AudioUnit {
        match self {
            Self::Source(source) => source,
            Self::Listener(listener) => listener,
        }
    }

    /// Mutable access through the shared capability. Mutators on a snapshot
    /// always fail.
    pub fn as_unit_mut(&mut self) -> &mut dyn AudioUnit {
        match self {
            Self::Source(source) => source,
            Self::Listener(listener) => listener,
        }
    }

    /// Which variant was captured.
    #[must_use]
    pub fn kind(&self) -> UnitKind {
        self.as_unit().kind()
    }

    /// Source handle, `None` for the listener.
    #[must_use]
    pub fn handle(&self) -> Option<Handle> {
        self.as_unit().handle()
    }

    /// Whether this is a source snapshot.
    #[must_use]
    pub const fn is_source(&self) -> bool {
        matches!(self, Self::Source(_))
    }

    /// Source snapshot, if this is one.
    #[must_use]
    pub const fn as_source(&self) -> Option<&AudioSource> {
        match self {
            Self::Source(source) => Some(source),
            Self::Listener(_) => None,
        }
    }

    /// Listener snapshot, if this is one.
    #[must_use]
    pub const fn as_listener(&self) -> Option<&AudioListener> {
        match self {
            Self::Listener(listener) => Some(listener),
            Self::Source(_) => None,
        }
    }

    /// One-line summary used in logs and observer feeds.
    #[must_use]
    pub fn describe(&self) -> String {
        let fields = self
            .as_unit()
            .fields()
            .into_iter()
            .map(|(label, value)| format!("{label}={value}"))
            .collect::<Vec<_>>()
            .join(" ");
        format!("{} {fields}", self.kind().name())
    }
}

/// Format a vector as `x,y,z`.
#[must_use]
pub fn format_vec3(v: Vec3) -> String {
    format!("{},{},{}", v.x, v.y, v.z)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_attributes() {
        let attrs = UnitAttributes::default();
        assert!((attrs.gain - 1.0).abs() < f32::EPSILON);
        assert_eq!(attrs.position, Vec3::ZERO);
        assert_eq!(attrs.velocity, Vec3::ZERO);
        assert!(attrs.valid);
    }

    #[test]
    fn test_listener_snapshot_variant() {
        let mut listener = AudioListener::new();
        listener.invalidate();
        let snapshot = UnitSnapshot::Listener(listener);
        assert_eq!(snapshot.kind(), UnitKind::Listener);
        assert!(snapshot.handle().is_none());
        assert!(!snapshot.is_source());
        assert!(snapshot.describe().starts_with("listener gain=1"));
    }

    #[test]
    fn test_format_vec3() {
        assert_eq!(format_vec3(Vec3::new(1.0, -2.5, 0.0)), "1,-2.5,0");
    }
}
