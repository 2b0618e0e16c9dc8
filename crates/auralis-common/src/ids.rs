//! Handle types for engine resources.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identifier issued by the rendering engine for a buffer or a source.
///
/// Handles are never reused while the owning object is live. Failure is
/// expressed as `Option<Handle>`; on the wire it becomes `-1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Handle(u32);

impl Handle {
    /// Wire value standing for "no handle" / failure.
    pub const WIRE_NONE: i64 = -1;

    /// Creates a handle from a raw value.
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw handle value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Encodes an optional handle for the wire, `-1` meaning none.
    #[must_use]
    pub fn to_wire(handle: Option<Self>) -> i64 {
        handle.map_or(Self::WIRE_NONE, |h| i64::from(h.0))
    }

    /// Decodes a wire value; negative or out-of-range values mean none.
    #[must_use]
    pub fn from_wire(value: i64) -> Option<Self> {
        u32::try_from(value).ok().map(Self)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
