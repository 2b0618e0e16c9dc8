//! # Auralis Common
//!
//! Common types, utilities, and shared abstractions for the Auralis
//! spatial audio server.
//!
//! This crate provides foundational types used across all Auralis crates:
//! - Monotonic time arithmetic for fades (`Time`, `Clock`)
//! - Engine handles (`Handle`)
//! - Common error types
//! - Prelude for convenient imports

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod error;
pub mod ids;
pub mod time;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::*;
    pub use crate::ids::*;
    pub use crate::time::*;
}

pub use prelude::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_handle_roundtrip() {
        let handle = Handle::new(7);
        assert_eq!(Handle::to_wire(Some(handle)), 7);
        assert_eq!(Handle::to_wire(None), -1);
        assert_eq!(Handle::from_wire(7), Some(handle));
        assert_eq!(Handle::from_wire(-1), None);
    }

    #[test]
    fn test_manual_clock_drives_time() {
        let clock = ManualClock::new();
        let start = clock.now();
        clock.advance_secs(1.5);
        let elapsed = clock.now() - start;
        assert!((elapsed.as_secs_f64() - 1.5).abs() < 1e-9);
    }
}
