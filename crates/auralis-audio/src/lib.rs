//! # Auralis Audio
//!
//! The audio-unit resource manager and its time-driven fade engine.
//!
//! This crate provides:
//! - The rendering engine contract (`RenderEngine`) with a deterministic
//!   simulated engine and a rodio device engine
//! - Buffer construction from decoded files and procedural waveforms
//! - Sources, the listener and their shared unit capability
//! - `AudioHandler`, which owns every unit and serialises command and
//!   update-tick traffic behind one lock
//! - 3D spatial math (distance attenuation, cones, doppler)
//!
//! ## Observers
//!
//! Every successful command nominates the unit it changed. The nomination
//! is read once through `AudioHandler::recently_modified_unit`, and the
//! periodic sweep produces a batch of changed sources through
//! `AudioHandler::populate_updated_sources`. Both hand out invalidated
//! snapshots, never live units.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod backend;
pub mod buffer;
pub mod engine;
pub mod handler;
pub mod listener;
pub mod simulated;
pub mod source;
pub mod spatial;
pub mod unit;
pub mod waveform;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::backend::*;
    pub use crate::buffer::*;
    pub use crate::engine::*;
    pub use crate::handler::*;
    pub use crate::listener::*;
    pub use crate::simulated::*;
    pub use crate::source::*;
    pub use crate::spatial::*;
    pub use crate::unit::*;
    pub use crate::waveform::*;
}

pub use prelude::*;
