//! # Auralis Server
//!
//! Network front end for the Auralis audio handler.
//!
//! This crate provides:
//! - The text command protocol (`Command`, `Reply`)
//! - TOML server configuration
//! - The TCP server with its fade sweep task
//! - `ObserverHub`, which broadcasts changed-unit snapshots

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod command;
pub mod config;
pub mod error;
pub mod hub;
pub mod server;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::command::*;
    pub use crate::config::*;
    pub use crate::error::*;
    pub use crate::hub::*;
    pub use crate::server::*;
}

pub use prelude::*;
