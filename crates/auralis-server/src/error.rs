//! Server error types.

use std::io;

use auralis_common::EngineError;
use thiserror::Error;

/// A wire message that could not be turned into a command.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    /// The message held no verb.
    #[error("Empty message")]
    Empty,

    /// The verb is not recognised.
    #[error("Unknown command verb \"{0}\"")]
    UnknownVerb(String),

    /// A required argument is absent.
    #[error("{verb}: missing argument {index}")]
    MissingArgument {
        /// Command verb.
        verb: &'static str,
        /// Zero-based argument position.
        index: usize,
    },

    /// An argument could not be parsed or is out of range.
    #[error("{verb}: invalid argument \"{value}\"")]
    InvalidArgument {
        /// Command verb.
        verb: &'static str,
        /// The offending text.
        value: String,
    },
}

/// Result type for command parsing.
pub type CommandResult<T> = Result<T, CommandError>;

/// Errors that stop the server from starting or running.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listening socket could not be bound.
    #[error("Failed to bind {address}: {source}")]
    Bind {
        /// Address that was requested.
        address: String,
        /// Underlying error.
        source: io::Error,
    },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The rendering engine could not be initialised.
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
}

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
