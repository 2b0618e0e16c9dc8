//! Error types for Auralis.
//!
//! Resource-manager mutators never fail with these: they report success as a
//! boolean. Only subsystem initialisation and teardown escalate errors.

use thiserror::Error;

/// Top-level error type for Auralis operations.
#[derive(Debug, Error)]
pub enum AuralisError {
    /// Rendering engine errors
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Rendering engine initialisation errors.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Failed to initialise the output device or context
    #[error("Failed to initialize audio device: {0}")]
    DeviceInitFailed(String),

    /// No output device is available
    #[error("No audio device available")]
    NoDevice,

    /// A device was requested by name but not found
    #[error("Audio device \"{0}\" not found")]
    DeviceNotFound(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Auralis operations.
pub type AuralisResult<T> = Result<T, AuralisError>;

/// Result type alias for engine initialisation.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_error_display() {
        let err = EngineError::DeviceNotFound("hdmi".to_string());
        assert!(err.to_string().contains("hdmi"));

        let err: AuralisError = EngineError::NoDevice.into();
        assert!(err.to_string().contains("No audio device"));
    }
}
