//! Server configuration.
//!
//! Loaded from a TOML file. Missing fields take their defaults and a missing
//! or unreadable file yields the default configuration.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Configuration file looked up when no path is given.
pub const CONFIG_FILE: &str = "auralis.toml";

/// Which rendering engine drives the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Play through an output device with rodio.
    #[default]
    Rodio,
    /// Headless in-memory engine.
    Simulated,
}

/// Server configuration parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    // === Network ===
    /// TCP port to listen on (0 = any free port)
    pub port: u16,
    /// Address to bind
    pub bind_address: String,
    /// Largest accepted command message in bytes
    pub max_message_size: usize,
    /// Largest accepted file upload in bytes
    pub max_upload_size: u64,

    // === Audio ===
    /// Directory uploaded files are stored in and relative names resolve to
    pub cache_directory: PathBuf,
    /// Output device name (None = system default)
    pub audio_device: Option<String>,
    /// Rendering engine
    pub engine: EngineKind,

    // === Updates ===
    /// Fade sweep period in milliseconds
    pub tick_interval_ms: u64,
    /// Observer broadcast buffer length
    pub observer_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 31231,
            bind_address: "0.0.0.0".to_string(),
            max_message_size: 256,
            max_upload_size: 64 * 1024 * 1024,

            cache_directory: PathBuf::from(".auralis/cache"),
            audio_device: None,
            engine: EngineKind::Rodio,

            tick_interval_ms: 10,
            observer_capacity: 1024,
        }
    }
}

impl ServerConfig {
    /// Load configuration from [`CONFIG_FILE`] in the working directory.
    pub fn load() -> Self {
        Self::load_from(CONFIG_FILE)
    }

    /// Load configuration from a specific path.
    /// Returns default config if file doesn't exist or is invalid.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();

        if !path.exists() {
            info!("Config file not found, using defaults");
            return Self::default();
        }

        let mut contents = String::new();
        if let Err(e) = fs::File::open(path).and_then(|mut f| f.read_to_string(&mut contents)) {
            warn!("Failed to read config file: {e}");
            return Self::default();
        }

        match toml::from_str(&contents) {
            Ok(config) => {
                info!("Loaded config from {}", path.display());
                config
            },
            Err(e) => {
                warn!("Failed to parse config file: {e}");
                Self::default()
            },
        }
    }

    /// Save configuration to a specific path.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let mut file = fs::File::create(path)?;
        file.write_all(contents.as_bytes())?;

        info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Clamp values to workable ranges.
    pub fn validate(&mut self) {
        self.tick_interval_ms = self.tick_interval_ms.clamp(1, 1000);
        self.observer_capacity = self.observer_capacity.clamp(16, 1 << 16);
        self.max_message_size = self.max_message_size.clamp(64, 4096);
    }

    /// `address:port` to bind.
    #[must_use]
    pub fn socket_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    /// Fade sweep period.
    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 31231);
        assert_eq!(config.max_message_size, 256);
        assert_eq!(config.tick_interval(), Duration::from_millis(10));
        assert_eq!(config.engine, EngineKind::Rodio);
        assert_eq!(config.socket_address(), "0.0.0.0:31231");
    }

    #[test]
    fn test_config_validation() {
        let mut config = ServerConfig {
            tick_interval_ms: 0,
            max_message_size: 1,
            ..ServerConfig::default()
        };
        config.validate();
        assert_eq!(config.tick_interval_ms, 1);
        assert_eq!(config.max_message_size, 64);
    }

    #[test]
    fn test_config_save_load() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("auralis.toml");

        let config = ServerConfig {
            port: 4000,
            engine: EngineKind::Simulated,
            audio_device: Some("hdmi".to_string()),
            ..ServerConfig::default()
        };
        config.save_to(&config_path).expect("Failed to save config");

        let loaded = ServerConfig::load_from(&config_path);
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("partial.toml");
        fs::write(&config_path, "engine = \"simulated\"\nport = 9000\n").expect("write");

        let loaded = ServerConfig::load_from(&config_path);
        assert_eq!(loaded.port, 9000);
        assert_eq!(loaded.engine, EngineKind::Simulated);
        assert_eq!(loaded.observer_capacity, 1024);
    }

    #[test]
    fn test_invalid_config_falls_back() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("broken.toml");
        fs::write(&config_path, "port = \"not a number\"").expect("write");
        assert_eq!(ServerConfig::load_from(&config_path), ServerConfig::default());
        assert_eq!(
            ServerConfig::load_from(temp_dir.path().join("absent.toml")),
            ServerConfig::default()
        );
    }
}
