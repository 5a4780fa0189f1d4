//! # Configuration Management Module
//!
//! Persistent bridge settings stored in platform-appropriate locations.
//! Per-run device and stream selection comes from the command line
//! (see `options`); this file holds the timing and buffering knobs.
//!
//! ## Settings
//! - `poll_interval_ms`: sleep between acquisition polls
//! - `impedance_poll_ms`: how long the impedance worker waits for a request
//! - `command_poll_ms`: how often the dispatcher re-checks the run state
//! - `analog_reset_settle_ms`: settling delay after an analog reset
//! - `shutdown_grace_ms`: idle window for in-flight samples during teardown
//! - `outlet_buffer_seconds` / `outlet_chunk_size`: stream outlet buffering
//! - `default_stream_name`, `manufacturer`: stream metadata defaults
//!
//! ## Storage Location
//! - macOS: ~/Library/Application Support/dsi2lsl/config.toml
//! - Linux: ~/.config/dsi2lsl/config.toml
//! - Windows: %APPDATA%\dsi2lsl\config.toml

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub poll_interval_ms: u64,
    pub impedance_poll_ms: u64,
    pub command_poll_ms: u64,
    pub analog_reset_settle_ms: u64,
    pub shutdown_grace_ms: u64,
    pub outlet_buffer_seconds: u32,
    pub outlet_chunk_size: u32,
    pub default_stream_name: String,
    pub manufacturer: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2,
            impedance_poll_ms: 10,
            command_poll_ms: 100,
            analog_reset_settle_ms: 3000,
            shutdown_grace_ms: 1000,
            outlet_buffer_seconds: 360,
            outlet_chunk_size: 0,
            default_stream_name: "WS-default".to_string(),
            manufacturer: "WearableSensing".to_string(),
        }
    }
}

impl Config {
    /// Get the path to the default config file
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("dsi2lsl")
            .join("config.toml")
    }

    /// Load config from the default location, or create it with defaults
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();

        match Self::load_from(&path) {
            Err(ConfigError::ReadFailed { source, .. })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                let config = Self::default();
                config.save_to(&path)?;
                Ok(config)
            }
            other => other,
        }
    }

    /// Load config from an explicit path
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&contents).map_err(|source| ConfigError::ParseFailed {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Resolve settings for this run. Never fails: problems are logged as
    /// warnings and the defaults are used instead.
    pub fn resolve(explicit: Option<&Path>) -> Self {
        let loaded = match explicit {
            Some(path) => Self::load_from(path),
            None => Self::load(),
        };

        match loaded {
            Ok(config) => config,
            Err(e) => {
                log::warn!("{} - using default settings", e);
                Self::default()
            }
        }
    }

    /// Save config to a file, creating its parent directory
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::WriteFailed {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let toml_string = toml::to_string_pretty(self).map_err(ConfigError::SerializeFailed)?;
        fs::write(path, toml_string).map_err(|source| ConfigError::WriteFailed {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn impedance_poll(&self) -> Duration {
        Duration::from_millis(self.impedance_poll_ms.max(1))
    }

    pub fn command_poll(&self) -> Duration {
        Duration::from_millis(self.command_poll_ms.max(1))
    }

    pub fn analog_reset_settle(&self) -> Duration {
        Duration::from_millis(self.analog_reset_settle_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_values() {
        let config = Config::default();
        assert_eq!(config.default_stream_name, "WS-default");
        assert_eq!(config.outlet_buffer_seconds, 360);
        assert_eq!(config.poll_interval(), Duration::from_millis(2));
        assert_eq!(config.analog_reset_settle(), Duration::from_secs(3));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let toml_str = r#"
            poll_interval_ms = 5
            manufacturer = "Acme"
        "#;

        let config: Config = toml::from_str(toml_str).expect("Failed to deserialize");
        assert_eq!(config.poll_interval_ms, 5);
        assert_eq!(config.manufacturer, "Acme");
        assert_eq!(config.shutdown_grace_ms, 1000);
    }

    #[test]
    fn test_save_and_load_from_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = Config {
            analog_reset_settle_ms: 50,
            ..Config::default()
        };

        config.save_to(&path).unwrap();
        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_resolve_falls_back_on_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "poll_interval_ms = \"fast\"").unwrap();

        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::ParseFailed { .. })
        ));
        assert_eq!(Config::resolve(Some(&path)), Config::default());
    }

    #[test]
    fn test_resolve_falls_back_on_missing_explicit_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        assert_eq!(Config::resolve(Some(&path)), Config::default());
        assert!(!path.exists());
    }
}
