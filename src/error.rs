//! # Error Types Module
//!
//! Centralized error handling for the bridge.
//!
//! ## Error Types
//! - `HardwareError`: a failed call into the headset collaborator
//! - `ConfigError`: settings file I/O and parsing errors
//! - `BridgeError`: setup-phase failures, each mapped to a process exit code
//!
//! Steady-state hardware errors never surface as `BridgeError`; the worker
//! that sees one logs it and requests shutdown instead.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// A failed hardware call.
///
/// The collaborator reports errors through a sticky flag that has to be read
/// and cleared after every call; each such read-and-clear becomes one of these.
#[derive(Debug, Clone, PartialEq)]
pub struct HardwareError {
    pub operation: &'static str,
    pub message: String,
}

impl HardwareError {
    pub fn new(operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
        }
    }

    /// The device session was already deleted when the call was attempted.
    pub fn session_closed(operation: &'static str) -> Self {
        Self::new(operation, "device session is closed")
    }
}

impl fmt::Display for HardwareError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DSI error during {}: {}", self.operation, self.message)
    }
}

impl std::error::Error for HardwareError {}

/// Errors that can occur while loading or saving the settings file
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read config file
    ReadFailed { path: PathBuf, source: io::Error },
    /// Failed to write config file
    WriteFailed { path: PathBuf, source: io::Error },
    /// Failed to parse config file
    ParseFailed { path: PathBuf, source: toml::de::Error },
    /// Failed to serialize config
    SerializeFailed(toml::ser::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ReadFailed { path, source } => {
                write!(f, "Failed to read config file {}: {}", path.display(), source)
            }
            ConfigError::WriteFailed { path, source } => {
                write!(f, "Failed to write config file {}: {}", path.display(), source)
            }
            ConfigError::ParseFailed { path, source } => {
                write!(f, "Failed to parse config file {}: {}", path.display(), source)
            }
            ConfigError::SerializeFailed(e) => {
                write!(f, "Failed to serialize config: {}", e)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::ReadFailed { source, .. } => Some(source),
            ConfigError::WriteFailed { source, .. } => Some(source),
            ConfigError::ParseFailed { source, .. } => Some(source),
            ConfigError::SerializeFailed(e) => Some(e),
        }
    }
}

/// Failures that abort startup
#[derive(Debug)]
pub enum BridgeError {
    /// The headset could not be reached or initialized
    Connection { port: String, reason: String },
    /// A hardware call failed while the session was being set up
    Hardware(HardwareError),
    /// The stream publisher could not be created
    StreamSetup(String),
    /// A worker thread could not be started
    ThreadCreation { name: &'static str, source: io::Error },
}

impl BridgeError {
    /// Process exit code reported for this failure
    pub fn exit_code(&self) -> u8 {
        1
    }
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeError::Connection { port, reason } => {
                write!(f, "Failed to connect to headset on port {:?}: {}", port, reason)
            }
            BridgeError::Hardware(e) => write!(f, "{}", e),
            BridgeError::StreamSetup(msg) => write!(f, "Failed to create stream outlet: {}", msg),
            BridgeError::ThreadCreation { name, source } => {
                write!(f, "Error creating {} thread: {}", name, source)
            }
        }
    }
}

impl std::error::Error for BridgeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BridgeError::Hardware(e) => Some(e),
            BridgeError::ThreadCreation { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<HardwareError> for BridgeError {
    fn from(err: HardwareError) -> Self {
        BridgeError::Hardware(err)
    }
}
