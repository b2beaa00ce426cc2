//! Error types for the BLE manager
//!
//! Errors are cloneable so they can be carried inside [`ManagerEvent`]s
//! delivered to observers.
//!
//! [`ManagerEvent`]: crate::messages::ManagerEvent

use serde::Serialize;
use thiserror::Error;

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
pub enum BleError {
    /// The platform has no BLE radio
    #[error("Bluetooth Low Energy is not supported on this platform")]
    Unsupported,

    /// The radio is present but switched off
    #[error("Bluetooth is powered off")]
    PowerOff,

    #[error("Failed to connect: {reason}")]
    ConnectFailed { reason: String },

    /// The attempt was torn down by an unconnect or removal request
    #[error("Connection attempt cancelled")]
    Cancelled,

    /// Characteristic discovery did not satisfy the configured channel policy
    #[error("Required characteristics unavailable: {missing}")]
    ServiceUnavailable { missing: String },

    #[error("Paired device storage failure: {reason}")]
    StorageFailure { reason: String },

    #[error("Transport error: {reason}")]
    Transport { reason: String },

    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    #[error("Radio adapter {adapter} is already coordinated by another manager")]
    RadioAlreadyClaimed { adapter: String },

    #[error("Central manager has stopped")]
    ManagerStopped,
}

impl BleError {
    pub fn connect_failed(reason: impl Into<String>) -> Self {
        BleError::ConnectFailed {
            reason: reason.into(),
        }
    }

    pub fn transport(reason: impl Into<String>) -> Self {
        BleError::Transport {
            reason: reason.into(),
        }
    }

    pub fn storage(reason: impl Into<String>) -> Self {
        BleError::StorageFailure {
            reason: reason.into(),
        }
    }

    pub fn config(reason: impl Into<String>) -> Self {
        BleError::Config {
            reason: reason.into(),
        }
    }
}

impl From<std::io::Error> for BleError {
    fn from(err: std::io::Error) -> Self {
        BleError::storage(err.to_string())
    }
}

impl From<serde_json::Error> for BleError {
    fn from(err: serde_json::Error) -> Self {
        BleError::storage(err.to_string())
    }
}

impl From<toml::de::Error> for BleError {
    fn from(err: toml::de::Error) -> Self {
        BleError::config(err.to_string())
    }
}

/// Result type for BLE manager operations
pub type Result<T> = std::result::Result<T, BleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_errors_become_storage_failures() {
        let err: BleError = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into();
        assert!(matches!(err, BleError::StorageFailure { .. }));
    }
}
