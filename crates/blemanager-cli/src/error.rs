//! Error handling for the blemanager CLI

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("BLE manager error: {0}")]
    Ble(#[from] blemanager_core::BleError),

    #[error("Transport initialization failed: {0}")]
    TransportInit(#[from] blemanager_btleplug::BtleplugTransportError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Device {0} was not found")]
    DeviceNotFound(String),

    #[error("Timed out waiting for {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("TOML encoding error: {0}")]
    TomlEncoding(#[from] toml::ser::Error),

    #[error("Hex decoding error: {0}")]
    HexDecoding(#[from] hex::FromHexError),
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
