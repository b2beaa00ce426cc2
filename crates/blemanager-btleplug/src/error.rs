//! Error types for the btleplug transport

use blemanager_core::BleError;
use thiserror::Error;

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Errors specific to the btleplug transport
#[derive(Error, Debug)]
pub enum BtleplugTransportError {
    #[error("BLE stack error: {0}")]
    Btleplug(#[from] btleplug::Error),

    #[error("No BLE adapter at index {index}")]
    AdapterNotAvailable { index: usize },

    #[error("Peripheral not found: {id}")]
    PeripheralNotFound { id: String },

    #[error("Characteristic not found: {characteristic}")]
    CharacteristicNotFound { characteristic: String },

    #[error("Transport is not attached to a manager")]
    NotAttached,
}

impl From<BtleplugTransportError> for BleError {
    fn from(err: BtleplugTransportError) -> Self {
        BleError::transport(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BtleplugTransportError>;
