//! btleplug transport for the BLE central connection manager
//!
//! Bridges [`blemanager_core::BleTransport`] onto the host Bluetooth stack via
//! btleplug, for desktop platforms (Linux BlueZ, macOS CoreBluetooth, Windows WinRT).

pub mod config;
pub mod disconnects;
pub mod error;
pub mod transport;

pub use config::BtleplugConfig;
pub use error::{BtleplugTransportError, Result};
pub use transport::BtleplugTransport;
