//! Bluetooth Low Energy central-role connection manager
//!
//! This crate discovers peripherals, filters them by advertised services and
//! discovered characteristics, drives each device through its connection
//! lifecycle (including automatic reconnects) and keeps a persisted registry
//! of paired devices. Radio I/O is delegated to a [`BleTransport`]; storage
//! of paired identifiers to a [`PairedStore`].
//!
//! ## Architecture
//!
//! - [`types`] - Device identifiers, advertisements, characteristics
//! - [`filter`] - Advertisement matching and default characteristic selection
//! - [`connection_state`] - Pure per-device lifecycle state machine
//! - [`peripheral`] - Manager-owned side-table entries and snapshots
//! - [`registry`] / [`storage`] - Paired device set and its persistence
//! - [`central`] - Synchronous engine turning inputs into effects
//! - [`manager`] - Async actor and the public [`CentralManager`] API
//!
//! ## Usage
//!
//! ```rust,no_run
//! use blemanager_core::{BleTransport, CentralManager, JsonFileStore, ManagerConfig, ManagerEvent};
//!
//! # async fn example(transport: impl BleTransport) -> blemanager_core::Result<()> {
//! let store = JsonFileStore::new("paired.json");
//! let (manager, mut events) = CentralManager::start(transport, store, ManagerConfig::default()).await?;
//!
//! manager.scan(None).await?;
//! while let Some(event) = events.recv().await {
//!     if let ManagerEvent::PeripheralDiscovered { id, .. } = event {
//!         manager.connect(&id).await?;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod central;
pub mod config;
pub mod connection_state;
pub mod errors;
pub mod filter;
pub mod manager;
pub mod messages;
pub mod peripheral;
pub mod registry;
pub mod storage;
pub mod transport;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use central::{CentralCore, ScanSession};
pub use config::ManagerConfig;
pub use connection_state::{ConnectionEvent, ConnectionState, StateTransitionError};
pub use errors::{BleError, Result};
pub use filter::{ChannelSelection, FilterDecision, ScanFilter};
pub use manager::{CentralManager, ManagerEventReceiver, ManagerEventSender};
pub use messages::{Effect, ManagerEvent, StackEvent};
pub use peripheral::{ConnectOrigin, PeripheralHandle, PeripheralSnapshot};
pub use registry::PairedRegistry;
pub use storage::{JsonFileStore, MemoryStore, PairedStore};
pub use transport::{create_stack_event_channel, BleTransport, StackEventReceiver, StackEventSender};
pub use types::{
    AdapterState, Advertisement, CharProperties, CharacteristicRef, DeviceId,
    DiscoveredCharacteristic, NeedChannel,
};

// Re-exported for transport implementations
pub use async_trait::async_trait;
