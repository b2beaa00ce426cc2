//! Manager-owned per-device state
//!
//! Every device the manager knows about has one [`PeripheralHandle`] in the
//! side-table keyed by [`DeviceId`]. Handles never leave the manager; callers
//! see [`PeripheralSnapshot`] copies.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::connection_state::ConnectionState;
use crate::filter::ChannelSelection;
use crate::types::{Advertisement, CharacteristicRef, DeviceId};

// ----------------------------------------------------------------------------
// Peripheral Handle
// ----------------------------------------------------------------------------

/// Who started the connection attempt currently in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectOrigin {
    /// An explicit `connect` call
    Caller,
    /// The reconnect timer
    AutoReconnect,
}

/// Side-table entry for one peripheral
#[derive(Debug, Clone)]
pub struct PeripheralHandle {
    pub id: DeviceId,
    pub name: Option<String>,
    pub rssi: Option<i16>,
    pub state: ConnectionState,
    /// Delay before an automatic reconnect attempt
    pub reconnect_interval: Duration,
    /// Removal latched while a link operation is in flight
    pub will_be_removed: bool,
    pub default_read: Option<CharacteristicRef>,
    pub default_write: Option<CharacteristicRef>,
    pub default_write_without_response: Option<CharacteristicRef>,
    /// Origin of the in-flight connect attempt, cleared once it resolves
    pub pending_connect: Option<ConnectOrigin>,
    /// An unconnect is waiting for the stack to confirm teardown
    pub teardown_requested: bool,
    /// Last disconnect was a channel-policy failure; suppresses reconnect
    pub policy_failure: bool,
    /// Last availability reported to observers
    pub available: bool,
    /// Incremented whenever a reconnect timer is armed or cancelled
    pub reconnect_generation: u64,
}

impl PeripheralHandle {
    /// Create a handle for a device seen in an advertisement
    pub fn discovered(advertisement: &Advertisement, reconnect_interval: Duration) -> Self {
        let mut handle = Self::with_state(
            advertisement.id.clone(),
            ConnectionState::Discovered,
            reconnect_interval,
        );
        handle.name = advertisement.local_name.clone();
        handle.rssi = advertisement.rssi;
        handle
    }

    /// Create a handle for a device restored from the paired store
    pub fn restored(id: DeviceId, reconnect_interval: Duration) -> Self {
        Self::with_state(id, ConnectionState::Disconnected, reconnect_interval)
    }

    fn with_state(id: DeviceId, state: ConnectionState, reconnect_interval: Duration) -> Self {
        Self {
            id,
            name: None,
            rssi: None,
            state,
            reconnect_interval,
            will_be_removed: false,
            default_read: None,
            default_write: None,
            default_write_without_response: None,
            pending_connect: None,
            teardown_requested: false,
            policy_failure: false,
            available: false,
            reconnect_generation: 0,
        }
    }

    /// Refresh name and signal strength from a new advertisement
    pub fn update_from_advertisement(&mut self, advertisement: &Advertisement) {
        if advertisement.local_name.is_some() {
            self.name = advertisement.local_name.clone();
        }
        if advertisement.rssi.is_some() {
            self.rssi = advertisement.rssi;
        }
    }

    pub fn apply_channel(&mut self, selection: &ChannelSelection) {
        self.default_read = selection.read;
        self.default_write = selection.write;
        self.default_write_without_response = selection.write_without_response;
    }

    pub fn clear_channel(&mut self) {
        self.default_read = None;
        self.default_write = None;
        self.default_write_without_response = None;
    }

    /// Invalidate any armed reconnect timer and return the new generation
    pub fn bump_reconnect_generation(&mut self) -> u64 {
        self.reconnect_generation = self.reconnect_generation.wrapping_add(1);
        self.reconnect_generation
    }

    pub fn snapshot(&self, paired: bool) -> PeripheralSnapshot {
        PeripheralSnapshot {
            id: self.id.clone(),
            name: self.name.clone(),
            rssi: self.rssi,
            state: self.state,
            reconnect_interval: self.reconnect_interval,
            will_be_removed: self.will_be_removed,
            default_read: self.default_read,
            default_write: self.default_write,
            default_write_without_response: self.default_write_without_response,
            available: self.available,
            paired,
        }
    }
}

// ----------------------------------------------------------------------------
// Snapshots
// ----------------------------------------------------------------------------

/// Read-only copy of a peripheral's state handed to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeripheralSnapshot {
    pub id: DeviceId,
    pub name: Option<String>,
    pub rssi: Option<i16>,
    pub state: ConnectionState,
    pub reconnect_interval: Duration,
    pub will_be_removed: bool,
    pub default_read: Option<CharacteristicRef>,
    pub default_write: Option<CharacteristicRef>,
    pub default_write_without_response: Option<CharacteristicRef>,
    pub available: bool,
    pub paired: bool,
}

impl PeripheralSnapshot {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<unnamed>")
    }
}
