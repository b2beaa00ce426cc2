//! Message schema between the manager, the transport stack and observers
//!
//! - [`StackEvent`]: transport stack → manager
//! - [`Effect`]: engine → manager actor (stack calls, timers, storage, events)
//! - [`ManagerEvent`]: manager → observers

use std::collections::BTreeSet;
use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

use crate::connection_state::ConnectionState;
use crate::errors::BleError;
use crate::peripheral::ConnectOrigin;
use crate::types::{AdapterState, Advertisement, CharacteristicRef, DeviceId, DiscoveredCharacteristic};

// ----------------------------------------------------------------------------
// Stack Events
// ----------------------------------------------------------------------------

/// Asynchronous notifications from the transport stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackEvent {
    AdvertisementReceived(Advertisement),
    LinkEstablished {
        id: DeviceId,
    },
    LinkFailed {
        id: DeviceId,
        reason: String,
    },
    LinkLost {
        id: DeviceId,
        reason: Option<String>,
    },
    CharacteristicsDiscovered {
        id: DeviceId,
        characteristics: Vec<DiscoveredCharacteristic>,
    },
    CharacteristicDiscoveryFailed {
        id: DeviceId,
        reason: String,
    },
    ReadCompleted {
        id: DeviceId,
        result: Result<Vec<u8>, String>,
    },
    WriteCompleted {
        id: DeviceId,
        error: Option<String>,
    },
    ValueNotified {
        id: DeviceId,
        characteristic: Uuid,
        value: Vec<u8>,
    },
    AdapterStateChanged(AdapterState),
}

impl StackEvent {
    pub fn device(&self) -> Option<&DeviceId> {
        match self {
            StackEvent::AdvertisementReceived(adv) => Some(&adv.id),
            StackEvent::LinkEstablished { id }
            | StackEvent::LinkFailed { id, .. }
            | StackEvent::LinkLost { id, .. }
            | StackEvent::CharacteristicsDiscovered { id, .. }
            | StackEvent::CharacteristicDiscoveryFailed { id, .. }
            | StackEvent::ReadCompleted { id, .. }
            | StackEvent::WriteCompleted { id, .. }
            | StackEvent::ValueNotified { id, .. } => Some(id),
            StackEvent::AdapterStateChanged(_) => None,
        }
    }
}

// ----------------------------------------------------------------------------
// Effects
// ----------------------------------------------------------------------------

/// Work the engine asks the actor to carry out, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    StartScan {
        services: Vec<Uuid>,
    },
    StopScan,
    ScheduleScanTimeout {
        session: u64,
        after: Duration,
    },
    CancelScanTimeout,
    Connect {
        id: DeviceId,
    },
    Disconnect {
        id: DeviceId,
    },
    DiscoverCharacteristics {
        id: DeviceId,
    },
    Subscribe {
        id: DeviceId,
        characteristic: CharacteristicRef,
    },
    Read {
        id: DeviceId,
        characteristic: CharacteristicRef,
    },
    Write {
        id: DeviceId,
        characteristic: CharacteristicRef,
        data: Vec<u8>,
        with_response: bool,
    },
    ScheduleReconnect {
        id: DeviceId,
        after: Duration,
        generation: u64,
    },
    CancelReconnect {
        id: DeviceId,
    },
    /// Persist the remaining paired set after `id` was purged
    PersistRemoval {
        id: DeviceId,
        paired: BTreeSet<DeviceId>,
    },
    Notify(ManagerEvent),
}

// ----------------------------------------------------------------------------
// Observer Events
// ----------------------------------------------------------------------------

/// Notifications delivered to the application, keyed by device and operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ManagerEvent {
    /// The platform has no BLE radio
    Unsupported,
    /// The radio is switched off
    PowerOff,
    ScanStarted {
        timeout: Duration,
    },
    ScanEnded,
    PeripheralDiscovered {
        id: DeviceId,
        name: Option<String>,
        rssi: Option<i16>,
    },
    StateChanged {
        id: DeviceId,
        from: ConnectionState,
        to: ConnectionState,
    },
    ConnectResult {
        id: DeviceId,
        origin: ConnectOrigin,
        result: Result<(), BleError>,
    },
    UnconnectResult {
        id: DeviceId,
        result: Result<(), BleError>,
    },
    RemovalResult {
        id: DeviceId,
        result: Result<(), BleError>,
    },
    AvailabilityChanged {
        id: DeviceId,
        available: bool,
    },
    DataReceived {
        id: DeviceId,
        data: Vec<u8>,
    },
    ReadFailed {
        id: DeviceId,
        error: BleError,
    },
    WriteCompleted {
        id: DeviceId,
        result: Result<(), BleError>,
    },
    PairedLoadFailed {
        error: BleError,
    },
}

impl ManagerEvent {
    /// Device the event refers to, if any
    pub fn device(&self) -> Option<&DeviceId> {
        match self {
            ManagerEvent::PeripheralDiscovered { id, .. }
            | ManagerEvent::StateChanged { id, .. }
            | ManagerEvent::ConnectResult { id, .. }
            | ManagerEvent::UnconnectResult { id, .. }
            | ManagerEvent::RemovalResult { id, .. }
            | ManagerEvent::AvailabilityChanged { id, .. }
            | ManagerEvent::DataReceived { id, .. }
            | ManagerEvent::ReadFailed { id, .. }
            | ManagerEvent::WriteCompleted { id, .. } => Some(id),
            ManagerEvent::Unsupported
            | ManagerEvent::PowerOff
            | ManagerEvent::ScanStarted { .. }
            | ManagerEvent::ScanEnded
            | ManagerEvent::PairedLoadFailed { .. } => None,
        }
    }
}
