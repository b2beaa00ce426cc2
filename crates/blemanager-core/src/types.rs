//! Shared identifiers and value types

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use uuid::Uuid;

// ----------------------------------------------------------------------------
// Device Identity
// ----------------------------------------------------------------------------

/// Opaque platform identifier of a remote peripheral
///
/// Stable for the lifetime of the process; not guaranteed to survive an OS
/// reinstall or a change of adapter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for DeviceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// ----------------------------------------------------------------------------
// Characteristics
// ----------------------------------------------------------------------------

/// Reference to a GATT characteristic, scoped by its owning service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CharacteristicRef {
    pub service: Uuid,
    pub uuid: Uuid,
}

impl CharacteristicRef {
    pub fn new(service: Uuid, uuid: Uuid) -> Self {
        Self { service, uuid }
    }
}

impl fmt::Display for CharacteristicRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.service, self.uuid)
    }
}

/// Operations a characteristic advertises support for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharProperties {
    pub read: bool,
    pub write: bool,
    pub write_without_response: bool,
    pub notify: bool,
    pub indicate: bool,
}

impl CharProperties {
    pub fn read() -> Self {
        Self {
            read: true,
            ..Self::default()
        }
    }

    pub fn write() -> Self {
        Self {
            write: true,
            ..Self::default()
        }
    }

    pub fn write_without_response() -> Self {
        Self {
            write_without_response: true,
            ..Self::default()
        }
    }

    pub fn notify() -> Self {
        Self {
            notify: true,
            ..Self::default()
        }
    }

    /// Combine two property sets
    pub fn with(mut self, other: CharProperties) -> Self {
        self.read |= other.read;
        self.write |= other.write;
        self.write_without_response |= other.write_without_response;
        self.notify |= other.notify;
        self.indicate |= other.indicate;
        self
    }

    pub fn can_notify(&self) -> bool {
        self.notify || self.indicate
    }
}

/// A characteristic reported by the stack after discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredCharacteristic {
    pub reference: CharacteristicRef,
    pub properties: CharProperties,
}

impl DiscoveredCharacteristic {
    pub fn new(service: Uuid, uuid: Uuid, properties: CharProperties) -> Self {
        Self {
            reference: CharacteristicRef::new(service, uuid),
            properties,
        }
    }
}

// ----------------------------------------------------------------------------
// Advertisements
// ----------------------------------------------------------------------------

/// Advertisement record as delivered by the transport stack
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Advertisement {
    pub id: DeviceId,
    pub local_name: Option<String>,
    pub services: SmallVec<[Uuid; 4]>,
    pub rssi: Option<i16>,
}

impl Advertisement {
    pub fn new(id: impl Into<DeviceId>) -> Self {
        Self {
            id: id.into(),
            local_name: None,
            services: SmallVec::new(),
            rssi: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.local_name = Some(name.into());
        self
    }

    pub fn with_service(mut self, service: Uuid) -> Self {
        self.services.push(service);
        self
    }

    pub fn with_rssi(mut self, rssi: i16) -> Self {
        self.rssi = Some(rssi);
        self
    }
}

// ----------------------------------------------------------------------------
// Policies and Radio State
// ----------------------------------------------------------------------------

/// Combination of default characteristics a device must expose to be usable
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NeedChannel {
    WriteOnly,
    ReadOnly,
    #[default]
    ReadAndWrite,
}

impl NeedChannel {
    pub fn needs_read(&self) -> bool {
        matches!(self, NeedChannel::ReadOnly | NeedChannel::ReadAndWrite)
    }

    pub fn needs_write(&self) -> bool {
        matches!(self, NeedChannel::WriteOnly | NeedChannel::ReadAndWrite)
    }
}

/// Power/capability state of the local radio
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdapterState {
    #[default]
    Unknown,
    Unsupported,
    PoweredOff,
    PoweredOn,
}

impl AdapterState {
    /// Whether requests may be issued to the radio.
    ///
    /// `Unknown` is treated as usable: several stacks only report a state
    /// change after the first operation.
    pub fn is_usable(&self) -> bool {
        matches!(self, AdapterState::PoweredOn | AdapterState::Unknown)
    }
}
