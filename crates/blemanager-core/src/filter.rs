//! Advertisement and characteristic filtering
//!
//! Service UUIDs are checked against advertisements at scan time.
//! Characteristic UUIDs are rarely advertised, so that part of the filter is
//! applied after connection, when the stack reports the discovered
//! characteristics.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::BleError;
use crate::types::{Advertisement, CharacteristicRef, DiscoveredCharacteristic, NeedChannel};

// ----------------------------------------------------------------------------
// Filter Configuration
// ----------------------------------------------------------------------------

/// Allow-lists and channel policy applied to discovered devices
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanFilter {
    /// Advertised services to accept; empty accepts every device
    pub services: Vec<Uuid>,
    /// Characteristics a device must expose once connected
    pub characteristics: Vec<Uuid>,
    /// Default characteristics required before a device is reported available
    pub need_channel: NeedChannel,
}

/// Outcome of matching an advertisement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    Include,
    Exclude,
}

/// Default characteristics chosen for a connected device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSelection {
    pub read: Option<CharacteristicRef>,
    pub write: Option<CharacteristicRef>,
    pub write_without_response: Option<CharacteristicRef>,
    /// Whether `read` can deliver notifications
    pub read_notifies: bool,
}

impl ChannelSelection {
    pub fn has_write(&self) -> bool {
        self.write.is_some() || self.write_without_response.is_some()
    }

    /// Whether this selection satisfies the given channel policy
    pub fn satisfies(&self, need: NeedChannel) -> bool {
        (!need.needs_read() || self.read.is_some()) && (!need.needs_write() || self.has_write())
    }

    /// Keep only the directions the policy asks for
    pub fn restricted_to(mut self, need: NeedChannel) -> Self {
        if !need.needs_read() {
            self.read = None;
            self.read_notifies = false;
        }
        if !need.needs_write() {
            self.write = None;
            self.write_without_response = None;
        }
        self
    }
}

impl ScanFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_service(mut self, service: Uuid) -> Self {
        self.services.push(service);
        self
    }

    pub fn with_characteristic(mut self, characteristic: Uuid) -> Self {
        self.characteristics.push(characteristic);
        self
    }

    pub fn with_need_channel(mut self, need: NeedChannel) -> Self {
        self.need_channel = need;
        self
    }

    /// Decide whether an advertisement belongs in the discovered list
    pub fn match_advertisement(&self, advertisement: &Advertisement) -> FilterDecision {
        if self.services.is_empty()
            || advertisement
                .services
                .iter()
                .any(|service| self.services.contains(service))
        {
            FilterDecision::Include
        } else {
            FilterDecision::Exclude
        }
    }

    /// Pick default characteristics and check them against the policy.
    ///
    /// Returns `ServiceUnavailable` naming what is missing when either a
    /// configured characteristic UUID is absent or the selection does not
    /// satisfy `need_channel`.
    pub fn select_channel(
        &self,
        discovered: &[DiscoveredCharacteristic],
    ) -> Result<ChannelSelection, BleError> {
        let missing: Vec<String> = self
            .characteristics
            .iter()
            .filter(|wanted| !discovered.iter().any(|c| c.reference.uuid == **wanted))
            .map(Uuid::to_string)
            .collect();
        if !missing.is_empty() {
            return Err(BleError::ServiceUnavailable {
                missing: missing.join(", "),
            });
        }

        let candidates: Vec<&DiscoveredCharacteristic> = discovered
            .iter()
            .filter(|c| {
                self.characteristics.is_empty() || self.characteristics.contains(&c.reference.uuid)
            })
            .collect();

        let readable = candidates.iter().find(|c| c.properties.read);
        let notifying = candidates.iter().find(|c| c.properties.can_notify());
        let read = readable.or(notifying);

        let selection = ChannelSelection {
            read: read.map(|c| c.reference),
            read_notifies: read.map(|c| c.properties.can_notify()).unwrap_or(false),
            write: candidates
                .iter()
                .find(|c| c.properties.write)
                .map(|c| c.reference),
            write_without_response: candidates
                .iter()
                .find(|c| c.properties.write_without_response)
                .map(|c| c.reference),
        };

        if selection.satisfies(self.need_channel) {
            Ok(selection.restricted_to(self.need_channel))
        } else {
            let mut missing = Vec::new();
            if self.need_channel.needs_read() && selection.read.is_none() {
                missing.push("read characteristic");
            }
            if self.need_channel.needs_write() && !selection.has_write() {
                missing.push("write characteristic");
            }
            Err(BleError::ServiceUnavailable {
                missing: missing.join(", "),
            })
        }
    }
}
