//! Registry of paired (previously connected) devices

use std::collections::BTreeSet;

use crate::types::DeviceId;

/// Identifiers of devices successfully connected at least once and not
/// removed since
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PairedRegistry {
    ids: BTreeSet<DeviceId>,
}

impl PairedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bulk insert identifiers restored from storage
    pub fn load(&mut self, ids: impl IntoIterator<Item = DeviceId>) {
        self.ids.extend(ids);
    }

    /// Returns true if the device was not already present
    pub fn insert(&mut self, id: DeviceId) -> bool {
        self.ids.insert(id)
    }

    pub fn remove(&mut self, id: &DeviceId) -> bool {
        self.ids.remove(id)
    }

    pub fn contains(&self, id: &DeviceId) -> bool {
        self.ids.contains(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeviceId> {
        self.ids.iter()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Copy of the key set, suitable for persisting
    pub fn to_set(&self) -> BTreeSet<DeviceId> {
        self.ids.clone()
    }
}
