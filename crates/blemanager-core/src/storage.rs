//! Persistent storage for paired device identifiers
//!
//! The manager only needs `load` at startup and `save` of the full key set;
//! how the set is stored is up to the [`PairedStore`] implementation.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::{BleError, Result};
use crate::types::DeviceId;

/// Current on-disk format version
const STORE_FORMAT_VERSION: u32 = 1;

// ----------------------------------------------------------------------------
// Store Trait
// ----------------------------------------------------------------------------

/// Storage backend for the paired registry
pub trait PairedStore: Send + Sync {
    /// Load persisted identifiers; an absent store yields an empty set
    fn load(&self) -> Result<BTreeSet<DeviceId>>;

    /// Replace the persisted set
    fn save(&self, ids: &BTreeSet<DeviceId>) -> Result<()>;
}

// ----------------------------------------------------------------------------
// JSON File Store
// ----------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct PairedFile {
    version: u32,
    devices: BTreeSet<DeviceId>,
}

/// Stores identifiers in a JSON document
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PairedStore for JsonFileStore {
    fn load(&self) -> Result<BTreeSet<DeviceId>> {
        if !self.path.exists() {
            debug!("No paired device file at {}", self.path.display());
            return Ok(BTreeSet::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        let file: PairedFile = serde_json::from_str(&content)?;
        if file.version != STORE_FORMAT_VERSION {
            return Err(BleError::storage(format!(
                "unsupported paired file version {} (expected {})",
                file.version, STORE_FORMAT_VERSION
            )));
        }
        info!(
            "Loaded {} paired devices from {}",
            file.devices.len(),
            self.path.display()
        );
        Ok(file.devices)
    }

    fn save(&self, ids: &BTreeSet<DeviceId>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = PairedFile {
            version: STORE_FORMAT_VERSION,
            devices: ids.clone(),
        };
        let content = serde_json::to_string_pretty(&file)?;

        // Atomic replace via sibling file
        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, content)?;
        std::fs::rename(&tmp_path, &self.path)?;

        debug!("Saved {} paired devices to {}", ids.len(), self.path.display());
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// In-Memory Store
// ----------------------------------------------------------------------------

/// Process-local store; clones share the same contents
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryStoreInner>>,
}

#[derive(Debug, Default)]
struct MemoryStoreInner {
    ids: BTreeSet<DeviceId>,
    fail_saves: bool,
    save_count: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ids(ids: impl IntoIterator<Item = DeviceId>) -> Self {
        let store = Self::default();
        if let Ok(mut inner) = store.inner.lock() {
            inner.ids.extend(ids);
        }
        store
    }

    /// Make subsequent saves fail with a storage error
    pub fn set_fail_saves(&self, fail: bool) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.fail_saves = fail;
        }
    }

    pub fn ids(&self) -> BTreeSet<DeviceId> {
        self.inner
            .lock()
            .map(|inner| inner.ids.clone())
            .unwrap_or_default()
    }

    pub fn save_count(&self) -> usize {
        self.inner.lock().map(|inner| inner.save_count).unwrap_or(0)
    }
}

impl PairedStore for MemoryStore {
    fn load(&self) -> Result<BTreeSet<DeviceId>> {
        let inner = self
            .inner
            .lock()
            .map_err(|_| BleError::storage("memory store poisoned"))?;
        Ok(inner.ids.clone())
    }

    fn save(&self, ids: &BTreeSet<DeviceId>) -> Result<()> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| BleError::storage("memory store poisoned"))?;
        if inner.fail_saves {
            return Err(BleError::storage("save rejected"));
        }
        inner.ids = ids.clone();
        inner.save_count += 1;
        Ok(())
    }
}
