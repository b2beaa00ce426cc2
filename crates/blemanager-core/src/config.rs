//! Central manager configuration

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{BleError, Result};
use crate::filter::ScanFilter;

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

/// Configuration for the central manager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Filter applied to new scan sessions
    pub filter: ScanFilter,
    /// Scan duration when the caller does not pass one
    #[serde(with = "duration_secs")]
    pub scan_timeout: Duration,
    /// Default delay before reconnecting a lost device
    #[serde(with = "duration_secs")]
    pub reconnect_interval: Duration,
    /// Whether lost links are re-established automatically
    pub auto_reconnect: bool,
    /// Subscribe to the read characteristic when it supports notifications
    pub subscribe_notifications: bool,
    /// Capacity of the command channel (caller -> manager)
    pub command_buffer_size: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            filter: ScanFilter::default(),
            scan_timeout: Duration::from_secs(10),
            reconnect_interval: Duration::from_secs(3),
            auto_reconnect: true,
            subscribe_notifications: true,
            command_buffer_size: 32,
        }
    }
}

impl ManagerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, filter: ScanFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout = timeout;
        self
    }

    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    pub fn with_subscribe_notifications(mut self, enabled: bool) -> Self {
        self.subscribe_notifications = enabled;
        self
    }

    pub fn with_command_buffer_size(mut self, size: usize) -> Self {
        self.command_buffer_size = size;
        self
    }

    /// Reject values the manager cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.command_buffer_size == 0 {
            return Err(BleError::config("command_buffer_size must be at least 1"));
        }
        if self.scan_timeout.is_zero() {
            return Err(BleError::config("scan_timeout must be positive"));
        }
        Ok(())
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            BleError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }
}

/// Durations as fractional seconds
pub mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
