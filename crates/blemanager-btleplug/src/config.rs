//! btleplug transport configuration

use std::time::Duration;

use blemanager_core::config::duration_secs;
use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

/// Configuration for the btleplug transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BtleplugConfig {
    /// Which of the host's adapters to drive
    pub adapter_index: usize,
    /// Maximum time to wait for a link to come up
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,
}

impl Default for BtleplugConfig {
    fn default() -> Self {
        Self {
            adapter_index: 0,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl BtleplugConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_adapter_index(mut self, index: usize) -> Self {
        self.adapter_index = index;
        self
    }

    /// Set connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}
