//! blemanager CLI configuration
//!
//! The configuration file is TOML with three tables: `[manager]` for the
//! connection manager, `[transport]` for the btleplug adapter and `[storage]`
//! for where the paired device file lives. Every key is optional.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use blemanager_btleplug::BtleplugConfig;
use blemanager_core::ManagerConfig;

use crate::error::{CliError, Result};

const APP_DIR_NAME: &str = "blemanager";
const DEFAULT_PAIRED_FILE: &str = "paired.json";

// ----------------------------------------------------------------------------
// CLI Application Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for the blemanager CLI
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub manager: ManagerConfig,
    pub transport: BtleplugConfig,
    pub storage: StorageConfig,
    pub cli: CliConfig,
}

/// Where paired device identifiers are persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Overrides the platform data directory
    pub data_dir: Option<PathBuf>,
    pub paired_file: String,
}

/// CLI-specific behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// How long a command waits for a connection, read or write to resolve
    #[serde(with = "blemanager_core::config::duration_secs")]
    pub operation_timeout: Duration,
}

// ----------------------------------------------------------------------------
// Default Implementations
// ----------------------------------------------------------------------------

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            paired_file: DEFAULT_PAIRED_FILE.to_string(),
        }
    }
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            operation_timeout: Duration::from_secs(20),
        }
    }
}

// ----------------------------------------------------------------------------
// Loading and Validation
// ----------------------------------------------------------------------------

impl AppConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            CliError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        self.manager.validate()?;
        if self.transport.connect_timeout.is_zero() {
            return Err(CliError::Config("transport.connect_timeout must be positive".into()));
        }
        if self.storage.paired_file.trim().is_empty() {
            return Err(CliError::Config("storage.paired_file must not be empty".into()));
        }
        if self.cli.operation_timeout.is_zero() {
            return Err(CliError::Config("cli.operation_timeout must be positive".into()));
        }
        Ok(())
    }

    /// Directory holding persisted state
    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.storage.data_dir {
            return Ok(dir.clone());
        }
        dirs::data_dir()
            .map(|dir| dir.join(APP_DIR_NAME))
            .ok_or_else(|| CliError::Config("no platform data directory; pass --data-dir".into()))
    }

    /// Full path of the paired device file, creating its directory
    pub fn paired_store_path(&self) -> Result<PathBuf> {
        let dir = self.data_dir()?;
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(&self.storage.paired_file);
        debug!("Paired devices stored at {}", path.display());
        Ok(path)
    }
}
