//! blemanager CLI library
//!
//! Wires the btleplug transport and a JSON paired-device file into a
//! [`blemanager_core::CentralManager`] and exposes one-shot commands on top.

pub mod app;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;

pub use app::BleManagerApp;
pub use cli::{Cli, Commands};
pub use config::AppConfig;
pub use error::{CliError, Result};
