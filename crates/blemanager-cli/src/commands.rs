//! Command handlers for the blemanager CLI

use std::time::Duration;

use tracing::info;
use uuid::Uuid;

use blemanager_core::{DeviceId, PeripheralSnapshot};

use crate::app::BleManagerApp;
use crate::cli::Commands;
use crate::config::AppConfig;
use crate::error::{CliError, Result};

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command against a started app
    pub async fn execute(command: Commands, mut app: BleManagerApp) -> Result<()> {
        let outcome = match command {
            Commands::Scan {
                timeout,
                service,
                json,
            } => Self::handle_scan_command(&mut app, timeout, service, json).await,
            Commands::Connect { device, watch } => {
                Self::handle_connect_command(&mut app, DeviceId::new(device), watch).await
            }
            Commands::Paired { json } => Self::handle_paired_command(&app, json).await,
            Commands::Forget { device, all } => Self::handle_forget_command(&mut app, device, all).await,
            Commands::Read { device } => Self::handle_read_command(&mut app, DeviceId::new(device)).await,
            Commands::Write {
                device,
                data,
                no_response,
            } => Self::handle_write_command(&mut app, DeviceId::new(device), &data, !no_response).await,
            Commands::Config => Self::print_config(app.config()),
        };

        // Shut down even when the command failed so the radio is released
        let stopped = app.stop().await;
        outcome.and(stopped)
    }

    async fn handle_scan_command(
        app: &mut BleManagerApp,
        timeout: Option<f64>,
        services: Vec<Uuid>,
        json: bool,
    ) -> Result<()> {
        let timeout = timeout.map(parse_seconds).transpose()?;
        if !services.is_empty() {
            let mut filter = app.config().manager.filter.clone();
            filter.services = services;
            app.manager().set_filter(filter).await?;
        }
        let found = app.scan(timeout).await?;
        print_peripherals(&found, json)
    }

    async fn handle_connect_command(app: &mut BleManagerApp, id: DeviceId, watch: bool) -> Result<()> {
        app.connect(&id).await?;
        println!("Connected to {}", id);
        if watch {
            app.watch(&id).await?;
            app.disconnect(&id).await?;
        }
        Ok(())
    }

    async fn handle_paired_command(app: &BleManagerApp, json: bool) -> Result<()> {
        let paired = app.paired().await?;
        print_peripherals(&paired, json)
    }

    async fn handle_forget_command(app: &mut BleManagerApp, device: Option<String>, all: bool) -> Result<()> {
        if all {
            let removed = app.forget_all().await?;
            println!("Forgot {} device(s)", removed);
            return Ok(());
        }
        let id = device
            .map(DeviceId::new)
            .ok_or_else(|| CliError::Config("forget needs a device or --all".into()))?;
        app.forget(&id).await?;
        println!("Forgot {}", id);
        Ok(())
    }

    async fn handle_read_command(app: &mut BleManagerApp, id: DeviceId) -> Result<()> {
        let data = app.read(&id).await?;
        println!("{}", hex::encode(data));
        Ok(())
    }

    async fn handle_write_command(
        app: &mut BleManagerApp,
        id: DeviceId,
        data: &str,
        with_response: bool,
    ) -> Result<()> {
        let payload = hex::decode(data.trim_start_matches("0x"))?;
        info!("Writing {} byte(s) to {}", payload.len(), id);
        app.write(&id, payload, with_response).await?;
        println!("Wrote to {}", id);
        Ok(())
    }

    /// Print the effective configuration as TOML
    pub fn print_config(config: &AppConfig) -> Result<()> {
        print!("{}", config.to_toml_string()?);
        Ok(())
    }
}

fn parse_seconds(secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs)
        .ok()
        .filter(|d| !d.is_zero())
        .ok_or_else(|| CliError::Config(format!("invalid duration: {}s", secs)))
}

fn print_peripherals(peripherals: &[PeripheralSnapshot], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(peripherals)?);
        return Ok(());
    }
    if peripherals.is_empty() {
        println!("No peripherals");
        return Ok(());
    }
    for p in peripherals {
        let rssi = p.rssi.map(|r| format!("{} dBm", r)).unwrap_or_else(|| "-".to_string());
        println!(
            "{:<40} {:<24} {:>8}  {}{}",
            p.id,
            p.display_name(),
            rssi,
            p.state,
            if p.paired { "  [paired]" } else { "" }
        );
    }
    Ok(())
}
