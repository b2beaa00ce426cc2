//! Application wiring: transport, store and manager

use std::collections::HashSet;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use blemanager_btleplug::BtleplugTransport;
use blemanager_core::{
    BleError, CentralManager, ConnectionState, DeviceId, JsonFileStore, ManagerEvent,
    ManagerEventReceiver, PeripheralSnapshot,
};

use crate::config::AppConfig;
use crate::error::{CliError, Result};

/// Running manager plus its event stream
pub struct BleManagerApp {
    config: AppConfig,
    manager: CentralManager,
    events: ManagerEventReceiver,
}

impl BleManagerApp {
    /// Open the adapter and start the manager
    pub async fn new(config: AppConfig) -> Result<Self> {
        config.validate()?;
        let transport = BtleplugTransport::new(config.transport.clone()).await?;
        let store = JsonFileStore::new(config.paired_store_path()?);
        let (manager, events) = CentralManager::start(transport, store, config.manager.clone()).await?;
        info!("Manager started on adapter {}", manager.adapter_id());

        Ok(Self {
            config,
            manager,
            events,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn manager(&self) -> &CentralManager {
        &self.manager
    }

    fn operation_timeout(&self) -> Duration {
        self.config.cli.operation_timeout
    }

    /// Next manager event before `deadline`
    async fn next_event(&mut self, deadline: Instant, waiting_for: &str) -> Result<ManagerEvent> {
        match tokio::time::timeout_at(deadline, self.events.recv()).await {
            Ok(Some(event)) => {
                report_background_event(&event);
                Ok(event)
            }
            Ok(None) => Err(BleError::ManagerStopped.into()),
            Err(_) => Err(CliError::Timeout(waiting_for.to_string())),
        }
    }

    // ---- Scanning ----

    /// Scan for the given duration, returning everything discovered
    pub async fn scan(&mut self, timeout: Option<Duration>) -> Result<Vec<PeripheralSnapshot>> {
        self.manager.scan(timeout).await?;
        let budget = timeout.unwrap_or(self.config.manager.scan_timeout) + self.operation_timeout();
        let deadline = Instant::now() + budget;

        loop {
            match self.next_event(deadline, "the scan to end").await? {
                ManagerEvent::PeripheralDiscovered { id, name, rssi } => {
                    debug!("Discovered {} {:?} rssi={:?}", id, name, rssi);
                }
                ManagerEvent::ScanEnded => break,
                ManagerEvent::PowerOff => return Err(BleError::PowerOff.into()),
                ManagerEvent::Unsupported => return Err(BleError::Unsupported.into()),
                _ => {}
            }
        }

        Ok(self.manager.peripherals().await?)
    }

    /// Make sure the manager knows `id`, scanning for it if needed
    async fn ensure_known(&mut self, id: &DeviceId) -> Result<()> {
        if self.manager.peripheral(id).await?.is_some() {
            return Ok(());
        }

        info!("Scanning for {}", id);
        self.manager.scan(None).await?;
        let deadline = Instant::now() + self.config.manager.scan_timeout + self.operation_timeout();
        loop {
            match self.next_event(deadline, "device discovery").await? {
                ManagerEvent::PeripheralDiscovered { id: found, .. } if found == *id => {
                    self.manager.stop_scan().await?;
                    return Ok(());
                }
                ManagerEvent::ScanEnded => return Err(CliError::DeviceNotFound(id.to_string())),
                ManagerEvent::PowerOff => return Err(BleError::PowerOff.into()),
                ManagerEvent::Unsupported => return Err(BleError::Unsupported.into()),
                _ => {}
            }
        }
    }

    // ---- Connections ----

    /// Connect and wait until the device is ready
    pub async fn connect(&mut self, id: &DeviceId) -> Result<()> {
        self.ensure_known(id).await?;
        if let Some(snapshot) = self.manager.peripheral(id).await? {
            if snapshot.state == ConnectionState::Ready {
                return Ok(());
            }
        }

        self.manager.connect(id).await?;
        let deadline = Instant::now() + self.operation_timeout();
        loop {
            if let ManagerEvent::ConnectResult { id: got, result, .. } =
                self.next_event(deadline, "the connection").await?
            {
                if got == *id {
                    result?;
                    info!("Connected to {}", id);
                    return Ok(());
                }
            }
        }
    }

    /// Print received data until ctrl-c
    pub async fn watch(&mut self, id: &DeviceId) -> Result<()> {
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted, disconnecting");
                    return Ok(());
                }
                event = self.events.recv() => {
                    let Some(event) = event else {
                        return Err(BleError::ManagerStopped.into());
                    };
                    match &event {
                        ManagerEvent::DataReceived { id: got, data } if got == id => {
                            println!("{}", hex::encode(data));
                        }
                        ManagerEvent::StateChanged { id: got, from, to } if got == id => {
                            println!("{} -> {}", from, to);
                        }
                        _ => report_background_event(&event),
                    }
                }
            }
        }
    }

    pub async fn disconnect(&mut self, id: &DeviceId) -> Result<()> {
        self.manager.unconnect(id).await?;
        let deadline = Instant::now() + self.operation_timeout();
        loop {
            if let ManagerEvent::UnconnectResult { id: got, result } =
                self.next_event(deadline, "the disconnect").await?
            {
                if got == *id {
                    return Ok(result?);
                }
            }
        }
    }

    // ---- Data ----

    pub async fn read(&mut self, id: &DeviceId) -> Result<Vec<u8>> {
        self.connect(id).await?;
        self.manager.read_data(id).await?;
        let deadline = Instant::now() + self.operation_timeout();
        loop {
            match self.next_event(deadline, "the read").await? {
                ManagerEvent::DataReceived { id: got, data } if got == *id => return Ok(data),
                ManagerEvent::ReadFailed { id: got, error } if got == *id => return Err(error.into()),
                _ => {}
            }
        }
    }

    pub async fn write(&mut self, id: &DeviceId, data: Vec<u8>, with_response: bool) -> Result<()> {
        self.connect(id).await?;
        if !with_response {
            self.manager.send_data_without_response(id, data).await?;
            // Only failures are reported for unacknowledged writes; give one a moment to arrive
            let deadline = Instant::now() + Duration::from_millis(500);
            loop {
                match self.next_event(deadline, "write errors").await {
                    Ok(ManagerEvent::WriteCompleted { id: got, result }) if got == *id => {
                        return Ok(result?)
                    }
                    Ok(_) => {}
                    Err(CliError::Timeout(_)) => return Ok(()),
                    Err(e) => return Err(e),
                }
            }
        }

        self.manager.send_data_with_response(id, data).await?;
        let deadline = Instant::now() + self.operation_timeout();
        loop {
            if let ManagerEvent::WriteCompleted { id: got, result } =
                self.next_event(deadline, "the write").await?
            {
                if got == *id {
                    return Ok(result?);
                }
            }
        }
    }

    // ---- Paired Devices ----

    pub async fn paired(&self) -> Result<Vec<PeripheralSnapshot>> {
        Ok(self.manager.paired_peripherals().await?)
    }

    pub async fn forget(&mut self, id: &DeviceId) -> Result<()> {
        if self.manager.peripheral(id).await?.is_none() {
            return Err(CliError::DeviceNotFound(id.to_string()));
        }
        self.manager.remove_connected_peripheral(id).await?;
        let deadline = Instant::now() + self.operation_timeout();
        loop {
            if let ManagerEvent::RemovalResult { id: got, result } =
                self.next_event(deadline, "the removal").await?
            {
                if got == *id {
                    return Ok(result?);
                }
            }
        }
    }

    pub async fn forget_all(&mut self) -> Result<usize> {
        let mut tally = RemovalTally::new(&self.manager.peripherals().await?);
        if tally.is_done() {
            return Ok(0);
        }
        self.manager.remove_all_connected_peripherals().await?;

        let deadline = Instant::now() + self.operation_timeout();
        while !tally.is_done() {
            let event = self.next_event(deadline, "removals").await?;
            tally.record(&event);
        }
        Ok(tally.removed())
    }

    /// Persist the paired set and release the radio
    pub async fn stop(self) -> Result<()> {
        if let Err(e) = self.manager.save_paired_peripherals().await {
            warn!("Failed to save paired devices: {}", e);
        }
        self.manager.shutdown().await?;
        Ok(())
    }
}

// ---- Removal tracking ----

/// Devices a remove-all still owes a `RemovalResult` for
struct RemovalTally {
    pending: HashSet<DeviceId>,
    removed: usize,
}

impl RemovalTally {
    /// Targets the same devices the manager's remove-all does
    fn new(peripherals: &[PeripheralSnapshot]) -> Self {
        let pending = peripherals
            .iter()
            .filter(|p| {
                p.paired
                    || p.state.has_link_activity()
                    || p.state == ConnectionState::ReconnectWaiting
            })
            .map(|p| p.id.clone())
            .collect();
        Self {
            pending,
            removed: 0,
        }
    }

    fn record(&mut self, event: &ManagerEvent) {
        let ManagerEvent::RemovalResult { id, result } = event else {
            return;
        };
        if !self.pending.remove(id) {
            return;
        }
        if let Err(e) = result {
            warn!("Removal of {} was not persisted: {}", id, e);
        }
        self.removed += 1;
    }

    fn is_done(&self) -> bool {
        self.pending.is_empty()
    }

    fn removed(&self) -> usize {
        self.removed
    }
}

/// Log events a command is not waiting on
fn report_background_event(event: &ManagerEvent) {
    match event {
        ManagerEvent::PairedLoadFailed { error } => {
            warn!("Could not load paired devices: {}", error)
        }
        ManagerEvent::StateChanged { id, from, to } => debug!("{}: {} -> {}", id, from, to),
        ManagerEvent::AvailabilityChanged { id, available } => {
            debug!("{} available={}", id, available)
        }
        ManagerEvent::PowerOff => warn!("Bluetooth is powered off"),
        ManagerEvent::Unsupported => warn!("Bluetooth LE is not supported on this host"),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(id: &str, state: ConnectionState, paired: bool) -> PeripheralSnapshot {
        PeripheralSnapshot {
            id: DeviceId::from(id),
            name: None,
            rssi: None,
            state,
            reconnect_interval: Duration::from_secs(3),
            will_be_removed: false,
            default_read: None,
            default_write: None,
            default_write_without_response: None,
            available: true,
            paired,
        }
    }

    fn removal(id: &str, result: std::result::Result<(), BleError>) -> ManagerEvent {
        ManagerEvent::RemovalResult {
            id: DeviceId::from(id),
            result,
        }
    }

    #[test]
    fn test_tally_targets_paired_and_linked_devices() {
        let tally = RemovalTally::new(&[
            snapshot("paired", ConnectionState::Disconnected, true),
            snapshot("linking", ConnectionState::Connecting, false),
            snapshot("waiting", ConnectionState::ReconnectWaiting, false),
            snapshot("seen", ConnectionState::Discovered, false),
        ]);
        assert_eq!(tally.pending.len(), 3);
        assert!(!tally.pending.contains(&DeviceId::from("seen")));
    }

    #[test]
    fn test_tally_counts_each_target_once() {
        let mut tally = RemovalTally::new(&[
            snapshot("a", ConnectionState::Ready, true),
            snapshot("b", ConnectionState::Disconnected, true),
        ]);

        tally.record(&removal("a", Ok(())));
        tally.record(&removal("a", Ok(())));
        tally.record(&removal("other", Ok(())));
        tally.record(&ManagerEvent::PowerOff);
        assert!(!tally.is_done());
        assert_eq!(tally.removed(), 1);

        tally.record(&removal("b", Err(BleError::StorageFailure {
            reason: "disk full".to_string(),
        })));
        assert!(tally.is_done());
        assert_eq!(tally.removed(), 2);
    }

    #[test]
    fn test_tally_with_nothing_to_remove_is_done() {
        let tally = RemovalTally::new(&[snapshot("seen", ConnectionState::Discovered, false)]);
        assert!(tally.is_done());
        assert_eq!(tally.removed(), 0);
    }
}
