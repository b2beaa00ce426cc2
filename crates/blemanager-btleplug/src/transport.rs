//! btleplug implementation of the manager's transport stack
//!
//! Every stack call returns as soon as the operation is issued. Completions
//! come back through the attached [`StackEventSender`] from spawned tasks,
//! the same way the adapter's own event stream is pumped.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use blemanager_core::{
    AdapterState, Advertisement, BleTransport, CharProperties, CharacteristicRef, DeviceId,
    DiscoveredCharacteristic, Result as BleResult, StackEvent, StackEventSender,
};
use btleplug::api::{
    Central, CentralEvent, CentralState, CharPropFlags, Characteristic, Manager as _,
    Peripheral as _, PeripheralProperties, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::StreamExt;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::config::BtleplugConfig;
use crate::disconnects::DisconnectTracker;
use crate::error::{BtleplugTransportError, Result};

type PeripheralCache = Arc<RwLock<HashMap<DeviceId, Peripheral>>>;
type SharedTracker = Arc<Mutex<DisconnectTracker>>;

// ----------------------------------------------------------------------------
// Transport
// ----------------------------------------------------------------------------

/// Transport stack driving one host adapter through btleplug
pub struct BtleplugTransport {
    config: BtleplugConfig,
    adapter: Adapter,
    adapter_name: String,
    peripherals: PeripheralCache,
    disconnects: SharedTracker,
    events: RwLock<Option<StackEventSender>>,
    event_pump: Mutex<Option<JoinHandle<()>>>,
    pending_connects: Mutex<HashMap<DeviceId, JoinHandle<()>>>,
    notification_tasks: Mutex<HashMap<DeviceId, JoinHandle<()>>>,
}

impl BtleplugTransport {
    /// Open the configured adapter
    pub async fn new(config: BtleplugConfig) -> Result<Self> {
        let manager = Manager::new().await?;
        let adapters = manager.adapters().await?;
        let adapter = adapters
            .into_iter()
            .nth(config.adapter_index)
            .ok_or(BtleplugTransportError::AdapterNotAvailable {
                index: config.adapter_index,
            })?;
        let adapter_name = adapter.adapter_info().await?;
        info!("Using BLE adapter {}", adapter_name);

        Ok(Self {
            config,
            adapter,
            adapter_name,
            peripherals: Arc::new(RwLock::new(HashMap::new())),
            disconnects: Arc::new(Mutex::new(DisconnectTracker::new())),
            events: RwLock::new(None),
            event_pump: Mutex::new(None),
            pending_connects: Mutex::new(HashMap::new()),
            notification_tasks: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &BtleplugConfig {
        &self.config
    }

    async fn sender(&self) -> Result<StackEventSender> {
        self.events
            .read()
            .await
            .clone()
            .ok_or(BtleplugTransportError::NotAttached)
    }

    async fn peripheral(&self, id: &DeviceId) -> Result<Peripheral> {
        if let Some(peripheral) = self.peripherals.read().await.get(id) {
            return Ok(peripheral.clone());
        }

        // Devices reported before attach are only known to the adapter
        let found = self
            .adapter
            .peripherals()
            .await?
            .into_iter()
            .find(|p| p.id().to_string() == id.as_str())
            .ok_or_else(|| BtleplugTransportError::PeripheralNotFound {
                id: id.to_string(),
            })?;
        self.peripherals
            .write()
            .await
            .insert(id.clone(), found.clone());
        Ok(found)
    }

    async fn characteristic(
        &self,
        id: &DeviceId,
        characteristic: &CharacteristicRef,
    ) -> Result<(Peripheral, Characteristic)> {
        let peripheral = self.peripheral(id).await?;
        let found = find_characteristic(&peripheral, characteristic).ok_or_else(|| {
            BtleplugTransportError::CharacteristicNotFound {
                characteristic: characteristic.to_string(),
            }
        })?;
        Ok((peripheral, found))
    }
}

impl Drop for BtleplugTransport {
    fn drop(&mut self) {
        if let Some(pump) = self.event_pump.get_mut().take() {
            pump.abort();
        }
        for (_, task) in self.pending_connects.get_mut().drain() {
            task.abort();
        }
        for (_, task) in self.notification_tasks.get_mut().drain() {
            task.abort();
        }
    }
}

#[async_trait]
impl BleTransport for BtleplugTransport {
    fn adapter_id(&self) -> String {
        self.adapter_name.clone()
    }

    async fn attach(&self, events: StackEventSender) -> BleResult<()> {
        let mut stream = self
            .adapter
            .events()
            .await
            .map_err(BtleplugTransportError::from)?;
        *self.events.write().await = Some(events.clone());

        let adapter = self.adapter.clone();
        let peripherals = self.peripherals.clone();
        let disconnects = self.disconnects.clone();
        let pump = tokio::spawn(async move {
            while let Some(event) = stream.next().await {
                let Some(stack_event) =
                    translate_event(&adapter, &peripherals, &disconnects, event).await
                else {
                    continue;
                };
                if events.send(stack_event).is_err() {
                    debug!("Manager gone, stopping adapter event pump");
                    break;
                }
            }
        });

        if let Some(previous) = self.event_pump.lock().await.replace(pump) {
            previous.abort();
        }
        Ok(())
    }

    async fn adapter_state(&self) -> AdapterState {
        match self.adapter.adapter_state().await {
            Ok(state) => adapter_state_from(state),
            Err(e) => {
                warn!("Failed to read adapter state: {}", e);
                AdapterState::Unknown
            }
        }
    }

    async fn start_scan(&self, services: &[Uuid]) -> BleResult<()> {
        let filter = ScanFilter {
            services: services.to_vec(),
        };
        self.adapter
            .start_scan(filter)
            .await
            .map_err(BtleplugTransportError::from)?;
        debug!("Scanning for {} service(s)", services.len());
        Ok(())
    }

    async fn stop_scan(&self) -> BleResult<()> {
        self.adapter
            .stop_scan()
            .await
            .map_err(BtleplugTransportError::from)?;
        Ok(())
    }

    async fn connect(&self, id: &DeviceId) -> BleResult<()> {
        let peripheral = self.peripheral(id).await?;
        let events = self.sender().await?;
        let timeout = self.config.connect_timeout;
        let disconnects = self.disconnects.clone();
        let device = id.clone();

        self.disconnects.lock().await.connect_started(id);
        let task = tokio::spawn(async move {
            let outcome = tokio::time::timeout(timeout, peripheral.connect()).await;
            disconnects.lock().await.connect_finished(&device);
            let event = match outcome {
                Ok(Ok(())) => StackEvent::LinkEstablished { id: device },
                Ok(Err(e)) => StackEvent::LinkFailed {
                    id: device,
                    reason: e.to_string(),
                },
                Err(_) => StackEvent::LinkFailed {
                    id: device,
                    reason: format!("connection timed out after {:?}", timeout),
                },
            };
            let _ = events.send(event);
        });

        let mut pending = self.pending_connects.lock().await;
        pending.retain(|_, task| !task.is_finished());
        if let Some(previous) = pending.insert(id.clone(), task) {
            previous.abort();
        }
        Ok(())
    }

    async fn disconnect(&self, id: &DeviceId) -> BleResult<()> {
        let events = self.sender().await?;

        if let Some(task) = self.notification_tasks.lock().await.remove(id) {
            task.abort();
        }
        let mut cancelled = false;
        if let Some(task) = self.pending_connects.lock().await.remove(id) {
            if !task.is_finished() {
                task.abort();
                cancelled = true;
                self.disconnects.lock().await.connect_finished(id);
                debug!("Cancelled pending connect to {}", id);
                let _ = events.send(StackEvent::LinkFailed {
                    id: id.clone(),
                    reason: "connection attempt cancelled".to_string(),
                });
            }
        }

        let peripheral = self.peripheral(id).await?;
        if !cancelled {
            self.disconnects
                .lock()
                .await
                .host_disconnected(id, Instant::now());
        }
        let disconnects = self.disconnects.clone();
        let device = id.clone();
        tokio::spawn(async move {
            let result = peripheral.disconnect().await;
            if cancelled {
                // LinkFailed above already reported the link as down
                if let Err(e) = result {
                    debug!("Disconnect after cancelled connect to {} failed: {}", device, e);
                }
                return;
            }
            let reason = match result {
                Ok(()) => None,
                Err(e) => {
                    disconnects.lock().await.host_disconnect_failed(&device);
                    Some(e.to_string())
                }
            };
            let _ = events.send(StackEvent::LinkLost { id: device, reason });
        });
        Ok(())
    }

    async fn discover_characteristics(&self, id: &DeviceId) -> BleResult<()> {
        let peripheral = self.peripheral(id).await?;
        let events = self.sender().await?;
        let device = id.clone();

        tokio::spawn(async move {
            let event = match peripheral.discover_services().await {
                Ok(()) => {
                    let characteristics = peripheral
                        .characteristics()
                        .iter()
                        .map(discovered_characteristic)
                        .collect::<Vec<_>>();
                    trace!("{} exposes {} characteristic(s)", device, characteristics.len());
                    StackEvent::CharacteristicsDiscovered {
                        id: device,
                        characteristics,
                    }
                }
                Err(e) => StackEvent::CharacteristicDiscoveryFailed {
                    id: device,
                    reason: e.to_string(),
                },
            };
            let _ = events.send(event);
        });
        Ok(())
    }

    async fn read_characteristic(
        &self,
        id: &DeviceId,
        characteristic: &CharacteristicRef,
    ) -> BleResult<()> {
        let (peripheral, target) = self.characteristic(id, characteristic).await?;
        let events = self.sender().await?;
        let device = id.clone();

        tokio::spawn(async move {
            let result = peripheral.read(&target).await.map_err(|e| e.to_string());
            let _ = events.send(StackEvent::ReadCompleted { id: device, result });
        });
        Ok(())
    }

    async fn write_characteristic(
        &self,
        id: &DeviceId,
        characteristic: &CharacteristicRef,
        data: &[u8],
        with_response: bool,
    ) -> BleResult<()> {
        let (peripheral, target) = self.characteristic(id, characteristic).await?;
        let events = self.sender().await?;
        let device = id.clone();
        let payload = data.to_vec();
        let write_type = if with_response {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        };

        tokio::spawn(async move {
            let error = peripheral
                .write(&target, &payload, write_type)
                .await
                .err()
                .map(|e| e.to_string());
            // Unacknowledged writes only report failures
            if with_response || error.is_some() {
                let _ = events.send(StackEvent::WriteCompleted { id: device, error });
            }
        });
        Ok(())
    }

    async fn subscribe(&self, id: &DeviceId, characteristic: &CharacteristicRef) -> BleResult<()> {
        let (peripheral, target) = self.characteristic(id, characteristic).await?;
        let events = self.sender().await?;
        let device = id.clone();

        let task = tokio::spawn(async move {
            if let Err(e) = peripheral.subscribe(&target).await {
                warn!("Failed to subscribe to {} on {}: {}", target.uuid, device, e);
                return;
            }
            let mut notifications = match peripheral.notifications().await {
                Ok(stream) => stream,
                Err(e) => {
                    warn!("No notification stream for {}: {}", device, e);
                    return;
                }
            };
            while let Some(notification) = notifications.next().await {
                let event = StackEvent::ValueNotified {
                    id: device.clone(),
                    characteristic: notification.uuid,
                    value: notification.value,
                };
                if events.send(event).is_err() {
                    break;
                }
            }
            debug!("Notification stream for {} ended", device);
        });

        if let Some(previous) = self.notification_tasks.lock().await.insert(id.clone(), task) {
            previous.abort();
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Event Translation
// ----------------------------------------------------------------------------

async fn translate_event(
    adapter: &Adapter,
    peripherals: &PeripheralCache,
    disconnects: &SharedTracker,
    event: CentralEvent,
) -> Option<StackEvent> {
    match event {
        CentralEvent::DeviceDiscovered(pid)
        | CentralEvent::DeviceUpdated(pid)
        | CentralEvent::ServicesAdvertisement { id: pid, .. } => {
            advertisement_for(adapter, peripherals, &pid)
                .await
                .map(StackEvent::AdvertisementReceived)
        }
        CentralEvent::DeviceDisconnected(pid) => {
            let id = DeviceId::new(pid.to_string());
            if !disconnects
                .lock()
                .await
                .forward_adapter_disconnect(&id, Instant::now())
            {
                trace!("Adapter disconnect for {} already reported", id);
                return None;
            }
            Some(StackEvent::LinkLost { id, reason: None })
        }
        CentralEvent::StateUpdate(state) => {
            Some(StackEvent::AdapterStateChanged(adapter_state_from(state)))
        }
        CentralEvent::DeviceConnected(pid) => {
            trace!("Adapter reports {} connected", pid);
            None
        }
        _ => None,
    }
}

async fn advertisement_for(
    adapter: &Adapter,
    peripherals: &PeripheralCache,
    pid: &PeripheralId,
) -> Option<Advertisement> {
    let peripheral = match adapter.peripheral(pid).await {
        Ok(peripheral) => peripheral,
        Err(e) => {
            debug!("Advertising peripheral {} vanished: {}", pid, e);
            return None;
        }
    };
    let properties = match peripheral.properties().await {
        Ok(Some(properties)) => properties,
        Ok(None) => return None,
        Err(e) => {
            debug!("Failed to read properties of {}: {}", pid, e);
            return None;
        }
    };

    let id = DeviceId::new(pid.to_string());
    peripherals.write().await.insert(id.clone(), peripheral);
    Some(advertisement_from(id, &properties))
}

fn advertisement_from(id: DeviceId, properties: &PeripheralProperties) -> Advertisement {
    let mut advertisement = Advertisement::new(id);
    advertisement.local_name = properties.local_name.clone();
    advertisement.rssi = properties.rssi;
    advertisement.services.extend(properties.services.iter().copied());
    advertisement
}

fn adapter_state_from(state: CentralState) -> AdapterState {
    match state {
        CentralState::PoweredOn => AdapterState::PoweredOn,
        CentralState::PoweredOff => AdapterState::PoweredOff,
        _ => AdapterState::Unknown,
    }
}

fn find_characteristic(
    peripheral: &Peripheral,
    reference: &CharacteristicRef,
) -> Option<Characteristic> {
    peripheral
        .characteristics()
        .into_iter()
        .find(|c| c.uuid == reference.uuid && c.service_uuid == reference.service)
}

fn discovered_characteristic(characteristic: &Characteristic) -> DiscoveredCharacteristic {
    DiscoveredCharacteristic::new(
        characteristic.service_uuid,
        characteristic.uuid,
        char_properties(characteristic.properties),
    )
}

fn char_properties(flags: CharPropFlags) -> CharProperties {
    CharProperties {
        read: flags.contains(CharPropFlags::READ),
        write: flags.contains(CharPropFlags::WRITE),
        write_without_response: flags.contains(CharPropFlags::WRITE_WITHOUT_RESPONSE),
        notify: flags.contains(CharPropFlags::NOTIFY),
        indicate: flags.contains(CharPropFlags::INDICATE),
    }
}
