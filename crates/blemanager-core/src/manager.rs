//! Central manager actor and public facade
//!
//! [`CentralManager::start`] spawns one task that owns the [`CentralCore`]
//! and serializes every command, stack event and timer expiry through it.
//! Public methods return once the request is queued; outcomes arrive on the
//! [`ManagerEvent`] receiver returned by `start`.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::central::CentralCore;
use crate::config::ManagerConfig;
use crate::errors::{BleError, Result};
use crate::filter::ScanFilter;
use crate::messages::{Effect, ManagerEvent, StackEvent};
use crate::peripheral::PeripheralSnapshot;
use crate::storage::PairedStore;
use crate::transport::{create_stack_event_channel, BleTransport, StackEventReceiver};
use crate::types::DeviceId;

/// Observer side of the manager
pub type ManagerEventSender = mpsc::UnboundedSender<ManagerEvent>;
pub type ManagerEventReceiver = mpsc::UnboundedReceiver<ManagerEvent>;

// ----------------------------------------------------------------------------
// Commands
// ----------------------------------------------------------------------------

enum Command {
    Scan {
        timeout: Option<Duration>,
    },
    StopScan,
    Connect(DeviceId),
    Unconnect(DeviceId),
    Remove(DeviceId),
    RemoveAll,
    ReadData(DeviceId),
    SendData {
        id: DeviceId,
        data: Vec<u8>,
        with_response: bool,
    },
    SetFilter(ScanFilter),
    SetReconnectInterval {
        id: DeviceId,
        interval: Duration,
    },
    SavePaired {
        reply: oneshot::Sender<Result<()>>,
    },
    Peripherals {
        reply: oneshot::Sender<Vec<PeripheralSnapshot>>,
    },
    PairedPeripherals {
        reply: oneshot::Sender<Vec<PeripheralSnapshot>>,
    },
    Peripheral {
        id: DeviceId,
        reply: oneshot::Sender<Option<PeripheralSnapshot>>,
    },
    IsScanning {
        reply: oneshot::Sender<bool>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

#[derive(Debug)]
enum TimerEvent {
    ScanTimeout { session: u64 },
    Reconnect { id: DeviceId, generation: u64 },
}

// ----------------------------------------------------------------------------
// Radio Claim
// ----------------------------------------------------------------------------

fn claimed_radios() -> &'static Mutex<HashSet<String>> {
    static CLAIMED: OnceLock<Mutex<HashSet<String>>> = OnceLock::new();
    CLAIMED.get_or_init(|| Mutex::new(HashSet::new()))
}

/// Exclusive ownership of one radio adapter, released on drop
#[derive(Debug)]
struct RadioClaim {
    adapter: String,
}

impl RadioClaim {
    fn acquire(adapter: String) -> Result<Self> {
        let mut claimed = claimed_radios()
            .lock()
            .map_err(|_| BleError::transport("radio claim registry poisoned"))?;
        if !claimed.insert(adapter.clone()) {
            return Err(BleError::RadioAlreadyClaimed { adapter });
        }
        debug!("Claimed radio adapter {}", adapter);
        Ok(Self { adapter })
    }
}

impl Drop for RadioClaim {
    fn drop(&mut self) {
        if let Ok(mut claimed) = claimed_radios().lock() {
            claimed.remove(&self.adapter);
        }
        debug!("Released radio adapter {}", self.adapter);
    }
}

// ----------------------------------------------------------------------------
// Central Manager
// ----------------------------------------------------------------------------

/// Handle to a running central manager
pub struct CentralManager {
    commands: mpsc::Sender<Command>,
    task: JoinHandle<()>,
    adapter_id: String,
}

impl CentralManager {
    /// Claim the transport's radio, restore paired devices and start the actor
    pub async fn start<T, S>(
        transport: T,
        store: S,
        config: ManagerConfig,
    ) -> Result<(Self, ManagerEventReceiver)>
    where
        T: BleTransport,
        S: PairedStore + 'static,
    {
        config.validate()?;
        let adapter_id = transport.adapter_id();
        let claim = RadioClaim::acquire(adapter_id.clone())?;

        let (stack_tx, stack_rx) = create_stack_event_channel();
        transport.attach(stack_tx).await?;
        let adapter_state = transport.adapter_state().await;

        let (command_tx, command_rx) = mpsc::channel(config.command_buffer_size);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();

        let mut core = CentralCore::new(config);
        let mut initial = Vec::new();
        match store.load() {
            Ok(ids) => {
                info!("Restored {} paired devices", ids.len());
                core.load_paired(ids);
            }
            Err(e) => {
                error!("Failed to load paired devices: {}", e);
                initial.push(Effect::Notify(ManagerEvent::PairedLoadFailed { error: e }));
            }
        }
        initial.extend(core.handle_stack_event(StackEvent::AdapterStateChanged(adapter_state)));

        let actor = ManagerActor {
            core,
            transport: Arc::new(transport),
            store: Arc::new(store),
            commands: command_rx,
            stack_events: stack_rx,
            timer_tx,
            timer_rx,
            scan_timer: None,
            reconnect_timers: ReconnectTimers::default(),
            events: event_tx,
            claim,
        };
        let task = tokio::spawn(actor.run(initial));

        info!("Central manager started on adapter {}", adapter_id);
        Ok((
            Self {
                commands: command_tx,
                task,
                adapter_id,
            },
            event_rx,
        ))
    }

    pub fn adapter_id(&self) -> &str {
        &self.adapter_id
    }

    // ---- Scanning ----

    /// Scan for `timeout`, or the configured default when `None`
    pub async fn scan(&self, timeout: Option<Duration>) -> Result<()> {
        self.send(Command::Scan { timeout }).await
    }

    pub async fn stop_scan(&self) -> Result<()> {
        self.send(Command::StopScan).await
    }

    /// Replace the filter used by subsequent scan sessions and connections
    pub async fn set_filter(&self, filter: ScanFilter) -> Result<()> {
        self.send(Command::SetFilter(filter)).await
    }

    // ---- Connections ----

    pub async fn connect(&self, id: &DeviceId) -> Result<()> {
        self.send(Command::Connect(id.clone())).await
    }

    pub async fn unconnect(&self, id: &DeviceId) -> Result<()> {
        self.send(Command::Unconnect(id.clone())).await
    }

    pub async fn remove_connected_peripheral(&self, id: &DeviceId) -> Result<()> {
        self.send(Command::Remove(id.clone())).await
    }

    pub async fn remove_all_connected_peripherals(&self) -> Result<()> {
        self.send(Command::RemoveAll).await
    }

    pub async fn set_reconnect_interval(&self, id: &DeviceId, interval: Duration) -> Result<()> {
        self.send(Command::SetReconnectInterval {
            id: id.clone(),
            interval,
        })
        .await
    }

    // ---- Data ----

    pub async fn read_data(&self, id: &DeviceId) -> Result<()> {
        self.send(Command::ReadData(id.clone())).await
    }

    pub async fn send_data_with_response(&self, id: &DeviceId, data: impl Into<Vec<u8>>) -> Result<()> {
        self.send(Command::SendData {
            id: id.clone(),
            data: data.into(),
            with_response: true,
        })
        .await
    }

    pub async fn send_data_without_response(
        &self,
        id: &DeviceId,
        data: impl Into<Vec<u8>>,
    ) -> Result<()> {
        self.send(Command::SendData {
            id: id.clone(),
            data: data.into(),
            with_response: false,
        })
        .await
    }

    // ---- Paired Registry ----

    /// Persist the paired registry keys
    pub async fn save_paired_peripherals(&self) -> Result<()> {
        self.request(|reply| Command::SavePaired { reply }).await?
    }

    // ---- Snapshots ----

    pub async fn peripherals(&self) -> Result<Vec<PeripheralSnapshot>> {
        self.request(|reply| Command::Peripherals { reply }).await
    }

    pub async fn paired_peripherals(&self) -> Result<Vec<PeripheralSnapshot>> {
        self.request(|reply| Command::PairedPeripherals { reply }).await
    }

    pub async fn peripheral(&self, id: &DeviceId) -> Result<Option<PeripheralSnapshot>> {
        let id = id.clone();
        self.request(|reply| Command::Peripheral { id, reply }).await
    }

    pub async fn is_scanning(&self) -> Result<bool> {
        self.request(|reply| Command::IsScanning { reply }).await
    }

    /// Stop scanning, drop links, cancel timers and release the radio
    pub async fn shutdown(self) -> Result<()> {
        let (reply, done) = oneshot::channel();
        if self.commands.send(Command::Shutdown { reply }).await.is_ok() {
            let _ = done.await;
        }
        if let Err(e) = self.task.await {
            error!("Central manager task failed: {}", e);
        }
        info!("Central manager on adapter {} shut down", self.adapter_id);
        Ok(())
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| BleError::ManagerStopped)
    }

    async fn request<R>(&self, command: impl FnOnce(oneshot::Sender<R>) -> Command) -> Result<R> {
        let (reply, response) = oneshot::channel();
        self.send(command(reply)).await?;
        response.await.map_err(|_| BleError::ManagerStopped)
    }
}

// ----------------------------------------------------------------------------
// Actor
// ----------------------------------------------------------------------------

struct ManagerActor {
    core: CentralCore,
    transport: Arc<dyn BleTransport>,
    store: Arc<dyn PairedStore>,
    commands: mpsc::Receiver<Command>,
    stack_events: StackEventReceiver,
    timer_tx: mpsc::UnboundedSender<TimerEvent>,
    timer_rx: mpsc::UnboundedReceiver<TimerEvent>,
    scan_timer: Option<JoinHandle<()>>,
    reconnect_timers: ReconnectTimers,
    events: ManagerEventSender,
    claim: RadioClaim,
}

impl ManagerActor {
    async fn run(mut self, initial: Vec<Effect>) {
        self.execute(initial).await;

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown { reply }) => {
                        self.stop().await;
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => {
                        let effects = self.handle_command(command);
                        self.execute(effects).await;
                    }
                    None => {
                        info!("Command channel closed, shutting down");
                        self.stop().await;
                        break;
                    }
                },
                Some(event) = self.stack_events.recv() => {
                    let effects = self.core.handle_stack_event(event);
                    self.execute(effects).await;
                }
                Some(timer) = self.timer_rx.recv() => {
                    let effects = match timer {
                        TimerEvent::ScanTimeout { session } => {
                            self.scan_timer = None;
                            self.core.scan_timeout_fired(session)
                        }
                        TimerEvent::Reconnect { id, generation } => {
                            self.reconnect_timers.fired(&id, generation);
                            self.core.reconnect_timer_fired(&id, generation)
                        }
                    };
                    self.execute(effects).await;
                }
            }
        }

        debug!("Actor for adapter {} exiting", self.claim.adapter);
    }

    fn handle_command(&mut self, command: Command) -> Vec<Effect> {
        match command {
            Command::Scan { timeout } => self.core.scan(timeout),
            Command::StopScan => self.core.stop_scan(),
            Command::Connect(id) => self.core.connect(&id),
            Command::Unconnect(id) => self.core.unconnect(&id),
            Command::Remove(id) => self.core.remove(&id),
            Command::RemoveAll => self.core.remove_all(),
            Command::ReadData(id) => self.core.read_data(&id),
            Command::SendData {
                id,
                data,
                with_response,
            } => self.core.send_data(&id, data, with_response),
            Command::SetFilter(filter) => {
                self.core.set_filter(filter);
                Vec::new()
            }
            Command::SetReconnectInterval { id, interval } => {
                if !self.core.set_reconnect_interval(&id, interval) {
                    debug!("set_reconnect_interval: unknown peripheral {}", id);
                }
                Vec::new()
            }
            Command::SavePaired { reply } => {
                let ids = self.core.paired_ids();
                let result = self.store.save(&ids);
                match &result {
                    Ok(()) => info!("Saved {} paired devices", ids.len()),
                    Err(e) => warn!("Failed to save paired devices: {}", e),
                }
                let _ = reply.send(result);
                Vec::new()
            }
            Command::Peripherals { reply } => {
                let _ = reply.send(self.core.peripherals());
                Vec::new()
            }
            Command::PairedPeripherals { reply } => {
                let _ = reply.send(self.core.paired_peripherals());
                Vec::new()
            }
            Command::Peripheral { id, reply } => {
                let _ = reply.send(self.core.snapshot(&id));
                Vec::new()
            }
            Command::IsScanning { reply } => {
                let _ = reply.send(self.core.is_scanning());
                Vec::new()
            }
            // Handled by the run loop
            Command::Shutdown { reply } => {
                let _ = reply.send(());
                Vec::new()
            }
        }
    }

    /// Carry out effects in order; issue failures feed back as stack events
    async fn execute(&mut self, effects: Vec<Effect>) {
        let mut queue: VecDeque<Effect> = effects.into();

        while let Some(effect) = queue.pop_front() {
            match effect {
                Effect::Notify(event) => self.emit(event),
                Effect::StartScan { services } => {
                    if let Err(e) = self.transport.start_scan(&services).await {
                        queue.extend(self.core.scan_start_failed(&e));
                    }
                }
                Effect::StopScan => {
                    if let Err(e) = self.transport.stop_scan().await {
                        warn!("Failed to stop scan: {}", e);
                    }
                }
                Effect::ScheduleScanTimeout { session, after } => {
                    self.arm_scan_timer(session, after);
                }
                Effect::CancelScanTimeout => {
                    if let Some(timer) = self.scan_timer.take() {
                        timer.abort();
                    }
                }
                Effect::Connect { id } => {
                    if let Err(e) = self.transport.connect(&id).await {
                        let event = StackEvent::LinkFailed {
                            id,
                            reason: e.to_string(),
                        };
                        queue.extend(self.core.handle_stack_event(event));
                    }
                }
                Effect::Disconnect { id } => {
                    if let Err(e) = self.transport.disconnect(&id).await {
                        warn!("Failed to disconnect {}: {}", id, e);
                        let event = StackEvent::LinkLost {
                            id,
                            reason: Some(e.to_string()),
                        };
                        queue.extend(self.core.handle_stack_event(event));
                    }
                }
                Effect::DiscoverCharacteristics { id } => {
                    if let Err(e) = self.transport.discover_characteristics(&id).await {
                        let event = StackEvent::CharacteristicDiscoveryFailed {
                            id,
                            reason: e.to_string(),
                        };
                        queue.extend(self.core.handle_stack_event(event));
                    }
                }
                Effect::Subscribe { id, characteristic } => {
                    if let Err(e) = self.transport.subscribe(&id, &characteristic).await {
                        warn!("Failed to subscribe to {} on {}: {}", characteristic, id, e);
                    }
                }
                Effect::Read { id, characteristic } => {
                    if let Err(e) = self.transport.read_characteristic(&id, &characteristic).await {
                        let event = StackEvent::ReadCompleted {
                            id,
                            result: Err(e.to_string()),
                        };
                        queue.extend(self.core.handle_stack_event(event));
                    }
                }
                Effect::Write {
                    id,
                    characteristic,
                    data,
                    with_response,
                } => {
                    let issued = self
                        .transport
                        .write_characteristic(&id, &characteristic, &data, with_response)
                        .await;
                    if let Err(e) = issued {
                        let event = StackEvent::WriteCompleted {
                            id,
                            error: Some(e.to_string()),
                        };
                        queue.extend(self.core.handle_stack_event(event));
                    }
                }
                Effect::ScheduleReconnect {
                    id,
                    after,
                    generation,
                } => self.arm_reconnect_timer(id, after, generation),
                Effect::CancelReconnect { id } => self.reconnect_timers.cancel(&id),
                Effect::PersistRemoval { id, paired } => {
                    let result = self.store.save(&paired);
                    if let Err(e) = &result {
                        warn!("Failed to persist removal of {}: {}", id, e);
                    }
                    self.emit(ManagerEvent::RemovalResult { id, result });
                }
            }
        }
    }

    fn emit(&self, event: ManagerEvent) {
        if self.events.send(event).is_err() {
            debug!("Manager event dropped, no observer");
        }
    }

    fn arm_scan_timer(&mut self, session: u64, after: Duration) {
        let timers = self.timer_tx.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = timers.send(TimerEvent::ScanTimeout { session });
        });
        if let Some(previous) = self.scan_timer.replace(task) {
            previous.abort();
        }
    }

    fn arm_reconnect_timer(&mut self, id: DeviceId, after: Duration, generation: u64) {
        let timers = self.timer_tx.clone();
        let key = id.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = timers.send(TimerEvent::Reconnect { id, generation });
        });
        self.reconnect_timers.arm(key, generation, task);
    }

    async fn stop(&mut self) {
        let effects = self.core.shutdown();
        self.execute(effects).await;

        if let Some(timer) = self.scan_timer.take() {
            timer.abort();
        }
        self.reconnect_timers.abort_all();
    }
}

// ----------------------------------------------------------------------------
// Reconnect timers
// ----------------------------------------------------------------------------

/// Pending reconnect timer tasks, one per device
#[derive(Default)]
struct ReconnectTimers {
    pending: HashMap<DeviceId, (u64, JoinHandle<()>)>,
}

impl ReconnectTimers {
    fn arm(&mut self, id: DeviceId, generation: u64, task: JoinHandle<()>) {
        if let Some((_, previous)) = self.pending.insert(id, (generation, task)) {
            previous.abort();
        }
    }

    fn cancel(&mut self, id: &DeviceId) {
        if let Some((_, timer)) = self.pending.remove(id) {
            timer.abort();
        }
    }

    /// Forget a timer that delivered its event; a newer arm for the device stays
    fn fired(&mut self, id: &DeviceId, generation: u64) {
        if self
            .pending
            .get(id)
            .is_some_and(|(armed, _)| *armed == generation)
        {
            self.pending.remove(id);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.pending.len()
    }

    fn abort_all(&mut self) {
        for (_, (_, timer)) in self.pending.drain() {
            timer.abort();
        }
    }
}
