//! Connection manager engine
//!
//! [`CentralCore`] owns the peripheral side-table, the paired registry and
//! the active scan session. It performs no I/O: every input returns the
//! [`Effect`]s to carry out, in order, and the actor in [`crate::manager`]
//! executes them. Stack calls that fail to issue come back as synthetic
//! [`StackEvent`]s.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ManagerConfig;
use crate::connection_state::{ConnectionEvent, ConnectionState};
use crate::errors::BleError;
use crate::filter::{FilterDecision, ScanFilter};
use crate::messages::{Effect, ManagerEvent, StackEvent};
use crate::peripheral::{ConnectOrigin, PeripheralHandle, PeripheralSnapshot};
use crate::registry::PairedRegistry;
use crate::types::{AdapterState, Advertisement, DeviceId, DiscoveredCharacteristic};

// ----------------------------------------------------------------------------
// Scan Session
// ----------------------------------------------------------------------------

/// The single active scan
#[derive(Debug, Clone)]
pub struct ScanSession {
    /// Changes whenever the timeout is re-armed
    pub id: u64,
    pub started_at: Instant,
    pub timeout: Duration,
    /// Filter captured when the session started
    pub filter: ScanFilter,
}

// ----------------------------------------------------------------------------
// Engine
// ----------------------------------------------------------------------------

pub struct CentralCore {
    config: ManagerConfig,
    /// Filter for the next scan session, and for discovery outside a scan
    filter: ScanFilter,
    peripherals: HashMap<DeviceId, PeripheralHandle>,
    /// Devices seen during a scan
    discovered: BTreeSet<DeviceId>,
    paired: PairedRegistry,
    adapter: AdapterState,
    scan: Option<ScanSession>,
    next_session: u64,
}

impl CentralCore {
    pub fn new(config: ManagerConfig) -> Self {
        Self {
            filter: config.filter.clone(),
            config,
            peripherals: HashMap::new(),
            discovered: BTreeSet::new(),
            paired: PairedRegistry::new(),
            adapter: AdapterState::Unknown,
            scan: None,
            next_session: 0,
        }
    }

    pub fn scan_session(&self) -> Option<&ScanSession> {
        self.scan.as_ref()
    }

    pub fn is_scanning(&self) -> bool {
        self.scan.is_some()
    }

    pub fn handle(&self, id: &DeviceId) -> Option<&PeripheralHandle> {
        self.peripherals.get(id)
    }

    /// Keys to persist for `save_paired_peripherals`
    pub fn paired_ids(&self) -> BTreeSet<DeviceId> {
        self.paired.to_set()
    }

    /// Restore paired devices; each joins the side-table as `Disconnected`
    pub fn load_paired(&mut self, ids: impl IntoIterator<Item = DeviceId>) {
        let interval = self.config.reconnect_interval;
        let ids: Vec<DeviceId> = ids.into_iter().collect();
        for id in &ids {
            self.peripherals
                .entry(id.clone())
                .or_insert_with(|| PeripheralHandle::restored(id.clone(), interval));
        }
        self.paired.load(ids);
        debug!("Paired registry holds {} devices", self.paired.len());
    }

    // ---- Queries ----

    pub fn snapshot(&self, id: &DeviceId) -> Option<PeripheralSnapshot> {
        self.peripherals
            .get(id)
            .map(|handle| handle.snapshot(self.paired.contains(id)))
    }

    /// Devices seen during scanning, ordered by id
    pub fn peripherals(&self) -> Vec<PeripheralSnapshot> {
        self.discovered
            .iter()
            .filter_map(|id| self.snapshot(id))
            .collect()
    }

    pub fn paired_peripherals(&self) -> Vec<PeripheralSnapshot> {
        self.paired.iter().filter_map(|id| self.snapshot(id)).collect()
    }

    // ---- Scanning ----

    pub fn scan(&mut self, timeout: Option<Duration>) -> Vec<Effect> {
        if let Some(error) = self.radio_error() {
            warn!("Cannot scan: {}", error);
            return vec![Effect::Notify(radio_event(&error))];
        }

        let timeout = timeout.unwrap_or(self.config.scan_timeout);
        self.next_session += 1;
        let session_id = self.next_session;
        let mut effects = Vec::new();

        if let Some(session) = self.scan.as_mut() {
            debug!("Scan already active, restarting timeout ({:?})", timeout);
            session.id = session_id;
            session.started_at = Instant::now();
            session.timeout = timeout;
        } else {
            let filter = self.filter.clone();
            info!(
                "Starting scan with {} service filters, timeout {:?}",
                filter.services.len(),
                timeout
            );
            effects.push(Effect::StartScan {
                services: filter.services.clone(),
            });
            self.scan = Some(ScanSession {
                id: session_id,
                started_at: Instant::now(),
                timeout,
                filter,
            });
        }

        effects.push(Effect::ScheduleScanTimeout {
            session: session_id,
            after: timeout,
        });
        effects.push(Effect::Notify(ManagerEvent::ScanStarted { timeout }));
        effects
    }

    pub fn stop_scan(&mut self) -> Vec<Effect> {
        self.end_scan(true)
    }

    pub fn scan_timeout_fired(&mut self, session: u64) -> Vec<Effect> {
        match self.scan.as_ref().map(|active| (active.id, active.timeout)) {
            Some((active, timeout)) if active == session => {
                info!("Scan timed out after {:?}", timeout);
                self.end_scan(true)
            }
            _ => {
                debug!("Discarding stale scan timeout for session {}", session);
                Vec::new()
            }
        }
    }

    /// The stack refused to start scanning
    pub fn scan_start_failed(&mut self, error: &BleError) -> Vec<Effect> {
        warn!("Scan could not be started: {}", error);
        self.end_scan(false)
    }

    fn end_scan(&mut self, issue_stop: bool) -> Vec<Effect> {
        let Some(session) = self.scan.take() else {
            debug!("No active scan to stop");
            return Vec::new();
        };
        info!(
            "Scan session {} ended after {:?}",
            session.id,
            session.started_at.elapsed()
        );

        let mut effects = vec![Effect::CancelScanTimeout];
        if issue_stop {
            effects.push(Effect::StopScan);
        }
        effects.push(Effect::Notify(ManagerEvent::ScanEnded));
        effects
    }

    pub fn set_filter(&mut self, filter: ScanFilter) {
        info!(
            "Filter updated: {} services, {} characteristics, {:?}",
            filter.services.len(),
            filter.characteristics.len(),
            filter.need_channel
        );
        self.filter = filter;
    }

    // ---- Connection Control ----

    pub fn connect(&mut self, id: &DeviceId) -> Vec<Effect> {
        let radio_error = self.radio_error();
        let Some(handle) = self.peripherals.get_mut(id) else {
            debug!("connect: unknown peripheral {}", id);
            return Vec::new();
        };
        if !handle.state.accepts_connect() {
            debug!("connect: {} is {}, ignoring", id, handle.state);
            return Vec::new();
        }
        if let Some(error) = radio_error {
            warn!("Cannot connect to {}: {}", id, error);
            return vec![Effect::Notify(ManagerEvent::ConnectResult {
                id: id.clone(),
                origin: ConnectOrigin::Caller,
                result: Err(error),
            })];
        }

        let mut effects = Vec::new();
        if handle.state == ConnectionState::ReconnectWaiting {
            handle.bump_reconnect_generation();
            effects.push(Effect::CancelReconnect { id: id.clone() });
        }
        if apply_transition(handle, ConnectionEvent::ConnectRequested, &mut effects) {
            handle.pending_connect = Some(ConnectOrigin::Caller);
            handle.teardown_requested = false;
            handle.policy_failure = false;
            info!("Connecting to {}", id);
            effects.push(Effect::Connect { id: id.clone() });
        }
        effects
    }

    pub fn reconnect_timer_fired(&mut self, id: &DeviceId, generation: u64) -> Vec<Effect> {
        let adapter = self.adapter;
        let Some(handle) = self.peripherals.get_mut(id) else {
            debug!("Discarding reconnect timer for unknown peripheral {}", id);
            return Vec::new();
        };
        if handle.reconnect_generation != generation
            || handle.state != ConnectionState::ReconnectWaiting
        {
            debug!("Discarding stale reconnect timer for {}", id);
            return Vec::new();
        }

        let mut effects = Vec::new();
        match adapter {
            AdapterState::PoweredOff => {
                let generation = handle.bump_reconnect_generation();
                debug!("Radio off, re-arming reconnect for {}", id);
                effects.push(Effect::ScheduleReconnect {
                    id: id.clone(),
                    after: handle.reconnect_interval,
                    generation,
                });
            }
            AdapterState::Unsupported => {
                handle.bump_reconnect_generation();
                apply_transition(handle, ConnectionEvent::ReconnectCancelled, &mut effects);
            }
            AdapterState::PoweredOn | AdapterState::Unknown => {
                if apply_transition(handle, ConnectionEvent::ReconnectTimerFired, &mut effects) {
                    handle.pending_connect = Some(ConnectOrigin::AutoReconnect);
                    info!("Reconnecting to {}", id);
                    effects.push(Effect::Connect { id: id.clone() });
                }
            }
        }
        effects
    }

    pub fn unconnect(&mut self, id: &DeviceId) -> Vec<Effect> {
        let Some(handle) = self.peripherals.get_mut(id) else {
            debug!("unconnect: unknown peripheral {}", id);
            return Vec::new();
        };

        let mut effects = Vec::new();
        match handle.state {
            ConnectionState::Connecting
            | ConnectionState::DiscoveringServices
            | ConnectionState::Ready => {
                if handle.teardown_requested {
                    debug!("unconnect: teardown of {} already pending", id);
                } else {
                    handle.teardown_requested = true;
                    info!("Disconnecting {}", id);
                    effects.push(Effect::Disconnect { id: id.clone() });
                }
            }
            ConnectionState::ReconnectWaiting => {
                handle.bump_reconnect_generation();
                effects.push(Effect::CancelReconnect { id: id.clone() });
                if apply_transition(handle, ConnectionEvent::ReconnectCancelled, &mut effects) {
                    info!("Cancelled pending reconnect for {}", id);
                    effects.push(Effect::Notify(ManagerEvent::UnconnectResult {
                        id: id.clone(),
                        result: Ok(()),
                    }));
                }
            }
            state => debug!("unconnect: {} is {}, nothing to do", id, state),
        }
        effects
    }

    pub fn set_reconnect_interval(&mut self, id: &DeviceId, interval: Duration) -> bool {
        match self.peripherals.get_mut(id) {
            Some(handle) => {
                handle.reconnect_interval = interval;
                debug!("Reconnect interval for {} set to {:?}", id, interval);
                true
            }
            None => false,
        }
    }

    // ---- Removal ----

    /// Remove a device, deferring the purge while a link operation is active
    pub fn remove(&mut self, id: &DeviceId) -> Vec<Effect> {
        let Some(handle) = self.peripherals.get_mut(id) else {
            debug!("remove: unknown peripheral {}", id);
            return Vec::new();
        };
        if handle.will_be_removed {
            debug!("remove: removal of {} already pending", id);
            return Vec::new();
        }
        handle.will_be_removed = true;

        let mut effects = Vec::new();
        if handle.state.has_link_activity() {
            info!("Removal of {} deferred until the link is down", id);
            effects.push(Effect::Disconnect { id: id.clone() });
        } else {
            self.finalize_removal(id, &mut effects);
        }
        effects
    }

    /// Remove every paired device and every device with an open or pending link
    pub fn remove_all(&mut self) -> Vec<Effect> {
        let targets: BTreeSet<DeviceId> = self
            .paired
            .iter()
            .cloned()
            .chain(
                self.peripherals
                    .values()
                    .filter(|handle| {
                        handle.state.has_link_activity()
                            || handle.state == ConnectionState::ReconnectWaiting
                    })
                    .map(|handle| handle.id.clone()),
            )
            .collect();

        let mut effects = Vec::new();
        for id in &targets {
            effects.extend(self.remove(id));
        }
        effects
    }

    fn finalize_removal(&mut self, id: &DeviceId, effects: &mut Vec<Effect>) {
        let Some(handle) = self.peripherals.get_mut(id) else {
            return;
        };
        if handle.state == ConnectionState::ReconnectWaiting {
            handle.bump_reconnect_generation();
            effects.push(Effect::CancelReconnect { id: id.clone() });
        }
        set_availability(handle, false, effects);
        if !apply_transition(handle, ConnectionEvent::Remove, effects) {
            return;
        }

        self.peripherals.remove(id);
        self.discovered.remove(id);
        self.paired.remove(id);
        info!("Removed peripheral {}", id);
        effects.push(Effect::PersistRemoval {
            id: id.clone(),
            paired: self.paired.to_set(),
        });
    }

    // ---- Data Transfer ----

    pub fn read_data(&self, id: &DeviceId) -> Vec<Effect> {
        match self.peripherals.get(id) {
            Some(handle) if handle.state.is_ready() => match handle.default_read {
                Some(characteristic) => vec![Effect::Read {
                    id: id.clone(),
                    characteristic,
                }],
                None => {
                    debug!("read_data: {} has no read characteristic", id);
                    Vec::new()
                }
            },
            _ => {
                debug!("read_data: {} is not ready", id);
                Vec::new()
            }
        }
    }

    pub fn send_data(&self, id: &DeviceId, data: Vec<u8>, with_response: bool) -> Vec<Effect> {
        let Some(handle) = self.peripherals.get(id).filter(|h| h.state.is_ready()) else {
            debug!("send_data: {} is not ready", id);
            return Vec::new();
        };
        let characteristic = if with_response {
            handle.default_write
        } else {
            handle.default_write_without_response
        };
        match characteristic {
            Some(characteristic) => vec![Effect::Write {
                id: id.clone(),
                characteristic,
                data,
                with_response,
            }],
            None => {
                debug!(
                    "send_data: {} has no {} characteristic",
                    id,
                    if with_response { "write" } else { "write-without-response" }
                );
                Vec::new()
            }
        }
    }

    // ---- Shutdown ----

    /// Stop scanning and drop every open link
    pub fn shutdown(&mut self) -> Vec<Effect> {
        let mut effects = self.end_scan(true);
        for handle in self.peripherals.values() {
            if handle.state.has_link_activity() {
                effects.push(Effect::Disconnect {
                    id: handle.id.clone(),
                });
            }
        }
        effects
    }

    // ------------------------------------------------------------------------
    // Stack Events
    // ------------------------------------------------------------------------

    pub fn handle_stack_event(&mut self, event: StackEvent) -> Vec<Effect> {
        match event {
            StackEvent::AdvertisementReceived(advertisement) => self.on_advertisement(advertisement),
            StackEvent::LinkEstablished { id } => self.on_link_established(&id),
            StackEvent::LinkFailed { id, reason } => {
                self.on_link_down(&id, ConnectionEvent::LinkFailed, reason)
            }
            StackEvent::LinkLost { id, reason } => self.on_link_down(
                &id,
                ConnectionEvent::LinkLost,
                reason.unwrap_or_else(|| "link lost".to_string()),
            ),
            StackEvent::CharacteristicsDiscovered {
                id,
                characteristics,
            } => self.on_characteristics(&id, &characteristics),
            StackEvent::CharacteristicDiscoveryFailed { id, reason } => {
                self.on_discovery_failed(&id, reason)
            }
            StackEvent::ReadCompleted { id, result } => self.on_read_completed(id, result),
            StackEvent::WriteCompleted { id, error } => self.on_write_completed(id, error),
            StackEvent::ValueNotified {
                id,
                characteristic,
                value,
            } => self.on_value_notified(id, characteristic, value),
            StackEvent::AdapterStateChanged(state) => self.on_adapter_state(state),
        }
    }

    fn on_advertisement(&mut self, advertisement: Advertisement) -> Vec<Effect> {
        let Some(session) = &self.scan else {
            debug!("Ignoring advertisement from {} outside a scan", advertisement.id);
            return Vec::new();
        };
        if session.filter.match_advertisement(&advertisement) == FilterDecision::Exclude {
            debug!("Filtered out advertisement from {}", advertisement.id);
            return Vec::new();
        }

        let interval = self.config.reconnect_interval;
        let handle = self
            .peripherals
            .entry(advertisement.id.clone())
            .or_insert_with(|| PeripheralHandle::discovered(&advertisement, interval));
        handle.update_from_advertisement(&advertisement);

        if self.discovered.insert(advertisement.id.clone()) {
            info!(
                "Discovered peripheral {} ({})",
                advertisement.id,
                handle.name.as_deref().unwrap_or("<unnamed>")
            );
            vec![Effect::Notify(ManagerEvent::PeripheralDiscovered {
                id: advertisement.id,
                name: handle.name.clone(),
                rssi: handle.rssi,
            })]
        } else {
            Vec::new()
        }
    }

    fn on_link_established(&mut self, id: &DeviceId) -> Vec<Effect> {
        let Some(handle) = self.peripherals.get_mut(id) else {
            debug!("Link established for unknown peripheral {}", id);
            return Vec::new();
        };

        let mut effects = Vec::new();
        if !apply_transition(handle, ConnectionEvent::LinkEstablished, &mut effects) {
            // No physical link may outlive a link-active state
            if !handle.state.has_link_activity() {
                warn!("Unexpected link to {} in state {}, dropping it", id, handle.state);
                effects.push(Effect::Disconnect { id: id.clone() });
            }
            return effects;
        }
        if handle.teardown_requested || handle.will_be_removed {
            debug!("Link to {} came up after teardown was requested", id);
            effects.push(Effect::Disconnect { id: id.clone() });
        } else {
            debug!("Link to {} established, discovering characteristics", id);
            effects.push(Effect::DiscoverCharacteristics { id: id.clone() });
        }
        effects
    }

    fn on_characteristics(
        &mut self,
        id: &DeviceId,
        characteristics: &[DiscoveredCharacteristic],
    ) -> Vec<Effect> {
        let Some(handle) = self.peripherals.get_mut(id) else {
            debug!("Characteristics for unknown peripheral {}", id);
            return Vec::new();
        };
        if handle.state != ConnectionState::DiscoveringServices
            || handle.teardown_requested
            || handle.will_be_removed
        {
            debug!("Ignoring characteristics for {} in state {}", id, handle.state);
            return Vec::new();
        }

        let mut effects = Vec::new();
        // Devices found during a scan keep that session's policy
        let filter = self.scan.as_ref().map_or(&self.filter, |session| &session.filter);
        let selection = filter.select_channel(characteristics);
        match selection {
            Ok(selection) => {
                if !apply_transition(handle, ConnectionEvent::ChannelSatisfied, &mut effects) {
                    return effects;
                }
                handle.apply_channel(&selection);
                let origin = handle.pending_connect.take().unwrap_or(ConnectOrigin::Caller);
                effects.push(Effect::Notify(ManagerEvent::ConnectResult {
                    id: id.clone(),
                    origin,
                    result: Ok(()),
                }));
                set_availability(handle, true, &mut effects);

                if self.config.subscribe_notifications && selection.read_notifies {
                    if let Some(characteristic) = selection.read {
                        effects.push(Effect::Subscribe {
                            id: id.clone(),
                            characteristic,
                        });
                    }
                }
                if self.paired.insert(id.clone()) {
                    info!("Paired {}", id);
                }
                info!("Peripheral {} ready", id);
            }
            Err(error) => {
                warn!("Peripheral {} rejected: {}", id, error);
                if !apply_transition(handle, ConnectionEvent::ChannelUnsatisfied, &mut effects) {
                    return effects;
                }
                handle.policy_failure = true;
                let origin = handle.pending_connect.take().unwrap_or(ConnectOrigin::Caller);
                effects.push(Effect::Notify(ManagerEvent::ConnectResult {
                    id: id.clone(),
                    origin,
                    result: Err(error),
                }));
                effects.push(Effect::Disconnect { id: id.clone() });
                self.after_disconnect(id, &mut effects);
            }
        }
        effects
    }

    fn on_discovery_failed(&mut self, id: &DeviceId, reason: String) -> Vec<Effect> {
        if self.peripherals.get(id).map(|h| h.state) != Some(ConnectionState::DiscoveringServices) {
            debug!("Ignoring discovery failure for {}", id);
            return Vec::new();
        }
        let mut effects = self.on_link_down(id, ConnectionEvent::LinkFailed, reason);
        effects.push(Effect::Disconnect { id: id.clone() });
        effects
    }

    /// Link failure or loss in any link-active state
    fn on_link_down(&mut self, id: &DeviceId, event: ConnectionEvent, reason: String) -> Vec<Effect> {
        let Some(handle) = self.peripherals.get_mut(id) else {
            debug!("{:?} for unknown peripheral {}", event, id);
            return Vec::new();
        };
        let from = handle.state;
        if !from.has_link_activity() {
            debug!("Ignoring {:?} for {} in state {}", event, id, from);
            return Vec::new();
        }

        let mut effects = Vec::new();
        if !apply_transition(handle, event, &mut effects) {
            return effects;
        }
        if let Some(origin) = handle.pending_connect.take() {
            let error = if handle.teardown_requested || handle.will_be_removed {
                BleError::Cancelled
            } else {
                BleError::connect_failed(reason.clone())
            };
            effects.push(Effect::Notify(ManagerEvent::ConnectResult {
                id: id.clone(),
                origin,
                result: Err(error),
            }));
        }
        if from == ConnectionState::Ready {
            info!("Link to {} lost: {}", id, reason);
        } else {
            warn!("Connection to {} failed: {}", id, reason);
        }

        self.after_disconnect(id, &mut effects);
        effects
    }

    /// Runs once a device has reached `Disconnected`
    fn after_disconnect(&mut self, id: &DeviceId, effects: &mut Vec<Effect>) {
        let Some(handle) = self.peripherals.get_mut(id) else {
            return;
        };
        handle.clear_channel();
        set_availability(handle, false, effects);

        let unconnected = std::mem::take(&mut handle.teardown_requested);
        if unconnected {
            info!("Unconnected {}", id);
            effects.push(Effect::Notify(ManagerEvent::UnconnectResult {
                id: id.clone(),
                result: Ok(()),
            }));
        }

        if handle.will_be_removed {
            self.finalize_removal(id, effects);
            return;
        }
        if unconnected || handle.policy_failure || !self.config.auto_reconnect {
            return;
        }

        let generation = handle.bump_reconnect_generation();
        if apply_transition(handle, ConnectionEvent::ReconnectScheduled, effects) {
            debug!("Reconnect to {} in {:?}", id, handle.reconnect_interval);
            effects.push(Effect::ScheduleReconnect {
                id: id.clone(),
                after: handle.reconnect_interval,
                generation,
            });
        }
    }

    fn on_read_completed(&mut self, id: DeviceId, result: Result<Vec<u8>, String>) -> Vec<Effect> {
        if !self.peripherals.contains_key(&id) {
            debug!("Read completion for unknown peripheral {}", id);
            return Vec::new();
        }
        let event = match result {
            Ok(data) => ManagerEvent::DataReceived { id, data },
            Err(reason) => {
                warn!("Read from {} failed: {}", id, reason);
                ManagerEvent::ReadFailed {
                    id,
                    error: BleError::transport(reason),
                }
            }
        };
        vec![Effect::Notify(event)]
    }

    fn on_write_completed(&mut self, id: DeviceId, error: Option<String>) -> Vec<Effect> {
        if !self.peripherals.contains_key(&id) {
            debug!("Write completion for unknown peripheral {}", id);
            return Vec::new();
        }
        let result = match error {
            None => Ok(()),
            Some(reason) => {
                warn!("Write to {} failed: {}", id, reason);
                Err(BleError::transport(reason))
            }
        };
        vec![Effect::Notify(ManagerEvent::WriteCompleted { id, result })]
    }

    fn on_value_notified(&mut self, id: DeviceId, characteristic: Uuid, value: Vec<u8>) -> Vec<Effect> {
        let subscribed = self
            .peripherals
            .get(&id)
            .filter(|handle| handle.state.is_ready())
            .and_then(|handle| handle.default_read)
            .map(|read| read.uuid == characteristic)
            .unwrap_or(false);
        if !subscribed {
            debug!("Dropping notification from {} on {}", id, characteristic);
            return Vec::new();
        }
        vec![Effect::Notify(ManagerEvent::DataReceived { id, data: value })]
    }

    fn on_adapter_state(&mut self, state: AdapterState) -> Vec<Effect> {
        let previous = std::mem::replace(&mut self.adapter, state);
        if previous == state {
            return Vec::new();
        }
        info!("Adapter state {:?} -> {:?}", previous, state);

        let mut effects = Vec::new();
        match state {
            AdapterState::PoweredOff => {
                effects.extend(self.end_scan(false));
                effects.push(Effect::Notify(ManagerEvent::PowerOff));
            }
            AdapterState::Unsupported => {
                effects.extend(self.end_scan(false));
                effects.push(Effect::Notify(ManagerEvent::Unsupported));
            }
            AdapterState::PoweredOn | AdapterState::Unknown => {}
        }
        effects
    }

    fn radio_error(&self) -> Option<BleError> {
        match self.adapter {
            AdapterState::Unsupported => Some(BleError::Unsupported),
            AdapterState::PoweredOff => Some(BleError::PowerOff),
            AdapterState::PoweredOn | AdapterState::Unknown => None,
        }
    }
}

// ----------------------------------------------------------------------------
// Helpers
// ----------------------------------------------------------------------------

fn radio_event(error: &BleError) -> ManagerEvent {
    match error {
        BleError::Unsupported => ManagerEvent::Unsupported,
        _ => ManagerEvent::PowerOff,
    }
}

/// Apply `event` to the handle, recording a `StateChanged` on success
fn apply_transition(
    handle: &mut PeripheralHandle,
    event: ConnectionEvent,
    effects: &mut Vec<Effect>,
) -> bool {
    let from = handle.state;
    match from.transition(event) {
        Ok(to) => {
            handle.state = to;
            debug!("{}: {} -> {}", handle.id, from, to);
            effects.push(Effect::Notify(ManagerEvent::StateChanged {
                id: handle.id.clone(),
                from,
                to,
            }));
            true
        }
        Err(e) => {
            debug!("Ignoring event for {}: {}", handle.id, e);
            false
        }
    }
}

/// Emit `AvailabilityChanged` only on an actual change
fn set_availability(handle: &mut PeripheralHandle, available: bool, effects: &mut Vec<Effect>) {
    if handle.available != available {
        handle.available = available;
        effects.push(Effect::Notify(ManagerEvent::AvailabilityChanged {
            id: handle.id.clone(),
            available,
        }));
    }
}
