//! Link-down bookkeeping for the adapter event pump
//!
//! btleplug reports a host-initiated disconnect twice: once when
//! `Peripheral::disconnect` returns and once as `CentralEvent::DeviceDisconnected`.
//! A connect attempt that fails is also reported by its own task. The
//! tracker decides which adapter reports still carry news for the manager.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use blemanager_core::DeviceId;

/// How long an adapter disconnect is attributed to an earlier host disconnect
pub const HOST_DISCONNECT_ECHO_WINDOW: Duration = Duration::from_secs(5);

#[derive(Debug, Default)]
pub struct DisconnectTracker {
    /// Host disconnects already reported, awaiting the adapter's echo
    host_initiated: HashMap<DeviceId, Instant>,
    /// Devices with a connect attempt in flight
    connecting: HashSet<DeviceId>,
}

impl DisconnectTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect_started(&mut self, id: &DeviceId) {
        self.connecting.insert(id.clone());
    }

    pub fn connect_finished(&mut self, id: &DeviceId) {
        self.connecting.remove(id);
    }

    /// The host is dropping an established link and reports it itself
    pub fn host_disconnected(&mut self, id: &DeviceId, now: Instant) {
        self.host_initiated.insert(id.clone(), now);
    }

    /// The stack refused the disconnect; the link may still drop on its own
    pub fn host_disconnect_failed(&mut self, id: &DeviceId) {
        self.host_initiated.remove(id);
    }

    /// Whether an adapter `DeviceDisconnected` should reach the manager
    pub fn forward_adapter_disconnect(&mut self, id: &DeviceId, now: Instant) -> bool {
        let echo = self
            .host_initiated
            .remove(id)
            .is_some_and(|issued| now.saturating_duration_since(issued) <= HOST_DISCONNECT_ECHO_WINDOW);
        // The connect task reports the attempt's outcome itself
        !echo && !self.connecting.contains(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spontaneous_disconnect_is_forwarded() {
        let mut tracker = DisconnectTracker::new();
        let id = DeviceId::from("AA:BB");
        assert!(tracker.forward_adapter_disconnect(&id, Instant::now()));
    }

    #[test]
    fn test_echo_of_host_disconnect_is_swallowed_once() {
        let mut tracker = DisconnectTracker::new();
        let id = DeviceId::from("AA:BB");
        let now = Instant::now();

        tracker.host_disconnected(&id, now);
        assert!(!tracker.forward_adapter_disconnect(&id, now + Duration::from_millis(200)));
        assert!(tracker.forward_adapter_disconnect(&id, now + Duration::from_millis(400)));
    }

    #[test]
    fn test_late_echo_during_new_connect_is_swallowed() {
        let mut tracker = DisconnectTracker::new();
        let id = DeviceId::from("AA:BB");
        let now = Instant::now();

        // unconnect, then a fresh connect before the adapter's report lands
        tracker.host_disconnected(&id, now);
        tracker.connect_started(&id);
        assert!(!tracker.forward_adapter_disconnect(&id, now + Duration::from_millis(50)));

        tracker.connect_finished(&id);
        assert!(tracker.forward_adapter_disconnect(&id, now + Duration::from_secs(1)));
    }

    #[test]
    fn test_failed_host_disconnect_keeps_adapter_reports() {
        let mut tracker = DisconnectTracker::new();
        let id = DeviceId::from("AA:BB");
        let now = Instant::now();

        tracker.host_disconnected(&id, now);
        tracker.host_disconnect_failed(&id);
        assert!(tracker.forward_adapter_disconnect(&id, now + Duration::from_millis(100)));
    }

    #[test]
    fn test_stale_host_disconnect_does_not_hide_real_loss() {
        let mut tracker = DisconnectTracker::new();
        let id = DeviceId::from("AA:BB");
        let now = Instant::now();

        tracker.host_disconnected(&id, now);
        let later = now + HOST_DISCONNECT_ECHO_WINDOW + Duration::from_secs(1);
        assert!(tracker.forward_adapter_disconnect(&id, later));
    }

    #[test]
    fn test_other_devices_are_unaffected() {
        let mut tracker = DisconnectTracker::new();
        let now = Instant::now();
        tracker.host_disconnected(&DeviceId::from("AA:BB"), now);
        tracker.connect_started(&DeviceId::from("AA:BB"));
        assert!(tracker.forward_adapter_disconnect(&DeviceId::from("CC:DD"), now));
    }
}
