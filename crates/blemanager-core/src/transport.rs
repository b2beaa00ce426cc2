//! Transport stack abstraction
//!
//! A [`BleTransport`] issues radio operations and reports their outcome as
//! [`StackEvent`]s on the sender handed to [`BleTransport::attach`]. Methods
//! return once the request is issued; an `Err` means the request could not
//! be issued at all.

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::errors::Result;
use crate::messages::StackEvent;
use crate::types::{AdapterState, CharacteristicRef, DeviceId};

/// Sender the transport uses to deliver stack events
pub type StackEventSender = mpsc::UnboundedSender<StackEvent>;
pub type StackEventReceiver = mpsc::UnboundedReceiver<StackEvent>;

pub fn create_stack_event_channel() -> (StackEventSender, StackEventReceiver) {
    mpsc::unbounded_channel()
}

#[async_trait]
pub trait BleTransport: Send + Sync + 'static {
    /// Identifier of the radio adapter this transport drives
    fn adapter_id(&self) -> String;

    /// Start delivering stack events
    async fn attach(&self, events: StackEventSender) -> Result<()>;

    async fn adapter_state(&self) -> AdapterState;

    async fn start_scan(&self, services: &[Uuid]) -> Result<()>;

    async fn stop_scan(&self) -> Result<()>;

    /// Completion: `LinkEstablished` or `LinkFailed`
    async fn connect(&self, id: &DeviceId) -> Result<()>;

    /// Completion: `LinkLost` (or `LinkFailed` for a pending attempt)
    async fn disconnect(&self, id: &DeviceId) -> Result<()>;

    /// Completion: `CharacteristicsDiscovered` or `CharacteristicDiscoveryFailed`
    async fn discover_characteristics(&self, id: &DeviceId) -> Result<()>;

    /// Completion: `ReadCompleted`
    async fn read_characteristic(&self, id: &DeviceId, characteristic: &CharacteristicRef) -> Result<()>;

    /// Completion: `WriteCompleted` when `with_response` is set
    async fn write_characteristic(
        &self,
        id: &DeviceId,
        characteristic: &CharacteristicRef,
        data: &[u8],
        with_response: bool,
    ) -> Result<()>;

    /// Values arrive as `ValueNotified`
    async fn subscribe(&self, id: &DeviceId, characteristic: &CharacteristicRef) -> Result<()>;
}
