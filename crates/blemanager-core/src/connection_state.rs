//! Per-device connection lifecycle
//!
//! The state machine is pure: [`ConnectionState::transition`] consumes the
//! current state and an event and either yields the next state or rejects
//! the event. Side effects (stack calls, timers, observer events) are
//! decided by the engine in [`crate::central`].

use std::fmt;

use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Connection State Types
// ----------------------------------------------------------------------------

/// Lifecycle state of a peripheral
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Seen during a scan, never connected in this session
    Discovered,
    /// Link establishment requested from the stack
    Connecting,
    /// Link is up, waiting for characteristic discovery
    DiscoveringServices,
    /// Default characteristics located; data transfer allowed
    Ready,
    /// No link
    Disconnected,
    /// No link, automatic reconnect pending
    ReconnectWaiting,
    /// Purged from every collection; terminal
    Removed,
}

/// Events that drive [`ConnectionState`] transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionEvent {
    /// Caller asked to connect
    ConnectRequested,
    /// Reconnect timer elapsed
    ReconnectTimerFired,
    /// Stack reported the link is up
    LinkEstablished,
    /// Stack reported the connect attempt failed
    LinkFailed,
    /// Stack reported loss of an established link
    LinkLost,
    /// Discovered characteristics satisfy the channel policy
    ChannelSatisfied,
    /// Discovered characteristics do not satisfy the channel policy
    ChannelUnsatisfied,
    /// Automatic reconnect armed
    ReconnectScheduled,
    /// Pending reconnect cancelled by unconnect or removal
    ReconnectCancelled,
    /// Device purged
    Remove,
}

// ----------------------------------------------------------------------------
// State Machine Implementation
// ----------------------------------------------------------------------------

impl ConnectionState {
    /// Get current state name for logging
    pub fn state_name(&self) -> &'static str {
        match self {
            ConnectionState::Discovered => "Discovered",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::DiscoveringServices => "DiscoveringServices",
            ConnectionState::Ready => "Ready",
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::ReconnectWaiting => "ReconnectWaiting",
            ConnectionState::Removed => "Removed",
        }
    }

    /// Process an event and transition to the next state (consumes self)
    pub fn transition(self, event: ConnectionEvent) -> Result<ConnectionState, StateTransitionError> {
        use ConnectionEvent as E;
        use ConnectionState as S;

        let next = match (self, event) {
            (S::Removed, _) => return Err(StateTransitionError::Terminal { event }),

            (S::Discovered | S::Disconnected | S::ReconnectWaiting, E::ConnectRequested) => {
                S::Connecting
            }
            (S::ReconnectWaiting, E::ReconnectTimerFired) => S::Connecting,

            (S::Connecting, E::LinkEstablished) => S::DiscoveringServices,
            (S::Connecting, E::LinkFailed | E::LinkLost) => S::Disconnected,

            (S::DiscoveringServices, E::ChannelSatisfied) => S::Ready,
            (
                S::DiscoveringServices,
                E::ChannelUnsatisfied | E::LinkLost | E::LinkFailed,
            ) => S::Disconnected,

            (S::Ready, E::LinkLost) => S::Disconnected,

            (S::Disconnected, E::ReconnectScheduled) => S::ReconnectWaiting,
            (S::ReconnectWaiting, E::ReconnectCancelled) => S::Disconnected,

            (S::Discovered | S::Disconnected | S::ReconnectWaiting, E::Remove) => S::Removed,

            (from, event) => return Err(StateTransitionError::InvalidTransition { from, event }),
        };

        Ok(next)
    }

    /// Whether a caller-initiated connect is accepted from this state
    pub fn accepts_connect(&self) -> bool {
        matches!(
            self,
            ConnectionState::Discovered
                | ConnectionState::Disconnected
                | ConnectionState::ReconnectWaiting
        )
    }

    /// Whether the stack may hold a link (or a pending link) for the device
    pub fn has_link_activity(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::DiscoveringServices | ConnectionState::Ready
        )
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, ConnectionState::Ready)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.state_name())
    }
}

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Errors that can occur during state transitions
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateTransitionError {
    #[error("Invalid transition from {from} on event {event:?}")]
    InvalidTransition {
        from: ConnectionState,
        event: ConnectionEvent,
    },
    #[error("Device already removed; ignoring {event:?}")]
    Terminal { event: ConnectionEvent },
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
