use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of one peer session, written only by the connection manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Idle,
    Signaling,
    Negotiating,
    Connecting,
    Connected,
    Degraded,
    Closed,
}

impl ConnectionState {
    /// Whether `self -> next` is an edge of the session state machine.
    /// Every state may move to `Closed`; `Closed` is terminal.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;

        match (self, next) {
            (Closed, _) => false,
            (_, Closed) => true,
            (Idle, Signaling)
            | (Signaling, Negotiating)
            | (Negotiating, Connecting)
            | (Connecting, Connected)
            | (Connected, Degraded)
            | (Degraded, Connected) => true,
            _ => false,
        }
    }

    pub fn is_closed(self) -> bool {
        self == ConnectionState::Closed
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Signaling => "signaling",
            ConnectionState::Negotiating => "negotiating",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Degraded => "degraded",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}
