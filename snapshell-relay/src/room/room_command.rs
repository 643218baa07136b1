use snapshell_core::{ClientId, ConnectionId, Role, SignalMessage};
use tokio::sync::oneshot;

/// Commands delivered to a room actor by the WebSocket layer.
#[derive(Debug)]
pub enum RoomCommand {
    /// A connection asks for a role slot. `accepted` learns whether it got it.
    Join {
        conn: ConnectionId,
        role: Role,
        client_id: ClientId,
        accepted: oneshot::Sender<bool>,
    },

    /// Offer, answer or candidate to forward to the other slot.
    Relay {
        conn: ConnectionId,
        message: SignalMessage,
    },

    /// The participant announced its departure.
    Leave { conn: ConnectionId },

    /// The socket went away without an announcement.
    Disconnect { conn: ConnectionId },
}
