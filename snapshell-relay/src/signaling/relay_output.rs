use async_trait::async_trait;
use snapshell_core::{ConnectionId, SignalMessage};

/// Outbound side of the relay as seen by a room: whatever owns the sockets
/// implements this so rooms can reach their participants.
#[async_trait]
pub trait RelayOutput: Send + Sync {
    /// Deliver a message to one connection. Unknown connections are ignored.
    async fn deliver(&self, conn: ConnectionId, msg: SignalMessage);
}
