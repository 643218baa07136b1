use crate::signaling::RelayOutput;
use async_trait::async_trait;
use axum::extract::ws::Message;
use dashmap::DashMap;
use snapshell_core::{ConnectionId, SignalMessage};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, warn};

/// Registry of live WebSocket connections.
#[derive(Clone, Default)]
pub struct SignalingService {
    connections: Arc<DashMap<ConnectionId, mpsc::UnboundedSender<Message>>>,
}

impl SignalingService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_connection(&self, conn: ConnectionId, tx: mpsc::UnboundedSender<Message>) {
        self.connections.insert(conn, tx);
    }

    pub fn remove_connection(&self, conn: &ConnectionId) {
        self.connections.remove(conn);
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn send_signal(&self, conn: ConnectionId, msg: SignalMessage) {
        if let Some(peer) = self.connections.get(&conn) {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if let Err(e) = peer.send(Message::Text(json.into())) {
                        error!("Failed to send WS message to {:?}: {:?}", conn, e);
                    }
                }
                Err(e) => error!("Failed to serialize signal message: {}", e),
            }
        } else {
            warn!(
                "Attempted to send {} to disconnected connection {:?}",
                msg.kind(),
                conn
            );
        }
    }
}

#[async_trait]
impl RelayOutput for SignalingService {
    async fn deliver(&self, conn: ConnectionId, msg: SignalMessage) {
        self.send_signal(conn, msg);
    }
}
