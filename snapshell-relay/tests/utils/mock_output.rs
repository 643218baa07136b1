use async_trait::async_trait;
use snapshell_core::{ConnectionId, SignalMessage};
use snapshell_relay::RelayOutput;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};

/// Timeout for a single expected delivery (ms).
pub const DELIVERY_TIMEOUT_MS: u64 = 2000;

pub type Delivery = (ConnectionId, SignalMessage);

/// Mock RelayOutput that captures every delivery.
#[derive(Clone)]
pub struct MockRelayOutput {
    tx: mpsc::UnboundedSender<Delivery>,
    deliveries: Arc<Mutex<Vec<Delivery>>>,
}

impl MockRelayOutput {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Delivery>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let output = Self {
            tx,
            deliveries: Arc::new(Mutex::new(Vec::new())),
        };
        (output, rx)
    }

    /// Everything delivered to `conn`, in order.
    pub async fn delivered_to(&self, conn: ConnectionId) -> Vec<SignalMessage> {
        self.deliveries
            .lock()
            .await
            .iter()
            .filter(|(c, _)| *c == conn)
            .map(|(_, m)| m.clone())
            .collect()
    }
}

#[async_trait]
impl RelayOutput for MockRelayOutput {
    async fn deliver(&self, conn: ConnectionId, msg: SignalMessage) {
        tracing::debug!("[MockRelayOutput] {} to {:?}", msg.kind(), conn);

        self.deliveries.lock().await.push((conn, msg.clone()));
        let _ = self.tx.send((conn, msg));
    }
}

/// Next delivery addressed to `conn`, skipping deliveries to others.
pub async fn next_for(
    rx: &mut mpsc::UnboundedReceiver<Delivery>,
    conn: ConnectionId,
) -> Option<SignalMessage> {
    let wait = async {
        while let Some((to, msg)) = rx.recv().await {
            if to == conn {
                return Some(msg);
            }
        }
        None
    };

    tokio::time::timeout(Duration::from_millis(DELIVERY_TIMEOUT_MS), wait)
        .await
        .ok()
        .flatten()
}

/// Asserts nothing arrives for `conn` within `ms`.
pub async fn assert_silent(rx: &mut mpsc::UnboundedReceiver<Delivery>, conn: ConnectionId, ms: u64) {
    let wait = async {
        while let Some((to, msg)) = rx.recv().await {
            if to == conn {
                return Some(msg);
            }
        }
        None
    };

    if let Ok(Some(msg)) = tokio::time::timeout(Duration::from_millis(ms), wait).await {
        panic!("unexpected delivery to {:?}: {:?}", conn, msg);
    }
}
