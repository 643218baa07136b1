use crate::error::SignalingError;
use crate::signaling::RetryPolicy;
use futures::{SinkExt, StreamExt};
use snapshell_core::{ClientId, IceServerConfig, Role, RoomId, SignalMessage};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Messages from the relay. A fatal error is the final item.
pub type SignalStream = mpsc::Receiver<Result<SignalMessage, SignalingError>>;

const OUTBOUND_QUEUE: usize = 64;
const INBOUND_QUEUE: usize = 64;
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalingConfig {
    /// WebSocket endpoint of the relay, e.g. `ws://localhost:8080/ws`.
    pub server_url: String,
    pub retry: RetryPolicy,
    /// Bound on connecting plus waiting for the join reply.
    pub handshake_timeout: Duration,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://localhost:8080/ws".to_string(),
            retry: RetryPolicy::default(),
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

/// Result of a successful join.
pub struct Joined {
    pub client: SignalingClient,
    pub inbound: SignalStream,
    /// ICE servers announced by the relay.
    pub ice_servers: Vec<IceServerConfig>,
}

pub(crate) enum Outbound {
    Signal(SignalMessage),
    Close(oneshot::Sender<()>),
}

/// Sending half of a joined signaling session. The socket is owned by a
/// background task which reconnects and rejoins on transient failures.
#[derive(Clone)]
pub struct SignalingClient {
    room: RoomId,
    role: Role,
    outbound: mpsc::Sender<Outbound>,
}

impl SignalingClient {
    /// Connects to the relay and takes the `role` slot of `room`.
    pub async fn join(
        config: &SignalingConfig,
        room: RoomId,
        role: Role,
    ) -> Result<Joined, SignalingError> {
        let link = Link {
            config: config.clone(),
            room: room.clone(),
            role,
            client_id: ClientId::new(),
        };

        let (ws, ice_servers) = link.connect_with_retry().await?;
        info!("Joined room '{}' as {}", room, role);

        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE);
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE);
        tokio::spawn(link.run(ws, outbound_rx, inbound_tx));

        Ok(Joined {
            client: SignalingClient {
                room,
                role,
                outbound: outbound_tx,
            },
            inbound: inbound_rx,
            ice_servers,
        })
    }

    pub fn room(&self) -> &RoomId {
        &self.room
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Queues a message for the relay. Messages sent while the link is
    /// reconnecting are delivered after the rejoin.
    pub async fn send(&self, msg: SignalMessage) -> Result<(), SignalingError> {
        self.outbound
            .send(Outbound::Signal(msg))
            .await
            .map_err(|_| SignalingError::Closed)
    }

    /// Announces departure to the relay and closes the socket.
    pub async fn close(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.outbound.send(Outbound::Close(done_tx)).await.is_ok() {
            let _ = timeout(CLOSE_TIMEOUT, done_rx).await;
        }
    }
}

#[cfg(test)]
impl SignalingClient {
    /// A client backed by a bare queue instead of a relay link.
    pub(crate) fn detached(room: RoomId, role: Role) -> (Self, mpsc::Receiver<Outbound>) {
        let (outbound, rx) = mpsc::channel(OUTBOUND_QUEUE);
        (
            SignalingClient {
                room,
                role,
                outbound,
            },
            rx,
        )
    }

    /// Messages queued and not yet picked up by the link.
    pub(crate) fn queued(&self) -> usize {
        self.outbound.max_capacity() - self.outbound.capacity()
    }
}

enum LinkEnd {
    /// Closed on purpose; no reconnect.
    Closed,
    /// Socket failed; `unsent` did not make it out.
    Dropped {
        reason: String,
        unsent: Option<SignalMessage>,
    },
}

struct Link {
    config: SignalingConfig,
    room: RoomId,
    role: Role,
    client_id: ClientId,
}

impl Link {
    async fn run(
        self,
        mut ws: WsStream,
        mut outbound: mpsc::Receiver<Outbound>,
        inbound: mpsc::Sender<Result<SignalMessage, SignalingError>>,
    ) {
        let mut carry: Option<SignalMessage> = None;

        loop {
            match self.pump(&mut ws, &mut outbound, &inbound, carry.take()).await {
                LinkEnd::Closed => break,
                LinkEnd::Dropped { reason, unsent } => {
                    warn!("Signaling connection lost: {}", reason);
                    carry = unsent;

                    match self.connect_with_retry().await {
                        Ok((fresh, _)) => {
                            info!("Rejoined room '{}' as {}", self.room, self.role);
                            ws = fresh;
                        }
                        Err(e) => {
                            warn!("Giving up on signaling: {}", e);
                            let _ = inbound.send(Err(e)).await;
                            break;
                        }
                    }
                }
            }
        }

        debug!("Signaling link for '{}' finished", self.room);
    }

    async fn pump(
        &self,
        ws: &mut WsStream,
        outbound: &mut mpsc::Receiver<Outbound>,
        inbound: &mpsc::Sender<Result<SignalMessage, SignalingError>>,
        carry: Option<SignalMessage>,
    ) -> LinkEnd {
        if let Some(msg) = carry {
            if let Err(e) = send_message(ws, &msg).await {
                return LinkEnd::Dropped {
                    reason: e.to_string(),
                    unsent: Some(msg),
                };
            }
        }

        loop {
            tokio::select! {
                out = outbound.recv() => match out {
                    Some(Outbound::Signal(msg)) => {
                        debug!("-> relay: {}", msg.kind());
                        if let Err(e) = send_message(ws, &msg).await {
                            return LinkEnd::Dropped { reason: e.to_string(), unsent: Some(msg) };
                        }
                    }
                    Some(Outbound::Close(done)) => {
                        let leave = SignalMessage::PeerLeft { room: self.room.clone(), role: self.role };
                        let _ = send_message(ws, &leave).await;
                        let _ = ws.close(None).await;
                        outbound.close();
                        let _ = done.send(());
                        return LinkEnd::Closed;
                    }
                    None => {
                        let _ = ws.close(None).await;
                        return LinkEnd::Closed;
                    }
                },

                incoming = ws.next() => match incoming {
                    Some(Ok(Message::Text(text))) => match serde_json::from_str::<SignalMessage>(&text) {
                        Ok(msg) => {
                            debug!("<- relay: {}", msg.kind());
                            if inbound.send(Ok(msg)).await.is_err() {
                                let _ = ws.close(None).await;
                                return LinkEnd::Closed;
                            }
                        }
                        Err(e) => warn!("Ignoring malformed relay message: {}", e),
                    },
                    Some(Ok(Message::Close(_))) | None => {
                        return LinkEnd::Dropped { reason: "closed by relay".to_string(), unsent: None };
                    }
                    Some(Err(e)) => {
                        return LinkEnd::Dropped { reason: e.to_string(), unsent: None };
                    }
                    Some(Ok(_)) => {}
                },
            }
        }
    }

    async fn connect_with_retry(&self) -> Result<(WsStream, Vec<IceServerConfig>), SignalingError> {
        let policy = &self.config.retry;
        let mut attempt = 0;

        loop {
            match self.connect_once().await {
                Ok(joined) => return Ok(joined),
                Err(e) if e.is_transient() && attempt < policy.max_retries => {
                    let delay = policy.delay(attempt);
                    warn!(
                        "Signaling attempt {} failed: {}; retrying in {:?}",
                        attempt + 1,
                        e,
                        delay
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) if e.is_transient() => {
                    return Err(SignalingError::SignalingUnavailable {
                        attempts: attempt + 1,
                        last_error: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// One connect plus join handshake.
    async fn connect_once(&self) -> Result<(WsStream, Vec<IceServerConfig>), SignalingError> {
        let limit = self.config.handshake_timeout;
        debug!("Connecting to signaling relay {}", self.config.server_url);

        let (mut ws, _response) = timeout(limit, connect_async(self.config.server_url.as_str()))
            .await
            .map_err(|_| SignalingError::Timeout)?
            .map_err(|e| SignalingError::Transport(e.to_string()))?;

        let join = SignalMessage::Join {
            room: self.room.clone(),
            role: self.role,
            client_id: self.client_id,
        };
        send_message(&mut ws, &join).await?;

        loop {
            let next = timeout(limit, ws.next())
                .await
                .map_err(|_| SignalingError::Timeout)?;

            match next {
                Some(Ok(Message::Text(text))) => {
                    let msg: SignalMessage = serde_json::from_str(&text)
                        .map_err(|e| SignalingError::Transport(e.to_string()))?;
                    match msg {
                        SignalMessage::JoinAck { ice_servers, .. } => return Ok((ws, ice_servers)),
                        SignalMessage::RoleOccupied { room, role } => {
                            return Err(SignalingError::RoleOccupied { room, role });
                        }
                        SignalMessage::Error { code, message } => {
                            return Err(SignalingError::Rejected { code, message });
                        }
                        other => debug!("Ignoring {} before join reply", other.kind()),
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    return Err(SignalingError::Transport(
                        "relay closed the connection during join".to_string(),
                    ));
                }
                Some(Err(e)) => return Err(SignalingError::Transport(e.to_string())),
                Some(Ok(_)) => {}
            }
        }
    }
}

async fn send_message(ws: &mut WsStream, msg: &SignalMessage) -> Result<(), SignalingError> {
    let json = serde_json::to_string(msg).map_err(|e| SignalingError::Transport(e.to_string()))?;
    ws.send(Message::Text(json))
        .await
        .map_err(|e| SignalingError::Transport(e.to_string()))
}
