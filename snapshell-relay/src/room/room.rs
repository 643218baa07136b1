use crate::room::room_command::RoomCommand;
use crate::signaling::RelayOutput;
use snapshell_core::{ClientId, ConnectionId, ErrorCode, IceServerConfig, Role, RoomId, SignalMessage};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

/// Timing knobs of a room.
#[derive(Debug, Clone)]
pub struct RoomSettings {
    pub ice_servers: Vec<IceServerConfig>,
    /// How long a silently dropped participant keeps its slot.
    pub rejoin_grace: Duration,
    /// How long an empty room lingers before its task exits.
    pub idle_ttl: Duration,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            ice_servers: Vec::new(),
            rejoin_grace: Duration::from_secs(5),
            idle_ttl: Duration::from_secs(60),
        }
    }
}

#[derive(Debug)]
struct Participant {
    conn: ConnectionId,
    client_id: ClientId,
    detached_at: Option<Instant>,
}

impl Participant {
    fn is_attached(&self) -> bool {
        self.detached_at.is_none()
    }
}

/// Two-slot rendezvous. Each room runs as its own task and owns all of its state.
pub struct Room {
    id: RoomId,
    slots: HashMap<Role, Participant>,
    /// Messages waiting for the keyed role to (re)join.
    backlog: HashMap<Role, Vec<SignalMessage>>,
    empty_since: Option<Instant>,
    command_rx: mpsc::Receiver<RoomCommand>,
    output: Arc<dyn RelayOutput>,
    settings: RoomSettings,
}

impl Room {
    pub fn new(
        id: RoomId,
        command_rx: mpsc::Receiver<RoomCommand>,
        output: Arc<dyn RelayOutput>,
        settings: RoomSettings,
    ) -> Self {
        Self {
            id,
            slots: HashMap::new(),
            backlog: HashMap::new(),
            empty_since: Some(Instant::now()),
            command_rx,
            output,
            settings,
        }
    }

    pub async fn run(mut self) {
        info!("Room '{}' event loop started", self.id);

        loop {
            let deadline = self.next_deadline();
            let timer = sleep_until(deadline.unwrap_or_else(far_future));

            tokio::select! {
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(c) => self.handle_command(c).await,
                        None => {
                            info!("Command channel closed. Shutting down room '{}'.", self.id);
                            break;
                        }
                    }
                }

                _ = timer, if deadline.is_some() => {
                    self.expire_detached().await;

                    if self.idle_expired() {
                        info!("Room '{}' idle, shutting down", self.id);
                        break;
                    }
                }
            }
        }

        info!("Room '{}' event loop finished", self.id);
    }

    async fn handle_command(&mut self, cmd: RoomCommand) {
        match cmd {
            RoomCommand::Join {
                conn,
                role,
                client_id,
                accepted,
            } => {
                let granted = self.handle_join(conn, role, client_id).await;
                let _ = accepted.send(granted);
            }

            RoomCommand::Relay { conn, message } => self.handle_relay(conn, message).await,

            RoomCommand::Leave { conn } => {
                let Some(role) = self.role_of(conn) else {
                    debug!("Leave from unknown connection {} in '{}'", conn, self.id);
                    return;
                };
                info!("{} left room '{}'", role, self.id);
                self.remove_participant(role).await;
            }

            RoomCommand::Disconnect { conn } => {
                let Some(role) = self.role_of(conn) else {
                    return;
                };
                info!(
                    "{} dropped from room '{}', holding slot for {:?}",
                    role, self.id, self.settings.rejoin_grace
                );
                if let Some(participant) = self.slots.get_mut(&role) {
                    participant.detached_at = Some(Instant::now());
                }
            }
        }
    }

    /// Returns whether the slot was granted.
    async fn handle_join(&mut self, conn: ConnectionId, role: Role, client_id: ClientId) -> bool {
        match self.slots.get_mut(&role) {
            Some(existing) if existing.client_id != client_id => {
                warn!("Rejecting join for occupied {} slot in '{}'", role, self.id);
                let msg = SignalMessage::RoleOccupied {
                    room: self.id.clone(),
                    role,
                };
                self.output.deliver(conn, msg).await;
                return false;
            }
            Some(existing) => {
                info!("{} rejoined room '{}'", role, self.id);
                existing.conn = conn;
                existing.detached_at = None;
            }
            None => {
                info!("{} joined room '{}'", role, self.id);
                self.slots.insert(
                    role,
                    Participant {
                        conn,
                        client_id,
                        detached_at: None,
                    },
                );
                self.empty_since = None;
            }
        }

        let ack = SignalMessage::JoinAck {
            room: self.id.clone(),
            role,
            ice_servers: self.settings.ice_servers.clone(),
        };
        self.output.deliver(conn, ack).await;

        let pending = self.backlog.remove(&role).unwrap_or_default();
        if !pending.is_empty() {
            debug!("Flushing {} queued messages to {}", pending.len(), role);
        }
        for msg in pending {
            self.output.deliver(conn, msg).await;
        }
        true
    }

    async fn handle_relay(&mut self, conn: ConnectionId, message: SignalMessage) {
        let Some(role) = self.role_of(conn) else {
            self.reject(conn, ErrorCode::NotJoined, "join the room first").await;
            return;
        };

        if message.role() != Some(role) {
            self.reject(conn, ErrorCode::WrongRole, "message role does not match your slot")
                .await;
            return;
        }

        let restarts_negotiation = match &message {
            SignalMessage::Offer { .. } if role == Role::Offerer => true,
            SignalMessage::Answer { .. } if role == Role::Answerer => true,
            SignalMessage::Candidate { .. } => false,
            SignalMessage::Offer { .. } | SignalMessage::Answer { .. } => {
                warn!("{} tried to send {} in '{}'", role, message.kind(), self.id);
                self.reject(conn, ErrorCode::WrongRole, "only the offerer offers, only the answerer answers")
                    .await;
                return;
            }
            _ => {
                self.reject(conn, ErrorCode::Malformed, "not a relayable message")
                    .await;
                return;
            }
        };

        let target = role.opposite();
        if restarts_negotiation {
            // A fresh description supersedes anything still queued from the same sender.
            if let Some(queued) = self.backlog.get_mut(&target) {
                queued.clear();
            }
        }

        self.forward(target, message).await;
    }

    /// Delivers to `target` if it is attached, queues otherwise.
    async fn forward(&mut self, target: Role, message: SignalMessage) {
        match self.slots.get(&target) {
            Some(p) if p.is_attached() => {
                debug!("Relaying {} to {} in '{}'", message.kind(), target, self.id);
                self.output.deliver(p.conn, message).await;
            }
            _ => {
                debug!("Queueing {} for absent {} in '{}'", message.kind(), target, self.id);
                self.backlog.entry(target).or_default().push(message);
            }
        }
    }

    async fn remove_participant(&mut self, role: Role) {
        self.slots.remove(&role);
        self.backlog.remove(&role);
        self.backlog.remove(&role.opposite());

        if self.slots.contains_key(&role.opposite()) {
            let msg = SignalMessage::PeerLeft {
                room: self.id.clone(),
                role,
            };
            self.forward(role.opposite(), msg).await;
        }

        if self.slots.is_empty() {
            self.empty_since = Some(Instant::now());
        }
    }

    async fn expire_detached(&mut self) {
        let now = Instant::now();
        let grace = self.settings.rejoin_grace;
        let expired: Vec<Role> = self
            .slots
            .iter()
            .filter_map(|(role, p)| match p.detached_at {
                Some(at) if at + grace <= now => Some(*role),
                _ => None,
            })
            .collect();

        for role in expired {
            info!("{} did not rejoin room '{}' in time", role, self.id);
            self.remove_participant(role).await;
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        let grace = self.settings.rejoin_grace;
        let detached = self
            .slots
            .values()
            .filter_map(|p| p.detached_at.map(|at| at + grace));
        let idle = self.empty_since.map(|at| at + self.settings.idle_ttl);

        detached.chain(idle).min()
    }

    fn idle_expired(&self) -> bool {
        match self.empty_since {
            Some(at) => self.slots.is_empty() && at + self.settings.idle_ttl <= Instant::now(),
            None => false,
        }
    }

    fn role_of(&self, conn: ConnectionId) -> Option<Role> {
        self.slots
            .iter()
            .find(|(_, p)| p.conn == conn)
            .map(|(role, _)| *role)
    }

    async fn reject(&self, conn: ConnectionId, code: ErrorCode, message: &str) {
        let msg = SignalMessage::Error {
            code,
            message: message.to_string(),
        };
        self.output.deliver(conn, msg).await;
    }
}

fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(86_400)
}
