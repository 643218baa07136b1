use crate::error::{ConnectError, SignalingError};
use crate::peer::candidates::CandidateQueue;
use crate::peer::transport::{PeerTransport, Transport};
use crate::peer::transport_event::TransportEvent;
use crate::signaling::{SignalStream, SignalingClient, SignalingConfig};
use bytes::Bytes;
use snapshell_core::{ConnectionState, IceCandidate, IceServerConfig, Role, RoomId, SignalMessage};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};
use webrtc::data_channel::RTCDataChannel;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;

const TRANSPORT_EVENT_QUEUE: usize = 64;

#[derive(Debug, Clone)]
pub struct PeerConfig {
    /// Bound on waiting for the remote description.
    pub negotiation_timeout: Duration,
    /// Bound on `Connecting`.
    pub ice_timeout: Duration,
    /// Bound on a `Degraded` episode.
    pub restart_timeout: Duration,
    /// Inbound messages buffered ahead of the pipeline.
    pub inbound_capacity: usize,
    /// Extra ICE servers, used alongside the ones the relay announces.
    pub ice_servers: Vec<IceServerConfig>,
    /// Gather loopback host candidates too.
    pub include_loopback: bool,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            negotiation_timeout: Duration::from_secs(60),
            ice_timeout: Duration::from_secs(20),
            restart_timeout: Duration::from_secs(10),
            inbound_capacity: 16,
            ice_servers: Vec::new(),
            include_loopback: false,
        }
    }
}

/// How an established connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    LocalClose,
    PeerLeft,
}

/// ICE candidates exchanged over signaling so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CandidateCounts {
    pub sent: usize,
    pub received: usize,
}

/// The open frame channel plus the messages arriving on it.
pub struct DataChannel {
    pub channel: Arc<RTCDataChannel>,
    pub inbound: mpsc::Receiver<Bytes>,
}

type StateCallback = Box<dyn Fn(ConnectionState) + Send + Sync>;
type Outcome = Result<CloseReason, ConnectError>;

struct Shared {
    state: watch::Sender<ConnectionState>,
    observers: Mutex<Vec<StateCallback>>,
    outcome: Mutex<Option<Outcome>>,
    candidates_sent: AtomicUsize,
    candidates_received: AtomicUsize,
}

impl Shared {
    fn current(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn transition(&self, next: ConnectionState) -> bool {
        let current = self.current();
        if current == next {
            return false;
        }
        if !current.can_transition_to(next) {
            warn!("Ignoring invalid transition {} -> {}", current, next);
            return false;
        }

        info!("Connection state {} -> {}", current, next);
        self.state.send_replace(next);
        if let Ok(observers) = self.observers.lock() {
            for callback in observers.iter() {
                callback(next);
            }
        }
        true
    }

    /// Records the terminal outcome, then enters `Closed`.
    fn finish(&self, outcome: Outcome) {
        if let Ok(mut slot) = self.outcome.lock() {
            slot.get_or_insert(outcome);
        }
        self.transition(ConnectionState::Closed);
    }

    fn take_outcome(&self) -> Option<Outcome> {
        self.outcome.lock().ok().and_then(|mut slot| slot.take())
    }
}

enum Command {
    Close,
}

/// Drives the offer/answer/ICE handshake for one session and owns the
/// resulting data channel. The negotiation itself runs as an actor task;
/// this handle only sends commands and observes state.
pub struct PeerConnectionManager {
    config: PeerConfig,
    shared: Arc<Shared>,
    commands: Mutex<Option<mpsc::Sender<Command>>>,
}

impl PeerConnectionManager {
    pub fn new(config: PeerConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        Self {
            config,
            shared: Arc::new(Shared {
                state,
                observers: Mutex::new(Vec::new()),
                outcome: Mutex::new(None),
                candidates_sent: AtomicUsize::new(0),
                candidates_received: AtomicUsize::new(0),
            }),
            commands: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.current()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    pub fn candidate_counts(&self) -> CandidateCounts {
        CandidateCounts {
            sent: self.shared.candidates_sent.load(Ordering::Relaxed),
            received: self.shared.candidates_received.load(Ordering::Relaxed),
        }
    }

    /// Registers a callback invoked synchronously on every transition.
    pub fn on_state_change<F>(&self, callback: F)
    where
        F: Fn(ConnectionState) + Send + Sync + 'static,
    {
        if let Ok(mut observers) = self.shared.observers.lock() {
            observers.push(Box::new(callback));
        }
    }

    /// Joins `room` as `role` and negotiates until the data channel is open.
    pub async fn connect(
        &self,
        room: RoomId,
        role: Role,
        signaling: &SignalingConfig,
    ) -> Result<DataChannel, ConnectError> {
        if self.state() != ConnectionState::Idle {
            return Err(ConnectError::Closed);
        }

        let joined = match SignalingClient::join(signaling, room.clone(), role).await {
            Ok(joined) => joined,
            Err(e) => {
                self.shared.finish(Err(ConnectError::Closed));
                return Err(e.into());
            }
        };

        if self.state().is_closed() {
            joined.client.close().await;
            return Err(ConnectError::Closed);
        }

        let mut ice_servers = joined.ice_servers;
        ice_servers.extend(self.config.ice_servers.iter().cloned());

        let (event_tx, event_rx) = mpsc::channel(TRANSPORT_EVENT_QUEUE);
        let transport =
            match PeerTransport::new(&ice_servers, self.config.include_loopback, event_tx).await {
                Ok(transport) => transport,
                Err(e) => {
                    joined.client.close().await;
                    self.shared.finish(Err(ConnectError::Closed));
                    return Err(e.into());
                }
            };

        let ready = self.start_negotiation(
            room,
            role,
            joined.client,
            joined.inbound,
            Box::new(transport),
            event_rx,
        );
        ready.await.unwrap_or(Err(ConnectError::Closed))
    }

    /// Spawns the negotiation actor over an already joined signaling link.
    fn start_negotiation(
        &self,
        room: RoomId,
        role: Role,
        signaling: SignalingClient,
        signals: SignalStream,
        transport: Box<dyn Transport>,
        events: mpsc::Receiver<TransportEvent>,
    ) -> oneshot::Receiver<Result<DataChannel, ConnectError>> {
        let (command_tx, command_rx) = mpsc::channel(4);
        if let Ok(mut commands) = self.commands.lock() {
            *commands = Some(command_tx);
        }

        let (inbound_tx, inbound_rx) = mpsc::channel(self.config.inbound_capacity.max(1));
        let (ready_tx, ready_rx) = oneshot::channel();

        let negotiator = Negotiator {
            role,
            room,
            config: self.config.clone(),
            shared: self.shared.clone(),
            signaling,
            signals,
            signaling_alive: true,
            transport,
            events,
            commands: command_rx,
            candidates: CandidateQueue::new(),
            local_set: false,
            remote_set: false,
            awaiting_answer: false,
            transport_connected: false,
            channel: None,
            channel_open: false,
            inbound_tx,
            inbound_rx: Some(inbound_rx),
            ready: Some(ready_tx),
            deadline: None,
            restart_attempted: false,
        };
        tokio::spawn(negotiator.run());
        ready_rx
    }

    /// Closes the channel, announces departure and waits for `Closed`.
    pub async fn close(&self) {
        let sender = self
            .commands
            .lock()
            .ok()
            .and_then(|commands| commands.clone());

        match sender {
            Some(tx) => {
                let _ = tx.send(Command::Close).await;
            }
            None => self.shared.finish(Ok(CloseReason::LocalClose)),
        }

        let mut rx = self.subscribe();
        let _ = rx.wait_for(|s| s.is_closed()).await;
    }

    /// Waits for `Closed` and yields how the session ended. The outcome is
    /// handed out once; later calls, and calls after a failed `connect`,
    /// report `ConnectError::Closed`.
    pub async fn closed(&self) -> Result<CloseReason, ConnectError> {
        let mut rx = self.subscribe();
        let _ = rx.wait_for(|s| s.is_closed()).await;
        self.shared
            .take_outcome()
            .unwrap_or(Err(ConnectError::Closed))
    }
}

enum Step {
    Continue,
    Finish(Outcome),
}

struct Negotiator {
    role: Role,
    room: RoomId,
    config: PeerConfig,
    shared: Arc<Shared>,
    signaling: SignalingClient,
    signals: SignalStream,
    signaling_alive: bool,
    transport: Box<dyn Transport>,
    events: mpsc::Receiver<TransportEvent>,
    commands: mpsc::Receiver<Command>,
    candidates: CandidateQueue,
    local_set: bool,
    remote_set: bool,
    awaiting_answer: bool,
    transport_connected: bool,
    channel: Option<Arc<RTCDataChannel>>,
    channel_open: bool,
    inbound_tx: mpsc::Sender<Bytes>,
    inbound_rx: Option<mpsc::Receiver<Bytes>>,
    ready: Option<oneshot::Sender<Result<DataChannel, ConnectError>>>,
    deadline: Option<Instant>,
    restart_attempted: bool,
}

impl Negotiator {
    async fn run(mut self) {
        let outcome = match self.start().await {
            Ok(()) => self.event_loop().await,
            Err(e) => Err(e),
        };
        self.finish(outcome).await;
    }

    async fn start(&mut self) -> Result<(), ConnectError> {
        if self.state().is_closed() {
            return Err(ConnectError::Closed);
        }
        self.set_state(ConnectionState::Signaling);

        if self.role == Role::Offerer {
            let dc = self.transport.create_data_channel().await?;
            self.channel = Some(dc);
            self.send_offer(false).await?;
            self.set_state(ConnectionState::Negotiating);
        } else {
            debug!("Waiting for an offer in '{}'", self.room);
        }
        Ok(())
    }

    async fn event_loop(&mut self) -> Outcome {
        loop {
            let deadline = self.deadline;
            let timer = sleep_until(deadline.unwrap_or_else(far_future));

            let step = tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(Command::Close) | None => Ok(Step::Finish(Ok(CloseReason::LocalClose))),
                },

                signal = self.signals.recv(), if self.signaling_alive => self.on_signal(signal).await,

                event = self.events.recv() => match event {
                    Some(event) => self.on_transport_event(event).await,
                    None => Ok(Step::Finish(Err(ConnectError::Closed))),
                },

                _ = timer, if deadline.is_some() => Ok(self.on_deadline()),
            };

            match step {
                Ok(Step::Continue) => {}
                Ok(Step::Finish(outcome)) => return outcome,
                Err(e) => return Err(e),
            }
        }
    }

    async fn on_signal(
        &mut self,
        signal: Option<Result<SignalMessage, SignalingError>>,
    ) -> Result<Step, ConnectError> {
        let msg = match signal {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => return Ok(self.on_signaling_lost(e)),
            None => return Ok(self.on_signaling_lost(SignalingError::Closed)),
        };

        match msg {
            SignalMessage::Offer { sdp, .. } if self.role == Role::Answerer => {
                self.accept_offer(sdp).await
            }
            SignalMessage::Answer { sdp, .. } if self.role == Role::Offerer => {
                self.accept_answer(sdp).await
            }
            SignalMessage::Candidate { candidate, .. } => {
                self.shared.candidates_received.fetch_add(1, Ordering::Relaxed);
                if let Some(candidate) = self.candidates.push(candidate) {
                    self.apply_candidate(candidate).await;
                }
                Ok(Step::Continue)
            }
            SignalMessage::PeerLeft { role, .. } if role != self.role => {
                info!("{} left room '{}'", role, self.room);
                Ok(self.peer_gone())
            }
            SignalMessage::Error { code, message } => {
                warn!("Relay rejected a message ({:?}): {}", code, message);
                Ok(Step::Continue)
            }
            other => {
                debug!("Ignoring {} signal", other.kind());
                Ok(Step::Continue)
            }
        }
    }

    async fn accept_offer(&mut self, sdp: String) -> Result<Step, ConnectError> {
        let restart = self.remote_set;
        self.transport.set_remote_offer(sdp).await?;
        self.remote_set = true;
        for candidate in self.candidates.mark_ready() {
            self.apply_candidate(candidate).await;
        }

        let first = self.state() == ConnectionState::Signaling;
        if first {
            self.set_state(ConnectionState::Negotiating);
        }

        let answer = self.transport.create_answer().await?;
        self.local_set = true;
        self.send_signal(SignalMessage::Answer {
            room: self.room.clone(),
            role: self.role,
            sdp: answer,
        })
        .await;

        if restart {
            info!("Answered ICE restart offer");
        }
        if first {
            self.set_state(ConnectionState::Connecting);
        }
        self.try_connected().await
    }

    async fn accept_answer(&mut self, sdp: String) -> Result<Step, ConnectError> {
        if !self.awaiting_answer {
            debug!("Ignoring answer with no outstanding offer");
            return Ok(Step::Continue);
        }

        self.transport.set_remote_answer(sdp).await?;
        self.awaiting_answer = false;
        self.remote_set = true;
        for candidate in self.candidates.mark_ready() {
            self.apply_candidate(candidate).await;
        }

        if self.state() == ConnectionState::Negotiating {
            self.set_state(ConnectionState::Connecting);
        }
        self.try_connected().await
    }

    async fn on_transport_event(&mut self, event: TransportEvent) -> Result<Step, ConnectError> {
        match event {
            TransportEvent::StateChanged(s) => self.on_transport_state(s).await,

            TransportEvent::CandidateGenerated(candidate) => {
                if self.signaling_alive {
                    self.shared.candidates_sent.fetch_add(1, Ordering::Relaxed);
                }
                self.send_signal(SignalMessage::Candidate {
                    room: self.room.clone(),
                    role: self.role,
                    candidate,
                })
                .await;
                Ok(Step::Continue)
            }

            TransportEvent::DataChannelOpen(dc) => {
                if self.channel.is_none() {
                    self.channel = Some(dc);
                }
                self.channel_open = true;
                self.try_connected().await
            }

            TransportEvent::Message(bytes) => {
                if let Err(TrySendError::Full(_)) = self.inbound_tx.try_send(bytes) {
                    debug!("Inbound queue full, dropping message");
                }
                Ok(Step::Continue)
            }

            TransportEvent::ChannelClosed => {
                self.channel_open = false;
                if self.state() == ConnectionState::Degraded {
                    debug!("Data channel closed during ICE restart");
                    return Ok(Step::Continue);
                }
                Ok(self.peer_gone())
            }
        }
    }

    async fn on_transport_state(
        &mut self,
        s: RTCPeerConnectionState,
    ) -> Result<Step, ConnectError> {
        match s {
            RTCPeerConnectionState::Connected => {
                self.transport_connected = true;
                self.try_connected().await
            }
            RTCPeerConnectionState::Disconnected | RTCPeerConnectionState::Failed => {
                self.transport_connected = false;
                match self.state() {
                    ConnectionState::Connected => self.degrade().await?,
                    ConnectionState::Connecting if s == RTCPeerConnectionState::Failed => {
                        return Ok(Step::Finish(Err(ConnectError::NoViableCandidate)));
                    }
                    _ => {}
                }
                Ok(Step::Continue)
            }
            RTCPeerConnectionState::Closed => {
                self.transport_connected = false;
                Ok(self.peer_gone())
            }
            _ => Ok(Step::Continue),
        }
    }

    async fn degrade(&mut self) -> Result<(), ConnectError> {
        self.set_state(ConnectionState::Degraded);
        if self.restart_attempted {
            return Ok(());
        }
        self.restart_attempted = true;

        if self.role == Role::Offerer {
            if !self.signaling_alive {
                warn!("Connectivity lost and signaling is gone; cannot restart ICE");
                return Ok(());
            }
            self.candidates.reset();
            self.send_offer(true).await?;
            info!("Sent ICE restart offer");
        }
        Ok(())
    }

    /// Enters `Connected` once every precondition holds.
    async fn try_connected(&mut self) -> Result<Step, ConnectError> {
        let state = self.state();
        if !matches!(state, ConnectionState::Connecting | ConnectionState::Degraded) {
            return Ok(Step::Continue);
        }
        if !(self.local_set && self.remote_set && self.transport_connected && self.channel_open) {
            return Ok(Step::Continue);
        }
        if !self.transport.has_selected_pair().await {
            debug!("Transport connected but no candidate pair selected yet");
            return Ok(Step::Continue);
        }

        if state == ConnectionState::Degraded {
            info!("Connectivity restored");
            self.restart_attempted = false;
        }
        self.set_state(ConnectionState::Connected);

        if let (Some(ready), Some(channel), Some(inbound)) = (
            self.ready.take(),
            self.channel.clone(),
            self.inbound_rx.take(),
        ) {
            let dc = DataChannel { channel, inbound };
            if ready.send(Ok(dc)).is_err() {
                debug!("connect() was abandoned, closing");
                return Ok(Step::Finish(Ok(CloseReason::LocalClose)));
            }
        }
        Ok(Step::Continue)
    }

    fn on_deadline(&mut self) -> Step {
        match self.state() {
            ConnectionState::Signaling | ConnectionState::Negotiating => Step::Finish(Err(
                ConnectError::NegotiationTimeout(self.config.negotiation_timeout),
            )),
            ConnectionState::Connecting => Step::Finish(Err(ConnectError::NoViableCandidate)),
            ConnectionState::Degraded => {
                warn!("ICE restart did not recover within {:?}", self.config.restart_timeout);
                Step::Finish(Err(ConnectError::NoViableCandidate))
            }
            _ => {
                self.deadline = None;
                Step::Continue
            }
        }
    }

    fn on_signaling_lost(&mut self, e: SignalingError) -> Step {
        self.signaling_alive = false;
        match self.state() {
            ConnectionState::Connected | ConnectionState::Degraded => {
                warn!("Signaling lost, continuing without renegotiation: {}", e);
                Step::Continue
            }
            _ => Step::Finish(Err(e.into())),
        }
    }

    fn peer_gone(&self) -> Step {
        match self.state() {
            ConnectionState::Connected | ConnectionState::Degraded => {
                Step::Finish(Ok(CloseReason::PeerLeft))
            }
            _ => Step::Finish(Err(ConnectError::PeerDisconnected)),
        }
    }

    async fn send_offer(&mut self, ice_restart: bool) -> Result<(), ConnectError> {
        let sdp = self.transport.create_offer(ice_restart).await?;
        self.local_set = true;
        self.awaiting_answer = true;
        self.send_signal(SignalMessage::Offer {
            room: self.room.clone(),
            role: self.role,
            sdp,
        })
        .await;
        Ok(())
    }

    async fn send_signal(&self, msg: SignalMessage) {
        if !self.signaling_alive {
            debug!("Dropping {} signal, relay is gone", msg.kind());
            return;
        }
        if let Err(e) = self.signaling.send(msg).await {
            warn!("Failed to send signal: {}", e);
        }
    }

    async fn apply_candidate(&self, candidate: IceCandidate) {
        if let Err(e) = self.transport.add_ice_candidate(candidate).await {
            warn!("Failed to add remote candidate: {}", e);
        }
    }

    fn state(&self) -> ConnectionState {
        self.shared.current()
    }

    fn set_state(&mut self, next: ConnectionState) {
        if !self.shared.transition(next) {
            return;
        }
        let now = Instant::now();
        self.deadline = match next {
            ConnectionState::Signaling => Some(now + self.config.negotiation_timeout),
            ConnectionState::Negotiating => self.deadline,
            ConnectionState::Connecting => Some(now + self.config.ice_timeout),
            ConnectionState::Degraded => Some(now + self.config.restart_timeout),
            ConnectionState::Idle | ConnectionState::Connected | ConnectionState::Closed => None,
        };
    }

    async fn finish(mut self, outcome: Outcome) {
        if let Some(dc) = &self.channel {
            let _ = dc.close().await;
        }
        if self.signaling_alive {
            self.signaling.close().await;
        }
        if let Err(e) = self.transport.close().await {
            warn!("Error closing peer connection: {}", e);
        }

        let outcome = match (self.ready.take(), outcome) {
            (Some(ready), Err(e)) => match ready.send(Err(e)) {
                Ok(()) => Err(ConnectError::Closed),
                Err(Err(e)) => Err(e),
                Err(Ok(_)) => Err(ConnectError::Closed),
            },
            (Some(ready), Ok(reason)) => {
                let _ = ready.send(Err(ConnectError::Closed));
                Ok(reason)
            }
            (None, outcome) => outcome,
        };

        match &outcome {
            Ok(reason) => info!("Session in '{}' closed: {:?}", self.room, reason),
            Err(e) => warn!("Session in '{}' failed: {}", self.room, e),
        }
        self.shared.finish(outcome);
    }
}

fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(86_400)
}
