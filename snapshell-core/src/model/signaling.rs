use crate::model::peer::{ClientId, Role};
use crate::model::room::RoomId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<String>,
}

impl IceServerConfig {
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }
}

/// Trickle ICE candidate as exchanged through the relay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IceCandidate {
    pub candidate: String,
    pub sdp_mid: Option<String>,
    pub sdp_m_line_index: Option<u16>,
    pub username_fragment: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NotJoined,
    AlreadyJoined,
    WrongRole,
    RoomMismatch,
    Malformed,
}

/// Relay protocol. `role` names the participant the message is about:
/// the sender for negotiation messages, the departing side for `PeerLeft`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum SignalMessage {
    Join {
        room: RoomId,
        role: Role,
        client_id: ClientId,
    },
    JoinAck {
        room: RoomId,
        role: Role,
        ice_servers: Vec<IceServerConfig>,
    },
    RoleOccupied {
        room: RoomId,
        role: Role,
    },
    Offer {
        room: RoomId,
        role: Role,
        sdp: String,
    },
    Answer {
        room: RoomId,
        role: Role,
        sdp: String,
    },
    Candidate {
        room: RoomId,
        role: Role,
        candidate: IceCandidate,
    },
    PeerLeft {
        room: RoomId,
        role: Role,
    },
    Error {
        code: ErrorCode,
        message: String,
    },
}

impl SignalMessage {
    pub fn room(&self) -> Option<&RoomId> {
        match self {
            SignalMessage::Join { room, .. }
            | SignalMessage::JoinAck { room, .. }
            | SignalMessage::RoleOccupied { room, .. }
            | SignalMessage::Offer { room, .. }
            | SignalMessage::Answer { room, .. }
            | SignalMessage::Candidate { room, .. }
            | SignalMessage::PeerLeft { room, .. } => Some(room),
            SignalMessage::Error { .. } => None,
        }
    }

    pub fn role(&self) -> Option<Role> {
        match self {
            SignalMessage::Join { role, .. }
            | SignalMessage::JoinAck { role, .. }
            | SignalMessage::RoleOccupied { role, .. }
            | SignalMessage::Offer { role, .. }
            | SignalMessage::Answer { role, .. }
            | SignalMessage::Candidate { role, .. }
            | SignalMessage::PeerLeft { role, .. } => Some(*role),
            SignalMessage::Error { .. } => None,
        }
    }

    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            SignalMessage::Join { .. } => "join",
            SignalMessage::JoinAck { .. } => "join_ack",
            SignalMessage::RoleOccupied { .. } => "role_occupied",
            SignalMessage::Offer { .. } => "offer",
            SignalMessage::Answer { .. } => "answer",
            SignalMessage::Candidate { .. } => "candidate",
            SignalMessage::PeerLeft { .. } => "peer_left",
            SignalMessage::Error { .. } => "error",
        }
    }
}
