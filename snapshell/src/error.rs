use snapshell_core::{ErrorCode, Role, RoomId};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("capture device lost after {attempts} failed reads: {reason}")]
    DeviceLost { attempts: u32, reason: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodeError {
    #[error("raw frame {width}x{height} carries {actual} bytes, expected {expected}")]
    FrameSize {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("character grid must be at least 1x1")]
    EmptyGrid,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignalingError {
    #[error("the {role} slot of room '{room}' is already taken")]
    RoleOccupied { room: RoomId, role: Role },

    #[error("signaling relay unavailable after {attempts} attempts: {last_error}")]
    SignalingUnavailable { attempts: u32, last_error: String },

    #[error("relay rejected the request ({code:?}): {message}")]
    Rejected { code: ErrorCode, message: String },

    #[error("signaling client is closed")]
    Closed,

    #[error("signaling transport error: {0}")]
    Transport(String),

    #[error("timed out waiting for the relay")]
    Timeout,
}

impl SignalingError {
    /// Errors worth a reconnect attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, SignalingError::Transport(_) | SignalingError::Timeout)
    }
}

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("no remote description within {0:?}")]
    NegotiationTimeout(Duration),

    #[error("ICE found no usable candidate pair")]
    NoViableCandidate,

    #[error("peer disconnected before the session was established")]
    PeerDisconnected,

    #[error("connection closed locally")]
    Closed,

    #[error(transparent)]
    Signaling(#[from] SignalingError),

    #[error("webrtc: {0}")]
    WebRtc(#[from] webrtc::Error),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error("terminal output failed: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    /// Process exit code reported by the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            SessionError::Capture(_) => 2,
            SessionError::Connect(ConnectError::Signaling(_)) => 3,
            SessionError::Connect(
                ConnectError::NegotiationTimeout(_)
                | ConnectError::NoViableCandidate
                | ConnectError::PeerDisconnected,
            ) => 4,
            SessionError::Connect(ConnectError::Closed) => 0,
            SessionError::Connect(ConnectError::WebRtc(_))
            | SessionError::Encode(_)
            | SessionError::Io(_) => 1,
        }
    }
}
