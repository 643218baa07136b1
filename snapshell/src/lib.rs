//! SnapShell client: webcam frames as ASCII art, streamed peer-to-peer
//! over a WebRTC data channel after a rendezvous on a signaling relay.

pub mod capture;
pub mod encoder;
pub mod error;
pub mod peer;
pub mod pipeline;
pub mod render;
pub mod session;
pub mod signaling;

pub use error::{CaptureError, ConnectError, EncodeError, SessionError, SignalingError};
pub use peer::{CandidateCounts, CloseReason, DataChannel, PeerConfig, PeerConnectionManager};
pub use session::{SessionConfig, run_preview, run_session, run_session_with};
pub use snapshell_core::{ConnectionState, Frame, GridSize, Role, RoomId};
