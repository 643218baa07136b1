mod frame;
mod peer;
mod room;
mod signaling;
mod state;

pub use frame::{CellChange, CodecError, Frame, FrameBody, GridSize, is_glyph};
pub use peer::{ClientId, ConnectionId, Role};
pub use room::{RoomId, RoomIdError};
pub use signaling::{ErrorCode, IceCandidate, IceServerConfig, SignalMessage};
pub use state::ConnectionState;
