mod candidates;
mod manager;
mod transport;
mod transport_event;

pub use candidates::CandidateQueue;
pub use manager::{CandidateCounts, CloseReason, DataChannel, PeerConfig, PeerConnectionManager};
pub use transport::{DATA_CHANNEL_LABEL, PeerTransport, Transport};
pub use transport_event::TransportEvent;
