use bytes::Bytes;
use snapshell_core::IceCandidate;
use std::fmt;
use std::sync::Arc;
use webrtc::data_channel::RTCDataChannel;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;

/// Callback output of the WebRTC stack, funneled into the negotiation actor.
pub enum TransportEvent {
    StateChanged(RTCPeerConnectionState),
    CandidateGenerated(IceCandidate),
    DataChannelOpen(Arc<RTCDataChannel>),
    Message(Bytes),
    ChannelClosed,
}

impl fmt::Debug for TransportEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportEvent::StateChanged(s) => f.debug_tuple("StateChanged").field(s).finish(),
            TransportEvent::CandidateGenerated(c) => {
                f.debug_tuple("CandidateGenerated").field(c).finish()
            }
            TransportEvent::DataChannelOpen(dc) => {
                f.debug_tuple("DataChannelOpen").field(&dc.label()).finish()
            }
            TransportEvent::Message(bytes) => f.debug_tuple("Message").field(&bytes.len()).finish(),
            TransportEvent::ChannelClosed => f.write_str("ChannelClosed"),
        }
    }
}
