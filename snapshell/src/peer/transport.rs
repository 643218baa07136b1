use crate::peer::transport_event::TransportEvent;
use async_trait::async_trait;
use bytes::Bytes;
use snapshell_core::{IceCandidate, IceServerConfig};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tracing::{debug, info};
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::setting_engine::SettingEngine;
use webrtc::data_channel::RTCDataChannel;
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::offer_answer_options::RTCOfferOptions;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

/// Label of the frame channel.
pub const DATA_CHANNEL_LABEL: &str = "ascii";

/// The peer connection operations negotiation drives. Callbacks arrive
/// separately as [`TransportEvent`]s.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Creates the frame channel. Only the offerer calls this; the answerer
    /// receives the channel through `on_data_channel`.
    async fn create_data_channel(&self) -> Result<Arc<RTCDataChannel>, webrtc::Error>;
    /// Creates a local offer, sets it as local description and returns its SDP.
    async fn create_offer(&self, ice_restart: bool) -> Result<String, webrtc::Error>;
    async fn create_answer(&self) -> Result<String, webrtc::Error>;
    async fn set_remote_offer(&self, sdp: String) -> Result<(), webrtc::Error>;
    async fn set_remote_answer(&self, sdp: String) -> Result<(), webrtc::Error>;
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), webrtc::Error>;
    /// Whether ICE has nominated a candidate pair.
    async fn has_selected_pair(&self) -> bool;
    async fn close(&self) -> Result<(), webrtc::Error>;
}

/// One `RTCPeerConnection` with every callback forwarded as a [`TransportEvent`].
pub struct PeerTransport {
    peer_connection: Arc<RTCPeerConnection>,
    event_tx: mpsc::Sender<TransportEvent>,
}

impl PeerTransport {
    pub async fn new(
        ice_servers: &[IceServerConfig],
        include_loopback: bool,
        event_tx: mpsc::Sender<TransportEvent>,
    ) -> Result<Self, webrtc::Error> {
        let mut media = MediaEngine::default();
        media.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut media)?;

        let mut settings = SettingEngine::default();
        settings.set_include_loopback_candidate(include_loopback);

        let api = APIBuilder::new()
            .with_media_engine(media)
            .with_interceptor_registry(registry)
            .with_setting_engine(settings)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: ice_servers
                .iter()
                .map(|server| RTCIceServer {
                    urls: server.urls.clone(),
                    username: server.username.clone().unwrap_or_default(),
                    credential: server.credential.clone().unwrap_or_default(),
                })
                .collect(),
            ..Default::default()
        };

        let peer_connection = Arc::new(api.new_peer_connection(rtc_config).await?);

        let state_tx = event_tx.clone();
        peer_connection.on_peer_connection_state_change(Box::new(
            move |s: RTCPeerConnectionState| {
                let tx = state_tx.clone();
                Box::pin(async move {
                    debug!("Peer connection state: {}", s);
                    let _ = tx.send(TransportEvent::StateChanged(s)).await;
                })
            },
        ));

        let ice_tx = event_tx.clone();
        peer_connection.on_ice_candidate(Box::new(move |c: Option<RTCIceCandidate>| {
            let tx = ice_tx.clone();
            Box::pin(async move {
                let Some(candidate) = c else { return };
                let Ok(init) = candidate.to_json() else {
                    return;
                };
                let candidate = IceCandidate {
                    candidate: init.candidate,
                    sdp_mid: init.sdp_mid,
                    sdp_m_line_index: init.sdp_mline_index,
                    username_fragment: init.username_fragment,
                };
                let _ = tx.send(TransportEvent::CandidateGenerated(candidate)).await;
            })
        }));

        let dc_tx = event_tx.clone();
        peer_connection.on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
            let tx = dc_tx.clone();
            Box::pin(async move {
                debug!("Remote opened data channel '{}'", dc.label());
                wire_channel(&dc, tx);
            })
        }));

        Ok(Self {
            peer_connection,
            event_tx,
        })
    }
}

#[async_trait]
impl Transport for PeerTransport {
    async fn create_data_channel(&self) -> Result<Arc<RTCDataChannel>, webrtc::Error> {
        let init = RTCDataChannelInit {
            ordered: Some(false),
            max_retransmits: Some(0),
            ..Default::default()
        };
        let dc = self
            .peer_connection
            .create_data_channel(DATA_CHANNEL_LABEL, Some(init))
            .await?;
        wire_channel(&dc, self.event_tx.clone());
        Ok(dc)
    }

    async fn create_offer(&self, ice_restart: bool) -> Result<String, webrtc::Error> {
        let options = ice_restart.then(|| RTCOfferOptions {
            ice_restart: true,
            ..Default::default()
        });
        let offer = self.peer_connection.create_offer(options).await?;
        self.peer_connection
            .set_local_description(offer.clone())
            .await?;
        Ok(offer.sdp)
    }

    async fn create_answer(&self) -> Result<String, webrtc::Error> {
        let answer = self.peer_connection.create_answer(None).await?;
        self.peer_connection
            .set_local_description(answer.clone())
            .await?;
        Ok(answer.sdp)
    }

    async fn set_remote_offer(&self, sdp: String) -> Result<(), webrtc::Error> {
        let desc = RTCSessionDescription::offer(sdp)?;
        self.peer_connection.set_remote_description(desc).await
    }

    async fn set_remote_answer(&self, sdp: String) -> Result<(), webrtc::Error> {
        let desc = RTCSessionDescription::answer(sdp)?;
        self.peer_connection.set_remote_description(desc).await
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), webrtc::Error> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_m_line_index,
            username_fragment: candidate.username_fragment,
        };
        self.peer_connection.add_ice_candidate(init).await
    }

    async fn has_selected_pair(&self) -> bool {
        self.peer_connection
            .sctp()
            .transport()
            .ice_transport()
            .get_selected_candidate_pair()
            .await
            .is_some()
    }

    async fn close(&self) -> Result<(), webrtc::Error> {
        self.peer_connection.close().await
    }
}

fn wire_channel(dc: &Arc<RTCDataChannel>, tx: mpsc::Sender<TransportEvent>) {
    let open_tx = tx.clone();
    let weak: Weak<RTCDataChannel> = Arc::downgrade(dc);
    dc.on_open(Box::new(move || {
        Box::pin(async move {
            let Some(channel) = weak.upgrade() else {
                return;
            };
            info!("Data channel '{}' open", channel.label());
            let _ = open_tx.send(TransportEvent::DataChannelOpen(channel)).await;
        })
    }));

    let msg_tx = tx.clone();
    dc.on_message(Box::new(move |msg: DataChannelMessage| {
        let tx = msg_tx.clone();
        Box::pin(async move {
            let bytes: Bytes = msg.data;
            let _ = tx.send(TransportEvent::Message(bytes)).await;
        })
    }));

    dc.on_close(Box::new(move || {
        let tx = tx.clone();
        Box::pin(async move {
            debug!("Data channel closed");
            let _ = tx.send(TransportEvent::ChannelClosed).await;
        })
    }));
}
