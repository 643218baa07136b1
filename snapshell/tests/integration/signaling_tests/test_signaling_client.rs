use snapshell::SignalingError;
use snapshell::signaling::SignalingClient;
use snapshell_core::{IceServerConfig, Role, SignalMessage};
use snapshell_relay::RelayConfig;
use std::time::Duration;
use tokio::time::timeout;

use crate::integration::{demo_room, fast_signaling, init_tracing};
use crate::utils::{dead_relay_url, loopback_relay_config, spawn_relay};

const RECV_TIMEOUT: Duration = Duration::from_secs(3);

#[tokio::test]
async fn test_join_returns_announced_ice_servers() {
    init_tracing();

    let relay = RelayConfig {
        ice_servers: vec![IceServerConfig::stun("stun:stun.example.org:3478")],
        ..RelayConfig::default()
    };
    let url = spawn_relay(relay.clone()).await.expect("relay");

    let joined = SignalingClient::join(&fast_signaling(&url), demo_room(), Role::Offerer)
        .await
        .expect("join");

    assert_eq!(joined.ice_servers, relay.ice_servers);
    assert_eq!(joined.client.role(), Role::Offerer);
}

#[tokio::test]
async fn test_occupied_role_is_fatal() {
    init_tracing();

    let url = spawn_relay(loopback_relay_config()).await.expect("relay");
    let config = fast_signaling(&url);

    let _first = SignalingClient::join(&config, demo_room(), Role::Offerer)
        .await
        .expect("first join");

    let second = SignalingClient::join(&config, demo_room(), Role::Offerer).await;
    match second {
        Err(SignalingError::RoleOccupied { room, role }) => {
            assert_eq!(room, demo_room());
            assert_eq!(role, Role::Offerer);
        }
        other => panic!("expected RoleOccupied, got {:?}", other.err()),
    }
}

#[tokio::test]
async fn test_unreachable_relay_gives_up_after_retries() {
    init_tracing();

    let url = dead_relay_url().await.expect("port");
    let result = SignalingClient::join(&fast_signaling(&url), demo_room(), Role::Answerer).await;

    match result {
        Err(SignalingError::SignalingUnavailable { attempts, .. }) => assert_eq!(attempts, 3),
        other => panic!("expected SignalingUnavailable, got {:?}", other.err()),
    }
}

#[tokio::test]
async fn test_messages_cross_between_roles() {
    init_tracing();

    let url = spawn_relay(loopback_relay_config()).await.expect("relay");
    let config = fast_signaling(&url);

    let offerer = SignalingClient::join(&config, demo_room(), Role::Offerer)
        .await
        .unwrap();
    let mut answerer = SignalingClient::join(&config, demo_room(), Role::Answerer)
        .await
        .unwrap();

    let offer = SignalMessage::Offer {
        room: demo_room(),
        role: Role::Offerer,
        sdp: "v=0 offer".to_string(),
    };
    offerer.client.send(offer.clone()).await.unwrap();

    let received = timeout(RECV_TIMEOUT, answerer.inbound.recv())
        .await
        .expect("offer in time")
        .expect("stream open")
        .expect("no signaling error");
    assert_eq!(received, offer);
}

#[tokio::test]
async fn test_offer_waits_for_late_answerer() {
    init_tracing();

    let url = spawn_relay(loopback_relay_config()).await.expect("relay");
    let config = fast_signaling(&url);

    let offerer = SignalingClient::join(&config, demo_room(), Role::Offerer)
        .await
        .unwrap();
    let offer = SignalMessage::Offer {
        room: demo_room(),
        role: Role::Offerer,
        sdp: "v=0 early".to_string(),
    };
    offerer.client.send(offer.clone()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut answerer = SignalingClient::join(&config, demo_room(), Role::Answerer)
        .await
        .unwrap();
    let received = timeout(RECV_TIMEOUT, answerer.inbound.recv())
        .await
        .expect("offer in time")
        .expect("stream open")
        .expect("no signaling error");
    assert_eq!(received, offer);
}

#[tokio::test]
async fn test_close_announces_departure() {
    init_tracing();

    let url = spawn_relay(loopback_relay_config()).await.expect("relay");
    let config = fast_signaling(&url);

    let mut offerer = SignalingClient::join(&config, demo_room(), Role::Offerer)
        .await
        .unwrap();
    let answerer = SignalingClient::join(&config, demo_room(), Role::Answerer)
        .await
        .unwrap();

    answerer.client.close().await;

    let received = timeout(RECV_TIMEOUT, offerer.inbound.recv())
        .await
        .expect("departure in time")
        .expect("stream open")
        .expect("no signaling error");
    assert_eq!(
        received,
        SignalMessage::PeerLeft {
            room: demo_room(),
            role: Role::Answerer,
        }
    );

    assert_eq!(
        answerer.client.send(SignalMessage::PeerLeft {
            room: demo_room(),
            role: Role::Answerer,
        })
        .await,
        Err(SignalingError::Closed)
    );
}
