use snapshell_core::{ClientId, ErrorCode, Role, SignalMessage};
use snapshell_relay::RelayConfig;

use crate::integration::{demo_room, init_tracing};
use crate::utils::{WsTestClient, spawn_relay};

fn join(role: Role, client_id: ClientId) -> SignalMessage {
    SignalMessage::Join {
        room: demo_room(),
        role,
        client_id,
    }
}

#[tokio::test]
async fn test_offer_and_answer_cross_the_relay() {
    init_tracing();

    let url = spawn_relay(RelayConfig::default()).await.expect("relay");
    let mut offerer = WsTestClient::connect(&url).await.expect("offerer connect");
    let mut answerer = WsTestClient::connect(&url).await.expect("answerer connect");

    offerer.send(&join(Role::Offerer, ClientId::new())).await.unwrap();
    let ack = offerer.recv().await.unwrap();
    let SignalMessage::JoinAck { ice_servers, .. } = ack else {
        panic!("expected JoinAck, got {:?}", ack);
    };
    assert_eq!(ice_servers, RelayConfig::default().ice_servers);

    answerer.send(&join(Role::Answerer, ClientId::new())).await.unwrap();
    assert!(matches!(answerer.recv().await.unwrap(), SignalMessage::JoinAck { .. }));

    let offer = SignalMessage::Offer {
        room: demo_room(),
        role: Role::Offerer,
        sdp: "v=0 offer".to_string(),
    };
    offerer.send(&offer).await.unwrap();
    assert_eq!(answerer.recv().await.unwrap(), offer);

    let answer = SignalMessage::Answer {
        room: demo_room(),
        role: Role::Answerer,
        sdp: "v=0 answer".to_string(),
    };
    answerer.send(&answer).await.unwrap();
    assert_eq!(offerer.recv().await.unwrap(), answer);
}

#[tokio::test]
async fn test_third_client_gets_role_occupied() {
    init_tracing();

    let url = spawn_relay(RelayConfig::default()).await.expect("relay");
    let mut first = WsTestClient::connect(&url).await.unwrap();
    let mut second = WsTestClient::connect(&url).await.unwrap();

    first.send(&join(Role::Offerer, ClientId::new())).await.unwrap();
    first.recv().await.unwrap();

    second.send(&join(Role::Offerer, ClientId::new())).await.unwrap();
    assert!(matches!(
        second.recv().await.unwrap(),
        SignalMessage::RoleOccupied { role: Role::Offerer, .. }
    ));
}

#[tokio::test]
async fn test_refused_socket_can_take_the_free_slot() {
    init_tracing();

    let url = spawn_relay(RelayConfig::default()).await.expect("relay");
    let mut first = WsTestClient::connect(&url).await.unwrap();
    let mut second = WsTestClient::connect(&url).await.unwrap();

    first.send(&join(Role::Offerer, ClientId::new())).await.unwrap();
    first.recv().await.unwrap();

    let client_id = ClientId::new();
    second.send(&join(Role::Offerer, client_id)).await.unwrap();
    assert!(matches!(second.recv().await.unwrap(), SignalMessage::RoleOccupied { .. }));

    second.send(&join(Role::Answerer, client_id)).await.unwrap();
    let reply = second.recv().await.unwrap();
    assert!(
        matches!(reply, SignalMessage::JoinAck { role: Role::Answerer, .. }),
        "expected JoinAck, got {:?}",
        reply
    );
}

#[tokio::test]
async fn test_closing_with_peer_left_notifies_other_side() {
    init_tracing();

    let url = spawn_relay(RelayConfig::default()).await.expect("relay");
    let mut offerer = WsTestClient::connect(&url).await.unwrap();
    let mut answerer = WsTestClient::connect(&url).await.unwrap();

    offerer.send(&join(Role::Offerer, ClientId::new())).await.unwrap();
    offerer.recv().await.unwrap();
    answerer.send(&join(Role::Answerer, ClientId::new())).await.unwrap();
    answerer.recv().await.unwrap();

    answerer
        .send(&SignalMessage::PeerLeft {
            room: demo_room(),
            role: Role::Answerer,
        })
        .await
        .unwrap();
    answerer.close().await.unwrap();

    assert!(matches!(
        offerer.recv().await.unwrap(),
        SignalMessage::PeerLeft { role: Role::Answerer, .. }
    ));
}

#[tokio::test]
async fn test_malformed_and_unjoined_messages_get_errors() {
    init_tracing();

    let url = spawn_relay(RelayConfig::default()).await.expect("relay");
    let mut client = WsTestClient::connect(&url).await.unwrap();

    client.send_raw("{\"type\":\"bogus\"}").await.unwrap();
    assert!(matches!(
        client.recv().await.unwrap(),
        SignalMessage::Error { code: ErrorCode::Malformed, .. }
    ));

    client
        .send(&SignalMessage::Offer {
            room: demo_room(),
            role: Role::Offerer,
            sdp: "early".to_string(),
        })
        .await
        .unwrap();
    assert!(matches!(
        client.recv().await.unwrap(),
        SignalMessage::Error { code: ErrorCode::NotJoined, .. }
    ));
}

#[tokio::test]
async fn test_second_join_on_same_socket_is_rejected() {
    init_tracing();

    let url = spawn_relay(RelayConfig::default()).await.expect("relay");
    let mut client = WsTestClient::connect(&url).await.unwrap();

    client.send(&join(Role::Offerer, ClientId::new())).await.unwrap();
    client.recv().await.unwrap();

    client.send(&join(Role::Answerer, ClientId::new())).await.unwrap();
    assert!(matches!(
        client.recv().await.unwrap(),
        SignalMessage::Error { code: ErrorCode::AlreadyJoined, .. }
    ));
}
