use snapshell_core::{Role, SignalMessage};
use snapshell_relay::RoomSettings;

use crate::integration::{TestParticipant, create_test_room, init_tracing};
use crate::utils::next_for;

#[tokio::test]
async fn test_join_is_acknowledged_with_ice_servers() {
    init_tracing();

    let settings = RoomSettings {
        ice_servers: vec![snapshell_core::IceServerConfig::stun("stun:example.org:3478")],
        ..RoomSettings::default()
    };
    let (cmd_tx, mut rx, _output) = create_test_room(settings);
    let offerer = TestParticipant::new(Role::Offerer);

    cmd_tx.send(offerer.join()).await.unwrap();

    let ack = next_for(&mut rx, offerer.conn).await.expect("no ack");
    let SignalMessage::JoinAck {
        role, ice_servers, ..
    } = ack
    else {
        panic!("expected JoinAck, got {:?}", ack);
    };
    assert_eq!(role, Role::Offerer);
    assert_eq!(ice_servers[0].urls, vec!["stun:example.org:3478".to_string()]);
}

#[tokio::test]
async fn test_second_join_for_occupied_role_is_rejected() {
    init_tracing();

    let (cmd_tx, mut rx, _output) = create_test_room(RoomSettings::default());
    let first = TestParticipant::new(Role::Answerer);
    let intruder = TestParticipant::new(Role::Answerer);

    cmd_tx.send(first.join()).await.unwrap();
    assert!(matches!(
        next_for(&mut rx, first.conn).await,
        Some(SignalMessage::JoinAck { .. })
    ));

    cmd_tx.send(intruder.join()).await.unwrap();
    let reply = next_for(&mut rx, intruder.conn).await.expect("no reply");
    assert!(
        matches!(reply, SignalMessage::RoleOccupied { role: Role::Answerer, .. }),
        "got {:?}",
        reply
    );
}

#[tokio::test]
async fn test_both_roles_can_join_the_same_room() {
    init_tracing();

    let (cmd_tx, mut rx, _output) = create_test_room(RoomSettings::default());
    let offerer = TestParticipant::new(Role::Offerer);
    let answerer = TestParticipant::new(Role::Answerer);

    cmd_tx.send(offerer.join()).await.unwrap();
    cmd_tx.send(answerer.join()).await.unwrap();

    assert!(matches!(
        next_for(&mut rx, offerer.conn).await,
        Some(SignalMessage::JoinAck { .. })
    ));
    assert!(matches!(
        next_for(&mut rx, answerer.conn).await,
        Some(SignalMessage::JoinAck { .. })
    ));
}

#[tokio::test]
async fn test_same_client_rejoin_replaces_connection() {
    init_tracing();

    let (cmd_tx, mut rx, _output) = create_test_room(RoomSettings::default());
    let offerer = TestParticipant::new(Role::Offerer);
    let answerer = TestParticipant::new(Role::Answerer);

    cmd_tx.send(offerer.join()).await.unwrap();
    cmd_tx.send(answerer.join()).await.unwrap();
    next_for(&mut rx, offerer.conn).await;
    next_for(&mut rx, answerer.conn).await;

    let again = offerer.reconnected();
    cmd_tx.send(again.join()).await.unwrap();
    assert!(matches!(
        next_for(&mut rx, again.conn).await,
        Some(SignalMessage::JoinAck { .. })
    ));

    // Traffic for the offerer now goes to the new socket.
    let answer = SignalMessage::Answer {
        room: crate::integration::demo_room(),
        role: Role::Answerer,
        sdp: "answer-sdp".to_string(),
    };
    cmd_tx
        .send(snapshell_relay::RoomCommand::Relay {
            conn: answerer.conn,
            message: answer.clone(),
        })
        .await
        .unwrap();
    assert_eq!(next_for(&mut rx, again.conn).await, Some(answer));
}
