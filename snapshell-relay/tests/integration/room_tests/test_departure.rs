use snapshell_core::{Role, SignalMessage};
use snapshell_relay::{RoomCommand, RoomSettings};
use std::time::Duration;

use crate::integration::{TestParticipant, create_test_room, init_tracing};
use crate::utils::{assert_silent, next_for};

async fn joined_pair(
    settings: RoomSettings,
) -> (
    tokio::sync::mpsc::Sender<RoomCommand>,
    tokio::sync::mpsc::UnboundedReceiver<crate::utils::Delivery>,
    TestParticipant,
    TestParticipant,
) {
    let (cmd_tx, mut rx, _output) = create_test_room(settings);
    let offerer = TestParticipant::new(Role::Offerer);
    let answerer = TestParticipant::new(Role::Answerer);

    cmd_tx.send(offerer.join()).await.unwrap();
    cmd_tx.send(answerer.join()).await.unwrap();
    next_for(&mut rx, offerer.conn).await;
    next_for(&mut rx, answerer.conn).await;

    (cmd_tx, rx, offerer, answerer)
}

#[tokio::test]
async fn test_explicit_leave_notifies_remaining_peer() {
    init_tracing();

    let (cmd_tx, mut rx, offerer, answerer) = joined_pair(RoomSettings::default()).await;

    cmd_tx
        .send(RoomCommand::Leave { conn: answerer.conn })
        .await
        .unwrap();

    let msg = next_for(&mut rx, offerer.conn).await.expect("no PeerLeft");
    assert!(
        matches!(msg, SignalMessage::PeerLeft { role: Role::Answerer, .. }),
        "got {:?}",
        msg
    );
}

#[tokio::test]
async fn test_slot_is_free_after_leave() {
    init_tracing();

    let (cmd_tx, mut rx, _offerer, answerer) = joined_pair(RoomSettings::default()).await;

    cmd_tx
        .send(RoomCommand::Leave { conn: answerer.conn })
        .await
        .unwrap();

    let newcomer = TestParticipant::new(Role::Answerer);
    cmd_tx.send(newcomer.join()).await.unwrap();
    assert!(matches!(
        next_for(&mut rx, newcomer.conn).await,
        Some(SignalMessage::JoinAck { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_dropped_socket_gets_grace_period_before_peer_left() {
    init_tracing();

    let settings = RoomSettings {
        rejoin_grace: Duration::from_secs(5),
        ..RoomSettings::default()
    };
    let (cmd_tx, mut rx, offerer, answerer) = joined_pair(settings).await;

    cmd_tx
        .send(RoomCommand::Disconnect { conn: answerer.conn })
        .await
        .unwrap();

    assert_silent(&mut rx, offerer.conn, 4000).await;

    let msg = next_for(&mut rx, offerer.conn).await.expect("no PeerLeft");
    assert!(matches!(msg, SignalMessage::PeerLeft { role: Role::Answerer, .. }));
}

#[tokio::test(start_paused = true)]
async fn test_rejoin_within_grace_keeps_session_silent() {
    init_tracing();

    let (cmd_tx, mut rx, offerer, answerer) = joined_pair(RoomSettings::default()).await;

    cmd_tx
        .send(RoomCommand::Disconnect { conn: answerer.conn })
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    let back = answerer.reconnected();
    cmd_tx.send(back.join()).await.unwrap();
    assert!(matches!(
        next_for(&mut rx, back.conn).await,
        Some(SignalMessage::JoinAck { .. })
    ));

    assert_silent(&mut rx, offerer.conn, 10_000).await;
}

#[tokio::test]
async fn test_disconnect_of_replaced_socket_is_ignored() {
    init_tracing();

    let settings = RoomSettings {
        rejoin_grace: Duration::from_millis(50),
        ..RoomSettings::default()
    };
    let (cmd_tx, mut rx, offerer, answerer) = joined_pair(settings).await;

    let back = answerer.reconnected();
    cmd_tx.send(back.join()).await.unwrap();
    next_for(&mut rx, back.conn).await;

    // The old socket closing late must not evict the new one.
    cmd_tx
        .send(RoomCommand::Disconnect { conn: answerer.conn })
        .await
        .unwrap();

    assert_silent(&mut rx, offerer.conn, 300).await;
}
