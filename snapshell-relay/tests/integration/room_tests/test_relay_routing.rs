use snapshell_core::{ErrorCode, IceCandidate, Role, SignalMessage};
use snapshell_relay::{RoomCommand, RoomSettings};

use crate::integration::{TestParticipant, create_test_room, demo_room, init_tracing};
use crate::utils::{assert_silent, next_for};

fn offer(sdp: &str) -> SignalMessage {
    SignalMessage::Offer {
        room: demo_room(),
        role: Role::Offerer,
        sdp: sdp.to_string(),
    }
}

fn candidate(role: Role, n: u16) -> SignalMessage {
    SignalMessage::Candidate {
        room: demo_room(),
        role,
        candidate: IceCandidate {
            candidate: format!("candidate:{} 1 udp 2130706431 127.0.0.1 {} typ host", n, 5000 + n),
            sdp_mid: Some("0".to_string()),
            sdp_m_line_index: Some(0),
            username_fragment: None,
        },
    }
}

#[tokio::test]
async fn test_offer_is_forwarded_to_answerer() {
    init_tracing();

    let (cmd_tx, mut rx, _output) = create_test_room(RoomSettings::default());
    let offerer = TestParticipant::new(Role::Offerer);
    let answerer = TestParticipant::new(Role::Answerer);

    cmd_tx.send(offerer.join()).await.unwrap();
    cmd_tx.send(answerer.join()).await.unwrap();
    next_for(&mut rx, offerer.conn).await;
    next_for(&mut rx, answerer.conn).await;

    cmd_tx
        .send(RoomCommand::Relay {
            conn: offerer.conn,
            message: offer("offer-sdp"),
        })
        .await
        .unwrap();

    assert_eq!(next_for(&mut rx, answerer.conn).await, Some(offer("offer-sdp")));
}

#[tokio::test]
async fn test_answerer_cannot_offer() {
    init_tracing();

    let (cmd_tx, mut rx, output) = create_test_room(RoomSettings::default());
    let offerer = TestParticipant::new(Role::Offerer);
    let answerer = TestParticipant::new(Role::Answerer);

    cmd_tx.send(offerer.join()).await.unwrap();
    cmd_tx.send(answerer.join()).await.unwrap();
    next_for(&mut rx, offerer.conn).await;
    next_for(&mut rx, answerer.conn).await;

    let reversed = SignalMessage::Offer {
        room: demo_room(),
        role: Role::Answerer,
        sdp: "reversed".to_string(),
    };
    cmd_tx
        .send(RoomCommand::Relay {
            conn: answerer.conn,
            message: reversed,
        })
        .await
        .unwrap();

    let reply = next_for(&mut rx, answerer.conn).await.expect("no reply");
    assert!(
        matches!(reply, SignalMessage::Error { code: ErrorCode::WrongRole, .. }),
        "got {:?}",
        reply
    );
    let to_offerer = output.delivered_to(offerer.conn).await;
    assert!(
        !to_offerer.iter().any(|m| matches!(m, SignalMessage::Offer { .. })),
        "reversed offer must not be routed"
    );
}

#[tokio::test]
async fn test_offerer_cannot_answer_or_impersonate() {
    init_tracing();

    let (cmd_tx, mut rx, _output) = create_test_room(RoomSettings::default());
    let offerer = TestParticipant::new(Role::Offerer);
    let answerer = TestParticipant::new(Role::Answerer);

    cmd_tx.send(offerer.join()).await.unwrap();
    cmd_tx.send(answerer.join()).await.unwrap();
    next_for(&mut rx, offerer.conn).await;
    next_for(&mut rx, answerer.conn).await;

    let forged = SignalMessage::Answer {
        room: demo_room(),
        role: Role::Answerer,
        sdp: "forged".to_string(),
    };
    cmd_tx
        .send(RoomCommand::Relay {
            conn: offerer.conn,
            message: forged,
        })
        .await
        .unwrap();

    assert!(matches!(
        next_for(&mut rx, offerer.conn).await,
        Some(SignalMessage::Error { code: ErrorCode::WrongRole, .. })
    ));
    assert_silent(&mut rx, answerer.conn, 200).await;
}

#[tokio::test]
async fn test_relay_before_join_is_rejected() {
    init_tracing();

    let (cmd_tx, mut rx, _output) = create_test_room(RoomSettings::default());
    let stranger = TestParticipant::new(Role::Offerer);
    let offerer = TestParticipant::new(Role::Offerer);

    // Keep the room alive with a real participant.
    cmd_tx.send(offerer.join()).await.unwrap();
    next_for(&mut rx, offerer.conn).await;

    cmd_tx
        .send(RoomCommand::Relay {
            conn: stranger.conn,
            message: offer("sneaky"),
        })
        .await
        .unwrap();

    assert!(matches!(
        next_for(&mut rx, stranger.conn).await,
        Some(SignalMessage::Error { code: ErrorCode::NotJoined, .. })
    ));
}

#[tokio::test]
async fn test_messages_for_absent_role_are_flushed_in_order_after_join() {
    init_tracing();

    let (cmd_tx, mut rx, _output) = create_test_room(RoomSettings::default());
    let offerer = TestParticipant::new(Role::Offerer);
    let answerer = TestParticipant::new(Role::Answerer);

    cmd_tx.send(offerer.join()).await.unwrap();
    next_for(&mut rx, offerer.conn).await;

    for message in [offer("first"), candidate(Role::Offerer, 1), candidate(Role::Offerer, 2)] {
        cmd_tx
            .send(RoomCommand::Relay {
                conn: offerer.conn,
                message,
            })
            .await
            .unwrap();
    }

    cmd_tx.send(answerer.join()).await.unwrap();

    assert!(matches!(
        next_for(&mut rx, answerer.conn).await,
        Some(SignalMessage::JoinAck { .. })
    ));
    assert_eq!(next_for(&mut rx, answerer.conn).await, Some(offer("first")));
    assert_eq!(
        next_for(&mut rx, answerer.conn).await,
        Some(candidate(Role::Offerer, 1))
    );
    assert_eq!(
        next_for(&mut rx, answerer.conn).await,
        Some(candidate(Role::Offerer, 2))
    );
}

#[tokio::test]
async fn test_new_offer_discards_stale_backlog() {
    init_tracing();

    let (cmd_tx, mut rx, _output) = create_test_room(RoomSettings::default());
    let offerer = TestParticipant::new(Role::Offerer);
    let answerer = TestParticipant::new(Role::Answerer);

    cmd_tx.send(offerer.join()).await.unwrap();
    next_for(&mut rx, offerer.conn).await;

    for message in [offer("stale"), candidate(Role::Offerer, 1), offer("fresh")] {
        cmd_tx
            .send(RoomCommand::Relay {
                conn: offerer.conn,
                message,
            })
            .await
            .unwrap();
    }

    cmd_tx.send(answerer.join()).await.unwrap();
    next_for(&mut rx, answerer.conn).await;

    assert_eq!(next_for(&mut rx, answerer.conn).await, Some(offer("fresh")));
    assert_silent(&mut rx, answerer.conn, 200).await;
}
