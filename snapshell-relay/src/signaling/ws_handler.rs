use crate::AppState;
use crate::room::RoomCommand;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use snapshell_core::{ConnectionId, ErrorCode, RoomId, SignalMessage};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let conn = ConnectionId::new();
    info!("New WebSocket connection: {:?}", conn);

    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel();

    state.signaling.add_connection(conn, tx);

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    let mut joined: Option<RoomId> = None;

    loop {
        tokio::select! {
            _ = &mut send_task => break,

            msg = receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<SignalMessage>(&text) {
                    Ok(signal) => route(&state, conn, &mut joined, signal).await,
                    Err(e) => {
                        warn!("Invalid SignalMessage from {:?}: {:?}", conn, e);
                        reject(&state, conn, ErrorCode::Malformed, &e.to_string());
                    }
                },
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            }
        }
    }

    send_task.abort();

    if let Some(room) = joined {
        state
            .rooms
            .dispatch(&room, RoomCommand::Disconnect { conn })
            .await;
    }

    state.signaling.remove_connection(&conn);
    info!("WebSocket disconnected: {:?}", conn);
}

async fn route(state: &AppState, conn: ConnectionId, joined: &mut Option<RoomId>, signal: SignalMessage) {
    debug!("{:?} -> {}", conn, signal.kind());

    match signal {
        SignalMessage::Join {
            room,
            role,
            client_id,
        } => {
            if joined.is_some() {
                reject(state, conn, ErrorCode::AlreadyJoined, "connection already joined a room");
                return;
            }
            info!("Connection {:?} wants to join room '{}' as {}", conn, room, role);
            let (accepted, decision) = oneshot::channel();
            state
                .rooms
                .dispatch(
                    &room,
                    RoomCommand::Join {
                        conn,
                        role,
                        client_id,
                        accepted,
                    },
                )
                .await;
            // A refused join leaves the socket free to try another slot.
            if decision.await.unwrap_or(false) {
                *joined = Some(room);
            }
        }

        SignalMessage::PeerLeft { ref room, .. } => {
            if joined.as_ref() != Some(room) {
                reject(state, conn, ErrorCode::RoomMismatch, "not a member of that room");
                return;
            }
            state.rooms.dispatch(room, RoomCommand::Leave { conn }).await;
            *joined = None;
        }

        message @ (SignalMessage::Offer { .. }
        | SignalMessage::Answer { .. }
        | SignalMessage::Candidate { .. }) => {
            let Some(room) = joined.as_ref() else {
                reject(state, conn, ErrorCode::NotJoined, "join the room first");
                return;
            };
            if message.room() != Some(room) {
                reject(state, conn, ErrorCode::RoomMismatch, "message addressed to another room");
                return;
            }
            state
                .rooms
                .dispatch(room, RoomCommand::Relay { conn, message })
                .await;
        }

        SignalMessage::JoinAck { .. }
        | SignalMessage::RoleOccupied { .. }
        | SignalMessage::Error { .. } => {
            reject(state, conn, ErrorCode::Malformed, "relay-only message type");
        }
    }
}

fn reject(state: &AppState, conn: ConnectionId, code: ErrorCode, message: &str) {
    state.signaling.send_signal(
        conn,
        SignalMessage::Error {
            code,
            message: message.to_string(),
        },
    );
}
