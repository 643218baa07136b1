//! Room-code rendezvous for SnapShell peers.
//!
//! Each room has an offerer slot and an answerer slot. The relay forwards
//! session descriptions and ICE candidates between them over WebSocket and
//! tells the remaining participant when the other one leaves.

mod room;
mod signaling;

pub use room::*;
pub use signaling::*;

use anyhow::Context;
use axum::routing::get;
use axum::{Json, Router};
use snapshell_core::IceServerConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;

pub const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub ice_servers: Vec<IceServerConfig>,
    pub rejoin_grace: Duration,
    pub room_idle_ttl: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec![IceServerConfig::stun(DEFAULT_STUN_SERVER)],
            rejoin_grace: Duration::from_secs(5),
            room_idle_ttl: Duration::from_secs(60),
        }
    }
}

impl RelayConfig {
    fn room_settings(&self) -> RoomSettings {
        RoomSettings {
            ice_servers: self.ice_servers.clone(),
            rejoin_grace: self.rejoin_grace,
            idle_ttl: self.room_idle_ttl,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub signaling: SignalingService,
    pub rooms: RoomManager,
}

impl AppState {
    pub fn new(config: &RelayConfig) -> Self {
        let signaling = SignalingService::new();
        let rooms = RoomManager::new(Arc::new(signaling.clone()), config.room_settings());

        Self { signaling, rooms }
    }
}

pub fn router(config: &RelayConfig) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .with_state(AppState::new(config))
}

/// Serves the relay on an already bound listener until the process exits.
pub async fn serve(listener: TcpListener, config: RelayConfig) -> anyhow::Result<()> {
    let addr = listener.local_addr().context("listener has no local address")?;
    info!("Signaling relay listening on {}", addr);

    axum::serve(listener, router(&config))
        .await
        .context("relay server failed")?;

    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "snapshell-relay",
    }))
}
