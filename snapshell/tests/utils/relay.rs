use anyhow::Result;
use snapshell_relay::RelayConfig;
use std::time::Duration;
use tokio::net::TcpListener;

/// Starts a relay on an ephemeral port and returns its WebSocket URL.
pub async fn spawn_relay(config: RelayConfig) -> Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    tokio::spawn(async move {
        if let Err(e) = snapshell_relay::serve(listener, config).await {
            tracing::error!("[TestRelay] stopped: {:?}", e);
        }
    });

    Ok(format!("ws://{}/ws", addr))
}

/// Relay config for loopback tests: no STUN, short rejoin grace.
pub fn loopback_relay_config() -> RelayConfig {
    RelayConfig {
        ice_servers: Vec::new(),
        rejoin_grace: Duration::from_millis(500),
        ..RelayConfig::default()
    }
}

/// URL of a port nothing listens on.
pub async fn dead_relay_url() -> Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(format!("ws://{}/ws", addr))
}
