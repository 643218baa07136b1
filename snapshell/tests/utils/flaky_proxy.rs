use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::copy_bidirectional;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

/// TCP forwarder in front of a relay whose link can be cut and restored.
/// While cut, live connections are dropped and new ones are refused.
pub struct FlakyProxy {
    addr: SocketAddr,
    up: Arc<AtomicBool>,
    epoch: watch::Sender<u64>,
}

impl FlakyProxy {
    pub async fn start(relay_url: &str) -> Result<Self> {
        let upstream = relay_url
            .trim_start_matches("ws://")
            .trim_end_matches("/ws")
            .parse::<SocketAddr>()?;
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let up = Arc::new(AtomicBool::new(true));
        let (epoch, _) = watch::channel(0u64);

        let accept_up = up.clone();
        let accept_epoch = epoch.subscribe();
        tokio::spawn(async move {
            while let Ok((client, _)) = listener.accept().await {
                if !accept_up.load(Ordering::SeqCst) {
                    drop(client);
                    continue;
                }
                let mut epoch = accept_epoch.clone();
                epoch.borrow_and_update();
                tokio::spawn(forward(client, upstream, epoch));
            }
        });

        Ok(Self { addr, up, epoch })
    }

    pub fn url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// Drops every forwarded connection and refuses new ones.
    pub fn cut(&self) {
        self.up.store(false, Ordering::SeqCst);
        self.epoch.send_modify(|e| *e += 1);
    }

    pub fn restore(&self) {
        self.up.store(true, Ordering::SeqCst);
    }
}

async fn forward(mut client: TcpStream, upstream: SocketAddr, mut epoch: watch::Receiver<u64>) {
    let Ok(mut relay) = TcpStream::connect(upstream).await else {
        return;
    };
    tokio::select! {
        _ = copy_bidirectional(&mut client, &mut relay) => {}
        _ = epoch.changed() => {}
    }
}
