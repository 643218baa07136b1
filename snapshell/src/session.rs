//! Wires capture, encoding, the peer connection, the pipeline and the
//! renderer into one call.

use crate::capture::{CaptureConfig, FrameSource, FrameStream};
use crate::encoder::{AsciiEncoder, EncoderConfig};
use crate::error::SessionError;
use crate::peer::{CloseReason, PeerConfig, PeerConnectionManager};
use crate::pipeline::{
    FrameSink, PipelineConfig, SendQueue, SharedFrameBuffer, run_receiver, run_sender,
};
use crate::render::{TerminalRenderer, run_render_loop};
use crate::signaling::SignalingConfig;
use snapshell_core::{Role, RoomId};
use std::future::Future;
use std::io::Write;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub room: RoomId,
    pub role: Role,
    pub signaling: SignalingConfig,
    pub peer: PeerConfig,
    pub encoder: EncoderConfig,
    pub capture: CaptureConfig,
    pub pipeline: PipelineConfig,
}

impl SessionConfig {
    pub fn new(room: RoomId, role: Role) -> Self {
        Self {
            room,
            role,
            signaling: SignalingConfig::default(),
            peer: PeerConfig::default(),
            encoder: EncoderConfig::default(),
            capture: CaptureConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

/// Runs one call until either side closes, `shutdown` resolves or the
/// capture device is lost.
///
/// The capture device is opened before any network activity, so a missing
/// camera fails fast with an exit code of its own.
pub async fn run_session<W, S>(
    config: SessionConfig,
    writer: W,
    shutdown: S,
) -> Result<CloseReason, SessionError>
where
    W: Write,
    S: Future<Output = ()>,
{
    let manager = PeerConnectionManager::new(config.peer.clone());
    run_session_with(config, &manager, writer, shutdown).await
}

/// Like [`run_session`] with a caller-built peer manager, e.g. one with
/// `on_state_change` observers registered.
pub async fn run_session_with<W, S>(
    config: SessionConfig,
    manager: &PeerConnectionManager,
    writer: W,
    shutdown: S,
) -> Result<CloseReason, SessionError>
where
    W: Write,
    S: Future<Output = ()>,
{
    let encoder = AsciiEncoder::new(config.encoder.clone())?;
    let (source, mut frames) = FrameSource::start(config.capture.clone()).await?;

    tokio::pin!(shutdown);

    let channel = tokio::select! {
        connected = manager.connect(config.room.clone(), config.role, &config.signaling) => connected?,
        _ = &mut shutdown => {
            info!("Shutdown requested while connecting");
            manager.close().await;
            return Ok(CloseReason::LocalClose);
        }
    };
    info!(
        "Connected in room '{}' as {}, streaming {} frames",
        config.room,
        config.role,
        encoder.grid()
    );

    let queue = Arc::new(SendQueue::new(config.pipeline.send_queue));
    let sink: Arc<dyn FrameSink> = channel.channel.clone();
    let sender = tokio::spawn(run_sender(queue.clone(), sink, config.pipeline.clone()));

    let buffer = Arc::new(SharedFrameBuffer::new(
        config.pipeline.buffer_capacity,
        config.pipeline.grace,
    ));
    let receiver = tokio::spawn(run_receiver(
        channel.inbound,
        encoder.grid(),
        buffer.clone(),
    ));

    let mut renderer = TerminalRenderer::new(writer);
    renderer.enter()?;

    let result = {
        let render = run_render_loop(
            &mut renderer,
            buffer,
            manager.subscribe(),
            config.pipeline.refresh_interval,
        );
        let capture = pump_capture(&mut frames, &encoder, &queue);
        tokio::pin!(render, capture);

        tokio::select! {
            outcome = manager.closed() => outcome.map_err(SessionError::from),
            rendered = &mut render => match rendered {
                Ok(_) => manager.closed().await.map_err(SessionError::from),
                Err(e) => {
                    manager.close().await;
                    Err(e.into())
                }
            },
            captured = &mut capture => {
                manager.close().await;
                captured.map(|()| CloseReason::LocalClose)
            }
            _ = &mut shutdown => {
                info!("Shutdown requested");
                manager.close().await;
                manager.closed().await.map_err(SessionError::from)
            }
        }
    };

    queue.close();
    receiver.abort();
    source.stop();
    if let Ok(sent) = sender.await {
        debug!("Sent {} frames", sent);
    }
    renderer.leave()?;

    result
}

/// Local capture → encode → render loop with no network.
pub async fn run_preview<W, S>(
    capture: CaptureConfig,
    encoder: EncoderConfig,
    writer: W,
    shutdown: S,
) -> Result<(), SessionError>
where
    W: Write,
    S: Future<Output = ()>,
{
    let encoder = AsciiEncoder::new(encoder)?;
    let (source, mut frames) = FrameSource::start(capture).await?;
    let mut renderer = TerminalRenderer::new(writer);
    renderer.enter()?;

    tokio::pin!(shutdown);
    let mut seq = 0u64;

    let result = loop {
        tokio::select! {
            next = frames.recv() => match next {
                Some(Ok(raw)) => {
                    seq += 1;
                    let frame = match encoder.encode(&raw, seq) {
                        Ok(frame) => frame,
                        Err(e) => break Err(e.into()),
                    };
                    if let Err(e) = renderer.render(&frame) {
                        break Err(e.into());
                    }
                }
                Some(Err(e)) => break Err(e.into()),
                None => break Ok(()),
            },
            _ = &mut shutdown => break Ok(()),
        }
    };

    source.stop();
    renderer.leave()?;
    result
}

async fn pump_capture(
    frames: &mut FrameStream,
    encoder: &AsciiEncoder,
    queue: &SendQueue,
) -> Result<(), SessionError> {
    let mut seq = 0u64;
    while let Some(next) = frames.recv().await {
        let raw = next?;
        seq += 1;
        queue.push(encoder.encode(&raw, seq)?);
    }
    Ok(())
}
