use crate::pipeline::PipelineConfig;
use crate::pipeline::delta::DeltaEncoder;
use async_trait::async_trait;
use bytes::Bytes;
use snapshell_core::Frame;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::time::sleep;
use tracing::{debug, warn};
use webrtc::data_channel::RTCDataChannel;

const DRAIN_POLL: Duration = Duration::from_millis(5);

#[derive(Debug, Error)]
#[error("frame send failed: {0}")]
pub struct SinkError(pub String);

/// Where encoded frames go. Implemented by the WebRTC data channel.
#[async_trait]
pub trait FrameSink: Send + Sync {
    /// Bytes accepted but not yet handed to the network.
    async fn pending_bytes(&self) -> usize;
    async fn send_frame(&self, data: &Bytes) -> Result<(), SinkError>;
}

#[async_trait]
impl FrameSink for RTCDataChannel {
    async fn pending_bytes(&self) -> usize {
        self.buffered_amount().await
    }

    async fn send_frame(&self, data: &Bytes) -> Result<(), SinkError> {
        self.send(data)
            .await
            .map(|_| ())
            .map_err(|e| SinkError(e.to_string()))
    }
}

/// Bounded frame queue between the encoder and the send task. Pushing
/// never waits; when full, the oldest queued frame is evicted.
#[derive(Debug)]
pub struct SendQueue {
    frames: Mutex<VecDeque<Frame>>,
    capacity: usize,
    notify: Notify,
    closed: AtomicBool,
    evicted: AtomicU64,
}

impl SendQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
            capacity: capacity.max(1),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            evicted: AtomicU64::new(0),
        }
    }

    /// Queues `frame`, returning the frame it displaced, if any.
    pub fn push(&self, frame: Frame) -> Option<Frame> {
        let displaced = {
            let mut frames = self.lock();
            let displaced = if frames.len() >= self.capacity {
                frames.pop_front()
            } else {
                None
            };
            frames.push_back(frame);
            displaced
        };

        if let Some(old) = &displaced {
            self.evicted.fetch_add(1, Ordering::Relaxed);
            debug!("Send queue full, dropped frame {}", old.seq);
        }
        self.notify.notify_one();
        displaced
    }

    /// Waits for the oldest queued frame. `None` once closed and drained.
    pub async fn pop(&self) -> Option<Frame> {
        loop {
            if let Some(frame) = self.lock().pop_front() {
                return Some(frame);
            }
            if self.is_closed() {
                return None;
            }
            self.notify.notified().await;
        }
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Frames dropped because the queue was full.
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Frame>> {
        self.frames.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Drains `queue` into `sink` until the queue is closed. Returns the
/// number of frames sent.
pub async fn run_sender(
    queue: Arc<SendQueue>,
    sink: Arc<dyn FrameSink>,
    config: PipelineConfig,
) -> u64 {
    let mut delta = config
        .delta_frames
        .then(|| DeltaEncoder::new(config.keyframe_interval));
    let mut sent = 0;

    loop {
        while sink.pending_bytes().await > config.high_water_mark {
            if queue.is_closed() {
                return sent;
            }
            sleep(DRAIN_POLL).await;
        }

        let Some(frame) = queue.pop().await else {
            break;
        };
        let seq = frame.seq;
        let wire = match delta.as_mut() {
            Some(encoder) => encoder.encode(frame),
            None => frame,
        };

        let bytes = match wire.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to serialize frame {}: {}", seq, e);
                continue;
            }
        };

        match sink.send_frame(&bytes).await {
            Ok(()) => sent += 1,
            Err(e) => {
                debug!("Dropping frame {}: {}", seq, e);
                if let Some(encoder) = delta.as_mut() {
                    encoder.reset();
                }
            }
        }
    }

    debug!("Sender finished after {} frames", sent);
    sent
}
