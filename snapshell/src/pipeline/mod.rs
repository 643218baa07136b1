//! Frames between the encoder, the data channel and the renderer.

mod delta;
mod frame_buffer;
mod inbound;
mod outbound;

pub use delta::{DeltaDecoder, DeltaEncoder};
pub use frame_buffer::{FrameBuffer, InsertOutcome, SharedFrameBuffer};
pub use inbound::run_receiver;
pub use outbound::{FrameSink, SendQueue, SinkError, run_sender};

use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Frames waiting for the send task.
    pub send_queue: usize,
    /// Data channel backlog above which sending pauses.
    pub high_water_mark: usize,
    pub delta_frames: bool,
    pub keyframe_interval: u32,
    /// Receive-side reorder window, in frames.
    pub buffer_capacity: usize,
    /// How long a missing frame is waited for.
    pub grace: Duration,
    /// Upper bound on how long the renderer sleeps between checks.
    pub refresh_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            send_queue: 2,
            high_water_mark: 256 * 1024,
            delta_frames: false,
            keyframe_interval: 30,
            buffer_capacity: 3,
            grace: Duration::from_millis(150),
            refresh_interval: Duration::from_millis(100),
        }
    }
}
