use crate::pipeline::delta::DeltaDecoder;
use crate::pipeline::frame_buffer::{InsertOutcome, SharedFrameBuffer};
use bytes::Bytes;
use snapshell_core::{Frame, GridSize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Decodes channel messages into full frames for the buffer. Runs until the
/// channel's inbound queue closes; returns the number of frames buffered.
pub async fn run_receiver(
    mut inbound: mpsc::Receiver<Bytes>,
    grid: GridSize,
    buffer: Arc<SharedFrameBuffer>,
) -> u64 {
    let mut decoder = DeltaDecoder::new();
    let mut buffered = 0;

    while let Some(data) = inbound.recv().await {
        let frame = match Frame::from_bytes(&data) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Dropping undecodable frame: {}", e);
                continue;
            }
        };

        if frame.grid() != grid {
            warn!(
                "Dropping {} frame {}, session grid is {}",
                frame.grid(),
                frame.seq,
                grid
            );
            continue;
        }

        let seq = frame.seq;
        let Some(frame) = decoder.apply(frame) else {
            debug!("Dropping delta {} without its base", seq);
            continue;
        };

        match buffer.insert(frame) {
            InsertOutcome::Inserted => buffered += 1,
            outcome => debug!("Frame {} not buffered: {:?}", seq, outcome),
        }
    }

    buffered
}
