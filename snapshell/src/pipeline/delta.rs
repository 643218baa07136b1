use snapshell_core::{CellChange, Frame, FrameBody};

/// Bytes a single `CellChange` costs on the wire, roughly.
const CHANGE_COST: usize = 4;

/// Turns full frames into keyframes and deltas against the last frame sent.
#[derive(Debug)]
pub struct DeltaEncoder {
    keyframe_interval: u32,
    since_keyframe: u32,
    last: Option<Frame>,
}

impl DeltaEncoder {
    pub fn new(keyframe_interval: u32) -> Self {
        Self {
            keyframe_interval: keyframe_interval.max(1),
            since_keyframe: 0,
            last: None,
        }
    }

    /// Encodes `frame`, which must be full, for the wire.
    pub fn encode(&mut self, frame: Frame) -> Frame {
        let Some(cells) = frame.cells() else {
            return frame;
        };

        let due = self.since_keyframe + 1 >= self.keyframe_interval;
        let base = self
            .last
            .as_ref()
            .filter(|prev| !due && prev.grid() == frame.grid());

        let delta = base.and_then(|prev| {
            let prev_cells = prev.cells()?;
            let changes: Vec<CellChange> = prev_cells
                .iter()
                .zip(cells)
                .enumerate()
                .filter(|(_, (old, new))| old != new)
                .map(|(index, (_, new))| CellChange {
                    index: index as u32,
                    glyph: *new,
                })
                .collect();

            (changes.len() * CHANGE_COST < cells.len()).then(|| Frame {
                seq: frame.seq,
                width: frame.width,
                height: frame.height,
                body: FrameBody::Delta {
                    base_seq: prev.seq,
                    changes,
                },
            })
        });

        match delta {
            Some(delta) => {
                self.since_keyframe += 1;
                self.last = Some(frame);
                delta
            }
            None => {
                self.since_keyframe = 0;
                self.last = Some(frame.clone());
                frame
            }
        }
    }

    /// Forces the next frame to be a keyframe, e.g. after a failed send.
    pub fn reset(&mut self) {
        self.last = None;
        self.since_keyframe = 0;
    }
}

/// Rebuilds full frames from keyframes and deltas.
#[derive(Debug, Default)]
pub struct DeltaDecoder {
    last: Option<Frame>,
}

impl DeltaDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the full frame, or `None` when a delta's base is not the
    /// frame reconstructed last.
    pub fn apply(&mut self, frame: Frame) -> Option<Frame> {
        match &frame.body {
            FrameBody::Full { .. } => {
                let newer = self.last.as_ref().is_none_or(|last| frame.seq > last.seq);
                if newer {
                    self.last = Some(frame.clone());
                }
                Some(frame)
            }
            FrameBody::Delta { base_seq, changes } => {
                let base = self
                    .last
                    .as_ref()
                    .filter(|base| base.seq == *base_seq && base.grid() == frame.grid())?;

                let mut cells = base.cells()?.to_vec();
                for change in changes {
                    let cell = cells.get_mut(change.index as usize)?;
                    *cell = change.glyph;
                }

                let full = Frame::full(frame.seq, frame.grid(), cells);
                self.last = Some(full.clone());
                Some(full)
            }
        }
    }
}
