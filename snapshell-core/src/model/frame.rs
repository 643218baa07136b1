use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to encode frame: {0}")]
    Encode(postcard::Error),
    #[error("failed to decode frame: {0}")]
    Decode(postcard::Error),
    #[error("frame {seq} carries {actual} cells, expected {expected}")]
    CellCount {
        seq: u64,
        expected: usize,
        actual: usize,
    },
    #[error("frame {seq} carries non-printable byte {byte:#04x}")]
    Glyph { seq: u64, byte: u8 },
}

/// Whether `byte` may appear as a cell: printable ASCII, space included.
pub fn is_glyph(byte: u8) -> bool {
    (b' '..=b'~').contains(&byte)
}

/// Character grid dimensions, fixed for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridSize {
    pub width: u16,
    pub height: u16,
}

impl GridSize {
    pub const fn new(width: u16, height: u16) -> Self {
        Self { width, height }
    }

    pub fn cell_count(self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl fmt::Display for GridSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellChange {
    pub index: u32,
    pub glyph: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameBody {
    /// Every cell, row-major, one glyph byte per cell.
    Full {
        #[serde(with = "serde_bytes")]
        cells: Vec<u8>,
    },
    /// Cells that differ from frame `base_seq`.
    Delta {
        base_seq: u64,
        changes: Vec<CellChange>,
    },
}

/// One ASCII frame as produced by the encoder and carried on the data channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub seq: u64,
    pub width: u16,
    pub height: u16,
    pub body: FrameBody,
}

impl Frame {
    pub fn full(seq: u64, grid: GridSize, cells: Vec<u8>) -> Self {
        Self {
            seq,
            width: grid.width,
            height: grid.height,
            body: FrameBody::Full { cells },
        }
    }

    pub fn grid(&self) -> GridSize {
        GridSize::new(self.width, self.height)
    }

    pub fn is_full(&self) -> bool {
        matches!(self.body, FrameBody::Full { .. })
    }

    /// Cells of a full frame; `None` for deltas.
    pub fn cells(&self) -> Option<&[u8]> {
        match &self.body {
            FrameBody::Full { cells } => Some(cells),
            FrameBody::Delta { .. } => None,
        }
    }

    /// Rows of a full frame as byte slices.
    pub fn rows(&self) -> impl Iterator<Item = &[u8]> {
        let width = (self.width as usize).max(1);
        self.cells().unwrap_or_default().chunks(width)
    }

    pub fn to_bytes(&self) -> Result<Bytes, CodecError> {
        postcard::to_allocvec(self)
            .map(Bytes::from)
            .map_err(CodecError::Encode)
    }

    /// Decodes a frame and checks that a full body matches its dimensions
    /// and that every glyph is printable.
    pub fn from_bytes(data: &[u8]) -> Result<Self, CodecError> {
        let frame: Frame = postcard::from_bytes(data).map_err(CodecError::Decode)?;

        let bad_glyph = match &frame.body {
            FrameBody::Full { cells } => {
                let expected = frame.grid().cell_count();
                if cells.len() != expected {
                    return Err(CodecError::CellCount {
                        seq: frame.seq,
                        expected,
                        actual: cells.len(),
                    });
                }
                cells.iter().copied().find(|b| !is_glyph(*b))
            }
            FrameBody::Delta { changes, .. } => changes
                .iter()
                .map(|change| change.glyph)
                .find(|b| !is_glyph(*b)),
        };

        match bad_glyph {
            Some(byte) => Err(CodecError::Glyph {
                seq: frame.seq,
                byte,
            }),
            None => Ok(frame),
        }
    }
}
