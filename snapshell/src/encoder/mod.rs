//! Raw RGB frame to ASCII grid.
//!
//! The encoder is a pure function of its configuration and input: the same
//! raw frame always produces the same cells.

mod downsample;
mod ramp;

pub use downsample::{block_luminance, block_span, luminance};
pub use ramp::{DENSE_RAMP, GlyphRamp, MINIMAL_RAMP, RampError, STANDARD_RAMP};

use crate::capture::RawFrame;
use crate::error::EncodeError;
use snapshell_core::{Frame, GridSize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderConfig {
    pub grid: GridSize,
    pub ramp: GlyphRamp,
    /// Flip left and right, for a selfie view.
    pub mirror: bool,
    /// Swap dark and light, for light terminal themes.
    pub invert: bool,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            grid: GridSize::new(80, 24),
            ramp: GlyphRamp::standard(),
            mirror: false,
            invert: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AsciiEncoder {
    config: EncoderConfig,
}

impl AsciiEncoder {
    pub fn new(config: EncoderConfig) -> Result<Self, EncodeError> {
        if config.grid.width == 0 || config.grid.height == 0 {
            return Err(EncodeError::EmptyGrid);
        }
        Ok(Self { config })
    }

    pub fn grid(&self) -> GridSize {
        self.config.grid
    }

    pub fn ramp(&self) -> &GlyphRamp {
        &self.config.ramp
    }

    /// Encodes `raw` as frame number `seq`.
    pub fn encode(&self, raw: &RawFrame, seq: u64) -> Result<Frame, EncodeError> {
        let width = raw.width as usize;
        let height = raw.height as usize;
        let expected = width * height * 3;
        if width == 0 || height == 0 || raw.data.len() != expected {
            return Err(EncodeError::FrameSize {
                width: raw.width,
                height: raw.height,
                expected,
                actual: raw.data.len(),
            });
        }

        let grid = self.config.grid;
        let cols = grid.width as usize;
        let rows = grid.height as usize;
        let stride = width * 3;
        let mut cells = vec![0u8; grid.cell_count()];

        for cy in 0..rows {
            let ys = block_span(cy, rows, height);
            for cx in 0..cols {
                let xs = block_span(cx, cols, width);
                let mut l = block_luminance(&raw.data, stride, xs, ys.clone());
                if self.config.invert {
                    l = 255 - l;
                }

                let out_x = if self.config.mirror { cols - 1 - cx } else { cx };
                cells[cy * cols + out_x] = self.config.ramp.glyph(l);
            }
        }

        Ok(Frame::full(seq, grid, cells))
    }
}
