use crate::error::CaptureError;
use thiserror::Error;

/// A transient read failure. The frame source decides when it becomes fatal.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ReadError(pub String);

/// Packed RGB8 pixels straight from a capture device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl RawFrame {
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let data = rgb
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 3)
            .collect();
        Self {
            width,
            height,
            data,
        }
    }

    /// Diagonal luminance gradient shifted by `phase`.
    pub fn gradient(width: u32, height: u32, phase: u32) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize * 3);
        let span = (width + height).max(1);
        for y in 0..height {
            for x in 0..width {
                let v = (((x + y + phase) % span) * 255 / span) as u8;
                data.extend_from_slice(&[v, v, v]);
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, rgb: [u8; 3]) {
        let i = (y as usize * self.width as usize + x as usize) * 3;
        self.data[i..i + 3].copy_from_slice(&rgb);
    }
}

/// Camera-like source of raw frames. Implementations are created and used
/// on the capture thread, so they need not be `Send`.
pub trait CaptureDevice {
    fn name(&self) -> String;

    fn open(&mut self) -> Result<(), CaptureError>;

    fn read_frame(&mut self) -> Result<RawFrame, ReadError>;

    fn close(&mut self);
}
