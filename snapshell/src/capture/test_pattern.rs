use crate::capture::device::{CaptureDevice, RawFrame, ReadError};
use crate::error::CaptureError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    /// Diagonal gradient that drifts one pixel per frame.
    Gradient,
    Solid([u8; 3]),
}

/// Synthetic camera for demos and tests.
#[derive(Debug)]
pub struct TestPattern {
    width: u32,
    height: u32,
    pattern: Pattern,
    tick: u32,
    open: bool,
}

impl TestPattern {
    pub fn new(width: u32, height: u32, pattern: Pattern) -> Self {
        Self {
            width,
            height,
            pattern,
            tick: 0,
            open: false,
        }
    }
}

impl CaptureDevice for TestPattern {
    fn name(&self) -> String {
        format!("test pattern {}x{}", self.width, self.height)
    }

    fn open(&mut self) -> Result<(), CaptureError> {
        if self.width == 0 || self.height == 0 {
            return Err(CaptureError::DeviceUnavailable(
                "test pattern needs a non-zero resolution".to_string(),
            ));
        }
        self.open = true;
        Ok(())
    }

    fn read_frame(&mut self) -> Result<RawFrame, ReadError> {
        if !self.open {
            return Err(ReadError("device is not open".to_string()));
        }
        self.tick = self.tick.wrapping_add(1);

        Ok(match self.pattern {
            Pattern::Gradient => RawFrame::gradient(self.width, self.height, self.tick),
            Pattern::Solid(rgb) => RawFrame::solid(self.width, self.height, rgb),
        })
    }

    fn close(&mut self) {
        self.open = false;
    }
}
