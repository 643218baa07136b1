mod device;
mod source;
mod test_pattern;
#[cfg(feature = "camera")]
mod webcam;

pub use device::{CaptureDevice, RawFrame, ReadError};
pub use source::{FrameSource, FrameStream};
pub use test_pattern::{Pattern, TestPattern};
#[cfg(feature = "camera")]
pub use webcam::Webcam;

use crate::error::CaptureError;

/// Which device the frame source opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceKind {
    Webcam { index: u32 },
    TestPattern(Pattern),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConfig {
    pub device: DeviceKind,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Consecutive failed reads tolerated before the device counts as lost.
    pub max_read_retries: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device: DeviceKind::Webcam { index: 0 },
            width: 640,
            height: 480,
            fps: 10,
            max_read_retries: 5,
        }
    }
}

impl CaptureConfig {
    /// Builds the configured device. Runs on the capture thread.
    pub fn build_device(&self) -> Result<Box<dyn CaptureDevice>, CaptureError> {
        match &self.device {
            DeviceKind::TestPattern(pattern) => {
                Ok(Box::new(TestPattern::new(self.width, self.height, *pattern)))
            }
            #[cfg(feature = "camera")]
            DeviceKind::Webcam { index } => Ok(Box::new(Webcam::new(
                *index,
                self.width,
                self.height,
                self.fps,
            ))),
            #[cfg(not(feature = "camera"))]
            DeviceKind::Webcam { index } => Err(CaptureError::DeviceUnavailable(format!(
                "camera {} requested but this build has no camera support",
                index
            ))),
        }
    }
}
