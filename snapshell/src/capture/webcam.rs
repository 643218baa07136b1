use crate::capture::device::{CaptureDevice, RawFrame, ReadError};
use crate::error::CaptureError;
use nokhwa::Camera;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution,
};
use tracing::{debug, info};

/// Platform camera through nokhwa.
pub struct Webcam {
    index: u32,
    width: u32,
    height: u32,
    fps: u32,
    camera: Option<Camera>,
}

impl Webcam {
    pub fn new(index: u32, width: u32, height: u32, fps: u32) -> Self {
        Self {
            index,
            width,
            height,
            fps,
            camera: None,
        }
    }

    fn open_with_fallback(&self) -> Result<Camera, CaptureError> {
        let resolution = Resolution::new(self.width, self.height);
        let attempts = [
            RequestedFormatType::Closest(CameraFormat::new(resolution, FrameFormat::MJPEG, self.fps)),
            RequestedFormatType::Closest(CameraFormat::new(resolution, FrameFormat::YUYV, self.fps)),
            RequestedFormatType::AbsoluteHighestFrameRate,
        ];

        let mut last_error = String::from("no formats tried");
        for requested in attempts {
            let format = RequestedFormat::new::<RgbFormat>(requested);
            match Camera::new(CameraIndex::Index(self.index), format) {
                Ok(camera) => return Ok(camera),
                Err(e) => {
                    debug!("Camera {} rejected format: {}", self.index, e);
                    last_error = e.to_string();
                }
            }
        }

        Err(CaptureError::DeviceUnavailable(format!(
            "camera {}: {}",
            self.index, last_error
        )))
    }
}

impl CaptureDevice for Webcam {
    fn name(&self) -> String {
        format!("camera {}", self.index)
    }

    fn open(&mut self) -> Result<(), CaptureError> {
        let mut camera = self.open_with_fallback()?;
        camera
            .open_stream()
            .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?;

        info!(
            "Opened camera {} at {} ({} fps)",
            self.index,
            camera.resolution(),
            camera.frame_rate()
        );
        self.camera = Some(camera);
        Ok(())
    }

    fn read_frame(&mut self) -> Result<RawFrame, ReadError> {
        let camera = self
            .camera
            .as_mut()
            .ok_or_else(|| ReadError("camera is not open".to_string()))?;

        let buffer = camera.frame().map_err(|e| ReadError(e.to_string()))?;
        let resolution = buffer.resolution();
        let decoded = buffer
            .decode_image::<RgbFormat>()
            .map_err(|e| ReadError(e.to_string()))?;

        Ok(RawFrame {
            width: resolution.width(),
            height: resolution.height(),
            data: decoded.into_raw(),
        })
    }

    fn close(&mut self) {
        if let Some(mut camera) = self.camera.take() {
            let _ = camera.stop_stream();
        }
    }
}
