use crate::capture::CaptureConfig;
use crate::capture::device::{CaptureDevice, RawFrame};
use crate::error::CaptureError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Frames as they leave the capture thread. A `DeviceLost` error is always
/// the last item.
pub type FrameStream = mpsc::Receiver<Result<RawFrame, CaptureError>>;

/// Handle to the capture thread. Dropping it stops the capture.
pub struct FrameSource {
    stop: Arc<AtomicBool>,
    device_name: String,
}

impl FrameSource {
    /// Opens the configured device and reads a first frame before returning,
    /// so a missing camera fails here with `DeviceUnavailable`.
    pub async fn start(config: CaptureConfig) -> Result<(Self, FrameStream), CaptureError> {
        let make_device = {
            let config = config.clone();
            move || config.build_device()
        };
        Self::start_with(make_device, config).await
    }

    /// Like [`FrameSource::start`] with a caller-supplied device constructor.
    pub async fn start_with<F>(
        make_device: F,
        config: CaptureConfig,
    ) -> Result<(Self, FrameStream), CaptureError>
    where
        F: FnOnce() -> Result<Box<dyn CaptureDevice>, CaptureError> + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let (frame_tx, frame_rx) = mpsc::channel(1);
        let (ready_tx, ready_rx) = oneshot::channel();

        let thread_stop = stop.clone();
        thread::Builder::new()
            .name("snapshell-capture".to_string())
            .spawn(move || run_capture_loop(make_device, config, thread_stop, frame_tx, ready_tx))
            .map_err(|e| CaptureError::DeviceUnavailable(format!("capture thread: {}", e)))?;

        let device_name = ready_rx.await.map_err(|_| {
            CaptureError::DeviceUnavailable("capture thread exited during startup".to_string())
        })??;

        info!("Capturing from {}", device_name);
        Ok((Self { stop, device_name }, frame_rx))
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_capture_loop<F>(
    make_device: F,
    config: CaptureConfig,
    stop: Arc<AtomicBool>,
    tx: mpsc::Sender<Result<RawFrame, CaptureError>>,
    ready: oneshot::Sender<Result<String, CaptureError>>,
) where
    F: FnOnce() -> Result<Box<dyn CaptureDevice>, CaptureError>,
{
    let mut device = match make_device() {
        Ok(device) => device,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    if let Err(e) = device.open() {
        let _ = ready.send(Err(e));
        return;
    }

    let first = match device.read_frame() {
        Ok(frame) => frame,
        Err(e) => {
            device.close();
            let _ = ready.send(Err(CaptureError::DeviceUnavailable(format!(
                "{} opened but produced no frame: {}",
                device.name(),
                e
            ))));
            return;
        }
    };
    let _ = ready.send(Ok(device.name()));
    deliver(&tx, first);

    let interval = Duration::from_secs_f64(1.0 / config.fps.max(1) as f64);
    let mut next_tick = Instant::now() + interval;
    let mut failures = 0u32;

    while !stop.load(Ordering::Relaxed) && !tx.is_closed() {
        let now = Instant::now();
        if next_tick > now {
            thread::sleep(next_tick - now);
        }
        next_tick = (next_tick + interval).max(Instant::now());

        match device.read_frame() {
            Ok(frame) => {
                failures = 0;
                deliver(&tx, frame);
            }
            Err(e) => {
                failures += 1;
                warn!(
                    "Read from {} failed ({}/{}): {}",
                    device.name(),
                    failures,
                    config.max_read_retries,
                    e
                );
                if failures > config.max_read_retries {
                    error!("{} lost", device.name());
                    let _ = tx.blocking_send(Err(CaptureError::DeviceLost {
                        attempts: failures,
                        reason: e.to_string(),
                    }));
                    break;
                }
            }
        }
    }

    device.close();
    debug!("Capture loop finished");
}

/// Hands a frame to the encoder unless it is still busy with the previous one.
fn deliver(tx: &mpsc::Sender<Result<RawFrame, CaptureError>>, frame: RawFrame) {
    if let Err(mpsc::error::TrySendError::Full(_)) = tx.try_send(Ok(frame)) {
        debug!("Encoder busy, dropping captured frame");
    }
}
