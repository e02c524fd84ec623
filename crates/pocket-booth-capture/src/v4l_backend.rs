//! V4L2 webcam backend.
//!
//! A capture thread keeps the newest decoded MJPEG frame in shared memory;
//! shots copy that frame out synchronously.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use image::ImageFormat;
use tracing::{debug, error, info, warn};
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;

use crate::device::{CameraDevice, VideoConstraints, VideoFrame, VideoStream};
use crate::CaptureError;

type SharedFrame = Arc<Mutex<Option<VideoFrame>>>;

/// Camera backed by a V4L2 device node such as `/dev/video0`.
#[derive(Debug, Clone)]
pub struct V4lCamera {
    path: String,
}

impl V4lCamera {
    /// Creates a camera for the given device node.
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl CameraDevice for V4lCamera {
    fn label(&self) -> String {
        format!("V4L2 {}", self.path)
    }

    fn open(&self, constraints: &VideoConstraints) -> Result<Box<dyn VideoStream>, CaptureError> {
        let latest: SharedFrame = Arc::new(Mutex::new(None));
        let running = Arc::new(AtomicBool::new(true));
        let (setup_tx, setup_rx) = mpsc::channel();

        let path = self.path.clone();
        let constraints = *constraints;
        let thread_latest = Arc::clone(&latest);
        let thread_running = Arc::clone(&running);
        let handle = std::thread::spawn(move || {
            if let Err(reason) =
                capture_loop(&path, constraints, thread_latest, thread_running, setup_tx)
            {
                error!(device = %path, error = %reason, "v4l capture loop failed");
            }
        });

        match setup_rx.recv_timeout(Duration::from_secs(5)) {
            Ok(Ok(())) => Ok(Box::new(V4lStream {
                latest,
                running,
                thread: Some(handle),
            })),
            Ok(Err(reason)) => {
                running.store(false, Ordering::SeqCst);
                let _ = handle.join();
                Err(CaptureError::DeviceAccess(reason))
            }
            Err(_) => {
                running.store(false, Ordering::SeqCst);
                Err(CaptureError::DeviceAccess(format!(
                    "{} did not start streaming",
                    self.path
                )))
            }
        }
    }
}

fn capture_loop(
    path: &str,
    constraints: VideoConstraints,
    latest: SharedFrame,
    running: Arc<AtomicBool>,
    setup: mpsc::Sender<Result<(), String>>,
) -> Result<(), String> {
    let mut dev = match open_device(path, constraints) {
        Ok(dev) => dev,
        Err(reason) => {
            let _ = setup.send(Err(reason.clone()));
            return Err(reason);
        }
    };

    let mut stream = match MmapStream::with_buffers(&mut dev, Type::VideoCapture, 4) {
        Ok(stream) => stream,
        Err(e) => {
            let reason = format!("failed to create buffer stream: {e}");
            let _ = setup.send(Err(reason.clone()));
            return Err(reason);
        }
    };
    let _ = setup.send(Ok(()));
    info!(device = path, "v4l capture stream started");

    while running.load(Ordering::SeqCst) {
        match stream.next() {
            Ok((buf, meta)) => match decode_mjpeg(buf) {
                Ok(frame) => {
                    if let Ok(mut slot) = latest.lock() {
                        *slot = Some(frame);
                    }
                }
                Err(reason) => debug!(
                    sequence = meta.sequence,
                    error = %reason,
                    "dropping undecodable frame"
                ),
            },
            Err(e) => {
                warn!(error = %e, "failed to dequeue v4l frame");
                std::thread::sleep(Duration::from_millis(10));
            }
        }
    }

    info!(device = path, "v4l capture loop ended");
    Ok(())
}

fn open_device(path: &str, constraints: VideoConstraints) -> Result<Device, String> {
    let dev = Device::with_path(path).map_err(|e| format!("failed to open {path}: {e}"))?;

    let mut format = dev.format().map_err(|e| format!("failed to query format: {e}"))?;
    format.width = constraints.width;
    format.height = constraints.height;
    format.fourcc = v4l::FourCC::new(b"MJPG");

    let applied = dev
        .set_format(&format)
        .map_err(|e| format!("failed to set format: {e}"))?;
    if applied.fourcc != format.fourcc {
        return Err(format!("{path} does not support MJPG capture"));
    }
    info!(
        width = applied.width,
        height = applied.height,
        fourcc = ?applied.fourcc,
        "set v4l format"
    );
    Ok(dev)
}

fn decode_mjpeg(buf: &[u8]) -> Result<VideoFrame, String> {
    let image = image::load_from_memory_with_format(buf, ImageFormat::Jpeg)
        .map_err(|e| e.to_string())?
        .to_rgba8();
    let (width, height) = image.dimensions();
    Ok(VideoFrame {
        width,
        height,
        rgba: image.into_raw(),
    })
}

struct V4lStream {
    latest: SharedFrame,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl VideoStream for V4lStream {
    fn wait_until_ready(&mut self, timeout: Duration) -> Result<(), CaptureError> {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.has_enough_data() {
                return Ok(());
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        Err(CaptureError::DeviceAccess(format!(
            "no frame within {} ms",
            timeout.as_millis()
        )))
    }

    fn has_enough_data(&self) -> bool {
        self.is_active() && self.latest.lock().is_ok_and(|slot| slot.is_some())
    }

    fn read_frame(&mut self) -> Result<VideoFrame, CaptureError> {
        if !self.is_active() {
            return Err(CaptureError::StreamReleased);
        }
        let slot = self
            .latest
            .lock()
            .map_err(|_| CaptureError::FrameCapture("frame buffer poisoned".to_string()))?;
        slot.clone()
            .ok_or_else(|| CaptureError::FrameCapture("no frame received yet".to_string()))
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                warn!("v4l capture thread panicked");
            }
        }
    }

    fn is_active(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for V4lStream {
    fn drop(&mut self) {
        self.stop();
    }
}
