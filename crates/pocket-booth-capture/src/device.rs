//! Camera device traits, the owned stream handle, and the synthetic backend.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::CaptureError;

/// Stream constraints requested from a camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoConstraints {
    /// Requested frame width.
    pub width: u32,
    /// Requested frame height.
    pub height: u32,
    /// Whether audio is requested. Photo booths never need it.
    pub audio: bool,
}

impl Default for VideoConstraints {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            audio: false,
        }
    }
}

/// One full-size frame read from a live stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// RGBA bytes (`width * height * 4`).
    pub rgba: Vec<u8>,
}

/// Camera provider able to open exclusive video streams.
pub trait CameraDevice: Send + Sync {
    /// Human-readable device label.
    fn label(&self) -> String;

    /// Opens a video-only stream.
    ///
    /// # Errors
    /// Returns [`CaptureError::DeviceAccess`] when permission is denied or no
    /// device is available.
    fn open(&self, constraints: &VideoConstraints) -> Result<Box<dyn VideoStream>, CaptureError>;
}

/// Live video stream opened by a [`CameraDevice`].
pub trait VideoStream: Send {
    /// Blocks until the first frame is decodable or `timeout` elapses.
    ///
    /// # Errors
    /// Returns [`CaptureError::DeviceAccess`] when the stream never becomes
    /// ready.
    fn wait_until_ready(&mut self, timeout: Duration) -> Result<(), CaptureError>;

    /// Returns `true` when a full current frame can be read.
    fn has_enough_data(&self) -> bool;

    /// Reads the current frame.
    ///
    /// # Errors
    /// Returns [`CaptureError::FrameCapture`] when no frame is available.
    fn read_frame(&mut self) -> Result<VideoFrame, CaptureError>;

    /// Stops every track and releases the hardware. Idempotent.
    fn stop(&mut self);

    /// Returns `true` until [`VideoStream::stop`] has been called.
    fn is_active(&self) -> bool;
}

/// Exclusive owner of one live stream.
///
/// Dropping the handle stops the stream, so every exit path of a capture
/// session frees the camera.
pub struct MediaStreamHandle {
    label: String,
    stream: Option<Box<dyn VideoStream>>,
}

impl MediaStreamHandle {
    /// Wraps a freshly opened stream.
    pub fn new(label: impl Into<String>, stream: Box<dyn VideoStream>) -> Self {
        Self {
            label: label.into(),
            stream: Some(stream),
        }
    }

    /// Device label the stream was opened from.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Borrows the live stream.
    ///
    /// # Errors
    /// Returns [`CaptureError::StreamReleased`] after [`MediaStreamHandle::release`].
    pub fn stream_mut(&mut self) -> Result<&mut (dyn VideoStream + 'static), CaptureError> {
        self.stream
            .as_deref_mut()
            .ok_or(CaptureError::StreamReleased)
    }

    /// Returns `true` while the stream is held and active.
    pub fn is_active(&self) -> bool {
        self.stream.as_ref().is_some_and(|stream| stream.is_active())
    }

    /// Stops the stream. Returns `false` when it was already released.
    pub fn release(&mut self) -> bool {
        match self.stream.take() {
            Some(mut stream) => {
                stream.stop();
                info!(device = %self.label, "camera stream released");
                true
            }
            None => false,
        }
    }
}

impl Drop for MediaStreamHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for MediaStreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaStreamHandle")
            .field("label", &self.label)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Center-crops a frame to a square of side `min(width, height)`.
///
/// # Errors
/// Returns [`CaptureError::FrameCapture`] when the frame buffer does not
/// match its declared geometry.
pub fn center_crop_square(frame: &VideoFrame) -> Result<(u32, Vec<u8>), CaptureError> {
    let expected = (frame.width as usize) * (frame.height as usize) * 4;
    if frame.width == 0 || frame.height == 0 || frame.rgba.len() != expected {
        return Err(CaptureError::FrameCapture(format!(
            "frame buffer of {} bytes does not match {}x{}",
            frame.rgba.len(),
            frame.width,
            frame.height
        )));
    }

    let size = frame.width.min(frame.height);
    let sx = ((frame.width - size) / 2) as usize;
    let sy = ((frame.height - size) / 2) as usize;
    let stride = frame.width as usize * 4;
    let row_len = size as usize * 4;

    let mut square = Vec::with_capacity(row_len * size as usize);
    for y in sy..sy + size as usize {
        let offset = y * stride + sx * 4;
        square.extend_from_slice(&frame.rgba[offset..offset + row_len]);
    }

    Ok((size, square))
}

/// Deterministic camera for tests, CI and the placeholder debug mode.
///
/// Frames are gradients whose blue channel changes on every read, so
/// consecutive shots are distinguishable.
#[derive(Debug, Clone, Default)]
pub struct SyntheticCamera {
    deny_access: bool,
    never_ready: bool,
    failing_reads: BTreeSet<usize>,
    open_streams: Arc<AtomicUsize>,
}

impl SyntheticCamera {
    /// Creates a camera that always grants access.
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates a denied camera permission.
    pub fn denying_access() -> Self {
        Self {
            deny_access: true,
            ..Self::default()
        }
    }

    /// Simulates a stream that never produces a first frame.
    pub fn never_ready() -> Self {
        Self {
            never_ready: true,
            ..Self::default()
        }
    }

    /// Makes the given 1-based frame reads fail.
    pub fn with_failing_reads(mut self, reads: impl IntoIterator<Item = usize>) -> Self {
        self.failing_reads.extend(reads);
        self
    }

    /// Number of streams opened and not yet stopped.
    pub fn open_streams(&self) -> usize {
        self.open_streams.load(Ordering::SeqCst)
    }
}

impl CameraDevice for SyntheticCamera {
    fn label(&self) -> String {
        "Synthetic Camera".to_string()
    }

    fn open(&self, constraints: &VideoConstraints) -> Result<Box<dyn VideoStream>, CaptureError> {
        if self.deny_access {
            return Err(CaptureError::DeviceAccess("permission denied".to_string()));
        }
        if constraints.width == 0 || constraints.height == 0 {
            return Err(CaptureError::DeviceAccess(
                "requested resolution is empty".to_string(),
            ));
        }

        self.open_streams.fetch_add(1, Ordering::SeqCst);
        debug!(
            width = constraints.width,
            height = constraints.height,
            "synthetic stream opened"
        );

        Ok(Box::new(SyntheticStream {
            width: constraints.width,
            height: constraints.height,
            ready: !self.never_ready,
            reads: 0,
            failing_reads: self.failing_reads.clone(),
            active: AtomicBool::new(true),
            open_streams: Arc::clone(&self.open_streams),
        }))
    }
}

struct SyntheticStream {
    width: u32,
    height: u32,
    ready: bool,
    reads: usize,
    failing_reads: BTreeSet<usize>,
    active: AtomicBool,
    open_streams: Arc<AtomicUsize>,
}

impl VideoStream for SyntheticStream {
    fn wait_until_ready(&mut self, timeout: Duration) -> Result<(), CaptureError> {
        if self.ready && self.is_active() {
            Ok(())
        } else {
            Err(CaptureError::DeviceAccess(format!(
                "stream not ready after {} ms",
                timeout.as_millis()
            )))
        }
    }

    fn has_enough_data(&self) -> bool {
        self.ready && self.is_active()
    }

    fn read_frame(&mut self) -> Result<VideoFrame, CaptureError> {
        if !self.is_active() {
            return Err(CaptureError::StreamReleased);
        }

        self.reads += 1;
        if self.failing_reads.contains(&self.reads) {
            return Err(CaptureError::FrameCapture(format!(
                "synthetic read {} failed",
                self.reads
            )));
        }

        let blue = ((self.reads * 40) % 256) as u8;
        let mut rgba = Vec::with_capacity((self.width * self.height * 4) as usize);
        for y in 0..self.height {
            for x in 0..self.width {
                rgba.push((x * 255 / self.width.max(1)) as u8);
                rgba.push((y * 255 / self.height.max(1)) as u8);
                rgba.push(blue);
                rgba.push(255);
            }
        }

        Ok(VideoFrame {
            width: self.width,
            height: self.height,
            rgba,
        })
    }

    fn stop(&mut self) {
        if self.active.swap(false, Ordering::SeqCst) {
            self.open_streams.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

impl Drop for SyntheticStream {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for cropping and handle release.

    use super::*;

    #[test]
    fn crop_takes_centered_square_from_landscape_frame() {
        // 4x2 frame; each pixel's red channel is its x coordinate.
        let mut rgba = Vec::new();
        for _y in 0..2 {
            for x in 0..4_u8 {
                rgba.extend_from_slice(&[x, 0, 0, 255]);
            }
        }
        let frame = VideoFrame {
            width: 4,
            height: 2,
            rgba,
        };

        let (size, square) = center_crop_square(&frame).expect("crop should work");
        assert_eq!(size, 2);
        let reds: Vec<u8> = square.chunks_exact(4).map(|px| px[0]).collect();
        assert_eq!(reds, vec![1, 2, 1, 2]);
    }

    #[test]
    fn crop_rejects_short_buffers() {
        let frame = VideoFrame {
            width: 2,
            height: 2,
            rgba: vec![0; 4],
        };
        assert!(center_crop_square(&frame).is_err());
    }

    #[test]
    fn dropping_handle_stops_stream() {
        let camera = SyntheticCamera::new();
        let stream = camera
            .open(&VideoConstraints::default())
            .expect("stream should open");
        let handle = MediaStreamHandle::new(camera.label(), stream);
        assert!(handle.is_active());
        assert_eq!(camera.open_streams(), 1);

        drop(handle);
        assert_eq!(camera.open_streams(), 0);
    }

    #[test]
    fn denied_camera_reports_device_access() {
        let camera = SyntheticCamera::denying_access();
        let error = camera.open(&VideoConstraints::default()).err();
        assert!(matches!(error, Some(CaptureError::DeviceAccess(_))));
    }
}
