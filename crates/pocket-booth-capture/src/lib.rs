#![warn(missing_docs)]
//! # pocket-booth-capture
//!
//! ## Purpose
//! Drives the camera and the timed multi-shot capture sequence.
//!
//! ## Responsibilities
//! - Define backend-agnostic camera traits ([`CameraDevice`], [`VideoStream`]).
//! - Own the live stream through [`MediaStreamHandle`], which stops the
//!   stream on every exit path including drop.
//! - Run the `Idle -> AcquiringCamera -> Countdown -> Capturing -> Complete`
//!   state machine ([`CaptureSession`]).
//! - Abstract waiting behind [`Scheduler`] so tests can use [`ManualClock`].
//! - Provide a deterministic [`SyntheticCamera`] and, with the `v4l` feature on
//!   Linux, a V4L2 webcam backend.
//!
//! ## Data flow
//! Session entry -> [`CameraDevice::open`] -> readiness + settle delay ->
//! countdown -> N shots (center crop, filter, JPEG) ->
//! [`pocket_booth_core::PhotoStrip`] appended to the gallery.
//!
//! ## Ownership and lifetimes
//! The session exclusively owns at most one [`MediaStreamHandle`]. Captured
//! frames are owned values copied out of the stream.
//!
//! ## Error model
//! Camera acquisition failures surface as [`CaptureError::DeviceAccess`] and
//! are never retried automatically. Individual shot failures surface as
//! [`CaptureError::FrameCapture`] and are handled by [`ShotFailurePolicy`].

mod clock;
mod device;
mod session;
#[cfg(all(target_os = "linux", feature = "v4l"))]
mod v4l_backend;

use pocket_booth_core::CoreError;
use thiserror::Error;

pub use clock::{ManualClock, Scheduler, SystemScheduler};
pub use device::{
    CameraDevice, MediaStreamHandle, SyntheticCamera, VideoConstraints, VideoFrame, VideoStream,
    center_crop_square,
};
pub use session::{
    CaptureSession, NoopObserver, SessionObserver, SessionSettings, SessionState,
    SessionTimings, ShotFailurePolicy, shot_offsets_ms,
};
#[cfg(all(target_os = "linux", feature = "v4l"))]
pub use v4l_backend::V4lCamera;

/// Capture layer error type.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Camera permission denied, device missing, or stream never became ready.
    #[error("camera unavailable: {0}")]
    DeviceAccess(String),
    /// One shot could not read a usable frame.
    #[error("frame capture failed: {0}")]
    FrameCapture(String),
    /// The requested transition is not legal from the current state.
    #[error("invalid session transition from {from} to {to}")]
    InvalidTransition {
        /// State name before the request.
        from: &'static str,
        /// Requested state name.
        to: &'static str,
    },
    /// The stream was already released.
    #[error("camera stream has been released")]
    StreamReleased,
    /// Strip assembly failed.
    #[error("strip assembly failed: {0}")]
    Strip(#[from] CoreError),
}
