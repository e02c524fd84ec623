//! Timed multi-shot capture state machine.

use std::sync::Arc;
use std::time::Duration;

use pocket_booth_core::{
    CaptureFrame, Gallery, PhotoStrip, SHOT_JPEG_QUALITY, StripId, StripLength, StripPhoto,
};
use pocket_booth_filters::{FilterKind, apply_filter};
use tracing::{debug, info, warn};

use crate::device::{CameraDevice, MediaStreamHandle, VideoConstraints, center_crop_square};
use crate::{CaptureError, Scheduler};

/// Delays of one capture sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimings {
    /// Wait after the stream is ready and before the first countdown tick.
    pub settle: Duration,
    /// First countdown value.
    pub countdown_from: u32,
    /// Duration of one countdown tick.
    pub countdown_tick: Duration,
    /// Wait before each shot.
    pub pre_shot: Duration,
    /// Wait after each shot, including the last one.
    pub inter_shot: Duration,
    /// Length of the flash cue reported to observers.
    pub flash: Duration,
    /// Upper bound for the first decodable frame.
    pub ready_timeout: Duration,
    /// Wait before a failed shot is attempted again.
    pub retry_delay: Duration,
}

impl Default for SessionTimings {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(1_000),
            countdown_from: 3,
            countdown_tick: Duration::from_millis(1_000),
            pre_shot: Duration::from_millis(500),
            inter_shot: Duration::from_millis(2_000),
            flash: Duration::from_millis(150),
            ready_timeout: Duration::from_secs(10),
            retry_delay: Duration::from_millis(100),
        }
    }
}

/// Offsets, in milliseconds from the start of capturing, at which each of
/// `shots` frames is read.
pub fn shot_offsets_ms(timings: &SessionTimings, shots: usize) -> Vec<u64> {
    let pre = timings.pre_shot.as_millis() as u64;
    let period = pre + timings.inter_shot.as_millis() as u64;
    (0..shots as u64).map(|index| index * period + pre).collect()
}

/// What to do when a single shot cannot read a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShotFailurePolicy {
    /// Try the same shot again up to `attempts` more times, then abort.
    Retry {
        /// Extra attempts after the first failure.
        attempts: u32,
    },
    /// Abort the session on the first failed shot.
    Abort,
}

impl Default for ShotFailurePolicy {
    fn default() -> Self {
        Self::Retry { attempts: 3 }
    }
}

/// Per-session capture settings.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SessionSettings {
    /// Shots per strip.
    pub strip_length: StripLength,
    /// Filter applied to every shot of the session.
    pub filter: FilterKind,
    /// Stream request sent to the camera.
    pub constraints: VideoConstraints,
    /// Sequence delays.
    pub timings: SessionTimings,
    /// Shot failure handling.
    pub failure_policy: ShotFailurePolicy,
}

/// Capture session state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No camera held.
    #[default]
    Idle,
    /// Waiting for the camera stream.
    AcquiringCamera,
    /// Counting down to the first shot.
    Countdown {
        /// Value currently shown.
        remaining: u32,
    },
    /// Taking shots.
    Capturing {
        /// 1-based shot in progress.
        shot: usize,
        /// Total shots of the strip.
        of: usize,
    },
    /// A strip was appended to the gallery.
    Complete {
        /// Id of the finished strip.
        strip: StripId,
    },
    /// The session failed and released the camera.
    Error {
        /// User-facing notice.
        reason: String,
    },
}

impl SessionState {
    /// Stable state name for logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::AcquiringCamera => "acquiring_camera",
            Self::Countdown { .. } => "countdown",
            Self::Capturing { .. } => "capturing",
            Self::Complete { .. } => "complete",
            Self::Error { .. } => "error",
        }
    }

    fn allows(&self, next: &SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (_, Idle) => true,
            (Idle | Error { .. }, AcquiringCamera) => true,
            (AcquiringCamera | Complete { .. }, Countdown { .. }) => true,
            (Countdown { remaining: now }, Countdown { remaining: next }) => next < now,
            (Countdown { remaining: 0 }, Capturing { .. }) => true,
            (Capturing { shot: now, .. }, Capturing { shot: next, .. }) => next > now,
            (Capturing { .. }, Complete { .. }) => true,
            (AcquiringCamera | Countdown { .. } | Capturing { .. }, Error { .. }) => true,
            _ => false,
        }
    }
}

/// Receives cues emitted while a session runs.
///
/// Every method defaults to a no-op.
pub trait SessionObserver: Send + Sync {
    /// Called after every state change.
    fn on_state(&self, _state: &SessionState) {}
    /// Called on every countdown tick, including the final zero.
    fn on_countdown(&self, _remaining: u32) {}
    /// Called after shot `shot` of `of` has been stored.
    fn on_shot(&self, _shot: usize, _of: usize) {}
    /// Flash overlay cue.
    fn on_flash(&self, _duration: Duration) {}
    /// Shutter sound cue.
    fn on_shutter(&self) {}
    /// Called for every failed attempt of a shot.
    fn on_shot_failed(&self, _shot: usize, _attempt: u32, _error: &CaptureError) {}
}

/// Observer that ignores every cue.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl SessionObserver for NoopObserver {}

/// One capture session bound to a camera.
pub struct CaptureSession {
    camera: Arc<dyn CameraDevice>,
    scheduler: Arc<dyn Scheduler>,
    observer: Arc<dyn SessionObserver>,
    settings: SessionSettings,
    state: SessionState,
    stream: Option<MediaStreamHandle>,
}

impl CaptureSession {
    /// Creates an idle session. No camera is touched until [`CaptureSession::start`].
    pub fn new(
        camera: Arc<dyn CameraDevice>,
        scheduler: Arc<dyn Scheduler>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            camera,
            scheduler,
            observer: Arc::new(NoopObserver),
            settings,
            state: SessionState::Idle,
            stream: None,
        }
    }

    /// Replaces the cue observer.
    pub fn with_observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Current state.
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Active settings.
    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Selects the filter for shots taken from now on.
    pub fn set_filter(&mut self, filter: FilterKind) {
        self.settings.filter = filter;
    }

    /// Changes the strip length for the next sequence.
    pub fn set_strip_length(&mut self, strip_length: StripLength) {
        self.settings.strip_length = strip_length;
    }

    /// Returns `true` while the session holds a live camera stream.
    pub fn has_active_stream(&self) -> bool {
        self.stream.as_ref().is_some_and(MediaStreamHandle::is_active)
    }

    /// Acquires the camera and moves to the first countdown value.
    ///
    /// # Errors
    /// Returns [`CaptureError::InvalidTransition`] unless the session is idle
    /// or failed, and [`CaptureError::DeviceAccess`] when the camera cannot be
    /// opened or never becomes ready. Access failures are not retried.
    pub fn start(&mut self) -> Result<(), CaptureError> {
        self.transition(SessionState::AcquiringCamera)?;

        match self.acquire() {
            Ok(handle) => {
                self.stream = Some(handle);
                self.scheduler.sleep(self.settings.timings.settle);
                self.transition(SessionState::Countdown {
                    remaining: self.settings.timings.countdown_from,
                })
            }
            Err(error) => Err(self.fail(error)),
        }
    }

    /// Runs the countdown and every shot, then appends the strip to `gallery`.
    ///
    /// # Errors
    /// Returns [`CaptureError::InvalidTransition`] unless a countdown is
    /// pending. Any capture failure releases the camera, discards the
    /// partial strip and moves the session to [`SessionState::Error`].
    pub fn run_sequence(&mut self, gallery: &mut Gallery) -> Result<StripId, CaptureError> {
        if !matches!(self.state, SessionState::Countdown { .. }) {
            return Err(CaptureError::InvalidTransition {
                from: self.state.name(),
                to: "capturing",
            });
        }

        match self.capture_strip() {
            Ok(strip) => {
                let id = gallery.push(strip);
                info!(strip = %id, gallery = gallery.len(), "strip added to gallery");
                self.transition(SessionState::Complete { strip: id })?;
                Ok(id)
            }
            Err(error) => Err(self.fail(error)),
        }
    }

    /// Re-enters the countdown after a finished strip, reusing the stream.
    ///
    /// # Errors
    /// Returns [`CaptureError::InvalidTransition`] outside
    /// [`SessionState::Complete`] and [`CaptureError::StreamReleased`] when
    /// the camera is no longer held.
    pub fn take_another(&mut self) -> Result<(), CaptureError> {
        if !matches!(self.state, SessionState::Complete { .. }) {
            return Err(CaptureError::InvalidTransition {
                from: self.state.name(),
                to: "countdown",
            });
        }
        if !self.has_active_stream() {
            return Err(CaptureError::StreamReleased);
        }
        self.transition(SessionState::Countdown {
            remaining: self.settings.timings.countdown_from,
        })
    }

    /// Leaves the session from any state and frees the camera.
    pub fn exit(&mut self) {
        self.release_stream();
        if self.state != SessionState::Idle {
            // Every state may return to idle.
            let _ = self.transition(SessionState::Idle);
        }
    }

    fn acquire(&self) -> Result<MediaStreamHandle, CaptureError> {
        let label = self.camera.label();
        let constraints = self.settings.constraints;
        info!(
            device = %label,
            width = constraints.width,
            height = constraints.height,
            "requesting camera"
        );

        let stream = self.camera.open(&constraints)?;
        let mut handle = MediaStreamHandle::new(label, stream);
        handle
            .stream_mut()?
            .wait_until_ready(self.settings.timings.ready_timeout)?;
        Ok(handle)
    }

    fn capture_strip(&mut self) -> Result<PhotoStrip, CaptureError> {
        let timings = self.settings.timings;
        let mut remaining = match self.state {
            SessionState::Countdown { remaining } => remaining,
            _ => timings.countdown_from,
        };

        loop {
            self.observer.on_countdown(remaining);
            if remaining == 0 {
                break;
            }
            self.scheduler.sleep(timings.countdown_tick);
            remaining -= 1;
            self.transition(SessionState::Countdown { remaining })?;
        }

        let total = self.settings.strip_length.get();
        let mut photos = Vec::with_capacity(total);
        for shot in 1..=total {
            self.transition(SessionState::Capturing { shot, of: total })?;
            self.scheduler.sleep(timings.pre_shot);

            photos.push(self.take_shot(shot)?);
            self.observer.on_flash(timings.flash);
            self.observer.on_shutter();
            self.observer.on_shot(shot, total);
            debug!(shot, of = total, "shot stored");

            self.scheduler.sleep(timings.inter_shot);
        }

        Ok(PhotoStrip::new(photos, self.scheduler.now_ms())?)
    }

    fn take_shot(&mut self, shot: usize) -> Result<StripPhoto, CaptureError> {
        let extra_attempts = match self.settings.failure_policy {
            ShotFailurePolicy::Retry { attempts } => attempts,
            ShotFailurePolicy::Abort => 0,
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.read_photo() {
                Ok(photo) => return Ok(photo),
                Err(CaptureError::FrameCapture(reason)) => {
                    let error = CaptureError::FrameCapture(reason);
                    warn!(shot, attempt, error = %error, "shot failed");
                    self.observer.on_shot_failed(shot, attempt, &error);
                    if attempt > extra_attempts {
                        return Err(error);
                    }
                    self.scheduler.sleep(self.settings.timings.retry_delay);
                }
                Err(other) => return Err(other),
            }
        }
    }

    fn read_photo(&mut self) -> Result<StripPhoto, CaptureError> {
        let filter = self.settings.filter;
        let captured_at_ms = self.scheduler.now_ms();

        let handle = self.stream.as_mut().ok_or(CaptureError::StreamReleased)?;
        let stream = handle.stream_mut()?;
        if !stream.has_enough_data() {
            return Err(CaptureError::FrameCapture(
                "video stream has no current frame".to_string(),
            ));
        }
        let frame = stream.read_frame()?;

        let (size, mut square) = center_crop_square(&frame)?;
        apply_filter(&mut square, filter)
            .map_err(|error| CaptureError::FrameCapture(error.to_string()))?;

        let frame = CaptureFrame::new(size, size, captured_at_ms, square)?;
        Ok(frame.to_jpeg(SHOT_JPEG_QUALITY)?)
    }

    fn fail(&mut self, error: CaptureError) -> CaptureError {
        self.release_stream();
        let reason = error.to_string();
        warn!(from = self.state.name(), reason = %reason, "capture session failed");
        if self.state.allows(&SessionState::Error { reason: reason.clone() }) {
            self.state = SessionState::Error { reason };
            self.observer.on_state(&self.state);
        }
        error
    }

    fn release_stream(&mut self) {
        if let Some(mut handle) = self.stream.take() {
            handle.release();
        }
    }

    fn transition(&mut self, next: SessionState) -> Result<(), CaptureError> {
        debug!(from = self.state.name(), to = next.name(), "request session transition");
        if !self.state.allows(&next) {
            warn!(
                from = self.state.name(),
                to = next.name(),
                "invalid session transition requested"
            );
            return Err(CaptureError::InvalidTransition {
                from: self.state.name(),
                to: next.name(),
            });
        }
        self.state = next;
        self.observer.on_state(&self.state);
        Ok(())
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.release_stream();
    }
}

impl std::fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSession")
            .field("camera", &self.camera.label())
            .field("settings", &self.settings)
            .field("state", &self.state)
            .field("stream", &self.stream)
            .finish()
    }
}
