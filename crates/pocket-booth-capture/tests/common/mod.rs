//! Shared fixtures for capture integration tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use pocket_booth_capture::{
    CaptureSession, ManualClock, SessionObserver, SessionSettings, SessionState, SessionTimings,
    SyntheticCamera, VideoConstraints,
};
use pocket_booth_core::StripLength;

/// Builds settings with a small frame so JPEG work stays fast.
#[allow(dead_code)]
pub fn small_settings(shots: usize) -> SessionSettings {
    SessionSettings {
        strip_length: StripLength::new(shots).expect("strip length fixture should be valid"),
        constraints: VideoConstraints {
            width: 32,
            height: 18,
            audio: false,
        },
        timings: SessionTimings::default(),
        ..SessionSettings::default()
    }
}

/// Builds a session over a synthetic camera and a manual clock.
#[allow(dead_code)]
pub fn session_with(
    camera: &SyntheticCamera,
    clock: &Arc<ManualClock>,
    settings: SessionSettings,
) -> CaptureSession {
    CaptureSession::new(Arc::new(camera.clone()), clock.clone(), settings)
}

/// Observer that records every cue as a short string.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<String>>,
}

impl RecordingObserver {
    /// Recorded cues in order.
    #[allow(dead_code)]
    pub fn events(&self) -> Vec<String> {
        self.events.lock().expect("observer lock").clone()
    }

    fn push(&self, event: String) {
        self.events.lock().expect("observer lock").push(event);
    }
}

impl SessionObserver for RecordingObserver {
    fn on_state(&self, state: &SessionState) {
        self.push(format!("state:{}", state.name()));
    }

    fn on_countdown(&self, remaining: u32) {
        self.push(format!("countdown:{remaining}"));
    }

    fn on_shot(&self, shot: usize, of: usize) {
        self.push(format!("shot:{shot}/{of}"));
    }

    fn on_flash(&self, duration: Duration) {
        self.push(format!("flash:{}", duration.as_millis()));
    }

    fn on_shutter(&self) {
        self.push("shutter".to_string());
    }

    fn on_shot_failed(
        &self,
        shot: usize,
        attempt: u32,
        _error: &pocket_booth_capture::CaptureError,
    ) {
        self.push(format!("failed:{shot}#{attempt}"));
    }
}
