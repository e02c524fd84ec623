#![warn(missing_docs)]
//! # pocket-booth-ui
//!
//! ## Purpose
//! Defines the UI-facing state model for `pocket-booth`.
//!
//! ## Responsibilities
//! - Project capture session state into display stages and countdown text.
//! - Project the resolved upload configuration and quota into the
//!   "insert coin" gate.
//! - Carry the viewfinder filter descriptor and upload status.
//!
//! ## Data flow
//! App dispatch results mutate [`UiState`], which front-ends render.
//!
//! ## Ownership and lifetimes
//! `UiState` owns all of its strings so reducers never borrow from the
//! session or resolver.
//!
//! ## Error model
//! This crate favors explicit state over recoverable errors. Failures arrive
//! as notices.
//!
//! ## Security and privacy notes
//! UI state holds no image bytes.

use pocket_booth_capture::SessionState;
use pocket_booth_config::{ConfigTier, UploadConfig};
use pocket_booth_filters::FilterKind;

/// Configuration origin as shown in settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiConfigState {
    /// Uploads are off.
    Disabled,
    /// Manual settings are in effect and editable.
    Manual,
    /// A key-based configuration is in effect; settings are read-only.
    Locked,
}

/// Stage shown for the capture session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiSessionStage {
    /// Landing screen.
    Idle,
    /// Waiting for the camera.
    Preparing,
    /// Countdown value on screen.
    Countdown(u32),
    /// Shot progress.
    Capturing {
        /// 1-based shot.
        shot: usize,
        /// Total shots.
        of: usize,
    },
    /// Strip preview.
    Complete,
    /// Session failed.
    Failed,
}

/// Generic stage status used for the upload flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    /// Stage has not started.
    Idle,
    /// Stage is currently running.
    Running,
    /// Stage completed successfully.
    Healthy,
    /// Stage encountered non-fatal error.
    Degraded,
}

/// Aggregate UI state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UiState {
    /// App version string sourced from root `VERSION`.
    pub version: String,
    /// Configuration origin.
    pub config: UiConfigState,
    /// Strips left under the quota; `None` when unlimited.
    pub photos_remaining: Option<u32>,
    /// Whether the quota is used up.
    pub quota_reached: bool,
    /// Capture stage.
    pub session: UiSessionStage,
    /// Selected filter.
    pub filter: FilterKind,
    /// Shots per strip.
    pub strip_length: usize,
    /// Upload stage status.
    pub upload: StageStatus,
    /// Strips in the gallery.
    pub gallery_count: usize,
    /// Last user-facing notice.
    pub notice: Option<String>,
}

impl UiState {
    /// Creates default UI state.
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            config: UiConfigState::Disabled,
            photos_remaining: None,
            quota_reached: false,
            session: UiSessionStage::Idle,
            filter: FilterKind::Normal,
            strip_length: 4,
            upload: StageStatus::Idle,
            gallery_count: 0,
            notice: None,
        }
    }

    /// Applies a freshly resolved configuration and quota snapshot.
    pub fn apply_config(
        &mut self,
        config: &UploadConfig,
        photos_remaining: Option<u32>,
        quota_reached: bool,
    ) {
        self.config = match config.tier {
            ConfigTier::KeyBased => UiConfigState::Locked,
            ConfigTier::Manual => UiConfigState::Manual,
            ConfigTier::Disabled => UiConfigState::Disabled,
        };
        self.photos_remaining = photos_remaining;
        self.quota_reached = quota_reached;
    }

    /// Applies a capture session state.
    pub fn apply_session(&mut self, state: &SessionState) {
        self.session = match state {
            SessionState::Idle => UiSessionStage::Idle,
            SessionState::AcquiringCamera => UiSessionStage::Preparing,
            SessionState::Countdown { remaining } => UiSessionStage::Countdown(*remaining),
            SessionState::Capturing { shot, of } => UiSessionStage::Capturing {
                shot: *shot,
                of: *of,
            },
            SessionState::Complete { .. } => UiSessionStage::Complete,
            SessionState::Error { reason } => {
                self.notice = Some(reason.clone());
                UiSessionStage::Failed
            }
        };
    }

    /// Returns `true` when a new session may start.
    pub fn can_insert_coin(&self) -> bool {
        !self.quota_reached
            && matches!(
                self.session,
                UiSessionStage::Idle | UiSessionStage::Complete | UiSessionStage::Failed
            )
    }

    /// Returns `true` when the settings form may be edited.
    pub fn settings_editable(&self) -> bool {
        self.config != UiConfigState::Locked
    }

    /// CSS filter string for the live viewfinder.
    pub fn viewfinder_filter(&self) -> &'static str {
        self.filter.css_descriptor()
    }

    /// Short status line for text front-ends.
    pub fn status_line(&self) -> String {
        let stage = match &self.session {
            UiSessionStage::Idle => "ready".to_string(),
            UiSessionStage::Preparing => "preparing camera".to_string(),
            UiSessionStage::Countdown(0) => "smile!".to_string(),
            UiSessionStage::Countdown(remaining) => format!("{remaining}..."),
            UiSessionStage::Capturing { shot, of } => format!("photo {shot} of {of}"),
            UiSessionStage::Complete => "strip ready".to_string(),
            UiSessionStage::Failed => "camera error".to_string(),
        };
        let quota = match self.photos_remaining {
            Some(remaining) => format!(", {remaining} left"),
            None => String::new(),
        };
        format!(
            "[{}] {stage} | filter {} | gallery {}{quota}",
            self.version,
            self.filter.display_name(),
            self.gallery_count
        )
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for UI state gates.

    use super::*;

    #[test]
    fn exhausted_quota_disables_insert_coin() {
        let mut state = UiState::new("v0.1.0");
        assert!(state.can_insert_coin());

        let config = UploadConfig {
            enabled: true,
            destination_id: "folder".to_string(),
            photo_limit: Some(3),
            locked: true,
            tier: ConfigTier::KeyBased,
        };
        state.apply_config(&config, Some(0), true);

        assert!(!state.can_insert_coin());
        assert!(!state.settings_editable());
    }

    #[test]
    fn running_session_blocks_insert_coin() {
        let mut state = UiState::new("v0.1.0");
        state.apply_session(&SessionState::Capturing { shot: 2, of: 4 });
        assert!(!state.can_insert_coin());
        assert!(state.status_line().contains("photo 2 of 4"));
    }

    #[test]
    fn session_error_becomes_notice() {
        let mut state = UiState::new("v0.1.0");
        state.apply_session(&SessionState::Error {
            reason: "camera unavailable: permission denied".to_string(),
        });
        assert_eq!(state.session, UiSessionStage::Failed);
        assert_eq!(
            state.notice.as_deref(),
            Some("camera unavailable: permission denied")
        );
    }

    #[test]
    fn viewfinder_follows_filter() {
        let mut state = UiState::new("v0.1.0");
        state.filter = FilterKind::BlackAndWhite;
        assert_eq!(state.viewfinder_filter(), "grayscale(100%)");
    }
}
