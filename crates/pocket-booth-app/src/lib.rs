#![warn(missing_docs)]
//! # pocket-booth-app
//!
//! ## Purpose
//! Orchestrates capture, filters, strip composition, configuration, uploads
//! and UI state for `pocket-booth`.
//!
//! ## Responsibilities
//! - Hold all application state in one [`Booth`] driven by
//!   [`Booth::dispatch`].
//! - Gate new sessions on the photo quota.
//! - Count finished strips and queue them for background upload.
//! - Export strips to disk and keep upload receipts.
//!
//! ## Data flow
//! [`BoothCommand`] -> capture session -> gallery append -> quota counter ->
//! strip composition -> upload worker -> [`UploadOutcome`] -> UI projection.
//!
//! ## Ownership and lifetimes
//! The booth owns the gallery and the capture session. Upload jobs carry
//! owned copies of the encoded strip, so deleting a strip never races an
//! upload in flight.
//!
//! ## Error model
//! Subsystem failures are wrapped in [`AppError`]. Upload failures never
//! touch the gallery.

mod worker;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use pocket_booth_capture::{
    CameraDevice, CaptureError, CaptureSession, NoopObserver, Scheduler, SessionObserver,
    SessionSettings, SessionState, SessionTimings, ShotFailurePolicy, VideoConstraints,
};
use pocket_booth_config::{ConfigError, ConfigResolver, ManualConfig};
use pocket_booth_core::{CoreError, Gallery, PhotoStrip, StripId, StripLength};
use pocket_booth_filters::FilterKind;
use pocket_booth_strip::{StripError, StripLayout, compose_strip};
use pocket_booth_ui::{StageStatus, UiState};
use pocket_booth_upload::{
    DEFAULT_API_BASE_URL, DEFAULT_UPLOAD_TIMEOUT, UploadClient, UploadError, UploadLedger,
    UploadReceipt, payload_fingerprint,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use worker::{UploadJob, UploadWorker};

pub use worker::UploadOutcome;

/// Build-time application version loaded from root `VERSION` file.
pub const APP_VERSION: &str = env!("POCKET_BOOTH_VERSION");

/// Environment variable overriding the upload API base URL.
pub const API_BASE_ENV: &str = "POCKET_BOOTH_API_BASE_URL";

/// Environment variable overriding the upload timeout in seconds.
pub const UPLOAD_TIMEOUT_ENV: &str = "POCKET_BOOTH_UPLOAD_TIMEOUT_SECS";

/// Returns the app version sourced from root `VERSION`.
pub fn app_version() -> &'static str {
    APP_VERSION
}

/// Reads the upload API base URL, falling back to the local default.
pub fn api_base_url_from_env() -> String {
    match std::env::var(API_BASE_ENV) {
        Ok(value) if !value.trim().is_empty() => value.trim().to_string(),
        _ => DEFAULT_API_BASE_URL.to_string(),
    }
}

/// Reads the upload timeout.
///
/// Unset or unparsable values use the default; zero is rejected as
/// unparsable.
pub fn upload_timeout_from_env() -> Duration {
    std::env::var(UPLOAD_TIMEOUT_ENV)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map_or(DEFAULT_UPLOAD_TIMEOUT, Duration::from_secs)
}

/// What gets uploaded after a strip completes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UploadPolicy {
    /// The composited strip only.
    #[default]
    Strip,
    /// Every individual shot.
    EachPhoto,
}

/// Booth-wide settings.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BoothSettings {
    /// Shots per strip.
    pub strip_length: StripLength,
    /// Filter for the next shots.
    pub filter: FilterKind,
    /// Camera request.
    pub constraints: VideoConstraints,
    /// Sequence delays.
    pub timings: SessionTimings,
    /// Shot failure handling.
    pub failure_policy: ShotFailurePolicy,
    /// Strip geometry.
    pub layout: StripLayout,
    /// Upload granularity.
    pub upload_policy: UploadPolicy,
}

impl BoothSettings {
    fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            strip_length: self.strip_length,
            filter: self.filter,
            constraints: self.constraints,
            timings: self.timings,
            failure_policy: self.failure_policy,
        }
    }
}

/// User intents accepted by [`Booth::dispatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoothCommand {
    /// Start a new capture session and take one strip.
    InsertCoin,
    /// Take another strip with the open camera.
    TakeAnother,
    /// Leave the booth and release the camera.
    LeaveBooth,
    /// Pick the filter for the next shots.
    SelectFilter(FilterKind),
    /// Change the number of shots per strip.
    SetStripLength(usize),
    /// Remove a strip from the gallery.
    DeleteStrip(StripId),
    /// Write a strip as JPEG into a directory.
    ExportStrip {
        /// Strip to export.
        id: StripId,
        /// Target directory.
        dir: PathBuf,
    },
    /// Explicitly upload a strip again.
    RetryUpload(StripId),
    /// Save manual upload settings.
    SaveManualConfig(ManualConfig),
    /// Forget the session configuration key.
    ClearConfigKey,
}

/// Result of a dispatched command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoothEvent {
    /// A strip was added to the gallery.
    StripReady {
        /// New strip.
        id: StripId,
        /// Uploads queued for it.
        uploads_queued: usize,
    },
    /// The camera was released.
    SessionClosed,
    /// Filter changed.
    FilterSelected(FilterKind),
    /// Strip length changed.
    StripLengthChanged(usize),
    /// Strip removed.
    StripDeleted(StripId),
    /// Strip written to disk.
    StripExported(PathBuf),
    /// Upload queued on explicit request.
    UploadQueued(StripId),
    /// Manual settings stored.
    ConfigSaved,
    /// Session key forgotten.
    ConfigKeyCleared,
}

/// Application state.
pub struct Booth {
    camera: Arc<dyn CameraDevice>,
    scheduler: Arc<dyn Scheduler>,
    observer: Arc<dyn SessionObserver>,
    resolver: ConfigResolver,
    settings: BoothSettings,
    session: Option<CaptureSession>,
    gallery: Gallery,
    uploads: Option<UploadWorker>,
    ledger: UploadLedger,
    receipts: BTreeMap<StripId, Vec<UploadReceipt>>,
    ui: UiState,
}

impl Booth {
    /// Creates a booth with uploads disabled until [`Booth::with_uploads`].
    pub fn new(
        camera: Arc<dyn CameraDevice>,
        scheduler: Arc<dyn Scheduler>,
        resolver: ConfigResolver,
        settings: BoothSettings,
    ) -> Self {
        let mut booth = Self {
            camera,
            scheduler,
            observer: Arc::new(NoopObserver),
            resolver,
            settings,
            session: None,
            gallery: Gallery::new(),
            uploads: None,
            ledger: UploadLedger::new(),
            receipts: BTreeMap::new(),
            ui: UiState::new(format!("v{}", app_version())),
        };
        booth.refresh_ui();
        booth
    }

    /// Starts the background upload worker.
    ///
    /// # Errors
    /// Returns [`AppError::Io`] when the worker thread cannot be spawned.
    pub fn with_uploads(mut self, client: UploadClient) -> Result<Self, AppError> {
        let worker = UploadWorker::spawn(client).map_err(|error| AppError::Io(error.to_string()))?;
        self.uploads = Some(worker);
        Ok(self)
    }

    /// Sets the observer for flash, shutter and countdown cues.
    pub fn with_observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Current UI projection.
    pub fn ui(&self) -> &UiState {
        &self.ui
    }

    /// Finished strips.
    pub fn gallery(&self) -> &Gallery {
        &self.gallery
    }

    /// Configuration resolver.
    pub fn resolver(&self) -> &ConfigResolver {
        &self.resolver
    }

    /// Current settings.
    pub fn settings(&self) -> &BoothSettings {
        &self.settings
    }

    /// Upload receipts recorded for a strip.
    pub fn receipts(&self, id: StripId) -> &[UploadReceipt] {
        self.receipts.get(&id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Capture session state, when a session exists.
    pub fn session_state(&self) -> Option<&SessionState> {
        self.session.as_ref().map(CaptureSession::state)
    }

    /// Applies one user intent.
    ///
    /// # Errors
    /// Returns [`AppError`] describing why the command could not complete.
    /// Failed capture sessions leave the gallery untouched.
    pub fn dispatch(&mut self, command: BoothCommand) -> Result<BoothEvent, AppError> {
        debug!(?command, "dispatch");
        let result = match command {
            BoothCommand::InsertCoin => self.insert_coin(),
            BoothCommand::TakeAnother => self.take_another(),
            BoothCommand::LeaveBooth => {
                if let Some(mut session) = self.session.take() {
                    session.exit();
                }
                self.ui.apply_session(&SessionState::Idle);
                Ok(BoothEvent::SessionClosed)
            }
            BoothCommand::SelectFilter(filter) => {
                self.settings.filter = filter;
                if let Some(session) = self.session.as_mut() {
                    session.set_filter(filter);
                }
                Ok(BoothEvent::FilterSelected(filter))
            }
            BoothCommand::SetStripLength(shots) => {
                let strip_length = StripLength::new(shots)?;
                self.settings.strip_length = strip_length;
                if let Some(session) = self.session.as_mut() {
                    session.set_strip_length(strip_length);
                }
                Ok(BoothEvent::StripLengthChanged(shots))
            }
            BoothCommand::DeleteStrip(id) => {
                self.gallery.delete(id).ok_or(AppError::UnknownStrip(id))?;
                self.receipts.remove(&id);
                info!(strip = %id, remaining = self.gallery.len(), "strip deleted");
                Ok(BoothEvent::StripDeleted(id))
            }
            BoothCommand::ExportStrip { id, dir } => {
                self.export_strip(id, &dir).map(BoothEvent::StripExported)
            }
            BoothCommand::RetryUpload(id) => self.retry_upload(id),
            BoothCommand::SaveManualConfig(config) => {
                self.resolver.save_manual(&config)?;
                Ok(BoothEvent::ConfigSaved)
            }
            BoothCommand::ClearConfigKey => {
                self.resolver.clear_key()?;
                Ok(BoothEvent::ConfigKeyCleared)
            }
        };

        if let Err(error) = &result {
            warn!(%error, "command failed");
            self.ui.notice = Some(error.to_string());
        }
        self.refresh_ui();
        result
    }

    /// Collects finished uploads without blocking.
    pub fn poll_uploads(&mut self) -> Vec<UploadOutcome> {
        let outcomes = match self.uploads.as_mut() {
            Some(worker) => worker.poll(),
            None => Vec::new(),
        };
        self.record_outcomes(&outcomes);
        outcomes
    }

    /// Waits up to `timeout` for every queued upload to finish.
    pub fn wait_for_uploads(&mut self, timeout: Duration) -> Vec<UploadOutcome> {
        let outcomes = match self.uploads.as_mut() {
            Some(worker) => worker.wait(timeout),
            None => Vec::new(),
        };
        self.record_outcomes(&outcomes);
        outcomes
    }

    fn insert_coin(&mut self) -> Result<BoothEvent, AppError> {
        self.ensure_quota()?;

        if let Some(mut previous) = self.session.take() {
            previous.exit();
        }
        let session = CaptureSession::new(
            Arc::clone(&self.camera),
            Arc::clone(&self.scheduler),
            self.settings.session_settings(),
        )
        .with_observer(Arc::clone(&self.observer));
        let session = self.session.insert(session);

        let started = session.start();
        self.ui.apply_session(session.state());
        started?;

        self.run_sequence()
    }

    fn take_another(&mut self) -> Result<BoothEvent, AppError> {
        self.ensure_quota()?;
        let session = self.session.as_mut().ok_or(AppError::NoActiveSession)?;
        session.take_another()?;
        self.run_sequence()
    }

    fn ensure_quota(&self) -> Result<(), AppError> {
        if self.resolver.has_reached_photo_limit() {
            return Err(AppError::QuotaExhausted);
        }
        Ok(())
    }

    fn run_sequence(&mut self) -> Result<BoothEvent, AppError> {
        let session = self.session.as_mut().ok_or(AppError::NoActiveSession)?;
        let outcome = session.run_sequence(&mut self.gallery);
        self.ui.apply_session(session.state());
        let id = outcome?;

        match self.resolver.record_strip() {
            Ok(Some(count)) => info!(strip = %id, count, "strip counted against quota"),
            Ok(None) => {}
            Err(error) => warn!(strip = %id, %error, "photo counter not updated; strip kept"),
        }

        let uploads_queued = match self.queue_uploads(id, true) {
            Ok(queued) => queued,
            Err(error) => {
                warn!(strip = %id, %error, "strip kept locally without upload");
                0
            }
        };
        Ok(BoothEvent::StripReady { id, uploads_queued })
    }

    fn retry_upload(&mut self, id: StripId) -> Result<BoothEvent, AppError> {
        if self.gallery.get(id).is_none() {
            return Err(AppError::UnknownStrip(id));
        }
        let config = self.resolver.resolve();
        if !config.enabled {
            return Err(UploadError::Disabled.into());
        }
        if self.resolver.current_key().is_none() {
            return Err(UploadError::MissingKey.into());
        }
        if self.queue_uploads(id, false)? == 0 {
            return Err(AppError::UploadsUnavailable);
        }
        Ok(BoothEvent::UploadQueued(id))
    }

    /// Queues the payloads of `id`. Automatic uploads claim each payload in
    /// the ledger so it is attempted once; explicit retries skip the claim.
    fn queue_uploads(&mut self, id: StripId, automatic: bool) -> Result<usize, AppError> {
        let Some(worker) = self.uploads.as_mut() else {
            return Ok(0);
        };
        let config = self.resolver.resolve();
        let Some(key) = self.resolver.current_key() else {
            debug!(strip = %id, "no configuration key; skipping upload");
            return Ok(0);
        };
        if !config.enabled {
            return Ok(0);
        }
        let strip = self.gallery.get(id).ok_or(AppError::UnknownStrip(id))?;

        let payloads = match self.settings.upload_policy {
            UploadPolicy::Strip => {
                let composed = compose_strip(strip.photos(), &self.settings.layout)?;
                vec![(strip.file_name(), composed.jpeg)]
            }
            UploadPolicy::EachPhoto => strip
                .photos()
                .iter()
                .enumerate()
                .map(|(index, photo)| {
                    (format!("photo-strip-{id}-{}.jpg", index + 1), photo.jpeg.clone())
                })
                .collect(),
        };

        let mut queued = 0;
        for (filename, jpeg) in payloads {
            let fingerprint = payload_fingerprint(&key, &filename, &jpeg);
            if automatic && !self.ledger.try_claim(&fingerprint) {
                debug!(strip = %id, fingerprint = %fingerprint, "payload already attempted");
                continue;
            }
            worker.submit(UploadJob {
                strip: id,
                filename,
                jpeg,
                config: config.clone(),
                key: key.clone(),
            })?;
            queued += 1;
        }

        if queued > 0 {
            self.ui.upload = StageStatus::Running;
        }
        Ok(queued)
    }

    fn record_outcomes(&mut self, outcomes: &[UploadOutcome]) {
        for outcome in outcomes {
            match &outcome.result {
                Ok(receipt) => {
                    info!(strip = %outcome.strip, link = %receipt.web_view_link, "strip uploaded");
                    self.receipts.entry(outcome.strip).or_default().push(receipt.clone());
                    self.ui.upload = StageStatus::Healthy;
                }
                Err(error) => {
                    self.ui.upload = StageStatus::Degraded;
                    self.ui.notice = Some(format!("upload failed: {error}"));
                }
            }
        }
        if self.uploads.as_ref().is_some_and(|worker| worker.in_flight() > 0) {
            self.ui.upload = StageStatus::Running;
        }
    }

    fn export_strip(&self, id: StripId, dir: &Path) -> Result<PathBuf, AppError> {
        let strip: &PhotoStrip = self.gallery.get(id).ok_or(AppError::UnknownStrip(id))?;
        let composed = compose_strip(strip.photos(), &self.settings.layout)?;

        fs::create_dir_all(dir)
            .map_err(|error| AppError::Io(format!("{}: {error}", dir.display())))?;
        let path = dir.join(strip.file_name());
        fs::write(&path, &composed.jpeg)
            .map_err(|error| AppError::Io(format!("{}: {error}", path.display())))?;

        info!(strip = %id, path = %path.display(), bytes = composed.jpeg.len(), "strip exported");
        Ok(path)
    }

    fn refresh_ui(&mut self) {
        let config = self.resolver.resolve();
        self.ui.apply_config(
            &config,
            self.resolver.photos_remaining(),
            self.resolver.has_reached_photo_limit(),
        );
        self.ui.filter = self.settings.filter;
        self.ui.strip_length = self.settings.strip_length.get();
        self.ui.gallery_count = self.gallery.len();
    }
}

impl std::fmt::Debug for Booth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Booth")
            .field("camera", &self.camera.label())
            .field("settings", &self.settings)
            .field("session", &self.session)
            .field("gallery", &self.gallery.len())
            .field("ui", &self.ui)
            .finish_non_exhaustive()
    }
}

/// App integration error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Capture subsystem error.
    #[error("capture error: {0}")]
    Capture(#[from] CaptureError),
    /// Core model error.
    #[error("core error: {0}")]
    Core(#[from] CoreError),
    /// Strip composition error.
    #[error("strip error: {0}")]
    Strip(#[from] StripError),
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    /// Upload error.
    #[error("upload error: {0}")]
    Upload(#[from] UploadError),
    /// The photo quota is used up.
    #[error("photo limit reached")]
    QuotaExhausted,
    /// No strip with this id.
    #[error("no strip with id {0}")]
    UnknownStrip(StripId),
    /// The command needs an open capture session.
    #[error("no capture session is open")]
    NoActiveSession,
    /// Uploads were requested but no upload worker runs.
    #[error("uploads are not available")]
    UploadsUnavailable,
    /// Filesystem failure.
    #[error("io error: {0}")]
    Io(String),
}
