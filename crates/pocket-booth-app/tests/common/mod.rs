//! Shared fixtures for app integration tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use pocket_booth_app::{Booth, BoothSettings, UploadPolicy};
use pocket_booth_capture::{ManualClock, SessionTimings, SyntheticCamera, VideoConstraints};
use pocket_booth_config::{ConfigError, ConfigResolver, KeyValueStore, MapConfigSource, MemoryStore};
use pocket_booth_core::StripLength;
use pocket_booth_strip::StripLayout;
use pocket_booth_upload::{TransportResponse, UploadClient, UploadError, UploadTransport};

/// Small frames and a small strip layout keep JPEG work fast.
#[allow(dead_code)]
pub fn fast_settings(shots: usize, upload_policy: UploadPolicy) -> BoothSettings {
    BoothSettings {
        strip_length: StripLength::new(shots).expect("strip length fixture should be valid"),
        constraints: VideoConstraints {
            width: 24,
            height: 16,
            audio: false,
        },
        timings: SessionTimings::default(),
        layout: StripLayout {
            photo_size: 16,
            outer_margin: 4,
            gap: 2,
            background: [0, 0, 0, 255],
        },
        upload_policy,
        ..BoothSettings::default()
    }
}

/// Builds a booth over a synthetic camera, a manual clock and memory stores.
///
/// `page_url` is applied before the booth is created.
#[allow(dead_code)]
pub fn booth_with(
    camera: &SyntheticCamera,
    configs: &[(&str, &str)],
    page_url: Option<&str>,
    settings: BoothSettings,
) -> Booth {
    booth_with_durable(
        camera,
        configs,
        page_url,
        settings,
        Arc::new(MemoryStore::new()),
    )
}

/// Same as [`booth_with`] over a caller-provided durable store.
#[allow(dead_code)]
pub fn booth_with_durable(
    camera: &SyntheticCamera,
    configs: &[(&str, &str)],
    page_url: Option<&str>,
    settings: BoothSettings,
    durable: Arc<dyn KeyValueStore>,
) -> Booth {
    let resolver = ConfigResolver::new(
        Arc::new(MemoryStore::new()),
        durable,
        Arc::new(MapConfigSource::new(configs.iter().copied())),
    );
    if let Some(page_url) = page_url {
        resolver
            .initialize_from_url(page_url)
            .expect("page url fixture should parse");
    }

    Booth::new(
        Arc::new(camera.clone()),
        Arc::new(ManualClock::new(1_700_000_000_000)),
        resolver,
        settings,
    )
}

/// Durable store whose photo counter writes always fail.
#[derive(Debug, Default)]
pub struct ReadOnlyCounterStore {
    inner: MemoryStore,
}

impl KeyValueStore for ReadOnlyCounterStore {
    fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), ConfigError> {
        if key.starts_with("photo_count_") {
            return Err(ConfigError::Storage("disk full".to_string()));
        }
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), ConfigError> {
        self.inner.remove(key)
    }
}

/// Transport replying with one fixed status and body.
#[derive(Debug)]
pub struct FixedTransport {
    status: u16,
    body: String,
    calls: Mutex<Vec<String>>,
}

impl FixedTransport {
    /// Creates a transport.
    #[allow(dead_code)]
    pub fn new(status: u16, body: &str) -> Arc<Self> {
        Arc::new(Self {
            status,
            body: body.to_string(),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Request bodies received so far.
    #[allow(dead_code)]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }
}

impl UploadTransport for FixedTransport {
    fn post_json(&self, _endpoint: &str, body: &str) -> Result<TransportResponse, UploadError> {
        self.calls.lock().expect("calls lock").push(body.to_string());
        Ok(TransportResponse {
            status: self.status,
            body: self.body.clone(),
        })
    }
}

/// Upload client over `transport`.
#[allow(dead_code)]
pub fn client_for(transport: Arc<FixedTransport>) -> UploadClient {
    UploadClient::new("https://api.example.test/api", transport).expect("client should build")
}

/// Generous wait for the upload worker.
#[allow(dead_code)]
pub const UPLOAD_WAIT: Duration = Duration::from_secs(10);

/// Successful upload body.
#[allow(dead_code)]
pub const UPLOAD_OK: &str = concat!(
    r#"{"success":true,"fileId":"remote-1","fileName":"photo-strip.jpg","#,
    r#""webViewLink":"https://drive.example/remote-1"}"#
);
