#![warn(missing_docs)]
//! # pocket-booth-upload
//!
//! ## Purpose
//! Ships finished strips to the remote photo store over HTTP.
//!
//! ## Responsibilities
//! - Validate the upload endpoint (`https`, or `http` on loopback hosts).
//! - Build the JSON request with the image as a base64 JPEG data URL.
//! - Map HTTP statuses to typed [`UploadError`]s.
//! - Fingerprint payloads so each one is attempted automatically at most once
//!   ([`UploadLedger`]).
//!
//! ## Data flow
//! JPEG bytes + filename + [`pocket_booth_config::UploadConfig`] ->
//! [`UploadClient::upload`] -> [`UploadTransport::post_json`] ->
//! [`UploadReceipt`].
//!
//! ## Ownership and lifetimes
//! The client borrows payload bytes for the duration of one call. Transports
//! are shared behind `Arc` so a background worker can own a client clone.
//!
//! ## Error model
//! Every failure is returned to the caller; nothing here retries. Callers use
//! [`classify_upload_error`] to decide whether offering a manual retry makes
//! sense.
//!
//! ## Security and privacy notes
//! Image bytes and data URLs are never logged; payloads appear in logs only
//! by size and fingerprint.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use pocket_booth_config::UploadConfig;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{info, warn};
use url::{Host, Url};

/// Path appended to the API base URL.
pub const UPLOAD_PATH: &str = "upload-photo";

/// Default API base URL for local development.
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:3000/api";

/// Default request timeout.
pub const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Request body of `POST {api_base}/upload-photo`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRequest {
    /// Configuration key the server resolves credentials from.
    pub key: String,
    /// Remote file name.
    pub filename: String,
    /// `data:image/jpeg;base64,...` image.
    #[serde(rename = "photoData")]
    pub photo_data: String,
}

impl UploadRequest {
    /// Builds a request, encoding `jpeg` as a data URL.
    pub fn new(key: impl Into<String>, filename: impl Into<String>, jpeg: &[u8]) -> Self {
        Self {
            key: key.into(),
            filename: filename.into(),
            photo_data: jpeg_data_url(jpeg),
        }
    }
}

/// Encodes JPEG bytes as a `data:` URL.
pub fn jpeg_data_url(jpeg: &[u8]) -> String {
    format!("data:image/jpeg;base64,{}", STANDARD.encode(jpeg))
}

/// Success body returned by the upload endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    /// Always `true` on success.
    pub success: bool,
    /// Remote file id.
    pub file_id: String,
    /// Stored file name.
    pub file_name: String,
    /// Link to view the file.
    pub web_view_link: String,
    /// Direct download link, when provided.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_content_link: Option<String>,
}

/// Failure body returned with non-2xx statuses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadErrorBody {
    /// Short error.
    pub error: String,
    /// Optional detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Result of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    /// Remote file id.
    pub file_id: String,
    /// Stored file name.
    pub file_name: String,
    /// Link to view the file.
    pub web_view_link: String,
    /// Direct download link, when provided.
    pub web_content_link: Option<String>,
    /// Fingerprint of the uploaded payload.
    pub fingerprint: String,
}

/// Raw HTTP outcome returned by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body text.
    pub body: String,
}

/// Transport used by the upload client.
pub trait UploadTransport: Send + Sync {
    /// POSTs a JSON body and returns the raw response.
    ///
    /// # Errors
    /// Returns [`UploadError::Network`] or [`UploadError::Timeout`] when no
    /// response was received.
    fn post_json(&self, endpoint: &str, body: &str) -> Result<TransportResponse, UploadError>;
}

/// Blocking HTTP transport.
#[derive(Debug, Clone)]
pub struct HttpUploadTransport {
    client: reqwest::blocking::Client,
}

impl HttpUploadTransport {
    /// Builds a transport with the given request timeout.
    ///
    /// # Errors
    /// Returns [`UploadError::Network`] when the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self, UploadError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("pocket-booth/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| UploadError::Network(format!("http client init failed: {e}")))?;
        Ok(Self { client })
    }
}

impl UploadTransport for HttpUploadTransport {
    fn post_json(&self, endpoint: &str, body: &str) -> Result<TransportResponse, UploadError> {
        let response = self
            .client
            .post(endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body.to_string())
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    UploadError::Timeout
                } else {
                    UploadError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|e| UploadError::Network(format!("failed to read response: {e}")))?;
        Ok(TransportResponse { status, body })
    }
}

/// Upload client bound to one validated endpoint.
#[derive(Clone)]
pub struct UploadClient {
    endpoint: String,
    transport: Arc<dyn UploadTransport>,
}

impl UploadClient {
    /// Creates a client for `{api_base}/upload-photo`.
    ///
    /// # Errors
    /// Returns [`UploadError::InvalidEndpoint`] when the resulting URL is not
    /// `https` and not a loopback `http` URL.
    pub fn new(api_base: &str, transport: Arc<dyn UploadTransport>) -> Result<Self, UploadError> {
        let endpoint = format!("{}/{UPLOAD_PATH}", api_base.trim_end_matches('/'));
        validate_upload_endpoint(&endpoint)?;
        Ok(Self {
            endpoint,
            transport,
        })
    }

    /// Full upload endpoint.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Uploads one JPEG. Makes exactly one attempt.
    ///
    /// # Errors
    /// Returns [`UploadError::Disabled`] when uploads are off,
    /// [`UploadError::MissingKey`] without a configuration key, and a
    /// status-specific variant when the server rejects the request.
    pub fn upload(
        &self,
        config: &UploadConfig,
        key: Option<&str>,
        jpeg: &[u8],
        filename: &str,
    ) -> Result<UploadReceipt, UploadError> {
        if !config.enabled {
            return Err(UploadError::Disabled);
        }
        let key = key
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or(UploadError::MissingKey)?;

        let fingerprint = payload_fingerprint(key, filename, jpeg);
        let request = UploadRequest::new(key, filename, jpeg);
        let body = serde_json::to_string(&request)
            .map_err(|e| UploadError::InvalidResponse(format!("request encoding failed: {e}")))?;

        info!(
            key = %key,
            filename = %filename,
            bytes = jpeg.len(),
            fingerprint = %fingerprint,
            "uploading strip"
        );

        let response = self.transport.post_json(&self.endpoint, &body)?;
        let receipt = interpret_response(response, fingerprint)?;
        info!(file_id = %receipt.file_id, "upload complete");
        Ok(receipt)
    }
}

impl std::fmt::Debug for UploadClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadClient")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

fn interpret_response(
    response: TransportResponse,
    fingerprint: String,
) -> Result<UploadReceipt, UploadError> {
    let TransportResponse { status, body } = response;

    if (200..300).contains(&status) {
        let parsed: UploadResponse = serde_json::from_str(&body)
            .map_err(|e| UploadError::InvalidResponse(e.to_string()))?;
        if !parsed.success || parsed.file_id.trim().is_empty() {
            return Err(UploadError::InvalidResponse(
                "response did not report a stored file".to_string(),
            ));
        }
        return Ok(UploadReceipt {
            file_id: parsed.file_id,
            file_name: parsed.file_name,
            web_view_link: parsed.web_view_link,
            web_content_link: parsed.web_content_link,
            fingerprint,
        });
    }

    let detail = error_detail(&body);
    warn!(status, detail = %detail, "upload rejected");
    Err(match status {
        400 => UploadError::Rejected(detail),
        401 | 403 => UploadError::Unauthorized(status),
        404 => UploadError::ConfigurationNotFound(detail),
        500..=599 => UploadError::Server(status, detail),
        other => UploadError::UnexpectedStatus(other),
    })
}

fn error_detail(body: &str) -> String {
    match serde_json::from_str::<UploadErrorBody>(body) {
        Ok(parsed) => parsed.message.unwrap_or(parsed.error),
        Err(_) => "no error detail".to_string(),
    }
}

/// Validates the upload endpoint policy.
///
/// # Errors
/// Returns [`UploadError::InvalidEndpoint`] for unparsable URLs and for
/// plain `http` to anything but a loopback host.
pub fn validate_upload_endpoint(endpoint: &str) -> Result<(), UploadError> {
    let parsed = Url::parse(endpoint)
        .map_err(|error| UploadError::InvalidEndpoint(format!("invalid upload url: {error}")))?;

    match parsed.scheme() {
        "https" => Ok(()),
        "http" if is_loopback(&parsed) => Ok(()),
        "http" => Err(UploadError::InvalidEndpoint(
            "upload endpoint must use https outside localhost".to_string(),
        )),
        other => Err(UploadError::InvalidEndpoint(format!(
            "unsupported scheme {other}"
        ))),
    }
}

fn is_loopback(url: &Url) -> bool {
    match url.host() {
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(address)) => address.is_loopback(),
        Some(Host::Ipv6(address)) => address.is_loopback(),
        None => false,
    }
}

/// Stable SHA-256 fingerprint of one upload payload.
pub fn payload_fingerprint(key: &str, filename: &str, jpeg: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hasher.update([0]);
    hasher.update(filename.as_bytes());
    hasher.update([0]);
    hasher.update(jpeg);
    hex::encode(hasher.finalize())
}

/// Remembers which payloads were already attempted automatically.
#[derive(Debug, Default)]
pub struct UploadLedger {
    attempted: Mutex<HashSet<String>>,
}

impl UploadLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the automatic attempt for `fingerprint`.
    ///
    /// Returns `false` when it was already claimed.
    pub fn try_claim(&self, fingerprint: &str) -> bool {
        self.attempted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(fingerprint.to_string())
    }

    /// Returns `true` when `fingerprint` has been claimed.
    pub fn was_attempted(&self, fingerprint: &str) -> bool {
        self.attempted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(fingerprint)
    }
}

/// Whether a failure may succeed if the user tries again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Transient; a manual retry may succeed.
    Retriable,
    /// Retrying the same request will fail again.
    Permanent,
}

/// Classifies an upload error.
pub fn classify_upload_error(error: &UploadError) -> FailureClass {
    match error {
        UploadError::Network(_) | UploadError::Timeout | UploadError::Server(..) => {
            FailureClass::Retriable
        }
        _ => FailureClass::Permanent,
    }
}

/// Upload errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UploadError {
    /// Uploads are turned off by configuration.
    #[error("uploads are disabled")]
    Disabled,
    /// Uploading requires a key-based configuration.
    #[error("no configuration key is active")]
    MissingKey,
    /// Endpoint violates the transport policy.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
    /// No response was received.
    #[error("network failure: {0}")]
    Network(String),
    /// The request timed out.
    #[error("upload timed out")]
    Timeout,
    /// The server has no configuration for the key (404).
    #[error("no configuration found for this key: {0}")]
    ConfigurationNotFound(String),
    /// The server refused the credentials (401/403).
    #[error("upload not authorized (status {0})")]
    Unauthorized(u16),
    /// The server rejected the request as malformed (400).
    #[error("upload rejected: {0}")]
    Rejected(String),
    /// The server failed (5xx).
    #[error("server error {0}: {1}")]
    Server(u16, String),
    /// A status outside the contract.
    #[error("unexpected status {0}")]
    UnexpectedStatus(u16),
    /// A 2xx body violated the contract.
    #[error("invalid upload response: {0}")]
    InvalidResponse(String),
}
