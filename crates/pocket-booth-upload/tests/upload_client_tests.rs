//! Integration tests for the upload client against a scripted transport.

use std::sync::{Arc, Mutex};

use pocket_booth_config::{ConfigTier, UploadConfig};
use pocket_booth_upload::{
    TransportResponse, UploadClient, UploadError, UploadRequest, UploadTransport,
};

#[derive(Debug)]
struct ScriptedTransport {
    status: u16,
    body: String,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedTransport {
    fn new(status: u16, body: &str) -> Arc<Self> {
        Arc::new(Self {
            status,
            body: body.to_string(),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().expect("calls lock").clone()
    }
}

impl UploadTransport for ScriptedTransport {
    fn post_json(&self, endpoint: &str, body: &str) -> Result<TransportResponse, UploadError> {
        self.calls
            .lock()
            .expect("calls lock")
            .push((endpoint.to_string(), body.to_string()));
        Ok(TransportResponse {
            status: self.status,
            body: self.body.clone(),
        })
    }
}

fn enabled_config() -> UploadConfig {
    UploadConfig {
        enabled: true,
        destination_id: "folder".to_string(),
        photo_limit: None,
        locked: true,
        tier: ConfigTier::KeyBased,
    }
}

const SUCCESS: &str = concat!(
    r#"{"success":true,"fileId":"f-1","fileName":"photo-strip-7.jpg","#,
    r#""webViewLink":"https://drive.example/f-1"}"#
);

#[test]
fn upload_client_tests_posts_contract_body_once() {
    let transport = ScriptedTransport::new(200, SUCCESS);
    let client = UploadClient::new("https://api.example.test/api/", transport.clone())
        .expect("client should build");

    let receipt = client
        .upload(&enabled_config(), Some("party"), b"jpeg-bytes", "photo-strip-7.jpg")
        .expect("upload should succeed");

    assert_eq!(receipt.file_id, "f-1");
    assert_eq!(receipt.web_view_link, "https://drive.example/f-1");
    assert_eq!(receipt.web_content_link, None);

    let calls = transport.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "https://api.example.test/api/upload-photo");
    let sent: UploadRequest = serde_json::from_str(&calls[0].1).expect("body should be json");
    assert_eq!(sent.key, "party");
    assert_eq!(sent.filename, "photo-strip-7.jpg");
    assert!(sent.photo_data.starts_with("data:image/jpeg;base64,"));
}

#[test]
fn upload_client_tests_404_is_configuration_not_found_and_not_retried() {
    let transport =
        ScriptedTransport::new(404, r#"{"error":"Configuration not found for this key"}"#);
    let client = UploadClient::new("https://api.example.test/api", transport.clone())
        .expect("client should build");

    let error = client
        .upload(&enabled_config(), Some("party"), b"jpeg", "a.jpg")
        .expect_err("404 should fail");

    assert!(matches!(error, UploadError::ConfigurationNotFound(_)));
    assert_eq!(transport.calls().len(), 1);
}

#[test]
fn upload_client_tests_skips_transport_when_disabled_or_keyless() {
    let transport = ScriptedTransport::new(200, SUCCESS);
    let client = UploadClient::new("https://api.example.test/api", transport.clone())
        .expect("client should build");

    assert_eq!(
        client.upload(&UploadConfig::disabled(), Some("party"), b"jpeg", "a.jpg"),
        Err(UploadError::Disabled)
    );
    assert_eq!(
        client.upload(&enabled_config(), None, b"jpeg", "a.jpg"),
        Err(UploadError::MissingKey)
    );
    assert_eq!(
        client.upload(&enabled_config(), Some("  "), b"jpeg", "a.jpg"),
        Err(UploadError::MissingKey)
    );
    assert!(transport.calls().is_empty());
}

#[test]
fn upload_client_tests_rejects_plain_http_remote_endpoint() {
    let transport = ScriptedTransport::new(200, SUCCESS);
    assert!(matches!(
        UploadClient::new("http://api.example.test/api", transport),
        Err(UploadError::InvalidEndpoint(_))
    ));
}
