//! Integration tests for background uploads after a strip completes.

mod common;

use std::sync::Arc;

use common::{
    FixedTransport, ReadOnlyCounterStore, UPLOAD_OK, UPLOAD_WAIT, booth_with, booth_with_durable,
    client_for, fast_settings,
};
use pocket_booth_app::{AppError, BoothCommand, BoothEvent, UploadPolicy};
use pocket_booth_capture::SyntheticCamera;
use pocket_booth_config::ManualConfig;
use pocket_booth_ui::StageStatus;
use pocket_booth_upload::{UploadError, UploadRequest};

const KEYED_URL: &str = "https://booth.example/?key=party";

#[test]
fn upload_flow_tests_404_reports_missing_configuration_and_keeps_strip() {
    let camera = SyntheticCamera::new();
    let transport = FixedTransport::new(404, r#"{"error":"Configuration not found for this key"}"#);
    let mut booth = booth_with(
        &camera,
        &[("party", "true,folder")],
        Some(KEYED_URL),
        fast_settings(4, UploadPolicy::Strip),
    )
    .with_uploads(client_for(transport.clone()))
    .expect("worker should spawn");

    let event = booth.dispatch(BoothCommand::InsertCoin).expect("strip");
    let BoothEvent::StripReady { id, uploads_queued } = event else {
        panic!("expected a finished strip, got {event:?}");
    };
    assert_eq!(uploads_queued, 1);

    let outcomes = booth.wait_for_uploads(UPLOAD_WAIT);
    assert_eq!(outcomes.len(), 1);
    assert!(matches!(
        outcomes[0].result,
        Err(UploadError::ConfigurationNotFound(_))
    ));
    assert!(booth.gallery().get(id).is_some());
    assert_eq!(booth.ui().upload, StageStatus::Degraded);
    assert!(booth.receipts(id).is_empty());
}

#[test]
fn upload_flow_tests_success_records_receipt_with_strip_filename() {
    let camera = SyntheticCamera::new();
    let transport = FixedTransport::new(200, UPLOAD_OK);
    let mut booth = booth_with(
        &camera,
        &[("party", "true,folder")],
        Some(KEYED_URL),
        fast_settings(2, UploadPolicy::Strip),
    )
    .with_uploads(client_for(transport.clone()))
    .expect("worker should spawn");

    let event = booth.dispatch(BoothCommand::InsertCoin).expect("strip");
    let BoothEvent::StripReady { id, .. } = event else {
        panic!("expected a finished strip");
    };
    booth.wait_for_uploads(UPLOAD_WAIT);

    assert_eq!(booth.receipts(id).len(), 1);
    assert_eq!(booth.receipts(id)[0].web_view_link, "https://drive.example/remote-1");
    assert_eq!(booth.ui().upload, StageStatus::Healthy);

    let calls = transport.calls();
    assert_eq!(calls.len(), 1);
    let sent: UploadRequest = serde_json::from_str(&calls[0]).expect("request json");
    assert_eq!(sent.key, "party");
    assert_eq!(sent.filename, format!("photo-strip-{id}.jpg"));
}

#[test]
fn upload_flow_tests_each_photo_policy_uploads_every_shot() {
    let camera = SyntheticCamera::new();
    let transport = FixedTransport::new(200, UPLOAD_OK);
    let mut booth = booth_with(
        &camera,
        &[("party", "true,folder")],
        Some(KEYED_URL),
        fast_settings(3, UploadPolicy::EachPhoto),
    )
    .with_uploads(client_for(transport.clone()))
    .expect("worker should spawn");

    let event = booth.dispatch(BoothCommand::InsertCoin).expect("strip");
    assert!(matches!(event, BoothEvent::StripReady { uploads_queued: 3, .. }));
    assert_eq!(booth.wait_for_uploads(UPLOAD_WAIT).len(), 3);
    assert_eq!(transport.calls().len(), 3);
}

#[test]
fn upload_flow_tests_explicit_retry_sends_again() {
    let camera = SyntheticCamera::new();
    let transport = FixedTransport::new(503, r#"{"error":"Failed to upload photo"}"#);
    let mut booth = booth_with(
        &camera,
        &[("party", "true,folder")],
        Some(KEYED_URL),
        fast_settings(1, UploadPolicy::Strip),
    )
    .with_uploads(client_for(transport.clone()))
    .expect("worker should spawn");

    let event = booth.dispatch(BoothCommand::InsertCoin).expect("strip");
    let BoothEvent::StripReady { id, .. } = event else {
        panic!("expected a finished strip");
    };
    booth.wait_for_uploads(UPLOAD_WAIT);
    assert_eq!(transport.calls().len(), 1, "no automatic retry");

    assert_eq!(
        booth.dispatch(BoothCommand::RetryUpload(id)).expect("retry should queue"),
        BoothEvent::UploadQueued(id)
    );
    booth.wait_for_uploads(UPLOAD_WAIT);
    assert_eq!(transport.calls().len(), 2);
}

#[test]
fn upload_flow_tests_manual_config_without_key_does_not_upload() {
    let camera = SyntheticCamera::new();
    let transport = FixedTransport::new(200, UPLOAD_OK);
    let mut booth = booth_with(&camera, &[], None, fast_settings(1, UploadPolicy::Strip))
        .with_uploads(client_for(transport.clone()))
        .expect("worker should spawn");

    booth
        .dispatch(BoothCommand::SaveManualConfig(ManualConfig {
            enabled: true,
            destination_id: "folder".to_string(),
        }))
        .expect("manual config should save");

    let event = booth.dispatch(BoothCommand::InsertCoin).expect("strip");
    let BoothEvent::StripReady { id, uploads_queued } = event else {
        panic!("expected a finished strip, got {event:?}");
    };
    assert_eq!(uploads_queued, 0);
    assert!(matches!(
        booth.dispatch(BoothCommand::RetryUpload(id)),
        Err(AppError::Upload(UploadError::MissingKey))
    ));
    assert!(transport.calls().is_empty());
}

#[test]
fn upload_flow_tests_locked_config_rejects_manual_edit() {
    let camera = SyntheticCamera::new();
    let mut booth = booth_with(
        &camera,
        &[("party", "true,folder")],
        Some(KEYED_URL),
        fast_settings(1, UploadPolicy::Strip),
    );
    assert!(!booth.ui().settings_editable());

    let edit = ManualConfig {
        enabled: false,
        destination_id: String::new(),
    };
    assert!(matches!(
        booth.dispatch(BoothCommand::SaveManualConfig(edit.clone())),
        Err(AppError::Config(_))
    ));

    booth
        .dispatch(BoothCommand::ClearConfigKey)
        .expect("clearing the key should work");
    assert!(booth.ui().settings_editable());
    booth
        .dispatch(BoothCommand::SaveManualConfig(edit))
        .expect("manual edit allowed after clearing key");
}

#[test]
fn upload_flow_tests_counter_write_failure_still_reports_and_uploads_strip() {
    let camera = SyntheticCamera::new();
    let transport = FixedTransport::new(200, UPLOAD_OK);
    let mut booth = booth_with_durable(
        &camera,
        &[("party", "true,folder,3")],
        Some(KEYED_URL),
        fast_settings(1, UploadPolicy::Strip),
        Arc::new(ReadOnlyCounterStore::default()),
    )
    .with_uploads(client_for(transport.clone()))
    .expect("worker should spawn");

    let event = booth
        .dispatch(BoothCommand::InsertCoin)
        .expect("saved strip should be reported");
    let BoothEvent::StripReady { id, uploads_queued } = event else {
        panic!("expected a finished strip, got {event:?}");
    };
    assert_eq!(uploads_queued, 1);
    assert_eq!(booth.gallery().len(), 1);

    booth.wait_for_uploads(UPLOAD_WAIT);
    assert_eq!(transport.calls().len(), 1);
    assert_eq!(booth.receipts(id).len(), 1);
}
