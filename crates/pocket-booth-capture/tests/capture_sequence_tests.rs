//! Integration tests for the timed capture sequence.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{RecordingObserver, session_with, small_settings};
use pocket_booth_capture::{CaptureError, ManualClock, SessionState, SyntheticCamera};
use pocket_booth_core::Gallery;
use pocket_booth_filters::FilterKind;

fn ms(values: &[u64]) -> Vec<Duration> {
    values.iter().copied().map(Duration::from_millis).collect()
}

#[test]
fn capture_sequence_tests_takes_exact_shot_count_in_order() {
    for shots in 1..=4 {
        let camera = SyntheticCamera::new();
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let mut session = session_with(&camera, &clock, small_settings(shots));
        let mut gallery = Gallery::new();

        session.start().expect("session should start");
        let id = session
            .run_sequence(&mut gallery)
            .expect("sequence should complete");

        let strip = gallery.get(id).expect("strip should be in gallery");
        assert_eq!(strip.photos().len(), shots);
        assert!(
            strip
                .photos()
                .windows(2)
                .all(|pair| pair[0].captured_at_ms < pair[1].captured_at_ms)
        );
        assert!(strip.photos().iter().all(|photo| photo.width == 18 && photo.height == 18));
        assert_eq!(session.state(), &SessionState::Complete { strip: id });
    }
}

#[test]
fn capture_sequence_tests_waits_settle_countdown_and_shot_delays() {
    let camera = SyntheticCamera::new();
    let clock = Arc::new(ManualClock::new(0));
    let mut session = session_with(&camera, &clock, small_settings(2));
    let mut gallery = Gallery::new();

    session.start().expect("session should start");
    session
        .run_sequence(&mut gallery)
        .expect("sequence should complete");

    assert_eq!(
        clock.sleeps(),
        ms(&[1_000, 1_000, 1_000, 1_000, 500, 2_000, 500, 2_000])
    );
}

#[test]
fn capture_sequence_tests_emits_cues_in_order() {
    let camera = SyntheticCamera::new();
    let clock = Arc::new(ManualClock::new(0));
    let observer = Arc::new(RecordingObserver::default());
    let mut session =
        session_with(&camera, &clock, small_settings(1)).with_observer(observer.clone());
    let mut gallery = Gallery::new();

    session.start().expect("session should start");
    session
        .run_sequence(&mut gallery)
        .expect("sequence should complete");

    assert_eq!(
        observer.events(),
        vec![
            "state:acquiring_camera",
            "state:countdown",
            "countdown:3",
            "state:countdown",
            "countdown:2",
            "state:countdown",
            "countdown:1",
            "state:countdown",
            "countdown:0",
            "state:capturing",
            "flash:150",
            "shutter",
            "shot:1/1",
            "state:complete",
        ]
    );
}

#[test]
fn capture_sequence_tests_denied_camera_ends_in_error_without_stream() {
    let camera = SyntheticCamera::denying_access();
    let clock = Arc::new(ManualClock::new(0));
    let mut session = session_with(&camera, &clock, small_settings(4));

    let error = session.start().expect_err("denied camera should fail");
    assert!(matches!(error, CaptureError::DeviceAccess(_)));
    assert!(matches!(session.state(), SessionState::Error { .. }));
    assert_eq!(camera.open_streams(), 0);
    assert!(clock.sleeps().is_empty(), "no settle or retry after denial");
}

#[test]
fn capture_sequence_tests_stream_that_never_readies_is_released() {
    let camera = SyntheticCamera::never_ready();
    let clock = Arc::new(ManualClock::new(0));
    let mut session = session_with(&camera, &clock, small_settings(4));

    assert!(matches!(session.start(), Err(CaptureError::DeviceAccess(_))));
    assert_eq!(camera.open_streams(), 0);
    assert!(!session.has_active_stream());
}

#[test]
fn capture_sequence_tests_retries_a_failed_shot() {
    let camera = SyntheticCamera::new().with_failing_reads([2]);
    let clock = Arc::new(ManualClock::new(0));
    let observer = Arc::new(RecordingObserver::default());
    let mut session =
        session_with(&camera, &clock, small_settings(2)).with_observer(observer.clone());
    let mut gallery = Gallery::new();

    session.start().expect("session should start");
    let id = session
        .run_sequence(&mut gallery)
        .expect("retry should recover the shot");

    assert_eq!(gallery.get(id).map(|strip| strip.photos().len()), Some(2));
    assert!(observer.events().contains(&"failed:2#1".to_string()));
    assert!(clock.sleeps().contains(&Duration::from_millis(100)));
}

#[test]
fn capture_sequence_tests_exhausted_retries_abort_without_short_strip() {
    let camera = SyntheticCamera::new().with_failing_reads([2, 3, 4, 5]);
    let clock = Arc::new(ManualClock::new(0));
    let mut session = session_with(&camera, &clock, small_settings(3));
    let mut gallery = Gallery::new();

    session.start().expect("session should start");
    let error = session
        .run_sequence(&mut gallery)
        .expect_err("retries should be exhausted");

    assert!(matches!(error, CaptureError::FrameCapture(_)));
    assert!(gallery.is_empty());
    assert!(matches!(session.state(), SessionState::Error { .. }));
    assert_eq!(camera.open_streams(), 0);
}

#[test]
fn capture_sequence_tests_abort_policy_fails_on_first_error() {
    let camera = SyntheticCamera::new().with_failing_reads([1]);
    let clock = Arc::new(ManualClock::new(0));
    let mut settings = small_settings(4);
    settings.failure_policy = pocket_booth_capture::ShotFailurePolicy::Abort;
    let mut session = session_with(&camera, &clock, settings);
    let mut gallery = Gallery::new();

    session.start().expect("session should start");
    assert!(matches!(
        session.run_sequence(&mut gallery),
        Err(CaptureError::FrameCapture(_))
    ));
    assert!(gallery.is_empty());
    assert_eq!(camera.open_streams(), 0);
}

#[test]
fn capture_sequence_tests_take_another_reuses_the_stream() {
    let camera = SyntheticCamera::new();
    let clock = Arc::new(ManualClock::new(0));
    let mut session = session_with(&camera, &clock, small_settings(1));
    let mut gallery = Gallery::new();

    session.start().expect("session should start");
    session.run_sequence(&mut gallery).expect("first strip");
    session.take_another().expect("take another should re-enter countdown");
    assert_eq!(session.state(), &SessionState::Countdown { remaining: 3 });
    assert_eq!(camera.open_streams(), 1);

    session.run_sequence(&mut gallery).expect("second strip");
    assert_eq!(gallery.len(), 2);

    session.exit();
    assert_eq!(session.state(), &SessionState::Idle);
    assert_eq!(camera.open_streams(), 0);
}

#[test]
fn capture_sequence_tests_dropping_session_releases_camera() {
    let camera = SyntheticCamera::new();
    let clock = Arc::new(ManualClock::new(0));
    let mut session = session_with(&camera, &clock, small_settings(1));

    session.start().expect("session should start");
    assert_eq!(camera.open_streams(), 1);
    drop(session);
    assert_eq!(camera.open_streams(), 0);
}

#[test]
fn capture_sequence_tests_rejects_sequence_before_start() {
    let camera = SyntheticCamera::new();
    let clock = Arc::new(ManualClock::new(0));
    let mut session = session_with(&camera, &clock, small_settings(1));
    let mut gallery = Gallery::new();

    assert!(matches!(
        session.run_sequence(&mut gallery),
        Err(CaptureError::InvalidTransition { from: "idle", .. })
    ));
    assert_eq!(camera.open_streams(), 0);
}

#[test]
fn capture_sequence_tests_applies_selected_filter_to_every_shot() {
    let camera = SyntheticCamera::new();
    let clock = Arc::new(ManualClock::new(0));
    let mut session = session_with(&camera, &clock, small_settings(2));
    session.set_filter(FilterKind::BlackAndWhite);
    let mut gallery = Gallery::new();

    session.start().expect("session should start");
    let id = session.run_sequence(&mut gallery).expect("sequence");

    for photo in gallery.get(id).expect("strip").photos() {
        let decoded = image::load_from_memory(&photo.jpeg)
            .expect("shot should decode")
            .to_rgb8();
        for pixel in decoded.pixels() {
            let [r, g, b] = pixel.0;
            let spread = r.max(g).max(b) - r.min(g).min(b);
            assert!(spread <= 6, "grayscale shot drifted: {:?}", pixel.0);
        }
    }
}
