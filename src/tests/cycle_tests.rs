//! # Duty Cycle Test Suite
//!
//! These tests run whole activations against fake capabilities and check the
//! contract between the stages: only an exactly complete image is rendered,
//! the battery line and the single commit happen on every cycle, and sleep is
//! armed exactly once with the configured interval.

use super::fakes::*;
use comic_frame_lib::config::Config;
use comic_frame_lib::cycle::{CycleController, CycleError, CycleState};
use comic_frame_lib::platform::WakeEdge;
use comic_frame_lib::{FetchResult, SleepDuration, WakeCause};

type Controller =
    CycleController<FakeLink, FakeTransport, RecordingPanel, FakeBattery, FakePlatform>;

fn build(config: Config, link_up: bool, transport: FakeTransport) -> Controller {
    let panel = RecordingPanel::new(config.panel.width, config.panel.height);
    CycleController::new(
        config,
        FakeLink { up: link_up },
        transport,
        panel,
        FakeBattery(Some(3.97)),
        FakePlatform::woken_by(WakeCause::Timer),
    )
}

fn controller_requests(controller: &Controller) -> usize {
    controller.transport().requests.get()
}

/// Battery line, commit and a single timer arm must happen on every cycle.
fn assert_overlay_commit_and_sleep(controller: &Controller) {
    let panel = controller.panel();
    assert_eq!(panel.printed(), vec!["Battery level: 3.97 V".to_string()]);
    assert_eq!(panel.commits(), 1, "panel must be committed exactly once");
    assert_eq!(panel.calls.last(), Some(&PanelCall::Commit), "commit comes last");
    assert_eq!(
        controller.platform().timers,
        vec![SleepDuration::from_secs(900)],
        "sleep must be armed once with the configured interval"
    );
}

/// Four bytes for a 4x2 panel arrive and the connection closes: the designed
/// success case renders every pixel pair, then overlays, commits and sleeps.
#[tokio::test(start_paused = true)]
async fn complete_image_is_rendered_then_committed() {
    let transport = FakeTransport::serving(vec![vec![0x12, 0x34], vec![0x56, 0x78]]);
    let mut controller = build(small_config(), true, transport);

    let report = controller.run_cycle().await.unwrap();

    assert_eq!(report.fetch, Some(FetchResult::new(4)));
    assert_eq!(report.expected_bytes, 4);
    assert!(report.rendered);
    assert!(report.failure.is_none());
    assert_eq!(
        report.states,
        vec![
            CycleState::Wake,
            CycleState::JoinNetwork,
            CycleState::Fetch,
            CycleState::RenderSuccess,
            CycleState::StatusOverlay,
            CycleState::ArmSleep,
        ]
    );

    assert_eq!(
        controller.panel().pixels(),
        vec![
            (0, 0, 0),
            (1, 0, 1),
            (2, 0, 1),
            (3, 0, 2),
            (0, 1, 2),
            (1, 1, 3),
            (2, 1, 3),
            (3, 1, 4),
        ]
    );
    // Pixels are set before any overlay text
    let first_text = controller
        .panel()
        .calls
        .iter()
        .position(|c| matches!(c, PanelCall::Print(_)))
        .unwrap();
    let last_pixel = controller
        .panel()
        .calls
        .iter()
        .rposition(|c| matches!(c, PanelCall::Pixel(..)))
        .unwrap();
    assert!(last_pixel < first_text);

    assert_overlay_commit_and_sleep(&controller);
}

/// A body that fills the whole buffer including the sentinel byte is longer
/// than an image and must not be rendered.
#[tokio::test(start_paused = true)]
async fn overlong_body_skips_render() {
    let transport = FakeTransport::serving(vec![vec![0xFF; 5], vec![0xFF; 3]]);
    let mut controller = build(small_config(), true, transport);

    let report = controller.run_cycle().await.unwrap();

    assert_eq!(report.fetch, Some(FetchResult::new(5)));
    assert!(!report.rendered);
    assert!(matches!(
        report.failure,
        Some(CycleError::FetchFailed {
            received: 5,
            expected: 4
        })
    ));
    assert!(report.states.contains(&CycleState::RenderSkipped));
    assert!(controller.panel().pixels().is_empty());
    assert_overlay_commit_and_sleep(&controller);
}

/// One byte short is a failed fetch, not a partial picture.
#[tokio::test(start_paused = true)]
async fn short_body_skips_render() {
    let transport = FakeTransport::serving(vec![vec![0x11, 0x22, 0x33]]);
    let mut controller = build(small_config(), true, transport);

    let report = controller.run_cycle().await.unwrap();

    assert_eq!(report.fetch, Some(FetchResult::new(3)));
    assert!(!report.rendered);
    assert!(controller.panel().pixels().is_empty());
    assert_overlay_commit_and_sleep(&controller);
}

/// A server error yields zero bytes; the cycle still shows the battery.
#[tokio::test(start_paused = true)]
async fn failed_request_still_overlays_and_sleeps() {
    let mut controller = build(small_config(), true, FakeTransport::status(500));

    let report = controller.run_cycle().await.unwrap();

    assert_eq!(report.fetch, Some(FetchResult::FAILED));
    assert!(matches!(
        report.failure,
        Some(CycleError::FetchFailed { received: 0, .. })
    ));
    assert!(controller.panel().pixels().is_empty());
    assert_overlay_commit_and_sleep(&controller);
}

/// Without a network the fetch is never attempted, but the device still
/// reports its battery and goes back to sleep.
#[tokio::test(start_paused = true)]
async fn unavailable_network_skips_fetch() {
    let transport = FakeTransport::serving(vec![vec![0x12, 0x34, 0x56, 0x78]]);
    let mut controller = build(small_config(), false, transport);

    let report = controller.run_cycle().await.unwrap();

    assert_eq!(report.fetch, None);
    assert_eq!(controller_requests(&controller), 0);
    assert!(matches!(
        report.failure,
        Some(CycleError::NetworkUnavailable(_))
    ));
    assert_eq!(
        report.states,
        vec![
            CycleState::Wake,
            CycleState::JoinNetwork,
            CycleState::RenderSkipped,
            CycleState::StatusOverlay,
            CycleState::ArmSleep,
        ]
    );
    assert_eq!(report.wake_cause, WakeCause::Timer);
    assert!(controller.panel().pixels().is_empty());
    assert_overlay_commit_and_sleep(&controller);
}

#[tokio::test(start_paused = true)]
async fn pin_wake_is_armed_only_when_configured() {
    let transport = FakeTransport::status(404);
    let mut controller = build(small_config(), true, transport);
    controller.run_cycle().await.unwrap();
    assert!(controller.platform().pins.is_empty());

    let mut config = small_config();
    config.sleep.wake_pin = Some(36);
    config.sleep.wake_edge = WakeEdge::Falling;
    let mut controller = build(config, true, FakeTransport::status(404));
    controller.run_cycle().await.unwrap();
    assert_eq!(controller.platform().pins, vec![(36, WakeEdge::Falling)]);
    assert_eq!(controller.platform().timers.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn commit_failure_does_not_block_sleep() {
    let transport = FakeTransport::serving(vec![vec![0x00; 4]]);
    let mut config = small_config();
    config.sleep.duration_secs = 60;
    let mut panel = RecordingPanel::new(4, 2);
    panel.fail_commit = true;
    let mut controller = CycleController::new(
        config,
        FakeLink { up: true },
        transport,
        panel,
        FakeBattery(Some(4.0)),
        FakePlatform::woken_by(WakeCause::ExternalPin),
    );

    let report = controller.run_cycle().await.unwrap();

    assert!(report.rendered);
    assert_eq!(report.wake_cause, WakeCause::ExternalPin);
    assert_eq!(controller.platform().timers, vec![SleepDuration::from_secs(60)]);
}

#[tokio::test(start_paused = true)]
async fn failed_battery_read_is_shown() {
    let transport = FakeTransport::status(404);
    let config = small_config();
    let mut controller = CycleController::new(
        config,
        FakeLink { up: true },
        transport,
        RecordingPanel::new(4, 2),
        FakeBattery(None),
        FakePlatform::woken_by(WakeCause::Other),
    );

    let report = controller.run_cycle().await.unwrap();

    assert_eq!(report.battery_volts, None);
    assert_eq!(
        controller.panel().printed(),
        vec!["Battery level: unknown".to_string()]
    );
    assert_eq!(controller.panel().commits(), 1);
}

#[tokio::test(start_paused = true)]
async fn timestamp_only_after_successful_render() {
    let mut config = small_config();
    config.status.show_timestamp = true;

    let transport = FakeTransport::serving(vec![vec![0x12, 0x34, 0x56, 0x78]]);
    let mut controller = build(config.clone(), true, transport);
    controller.run_cycle().await.unwrap();
    let printed = controller.panel().printed();
    assert_eq!(printed.len(), 2);
    assert!(printed[1].starts_with("Updated "));

    let mut controller = build(config, true, FakeTransport::status(503));
    controller.run_cycle().await.unwrap();
    assert_eq!(controller.panel().printed().len(), 1);
}

/// A buffer that cannot be allocated aborts the cycle before anything is
/// armed, leaving the restart to the caller.
#[tokio::test(start_paused = true)]
async fn allocation_failure_aborts_cycle() {
    let mut config = small_config();
    config.panel.width = u32::MAX - 1;
    config.panel.height = u32::MAX;
    let transport = FakeTransport::serving(Vec::new());
    let mut controller = build(config, true, transport);

    let outcome = controller.run_cycle().await;

    assert!(matches!(outcome, Err(CycleError::AllocationFailed(_))));
    assert_eq!(controller.panel().commits(), 0);
    assert!(controller.platform().timers.is_empty());
}
