//! Discovery session lifecycle tests
//!
//! Sessions run against the in-memory platform with tokio's clock paused, so the 30 second
//! discovery timer elapses instantly once every task is idle.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bluescan_core::{
    BluescanError, DiscoveryConfig, DiscoveryController, Notification, NotificationClass,
    OperationMode, PlatformOperation, PropertyMap, PropertyValue, SessionEnd, SessionState,
    SimulatedPlatform,
};

const SPEAKER: &str = "A4:93:3F:5B:3D:84";
const BAND: &str = "F0:99:B6:12:7C:0E";

fn device_props(address: &str, rssi: i16) -> PropertyMap {
    let mut props = PropertyMap::new();
    props.insert("Address".to_string(), address.into());
    props.insert("RSSI".to_string(), rssi.into());
    props
}

fn controller(platform: &Arc<SimulatedPlatform>) -> DiscoveryController<SimulatedPlatform> {
    DiscoveryController::new(Arc::clone(platform), DiscoveryConfig::default())
}

/// Record every property set handed to the new device callback
fn capture_found(
    controller: &DiscoveryController<SimulatedPlatform>,
) -> Arc<Mutex<Vec<PropertyMap>>> {
    let found = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&found);
    controller.set_on_new_device_found(move |props| sink.lock().unwrap().push(props.clone()));
    found
}

/// Let the session worker drain pending notifications
async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

fn assert_unsubscribed(platform: &SimulatedPlatform) {
    for class in NotificationClass::ALL {
        assert_eq!(platform.subscriber_count(class), 0, "{} still subscribed", class);
    }
}

#[tokio::test(start_paused = true)]
async fn test_scan_all_session_runs_until_timeout() {
    let platform = Arc::new(SimulatedPlatform::new());
    let path = platform.device_path(SPEAKER);
    platform.insert_device(path.clone(), device_props(SPEAKER, -58));

    let controller = controller(&platform);
    let found = capture_found(&controller);

    controller.start("scan-all").await.unwrap();
    assert_eq!(controller.state(), SessionState::Running);
    assert_eq!(controller.mode(), Some(OperationMode::ScanAll));
    assert!(platform.adapter_snapshot().discovering);
    for class in NotificationClass::ALL {
        assert_eq!(platform.subscriber_count(class), 1);
    }

    assert_eq!(
        platform.inject(Notification::device_added(&path, PropertyMap::new())),
        1
    );
    settle().await;

    assert_eq!(controller.device_count().await, 1);
    {
        let found = found.lock().unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["Address"].as_str(), Some(SPEAKER));
        assert_eq!(found[0]["RSSI"], PropertyValue::Int(-58));
    }

    tokio::time::sleep(Duration::from_secs(31)).await;

    assert_eq!(controller.state(), SessionState::Idle);
    let summary = controller.last_summary().expect("summary after timeout");
    assert_eq!(summary.end, SessionEnd::Timeout);
    assert_eq!(summary.devices_found, 1);
    assert!(!summary.discovering);
    assert!(summary.elapsed >= Duration::from_secs(30));

    assert_eq!(controller.device_count().await, 0);
    assert!(controller.mode().is_none());
    assert_eq!(platform.call_count(PlatformOperation::StopDiscovery), 1);
    assert_unsubscribed(&platform);
    assert_eq!(found.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_devices_found_by_discovery_reach_callback() {
    let platform = Arc::new(SimulatedPlatform::demo());
    let controller = controller(&platform);
    let found = capture_found(&controller);

    controller.start_mode(OperationMode::ScanAll).await.unwrap();
    settle().await;

    assert_eq!(found.lock().unwrap().len(), 3);
    assert_eq!(controller.device_count().await, 3);
    assert_eq!(controller.devices().await.len(), 3);

    let summary = controller.wait_idle().await.unwrap();
    assert_eq!(summary.devices_found, 3);
}

#[tokio::test(start_paused = true)]
async fn test_stop_tears_down_once() {
    let platform = Arc::new(SimulatedPlatform::new());
    let controller = controller(&platform);

    controller.start("scan-all").await.unwrap();
    let summary = controller.stop().await.expect("active session");

    assert_eq!(summary.end, SessionEnd::Stopped);
    assert_eq!(controller.state(), SessionState::Idle);
    assert_unsubscribed(&platform);
    assert!(!platform.adapter_snapshot().discovering);

    // Second stop has nothing to tear down
    assert!(controller.stop().await.is_none());
    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(platform.call_count(PlatformOperation::StopDiscovery), 1);
}

#[tokio::test]
async fn test_stop_when_idle_touches_nothing() {
    let platform = Arc::new(SimulatedPlatform::new());
    let controller = controller(&platform);

    assert!(controller.stop().await.is_none());
    assert!(platform.calls().is_empty());
    assert_eq!(controller.state(), SessionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_restart_replaces_active_session() {
    let platform = Arc::new(SimulatedPlatform::new());
    let path = platform.device_path(SPEAKER);
    platform.insert_device(path.clone(), device_props(SPEAKER, -58));
    let controller = controller(&platform);

    controller.start("scan-all").await.unwrap();
    platform.inject(Notification::device_added(&path, PropertyMap::new()));
    settle().await;
    assert_eq!(controller.device_count().await, 1);

    controller.start("scan-all").await.unwrap();

    let replaced = controller.last_summary().expect("replaced session summary");
    assert_eq!(replaced.end, SessionEnd::Stopped);
    assert_eq!(replaced.devices_found, 1);

    assert_eq!(controller.state(), SessionState::Running);
    assert_eq!(controller.device_count().await, 0);
    for class in NotificationClass::ALL {
        assert_eq!(platform.subscriber_count(class), 1);
    }
    assert_eq!(platform.call_count(PlatformOperation::StartDiscovery), 2);
    assert_eq!(platform.call_count(PlatformOperation::StopDiscovery), 1);
}

#[tokio::test(start_paused = true)]
async fn test_counter_follows_added_and_removed() {
    let platform = Arc::new(SimulatedPlatform::new());
    let speaker = platform.device_path(SPEAKER);
    let band = platform.device_path(BAND);
    platform.insert_device(speaker.clone(), device_props(SPEAKER, -58));
    platform.insert_device(band.clone(), device_props(BAND, -71));
    let controller = controller(&platform);

    controller.start("scan-all").await.unwrap();
    platform.inject(Notification::device_added(&speaker, PropertyMap::new()));
    platform.inject(Notification::device_added(&band, PropertyMap::new()));
    settle().await;
    assert_eq!(controller.device_count().await, 2);

    // Untracked path leaves the counter alone
    let stranger = platform.device_path("00:11:22:33:44:55");
    platform.inject(Notification::device_removed(stranger));
    settle().await;
    assert_eq!(controller.device_count().await, 2);

    platform.inject(Notification::device_removed(&band));
    platform.inject(Notification::device_removed(&band));
    settle().await;
    assert_eq!(controller.device_count().await, 1);

    let devices = controller.devices().await;
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].path, speaker);
}

#[tokio::test(start_paused = true)]
async fn test_property_changes_merge_into_records() {
    let platform = Arc::new(SimulatedPlatform::new());
    let path = platform.device_path(SPEAKER);
    let controller = controller(&platform);
    let found = capture_found(&controller);

    controller.start("scan-all").await.unwrap();

    let mut rssi = PropertyMap::new();
    rssi.insert("RSSI".to_string(), PropertyValue::Int(-60));
    let mut name = PropertyMap::new();
    name.insert("Name".to_string(), "Living Room Speaker".into());
    platform.inject(Notification::device_changed(&path, rssi));
    platform.inject(Notification::device_changed(&path, name));
    settle().await;

    let devices = controller.devices().await;
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].properties["RSSI"], PropertyValue::Int(-60));
    assert_eq!(
        devices[0].properties["Name"].as_str(),
        Some("Living Room Speaker")
    );

    // Changes never count devices or reach the callback
    assert_eq!(controller.device_count().await, 0);
    assert!(found.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_start_failure_leaves_controller_idle() {
    let platform = Arc::new(SimulatedPlatform::new());
    platform.fail_on(PlatformOperation::StartDiscovery);
    let controller = controller(&platform);

    let err = controller.start("scan-all").await.unwrap_err();
    assert!(err.is_platform_call());
    assert_eq!(controller.state(), SessionState::Idle);
    assert!(controller.last_summary().is_none());
    assert_unsubscribed(&platform);
}

#[tokio::test]
async fn test_start_on_powered_off_adapter_fails() {
    let platform = Arc::new(SimulatedPlatform::new());
    let controller = controller(&platform);
    controller.adapter().set_powered(false).await.unwrap();

    assert!(controller.start("scan-all").await.is_err());
    assert_eq!(controller.state(), SessionState::Idle);
    assert_unsubscribed(&platform);
}

#[tokio::test(start_paused = true)]
async fn test_stop_discovery_failure_is_absorbed() {
    let platform = Arc::new(SimulatedPlatform::new());
    let controller = controller(&platform);

    controller.start("scan-all").await.unwrap();
    platform.fail_on(PlatformOperation::StopDiscovery);

    let summary = controller.stop().await.expect("teardown completes");
    assert_eq!(summary.end, SessionEnd::Stopped);
    assert_eq!(controller.state(), SessionState::Idle);
    assert_unsubscribed(&platform);
}

#[tokio::test]
async fn test_unknown_mode_is_rejected() {
    let platform = Arc::new(SimulatedPlatform::new());
    let controller = controller(&platform);

    let err = controller.start("pair-target").await.unwrap_err();
    assert!(matches!(err, BluescanError::UnknownMode { ref mode } if mode == "pair-target"));
    assert!(platform.calls().is_empty());
    assert_eq!(controller.state(), SessionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_clones_share_session() {
    let platform = Arc::new(SimulatedPlatform::new());
    let controller = controller(&platform);
    let other = controller.clone();

    controller.start("scan-all").await.unwrap();
    assert!(other.is_running());

    let summary = other.stop().await.expect("clone stops the shared session");
    assert_eq!(summary.end, SessionEnd::Stopped);
    assert_eq!(controller.state(), SessionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_custom_timeout() {
    let platform = Arc::new(SimulatedPlatform::new());
    let config = DiscoveryConfig::new().with_discovery_timeout(Duration::from_secs(5));
    let controller = DiscoveryController::new(Arc::clone(&platform), config);

    controller.start("scan-all").await.unwrap();
    tokio::time::sleep(Duration::from_secs(4)).await;
    assert!(controller.is_running());

    let summary = controller.wait_idle().await.unwrap();
    assert_eq!(summary.end, SessionEnd::Timeout);
    assert!(summary.elapsed >= Duration::from_secs(5));
    assert!(summary.elapsed < Duration::from_secs(6));
}

#[tokio::test(start_paused = true)]
async fn test_cleared_callback_is_not_invoked() {
    let platform = Arc::new(SimulatedPlatform::new());
    let path = platform.device_path(SPEAKER);
    platform.insert_device(path.clone(), device_props(SPEAKER, -58));

    let controller = controller(&platform);
    let found = capture_found(&controller);
    controller.clear_on_new_device_found();

    controller.start("scan-all").await.unwrap();
    platform.inject(Notification::device_added(&path, PropertyMap::new()));
    settle().await;
    assert_eq!(controller.device_count().await, 1);

    controller.stop().await.unwrap();
    assert!(found.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_out_of_range_timeout_fails_to_start() {
    let platform = Arc::new(SimulatedPlatform::new());
    let config = DiscoveryConfig::new().with_discovery_timeout(Duration::from_secs(u64::MAX));
    let controller = DiscoveryController::new(Arc::clone(&platform), config);

    let err = controller.start("scan-all").await.unwrap_err();
    assert!(matches!(err, BluescanError::Configuration { .. }));
    assert_eq!(controller.state(), SessionState::Idle);
    assert!(!controller.is_running());
    assert_eq!(platform.call_count(PlatformOperation::StartDiscovery), 0);
    assert_unsubscribed(&platform);
    assert!(controller.wait_idle().await.is_none());
}
