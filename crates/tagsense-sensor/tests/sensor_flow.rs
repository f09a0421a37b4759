//! Integration tests for detection, removal and await_scan
//!
//! These tests drive a real polling session against a scripted mock reader
//! and observe the sensor only through its public API.

mod common;

use serde_json::{Value, json};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tagsense_hardware::{NdefMessage, NdefRecord};
use tagsense_sensor::{Pn532Sensor, SensorError};

/// Tag A detected, removed, tag B detected: no field of A leaks into B
#[tokio::test]
async fn test_detect_remove_detect_has_no_leakage() {
    let (sensor, handle) = common::start_sensor();

    handle.present(common::tag("04aaaaaa").with_text("first"));
    assert!(common::wait_for_uid(&sensor, "04aaaaaa").await);
    let readings = sensor.readings();
    assert_eq!(readings["ndef_text"], "first");
    assert_eq!(readings["ntag_variant"], "NTAG215");

    handle.remove();
    assert!(common::wait_for_absent(&sensor).await);
    let readings = sensor.readings();
    assert_eq!(readings.len(), 3);
    assert_eq!(readings["device_healthy"], true);

    handle.present(common::tag("04bbbbbb"));
    assert!(common::wait_for_uid(&sensor, "04bbbbbb").await);
    let readings = sensor.readings();
    assert_eq!(readings["tag_present"], true);
    assert_eq!(readings["ndef_text"], "");
    assert_eq!(readings["ndef_record_count"], 0);

    sensor.close().await.unwrap();
}

/// A tag briefly unseen for less than the removal timeout stays present
#[tokio::test]
async fn test_short_absence_is_not_removal() {
    let (sensor, handle) = common::start_sensor();

    handle.present(common::tag("04aaaaaa"));
    assert!(common::wait_for_uid(&sensor, "04aaaaaa").await);

    handle.remove();
    tokio::time::sleep(Duration::from_millis(common::POLL_INTERVAL_MS)).await;
    handle.present(common::tag("04aaaaaa"));
    tokio::time::sleep(Duration::from_millis(common::REMOVAL_TIMEOUT_MS * 3)).await;

    assert_eq!(sensor.readings()["tag_present"], true);
    sensor.close().await.unwrap();
}

/// Disconnect while a tag is present leaves an unhealthy, empty state
#[tokio::test]
async fn test_disconnect_while_present() {
    let (sensor, handle) = common::start_sensor();

    handle.present(common::tag("04aaaaaa"));
    assert!(common::wait_for_uid(&sensor, "04aaaaaa").await);

    handle.disconnect();
    let unhealthy = common::wait_until(Duration::from_secs(2), || {
        sensor.readings()["device_healthy"] == false
    })
    .await;
    assert!(unhealthy);

    let readings = sensor.readings();
    assert_eq!(readings.len(), 3);
    assert_eq!(readings["tag_present"], false);

    // no automatic recovery
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(sensor.readings()["device_healthy"], false);

    sensor.close().await.unwrap();
}

/// await_scan with no detection times out close to the requested deadline
#[tokio::test]
async fn test_await_scan_timeout_is_bounded() {
    let (sensor, _handle) = common::start_sensor();

    let started = Instant::now();
    let result = sensor.do_command(&common::await_scan(100)).await;
    let elapsed = started.elapsed();

    assert!(matches!(result, Err(SensorError::Timeout { timeout_ms: 100 })));
    assert!(elapsed >= Duration::from_millis(100), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(500), "{elapsed:?}");

    sensor.close().await.unwrap();
}

/// await_scan returns the readings of the detection it was woken by
#[tokio::test]
async fn test_await_scan_receives_detection() {
    let (sensor, handle) = common::start_sensor();
    let sensor = Arc::new(sensor);

    let waiter = {
        let sensor = Arc::clone(&sensor);
        tokio::spawn(async move { sensor.do_command(&common::await_scan(2000)).await })
    };

    tokio::time::sleep(Duration::from_millis(30)).await;
    let ndef = NdefMessage::new(vec![NdefRecord::text("gate 4")]);
    handle.present(common::tag("04cccccc").with_ndef(ndef));

    let scan = waiter.await.unwrap().unwrap();
    assert_eq!(scan["uid"], "04cccccc");
    assert_eq!(scan["ndef_text"], "gate 4");
    assert_eq!(scan["device_healthy"], true);

    sensor.close().await.unwrap();
}

/// A detection made before await_scan is delivered even with a tiny deadline,
/// and after the tag has already left
#[tokio::test]
async fn test_buffered_scan_survives_removal() {
    let (sensor, handle) = common::start_sensor();

    handle.present(common::tag("04aaaaaa"));
    assert!(common::wait_for_uid(&sensor, "04aaaaaa").await);
    handle.remove();
    assert!(common::wait_for_absent(&sensor).await);

    let scan = sensor.do_command(&common::await_scan(1)).await.unwrap();
    assert_eq!(scan["uid"], "04aaaaaa");
    assert_eq!(scan["tag_present"], true);

    // consumed
    let result = sensor.do_command(&common::await_scan(20)).await;
    assert!(matches!(result, Err(SensorError::Timeout { .. })));

    sensor.close().await.unwrap();
}

/// Two detections before anyone waits: the second one is delivered
#[tokio::test]
async fn test_freshest_scan_wins() {
    let (sensor, handle) = common::start_sensor();

    handle.present(common::tag("04aaaaaa"));
    assert!(common::wait_for_uid(&sensor, "04aaaaaa").await);
    handle.present(common::tag("04bbbbbb"));
    assert!(common::wait_for_uid(&sensor, "04bbbbbb").await);

    let scan = sensor.do_command(&common::await_scan(100)).await.unwrap();
    assert_eq!(scan["uid"], "04bbbbbb");

    sensor.close().await.unwrap();
}

/// read_ndef=false leaves payload fields empty even for tags that carry one
#[tokio::test]
async fn test_ndef_reading_disabled() {
    let config = tagsense_sensor::SensorConfig {
        read_ndef: Some(false),
        ..common::fast_config()
    };
    let (sensor, handle) = common::start_sensor_with(config);

    handle.present(common::tag("04aaaaaa").with_text("secret"));
    assert!(common::wait_for_uid(&sensor, "04aaaaaa").await);

    let readings = sensor.readings();
    assert_eq!(readings["ndef_text"], "");
    assert_eq!(readings["ndef_record_count"], 0);
    assert_eq!(readings["user_memory_bytes"], 504);

    sensor.close().await.unwrap();
}

/// Detection I/O failures are absorbed: the tag is still reported
#[tokio::test]
async fn test_detection_io_failures_absorbed() {
    let (sensor, handle) = common::start_sensor();
    handle.fail_select(Some("no ATS"));

    handle.present(common::tag("04aaaaaa").with_text("hidden"));
    assert!(common::wait_for_uid(&sensor, "04aaaaaa").await);

    let readings = sensor.readings();
    assert_eq!(readings["tag_type"], "NTAG");
    assert_eq!(readings["ntag_variant"], "");
    assert_eq!(readings["ndef_text"], "");

    sensor.close().await.unwrap();
}

/// Present tags always carry a uid, and unhealthy devices never report one,
/// while detections, removals and a disconnect race against readers
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_readings_consistent_under_concurrency() {
    let (sensor, handle) = common::start_sensor();
    let sensor = Arc::new(sensor);

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let sensor = Arc::clone(&sensor);
            tokio::spawn(async move {
                for _ in 0..2000 {
                    let readings = sensor.readings();
                    if readings["tag_present"] == true {
                        let uid = readings["uid"].as_str().unwrap();
                        assert!(!uid.is_empty());
                        assert_eq!(readings["device_healthy"], true);
                    }
                    if readings["device_healthy"] == false {
                        assert_eq!(readings["tag_present"], false);
                    }
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();

    for i in 0..10u8 {
        handle.present(common::tag(&format!("04{i:02x}{i:02x}{i:02x}")));
        tokio::time::sleep(Duration::from_millis(15)).await;
        if i % 3 == 0 {
            handle.remove();
            tokio::time::sleep(Duration::from_millis(60)).await;
        }
    }
    handle.disconnect();

    for reader in readers {
        reader.await.unwrap();
    }

    let unhealthy = common::wait_until(Duration::from_secs(2), || {
        sensor.readings()["device_healthy"] == Value::Bool(false)
    })
    .await;
    assert!(unhealthy);
    sensor.close().await.unwrap();
}

/// Unknown and malformed commands fail without touching the state
#[tokio::test]
async fn test_command_errors_leave_state_untouched() {
    let (sensor, handle) = common::start_sensor();
    handle.present(common::tag("04aaaaaa"));
    assert!(common::wait_for_uid(&sensor, "04aaaaaa").await);
    let before = sensor.readings();

    let unknown = sensor
        .do_command(&common::command(json!({"action": "format_tag"})))
        .await;
    assert!(matches!(unknown, Err(SensorError::UnknownAction(_))));

    let missing = sensor.do_command(&common::command(json!({"timeout_ms": 5}))).await;
    assert!(matches!(missing, Err(SensorError::MissingAction)));

    assert_eq!(sensor.readings(), before);
    sensor.close().await.unwrap();
}

#[tokio::test]
async fn test_readings_before_session() {
    let sensor = Pn532Sensor::new(common::fast_config()).unwrap();
    let readings = sensor.readings();

    assert_eq!(
        Value::Object(readings),
        json!({"status": "connected", "device_healthy": false, "tag_present": false})
    );
}
