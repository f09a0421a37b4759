//! Common test utilities for sensor integration tests.
//!
//! Every test runs a real polling session against a [`MockReader`] with a
//! fast poll cadence (10ms poll, 40ms removal timeout) on the real clock.

#![allow(dead_code)]

use serde_json::{Map, Value, json};
use std::time::Duration;
use tagsense_hardware::AnyReader;
use tagsense_hardware::mock::{MockReader, MockReaderHandle, MockTag};
use tagsense_sensor::{Pn532Sensor, SensorConfig};

pub const POLL_INTERVAL_MS: u64 = 10;
pub const REMOVAL_TIMEOUT_MS: u64 = 40;

/// Install a test-writer subscriber honouring `RUST_LOG`. Safe to call from
/// every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn fast_config() -> SensorConfig {
    SensorConfig {
        transport: "i2c".into(),
        device_path: "/dev/i2c-1".into(),
        poll_interval_ms: POLL_INTERVAL_MS,
        card_removal_timeout_ms: REMOVAL_TIMEOUT_MS,
        ..Default::default()
    }
}

/// A sensor polling a fresh mock reader.
pub fn start_sensor_with(config: SensorConfig) -> (Pn532Sensor, MockReaderHandle) {
    init_tracing();
    let (reader, handle) = MockReader::new(config.device_path.clone());
    let sensor = Pn532Sensor::new(config).unwrap();
    sensor.start_session(AnyReader::Mock(reader)).unwrap();
    (sensor, handle)
}

pub fn start_sensor() -> (Pn532Sensor, MockReaderHandle) {
    start_sensor_with(fast_config())
}

pub fn tag(uid: &str) -> MockTag {
    MockTag::ntag215(uid).unwrap()
}

pub fn command(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

pub fn await_scan(timeout_ms: u64) -> Map<String, Value> {
    command(json!({"action": "await_scan", "timeout_ms": timeout_ms}))
}

/// Poll `condition` every millisecond until it holds or `timeout` elapses.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    condition()
}

pub async fn wait_for_uid(sensor: &Pn532Sensor, uid: &str) -> bool {
    wait_until(Duration::from_secs(2), || {
        sensor.readings().get("uid").and_then(Value::as_str) == Some(uid)
    })
    .await
}

pub async fn wait_for_absent(sensor: &Pn532Sensor) -> bool {
    wait_until(Duration::from_secs(2), || {
        sensor.readings()["tag_present"] == false
    })
    .await
}
