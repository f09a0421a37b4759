//! Command dispatch: `await_scan` and `diagnostics`.
//!
//! Commands are JSON objects with a string `action` key:
//!
//! ```json
//! {"action": "await_scan", "timeout_ms": 5000}
//! {"action": "diagnostics"}
//! ```

use crate::error::{Result, SensorError};
use crate::lifecycle::Pn532Sensor;
use crate::notify::AwaitError;
use crate::state::Readings;
use futures::FutureExt;
use serde_json::{Map, Value};
use std::time::Duration;
use tagsense_hardware::{AnyReader, ReaderDevice};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Payload of the communication self-test.
const COMM_TEST_PAYLOAD: [u8; 1] = [0xAB];

impl Pn532Sensor {
    /// Run a command.
    ///
    /// # Errors
    ///
    /// Returns [`SensorError::MissingAction`] or
    /// [`SensorError::UnknownAction`] for malformed commands, otherwise the
    /// error of the command itself.
    pub async fn do_command(&self, command: &Map<String, Value>) -> Result<Readings> {
        let action = command
            .get("action")
            .and_then(Value::as_str)
            .ok_or(SensorError::MissingAction)?;

        match action {
            "await_scan" => self.await_scan(parse_timeout(command)?).await,
            "diagnostics" => self.diagnostics().await,
            other => Err(SensorError::UnknownAction(other.to_string())),
        }
    }

    /// Wait for the next detection and return its readings.
    ///
    /// A detection that happened since the last consumed one is returned
    /// immediately. `None` waits until a detection or `close()`.
    ///
    /// # Errors
    ///
    /// Returns [`SensorError::Timeout`] if no tag is detected in time, or
    /// [`SensorError::Closed`] if the sensor is closed while waiting.
    pub async fn await_scan(&self, timeout: Option<Duration>) -> Result<Readings> {
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));

        match self.core.slot.await_next(deadline, &self.cancel).await {
            Ok(snapshot) => {
                debug!(
                    uid = %snapshot.fields.uid,
                    age_ms = snapshot.age().num_milliseconds(),
                    "Delivering scan"
                );
                Ok(snapshot.readings())
            }
            Err(AwaitError::Timeout) => Err(SensorError::Timeout {
                timeout_ms: timeout.map_or(0, |t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX)),
            }),
            Err(AwaitError::Cancelled) => Err(SensorError::Closed),
        }
    }

    /// Pause polling and probe the reader.
    ///
    /// Each probe is independent; a failed probe reports an `*_error` key
    /// instead of its values.
    ///
    /// # Errors
    ///
    /// Returns [`SensorError::Closed`] once closed,
    /// [`SensorError::NotConnected`] without a polling session, or
    /// [`SensorError::Diagnostics`] if the session cannot lend the device.
    pub async fn diagnostics(&self) -> Result<Readings> {
        if self.core.cache.is_closed() {
            return Err(SensorError::Closed);
        }
        let control = self.session_control().ok_or(SensorError::NotConnected)?;

        debug!("Pausing polling for diagnostics");
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(SensorError::Closed),
            result = control.pause_and_run(|device| probe(device).boxed()) => {
                result.map_err(SensorError::Diagnostics)
            }
        }
    }
}

fn parse_timeout(command: &Map<String, Value>) -> Result<Option<Duration>> {
    let Some(value) = command.get("timeout_ms").filter(|v| !v.is_null()) else {
        return Ok(None);
    };

    let ms = value.as_f64().ok_or_else(|| {
        SensorError::InvalidCommand(format!("timeout_ms must be a number, got {value}"))
    })?;

    if ms > 0.0 {
        // float-to-int casts saturate
        Ok(Some(Duration::from_micros((ms * 1000.0) as u64)))
    } else {
        Ok(None)
    }
}

async fn probe(device: &mut AnyReader) -> Readings {
    let mut result = Map::new();

    match device.diagnose_communication(&COMM_TEST_PAYLOAD).await {
        Ok(test) => {
            result.insert("comm_test_ok".into(), Value::from(test.success));
        }
        Err(e) => {
            warn!(error = %e, "Communication self-test failed");
            result.insert("comm_test_ok".into(), Value::from(false));
            result.insert("comm_test_error".into(), Value::from(e.to_string()));
        }
    }

    match device.general_status().await {
        Ok(status) => {
            result.insert("field_present".into(), Value::from(status.field_present));
            result.insert("last_error".into(), Value::from(status.last_error));
            result.insert("targets".into(), Value::from(status.targets));
        }
        Err(e) => {
            warn!(error = %e, "General status query failed");
            result.insert("general_status_error".into(), Value::from(e.to_string()));
        }
    }

    match device.firmware_version().await {
        Ok(firmware) => {
            result.insert("firmware_version".into(), Value::from(firmware.version));
            result.insert("support_iso14443a".into(), Value::from(firmware.support_iso14443a));
            result.insert("support_iso14443b".into(), Value::from(firmware.support_iso14443b));
            result.insert("support_iso18092".into(), Value::from(firmware.support_iso18092));
        }
        Err(e) => {
            warn!(error = %e, "Firmware version query failed");
            result.insert("firmware_error".into(), Value::from(e.to_string()));
        }
    }

    result
}
