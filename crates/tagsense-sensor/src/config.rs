//! Sensor configuration.
//!
//! [`SensorConfig`] is the user-facing attribute set, deserialized from JSON.
//! Zero or absent numeric values fall back to defaults when the config is
//! [resolved](SensorConfig::resolve) into the typed [`ResolvedConfig`] the
//! sensor runs with.

use crate::error::{Result, SensorError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tagsense_hardware::{PollConfig, TransportKind};

/// Default delay between detection polls.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 250;

/// Default time a tag may go unseen before it counts as removed.
pub const DEFAULT_CARD_REMOVAL_TIMEOUT_MS: u64 = 600;

/// Default reader connection timeout.
pub const DEFAULT_CONNECT_TIMEOUT_SEC: u64 = 10;

/// Sensor attributes as written by the user.
///
/// # Example
///
/// ```
/// use tagsense_sensor::SensorConfig;
///
/// let config = SensorConfig::from_json(r#"{"transport": "i2c", "device_path": "/dev/i2c-1"}"#).unwrap();
/// let resolved = config.resolve().unwrap();
/// assert_eq!(resolved.poll.poll_interval.as_millis(), 250);
/// assert!(resolved.read_ndef);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// Reader transport: "uart", "i2c" or "spi".
    pub transport: String,

    /// Transport device path (e.g. `/dev/i2c-1`).
    pub device_path: String,

    /// Delay between detection polls, in milliseconds.
    #[serde(skip_serializing_if = "is_zero")]
    pub poll_interval_ms: u64,

    /// Time a tag may go unseen before it counts as removed, in milliseconds.
    #[serde(skip_serializing_if = "is_zero")]
    pub card_removal_timeout_ms: u64,

    /// Whether detections read the tag's NDEF message. Defaults to true.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_ndef: Option<bool>,

    /// Log every detection at info level.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub debug: bool,

    /// Reader connection timeout, in seconds.
    #[serde(skip_serializing_if = "is_zero")]
    pub connect_timeout_sec: u64,
}

fn is_zero(value: &u64) -> bool {
    *value == 0
}

fn or_default(value: u64, default: u64) -> u64 {
    if value == 0 { default } else { value }
}

impl SensorConfig {
    /// Parse a config from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`SensorError::Config`] if the JSON does not describe a config.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| SensorError::Config(e.to_string()))
    }

    /// Parse a config from an already-decoded JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`SensorError::Config`] if the value does not describe a config.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| SensorError::Config(e.to_string()))
    }

    /// Check the config without resolving it.
    ///
    /// # Errors
    ///
    /// Returns [`SensorError::Config`] if the transport is empty or unknown,
    /// or the device path is missing.
    pub fn validate(&self) -> Result<()> {
        self.transport_kind().map(|_| ())
    }

    fn transport_kind(&self) -> Result<TransportKind> {
        if self.transport.is_empty() {
            return Err(SensorError::Config(
                "transport is required, must be one of [uart i2c spi]".to_string(),
            ));
        }

        let transport: TransportKind = self
            .transport
            .parse()
            .map_err(|e: tagsense_hardware::HardwareError| SensorError::Config(e.to_string()))?;

        if self.device_path.trim().is_empty() {
            return Err(SensorError::Config(format!(
                "device_path is required when transport is {:?}",
                self.transport
            )));
        }

        Ok(transport)
    }

    /// Validate and apply defaults.
    ///
    /// # Errors
    ///
    /// Returns [`SensorError::Config`] if validation fails.
    pub fn resolve(&self) -> Result<ResolvedConfig> {
        let transport = self.transport_kind()?;

        Ok(ResolvedConfig {
            transport,
            device_path: self.device_path.clone(),
            poll: PollConfig {
                poll_interval: Duration::from_millis(or_default(
                    self.poll_interval_ms,
                    DEFAULT_POLL_INTERVAL_MS,
                )),
                card_removal_timeout: Duration::from_millis(or_default(
                    self.card_removal_timeout_ms,
                    DEFAULT_CARD_REMOVAL_TIMEOUT_MS,
                )),
            },
            read_ndef: self.read_ndef.unwrap_or(true),
            debug: self.debug,
            connect_timeout: Duration::from_secs(or_default(
                self.connect_timeout_sec,
                DEFAULT_CONNECT_TIMEOUT_SEC,
            )),
        })
    }
}

/// Validated config with defaults applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub transport: TransportKind,
    pub device_path: String,
    pub poll: PollConfig,
    pub read_ndef: bool,
    pub debug: bool,
    pub connect_timeout: Duration,
}
