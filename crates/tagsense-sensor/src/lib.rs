//! Proximity-card reader sensor.
//!
//! A background worker polls a PN532-class reader for tag insertion and
//! removal while foreground callers read the cached state or wait for the
//! next detection.
//!
//! # Overview
//!
//! ```text
//!   PollingSession (worker) ──► handlers ──► StateCache ──► readings()
//!                                   │
//!                                   └──────► ScanSlot ────► await_scan
//!
//!   diagnostics ──► SessionControl::pause_and_run ──► device probes
//! ```
//!
//! - [`Pn532Sensor::readings`] never blocks on hardware I/O.
//! - [`Pn532Sensor::do_command`] runs `await_scan` and `diagnostics`.
//! - [`Pn532Sensor::close`] is ordered, idempotent and bounded even when the
//!   worker is stuck inside a slow hardware call.
//!
//! # Example
//!
//! ```no_run
//! use serde_json::json;
//! use tagsense_hardware::mock::{MockConnector, MockReader, MockTag};
//! use tagsense_sensor::{Pn532Sensor, SensorConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (reader, handle) = MockReader::new("/dev/i2c-1");
//!     let config = SensorConfig::from_json(r#"{"transport": "i2c", "device_path": "/dev/i2c-1"}"#)?;
//!     let sensor = Pn532Sensor::connect(config, &MockConnector::new(reader)).await?;
//!
//!     handle.present(MockTag::ntag215("04aaaaaa")?);
//!
//!     let command = json!({"action": "await_scan", "timeout_ms": 1000});
//!     let scan = sensor.do_command(command.as_object().unwrap()).await?;
//!     println!("scanned {}", scan["uid"]);
//!
//!     sensor.close().await?;
//!     Ok(())
//! }
//! ```

pub mod command;
pub mod config;
pub mod error;
mod handlers;
pub mod lifecycle;
pub mod notify;
pub mod state;

pub use config::{ResolvedConfig, SensorConfig};
pub use error::{Result, SensorError};
pub use lifecycle::{Phase, Pn532Sensor};
pub use notify::{AwaitError, ScanSlot};
pub use state::{Readings, ScanSnapshot, TagFields, TagState, project};
