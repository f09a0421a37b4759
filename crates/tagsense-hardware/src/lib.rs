//! Reader abstraction layer for PN532-class proximity-card readers.
//!
//! This crate provides the collaborators a sensor core needs to talk to a
//! reader without knowing how the reader is wired: a device handle, a
//! connector, a transport closer, tag-level operations and a background
//! polling session. A scriptable mock reader stands in for real transports in
//! development and tests.
//!
//! # Design Philosophy
//!
//! - **Async-first**: All I/O operations are asynchronous. Traits return
//!   `impl Future + Send` so generic code can be spawned onto Tokio.
//! - **Single owner**: The device is owned by one task at a time. Other tasks
//!   borrow it through [`SessionControl::pause_and_run`] or interrupt it
//!   through a [`TransportCloser`].
//! - **Error-aware**: All operations return `Result<T>`. Only
//!   disconnection ends a polling session; every other error is transient.
//!
//! # Polling a Reader
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tagsense_hardware::mock::{MockConnector, MockReader};
//! use tagsense_hardware::session::{PollConfig, PollingSession};
//! use tagsense_hardware::traits::{DetectedTag, ReaderConnector, TagEventHandler};
//! use tagsense_hardware::{AnyReader, HardwareError, TransportKind};
//! use tokio_util::sync::CancellationToken;
//!
//! struct Log;
//!
//! impl TagEventHandler<AnyReader> for Log {
//!     async fn on_detected(&self, _: &mut AnyReader, tag: &DetectedTag) -> tagsense_hardware::Result<()> {
//!         println!("tag {}", tag.uid);
//!         Ok(())
//!     }
//!     fn on_removed(&self) {
//!         println!("tag removed");
//!     }
//!     fn on_disconnected(&self, error: &HardwareError) {
//!         println!("reader gone: {error}");
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> tagsense_hardware::Result<()> {
//!     let (reader, _handle) = MockReader::new("/dev/i2c-1");
//!     let connector = MockConnector::new(reader);
//!     let device = connector
//!         .connect("/dev/i2c-1", TransportKind::I2c, Duration::from_secs(10))
//!         .await?;
//!
//!     let (session, _control) = PollingSession::new(device, PollConfig::default());
//!     session.run(Arc::new(Log), CancellationToken::new()).await
//! }
//! ```
//!
//! # Error Handling
//!
//! All operations return [`Result<T>`][error::Result] which uses the
//! [`HardwareError`] error type. [`HardwareError::is_disconnect`] separates
//! reader loss from recoverable failures.

pub mod devices;
pub mod error;
pub mod mock;
pub mod session;
pub mod tagops;
pub mod traits;
pub mod transport;
pub mod types;

// Re-export commonly used types for convenience
pub use devices::AnyReader;
pub use error::{HardwareError, Result};
pub use session::{PollConfig, PollingSession, SessionControl};
pub use tagops::TagOperations;
pub use traits::{
    DetectedTag, MAX_UID_LENGTH, MIN_UID_LENGTH, Manufacturer, ReaderConnector, ReaderDevice,
    TagEventHandler, TagType,
};
pub use transport::TransportCloser;
pub use types::{
    DiagnoseResult, FirmwareVersion, GeneralStatus, NdefMessage, NdefRecord, NdefRecordType,
    TagInfo, TransportKind,
};
