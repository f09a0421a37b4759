//! Enum wrapper for reader dispatch.
//!
//! The traits in [`crate::traits`] return opaque futures and are not
//! object-safe, so `Box<dyn ReaderDevice>` is not available. [`AnyReader`]
//! provides concrete type dispatch instead, which keeps the sensor core free
//! of a device type parameter.
//!
//! # Examples
//!
//! ```
//! use tagsense_hardware::devices::AnyReader;
//! use tagsense_hardware::mock::MockReader;
//!
//! let (reader, _handle) = MockReader::new("/dev/i2c-1");
//! let any_reader = AnyReader::Mock(reader);
//! ```

use crate::mock::MockReader;
use crate::traits::{DetectedTag, ReaderDevice};
use crate::transport::TransportCloser;
use crate::types::{DiagnoseResult, FirmwareVersion, GeneralStatus, NdefMessage, TagInfo};
use crate::Result;

/// Enum wrapper for reader dispatch.
///
/// # Examples
///
/// ```
/// use tagsense_hardware::devices::AnyReader;
/// use tagsense_hardware::traits::ReaderDevice;
/// use tagsense_hardware::mock::MockReader;
///
/// #[tokio::main]
/// async fn main() -> tagsense_hardware::Result<()> {
///     let (reader, _handle) = MockReader::new("/dev/i2c-1");
///     let mut any_reader = AnyReader::Mock(reader);
///
///     let firmware = any_reader.firmware_version().await?;
///     println!("Firmware: {}", firmware.version);
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyReader {
    /// Mock reader for development and testing.
    Mock(MockReader),
    // Hardware transports are implemented outside this crate.
}

impl ReaderDevice for AnyReader {
    async fn poll_tag(&mut self) -> Result<Option<DetectedTag>> {
        match self {
            Self::Mock(device) => device.poll_tag().await,
        }
    }

    async fn select_tag(&mut self, tag: &DetectedTag) -> Result<()> {
        match self {
            Self::Mock(device) => device.select_tag(tag).await,
        }
    }

    async fn tag_info(&mut self, tag: &DetectedTag) -> Result<TagInfo> {
        match self {
            Self::Mock(device) => device.tag_info(tag).await,
        }
    }

    async fn read_ndef(&mut self, tag: &DetectedTag) -> Result<Option<NdefMessage>> {
        match self {
            Self::Mock(device) => device.read_ndef(tag).await,
        }
    }

    async fn diagnose_communication(&mut self, payload: &[u8]) -> Result<DiagnoseResult> {
        match self {
            Self::Mock(device) => device.diagnose_communication(payload).await,
        }
    }

    async fn general_status(&mut self) -> Result<GeneralStatus> {
        match self {
            Self::Mock(device) => device.general_status().await,
        }
    }

    async fn firmware_version(&mut self) -> Result<FirmwareVersion> {
        match self {
            Self::Mock(device) => device.firmware_version().await,
        }
    }

    fn closer(&self) -> TransportCloser {
        match self {
            Self::Mock(device) => device.closer(),
        }
    }
}
