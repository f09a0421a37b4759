//! Reader trait definitions.
//!
//! This module defines the contract between the sensor core and the reader
//! hardware. The [`ReaderDevice`] trait is the opaque device handle, the
//! [`ReaderConnector`] opens one, and [`TagEventHandler`] is the set of
//! callbacks a polling session drives.
//!
//! Methods return `impl Future + Send` rather than using bare `async fn` so
//! that generic code (the polling session) can be spawned onto Tokio without
//! the caller having to prove the futures are `Send`. Implementations may
//! still write `async fn`.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::devices::AnyReader;
use crate::error::{HardwareError, Result};
use crate::transport::TransportCloser;
use crate::types::{DiagnoseResult, FirmwareVersion, GeneralStatus, NdefMessage, TagInfo, TransportKind};

/// Tag family identification.
///
/// Identifies the family of a detected tag from its selection response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum TagType {
    /// NXP NTAG21x.
    Ntag,

    /// MIFARE Classic 1K/4K.
    MifareClassic,

    /// MIFARE Ultralight.
    MifareUltralight,

    /// MIFARE DESFire.
    Desfire,

    /// Unrecognized tag family.
    Unknown,
}

impl TagType {
    /// Identifier used in readings (e.g. "NTAG").
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ntag => "NTAG",
            Self::MifareClassic => "MIFARE",
            Self::MifareUltralight => "ULTRALIGHT",
            Self::Desfire => "DESFIRE",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Classify a tag from its SAK byte.
    ///
    /// SAK `0x00` is shared by NTAG and Ultralight; it is reported as NTAG
    /// and refined later by the capability probe.
    pub fn from_sak(sak: u8) -> Self {
        match sak {
            0x00 => Self::Ntag,
            0x08 | 0x09 | 0x18 | 0x88 => Self::MifareClassic,
            0x20 => Self::Desfire,
            _ => Self::Unknown,
        }
    }

    /// Check if this is a known tag family.
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

/// IC manufacturer, from the first UID byte (ISO/IEC 7816-6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Manufacturer {
    /// NXP Semiconductors (`0x04`).
    Nxp,

    /// STMicroelectronics (`0x02`).
    StMicro,

    /// Infineon Technologies (`0x05`).
    Infineon,

    /// Texas Instruments (`0x07`).
    TexasInstruments,

    /// Unrecognized manufacturer code.
    Unknown,
}

impl Manufacturer {
    /// Look up a manufacturer code.
    pub fn from_code(code: u8) -> Self {
        match code {
            0x02 => Self::StMicro,
            0x04 => Self::Nxp,
            0x05 => Self::Infineon,
            0x07 => Self::TexasInstruments,
            _ => Self::Unknown,
        }
    }

    /// Name used in readings.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nxp => "NXP",
            Self::StMicro => "STMicroelectronics",
            Self::Infineon => "Infineon",
            Self::TexasInstruments => "Texas Instruments",
            Self::Unknown => "Unknown",
        }
    }
}

/// Minimum UID length in bytes (per ISO 14443 specification).
pub const MIN_UID_LENGTH: usize = 4;

/// Maximum UID length in bytes (per ISO 14443 specification).
pub const MAX_UID_LENGTH: usize = 10;

/// A tag reported by the reader's detection poll.
///
/// The `uid` string is never empty; [`DetectedTagBuilder::build`] enforces it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectedTag {
    /// UID in display form (lowercase hex unless overridden).
    pub uid: String,

    /// Raw UID bytes (4-10 bytes).
    pub uid_bytes: Vec<u8>,

    /// Tag family.
    pub tag_type: TagType,

    /// Select acknowledge byte.
    pub sak: u8,

    /// When the reader reported the tag.
    pub detected_at: chrono::DateTime<chrono::Utc>,
}

impl DetectedTag {
    /// Create a detected tag with the current timestamp.
    ///
    /// # Errors
    ///
    /// Returns an error if the UID length is not within 4-10 bytes.
    ///
    /// # Examples
    ///
    /// ```
    /// use tagsense_hardware::traits::{DetectedTag, TagType};
    ///
    /// let tag = DetectedTag::new(vec![0x04, 0xAB, 0xCD, 0xEF], TagType::Ntag).unwrap();
    /// assert_eq!(tag.uid, "04abcdef");
    /// ```
    pub fn new(uid_bytes: Vec<u8>, tag_type: TagType) -> Result<Self> {
        DetectedTagBuilder::new(uid_bytes, tag_type).build()
    }

    /// Create a builder for constructing a detected tag with optional fields.
    ///
    /// # Examples
    ///
    /// ```
    /// use tagsense_hardware::traits::{DetectedTag, TagType};
    ///
    /// let tag = DetectedTag::builder(vec![0x04, 0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC], TagType::Ntag)
    ///     .uid("04bbbbbb")
    ///     .sak(0x00)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(tag.uid, "04bbbbbb");
    /// ```
    pub fn builder(uid_bytes: Vec<u8>, tag_type: TagType) -> DetectedTagBuilder {
        DetectedTagBuilder::new(uid_bytes, tag_type)
    }

    /// IC manufacturer derived from the first UID byte.
    pub fn manufacturer(&self) -> Manufacturer {
        self.uid_bytes
            .first()
            .copied()
            .map_or(Manufacturer::Unknown, Manufacturer::from_code)
    }

    /// Whether the UID looks like a genuine NXP part.
    ///
    /// Genuine NTAG/Ultralight/DESFire parts carry a 7-byte UID with the NXP
    /// manufacturer code; MIFARE Classic parts may also carry a 4-byte NUID.
    pub fn is_genuine(&self) -> bool {
        if self.manufacturer() != Manufacturer::Nxp {
            return false;
        }

        match self.tag_type {
            TagType::MifareClassic => matches!(self.uid_bytes.len(), 4 | 7),
            TagType::Unknown => false,
            _ => self.uid_bytes.len() == 7,
        }
    }
}

/// Lowercase hex rendering of UID bytes.
pub fn uid_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Builder for constructing a [`DetectedTag`] with optional fields.
#[derive(Debug, Clone)]
pub struct DetectedTagBuilder {
    uid_bytes: Vec<u8>,
    tag_type: TagType,
    uid: Option<String>,
    sak: u8,
    detected_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl DetectedTagBuilder {
    /// Create a new builder with required fields.
    pub fn new(uid_bytes: Vec<u8>, tag_type: TagType) -> Self {
        Self {
            uid_bytes,
            tag_type,
            uid: None,
            sak: 0x00,
            detected_at: None,
        }
    }

    /// Override the display UID (defaults to the lowercase hex of the bytes).
    pub fn uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = Some(uid.into());
        self
    }

    /// Set the SAK byte.
    pub fn sak(mut self, sak: u8) -> Self {
        self.sak = sak;
        self
    }

    /// Set a custom detection timestamp.
    pub fn detected_at(mut self, detected_at: chrono::DateTime<chrono::Utc>) -> Self {
        self.detected_at = Some(detected_at);
        self
    }

    /// Build the tag with validation.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - UID length is not between MIN_UID_LENGTH and MAX_UID_LENGTH
    /// - an overridden UID string is empty
    pub fn build(self) -> Result<DetectedTag> {
        let uid_len = self.uid_bytes.len();
        if !(MIN_UID_LENGTH..=MAX_UID_LENGTH).contains(&uid_len) {
            return Err(HardwareError::invalid_data(format!(
                "Tag UID length must be between {} and {} bytes, got {}",
                MIN_UID_LENGTH, MAX_UID_LENGTH, uid_len
            )));
        }

        let uid = match self.uid {
            Some(uid) if uid.trim().is_empty() => {
                return Err(HardwareError::invalid_data("Tag UID cannot be empty"));
            }
            Some(uid) => uid,
            None => uid_hex(&self.uid_bytes),
        };

        Ok(DetectedTag {
            uid,
            uid_bytes: self.uid_bytes,
            tag_type: self.tag_type,
            sak: self.sak,
            detected_at: self.detected_at.unwrap_or_else(chrono::Utc::now),
        })
    }
}

/// Proximity-card reader abstraction (the device handle).
///
/// The device is owned by exactly one task at a time: the polling worker, or
/// a foreground operation it has lent the device to. The only part that may
/// be used concurrently is the [`TransportCloser`] returned by
/// [`closer`](ReaderDevice::closer).
///
/// For dynamic dispatch, use [`AnyReader`](crate::devices::AnyReader).
pub trait ReaderDevice: Send + Sync + 'static {
    /// Poll the RF field once.
    ///
    /// Returns `Ok(None)` when no tag answers.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError::Disconnected`] if the reader is gone, or a
    /// transient error if this cycle failed.
    fn poll_tag(&mut self) -> impl Future<Output = Result<Option<DetectedTag>>> + Send;

    /// Select a detected tag for further commands.
    ///
    /// # Errors
    ///
    /// Returns an error if the tag did not answer the selection.
    fn select_tag(&mut self, tag: &DetectedTag) -> impl Future<Output = Result<()>> + Send;

    /// Read capability information of the selected tag.
    ///
    /// # Errors
    ///
    /// Returns an error if the capability container cannot be read.
    fn tag_info(&mut self, tag: &DetectedTag) -> impl Future<Output = Result<TagInfo>> + Send;

    /// Read the NDEF message of the selected tag.
    ///
    /// Returns `Ok(None)` for tags without an NDEF message.
    ///
    /// # Errors
    ///
    /// Returns an error if the tag memory cannot be read.
    fn read_ndef(
        &mut self,
        tag: &DetectedTag,
    ) -> impl Future<Output = Result<Option<NdefMessage>>> + Send;

    /// Run the reader's communication self-test with `payload`.
    ///
    /// # Errors
    ///
    /// Returns an error if the reader does not answer.
    fn diagnose_communication(
        &mut self,
        payload: &[u8],
    ) -> impl Future<Output = Result<DiagnoseResult>> + Send;

    /// Query the reader's general status.
    ///
    /// # Errors
    ///
    /// Returns an error if the reader does not answer.
    fn general_status(&mut self) -> impl Future<Output = Result<GeneralStatus>> + Send;

    /// Query the reader's firmware version.
    ///
    /// # Errors
    ///
    /// Returns an error if the reader does not answer.
    fn firmware_version(&mut self) -> impl Future<Output = Result<FirmwareVersion>> + Send;

    /// Handle that closes this reader's transport from another task.
    fn closer(&self) -> TransportCloser;
}

/// Opens reader devices.
pub trait ReaderConnector: Send + Sync {
    /// Connect to the reader at `path` over `transport`.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport cannot be opened or the reader does
    /// not answer within `timeout`.
    fn connect(
        &self,
        path: &str,
        transport: TransportKind,
        timeout: Duration,
    ) -> impl Future<Output = Result<AnyReader>> + Send;
}

/// Callbacks driven by a polling session.
///
/// The session serializes calls: no two callbacks run concurrently, and
/// `on_detected` gets exclusive access to the device for its duration.
pub trait TagEventHandler<D>: Send + Sync + 'static {
    /// A tag entered the field.
    ///
    /// # Errors
    ///
    /// Errors are logged by the session and never end polling.
    fn on_detected(
        &self,
        device: &mut D,
        tag: &DetectedTag,
    ) -> impl Future<Output = Result<()>> + Send;

    /// The previously detected tag left the field.
    fn on_removed(&self);

    /// The reader is unreachable. The session ends after this call.
    fn on_disconnected(&self, error: &HardwareError);
}
