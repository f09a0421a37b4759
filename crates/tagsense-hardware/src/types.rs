//! Common types shared across reader implementations.
//!
//! This module defines the transport selector, tag capability information,
//! pre-parsed NDEF structures and the results of the reader's diagnostic
//! probes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::HardwareError;

/// Physical transport between host and reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// High-speed UART (e.g. `/dev/ttyAMA0`).
    Uart,

    /// I2C bus (e.g. `/dev/i2c-1`).
    I2c,

    /// SPI bus (e.g. `/dev/spidev0.0`).
    Spi,
}

impl TransportKind {
    /// All supported transports, in configuration order.
    pub const ALL: [TransportKind; 3] = [Self::Uart, Self::I2c, Self::Spi];

    /// Configuration name of the transport.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uart => "uart",
            Self::I2c => "i2c",
            Self::Spi => "spi",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = HardwareError;

    /// Parse a transport name. Matching is case-sensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| {
                HardwareError::configuration(format!(
                    "unsupported transport type {:?}, must be one of [uart i2c spi]",
                    s
                ))
            })
    }
}

/// Capability information reported for an initialized tag.
///
/// Fields are empty/zero when the tag family does not define them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagInfo {
    /// NTAG variant (e.g. "NTAG215"), empty for non-NTAG tags.
    pub ntag_variant: String,

    /// MIFARE variant (e.g. "MIFARE Classic 1K"), empty for non-MIFARE tags.
    pub mifare_variant: String,

    /// Bytes of user-writable memory.
    pub user_memory_bytes: u32,
}

impl TagInfo {
    /// Capability info for an NTAG21x tag.
    pub fn ntag(variant: impl Into<String>, user_memory_bytes: u32) -> Self {
        Self {
            ntag_variant: variant.into(),
            mifare_variant: String::new(),
            user_memory_bytes,
        }
    }

    /// Capability info for a MIFARE tag.
    pub fn mifare(variant: impl Into<String>, user_memory_bytes: u32) -> Self {
        Self {
            ntag_variant: String::new(),
            mifare_variant: variant.into(),
            user_memory_bytes,
        }
    }
}

/// Well-known NDEF record types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum NdefRecordType {
    /// NFC Forum text record (`T`).
    Text,

    /// NFC Forum URI record (`U`).
    Uri,

    /// Any other record type, by its type name.
    Other(String),
}

/// A single pre-parsed NDEF record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NdefRecord {
    /// Record type.
    pub record_type: NdefRecordType,

    /// Decoded text for text records, URI for URI records.
    pub text: Option<String>,

    /// Raw payload bytes.
    pub payload: Vec<u8>,
}

impl NdefRecord {
    /// Create a text record.
    pub fn text(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            record_type: NdefRecordType::Text,
            payload: text.as_bytes().to_vec(),
            text: Some(text),
        }
    }

    /// Create a URI record.
    pub fn uri(uri: impl Into<String>) -> Self {
        let uri = uri.into();
        Self {
            record_type: NdefRecordType::Uri,
            payload: uri.as_bytes().to_vec(),
            text: Some(uri),
        }
    }

    /// Create a record of another type with raw payload.
    pub fn other(type_name: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            record_type: NdefRecordType::Other(type_name.into()),
            text: None,
            payload,
        }
    }

    /// Text content if this is a non-empty text record.
    pub fn as_text(&self) -> Option<&str> {
        match (&self.record_type, self.text.as_deref()) {
            (NdefRecordType::Text, Some(text)) if !text.is_empty() => Some(text),
            _ => None,
        }
    }
}

/// A pre-parsed NDEF message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NdefMessage {
    /// Records in message order.
    pub records: Vec<NdefRecord>,
}

impl NdefMessage {
    /// Create a message from records.
    pub fn new(records: Vec<NdefRecord>) -> Self {
        Self { records }
    }

    /// First non-empty text record, if any.
    pub fn first_text(&self) -> Option<&str> {
        self.records.iter().find_map(NdefRecord::as_text)
    }
}

/// Result of the reader's communication self-test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnoseResult {
    /// Whether the echoed payload matched.
    pub success: bool,
}

/// Reader general status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneralStatus {
    /// Whether an external RF field is present.
    pub field_present: bool,

    /// Last error code reported by the reader.
    pub last_error: u8,

    /// Number of targets currently in the field.
    pub targets: u8,
}

/// Reader firmware information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareVersion {
    /// Firmware version string (e.g. "1.6").
    pub version: String,

    /// ISO/IEC 14443 Type A support.
    pub support_iso14443a: bool,

    /// ISO/IEC 14443 Type B support.
    pub support_iso14443b: bool,

    /// ISO/IEC 18092 (FeliCa/NFCIP-1) support.
    pub support_iso18092: bool,
}
