//! Error types for reader operations.
//!
//! This module defines error types specific to proximity-card reader
//! operations, covering transport disconnection, timeouts, protocol errors,
//! tag-level read failures and the pause/resume hand-off.

use std::time::Duration;

/// Result type alias for hardware operations.
pub type Result<T> = std::result::Result<T, HardwareError>;

/// Errors that can occur during reader operations.
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    /// Reader is not connected or the transport has been closed.
    #[error("Device disconnected: {device}")]
    Disconnected { device: String },

    /// Operation timed out after specified duration.
    #[error("Operation timeout after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Reader communication error.
    #[error("Communication error: {message}")]
    CommunicationError { message: String },

    /// Invalid data received from the reader or supplied by the caller.
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// Reader or tag initialization failed.
    #[error("Initialization failed: {message}")]
    InitializationFailed { message: String },

    /// Transport configuration error.
    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    /// Tag-level read error (capabilities, NDEF).
    #[error("Tag read error: {message}")]
    TagReadError { message: String },

    /// The polling session is not running or refused the hand-off.
    #[error("Session unavailable: {message}")]
    SessionUnavailable { message: String },

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HardwareError {
    /// Create a new disconnected error.
    pub fn disconnected(device: impl Into<String>) -> Self {
        Self::Disconnected {
            device: device.into(),
        }
    }

    /// Create a new timeout error.
    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    /// Create a timeout error from a [`Duration`].
    pub fn timeout_after(duration: Duration) -> Self {
        Self::timeout(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    /// Create a new communication error.
    pub fn communication(message: impl Into<String>) -> Self {
        Self::CommunicationError {
            message: message.into(),
        }
    }

    /// Create a new invalid data error.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    /// Create a new initialization failed error.
    pub fn initialization_failed(message: impl Into<String>) -> Self {
        Self::InitializationFailed {
            message: message.into(),
        }
    }

    /// Create a new configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::ConfigurationError {
            message: message.into(),
        }
    }

    /// Create a new tag read error.
    pub fn tag_read(message: impl Into<String>) -> Self {
        Self::TagReadError {
            message: message.into(),
        }
    }

    /// Create a new session unavailable error.
    pub fn session_unavailable(message: impl Into<String>) -> Self {
        Self::SessionUnavailable {
            message: message.into(),
        }
    }

    /// Whether this error means the reader itself is gone.
    ///
    /// Only disconnection ends a polling session; every other error is
    /// treated as transient.
    pub fn is_disconnect(&self) -> bool {
        match self {
            Self::Disconnected { .. } => true,
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}
