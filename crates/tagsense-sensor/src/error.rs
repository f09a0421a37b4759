use tagsense_hardware::HardwareError;
use thiserror::Error;

/// Errors surfaced by the sensor to its callers.
#[derive(Error, Debug)]
pub enum SensorError {
    // Setup errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to connect to reader: {0}")]
    Connection(#[source] HardwareError),

    #[error("Polling session already started")]
    AlreadyStarted,

    // Command errors
    #[error("missing or invalid \"action\" field in command")]
    MissingAction,

    #[error("action {0:?} is not implemented")]
    UnknownAction(String),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    // Wait outcomes
    #[error("await_scan: no tag detected within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("sensor closed")]
    Closed,

    // Diagnostics errors
    #[error("diagnostics: device not connected")]
    NotConnected,

    #[error("diagnostics: {0}")]
    Diagnostics(#[source] HardwareError),
}

impl SensorError {
    /// Whether the error was caused by the caller's input.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::MissingAction | Self::UnknownAction(_) | Self::InvalidCommand(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SensorError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            SensorError::UnknownAction("reboot".into()).to_string(),
            "action \"reboot\" is not implemented"
        );
        assert_eq!(
            SensorError::Timeout { timeout_ms: 100 }.to_string(),
            "await_scan: no tag detected within 100ms"
        );
        assert_eq!(SensorError::Closed.to_string(), "sensor closed");
    }

    #[test]
    fn test_connection_error_keeps_source() {
        let error = SensorError::Connection(HardwareError::timeout(10_000));
        assert!(error.source().is_some());
        assert!(error.to_string().contains("10000ms"));
    }

    #[test]
    fn test_caller_errors() {
        assert!(SensorError::MissingAction.is_caller_error());
        assert!(SensorError::InvalidCommand("x".into()).is_caller_error());
        assert!(!SensorError::Closed.is_caller_error());
        assert!(!SensorError::NotConnected.is_caller_error());
    }
}
