//! Mock connector that hands out a pre-built [`MockReader`].

use crate::{
    HardwareError, Result,
    devices::AnyReader,
    mock::MockReader,
    traits::ReaderConnector,
    types::TransportKind,
};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// A connection attempt recorded by [`MockConnector`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectAttempt {
    pub path: String,
    pub transport: TransportKind,
    pub timeout: Duration,
}

/// Connector for testing without hardware.
///
/// Holds at most one reader; the first successful `connect` takes it and
/// later attempts fail with [`HardwareError::InitializationFailed`].
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use tagsense_hardware::mock::{MockConnector, MockReader};
/// use tagsense_hardware::traits::ReaderConnector;
/// use tagsense_hardware::types::TransportKind;
///
/// #[tokio::main]
/// async fn main() -> tagsense_hardware::Result<()> {
///     let (reader, _handle) = MockReader::new("/dev/i2c-1");
///     let connector = MockConnector::new(reader);
///
///     let _device = connector
///         .connect("/dev/i2c-1", TransportKind::I2c, Duration::from_secs(10))
///         .await?;
///     assert_eq!(connector.attempts().len(), 1);
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct MockConnector {
    reader: Arc<Mutex<Option<MockReader>>>,
    failure: Option<String>,
    delay: Duration,
    attempts: Arc<Mutex<Vec<ConnectAttempt>>>,
}

impl MockConnector {
    /// A connector that hands out `reader` once.
    pub fn new(reader: MockReader) -> Self {
        Self {
            reader: Arc::new(Mutex::new(Some(reader))),
            failure: None,
            delay: Duration::ZERO,
            attempts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A connector whose every attempt fails with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            reader: Arc::new(Mutex::new(None)),
            failure: Some(message.into()),
            delay: Duration::ZERO,
            attempts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Make the reader take `delay` to answer the connection handshake.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Every connection attempt made so far, in order.
    pub fn attempts(&self) -> Vec<ConnectAttempt> {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ReaderConnector for MockConnector {
    async fn connect(
        &self,
        path: &str,
        transport: TransportKind,
        timeout: Duration,
    ) -> Result<AnyReader> {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ConnectAttempt {
                path: path.to_string(),
                transport,
                timeout,
            });

        if let Some(message) = &self.failure {
            return Err(HardwareError::initialization_failed(format!(
                "{path} ({transport}): {message}"
            )));
        }

        if !self.delay.is_zero() {
            tokio::time::timeout(timeout, tokio::time::sleep(self.delay))
                .await
                .map_err(|_| HardwareError::timeout_after(timeout))?;
        }

        self.reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .map(AnyReader::Mock)
            .ok_or_else(|| {
                HardwareError::initialization_failed(format!("{path}: reader already in use"))
            })
    }
}
