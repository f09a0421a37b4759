//! Transport-level interruption.
//!
//! A [`TransportCloser`] is the only part of a reader that may be touched from
//! outside the task that owns the device. Closing it makes every in-flight and
//! future operation on the device fail with [`HardwareError::Disconnected`],
//! which is how a worker blocked inside a slow hardware call gets unstuck.

use crate::{HardwareError, Result};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::CancellationToken;

type CloseHook = Arc<dyn Fn() -> Result<()> + Send + Sync>;

/// Cloneable handle that closes a reader's transport.
///
/// `close()` is idempotent: the hook (if any) runs exactly once, later calls
/// return `Ok(())`.
///
/// # Examples
///
/// ```
/// use tagsense_hardware::TransportCloser;
///
/// let closer = TransportCloser::new("/dev/i2c-1");
/// assert!(!closer.is_closed());
///
/// closer.close().unwrap();
/// closer.close().unwrap();
/// assert!(closer.is_closed());
/// ```
#[derive(Clone)]
pub struct TransportCloser {
    token: CancellationToken,
    fired: Arc<AtomicBool>,
    device: Arc<str>,
    hook: Option<CloseHook>,
}

impl TransportCloser {
    /// Create a closer for the transport at `device`.
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            token: CancellationToken::new(),
            fired: Arc::new(AtomicBool::new(false)),
            device: Arc::from(device.into()),
            hook: None,
        }
    }

    /// Create a closer that also runs `hook` the first time it is closed.
    ///
    /// Real transports use the hook to release the file descriptor.
    pub fn with_hook(
        device: impl Into<String>,
        hook: impl Fn() -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            hook: Some(Arc::new(hook)),
            ..Self::new(device)
        }
    }

    /// Path or name of the transport this closer belongs to.
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Close the transport, interrupting in-flight operations.
    ///
    /// # Errors
    ///
    /// Returns the hook's error on the first call only. The transport is
    /// marked closed either way.
    pub fn close(&self) -> Result<()> {
        if self.fired.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.token.cancel();
        match &self.hook {
            Some(hook) => hook(),
            None => Ok(()),
        }
    }

    /// Whether the transport has been closed.
    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Run `op` unless the transport closes first.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError::Disconnected`] if the transport is closed
    /// before or while `op` runs, otherwise whatever `op` returns.
    pub async fn guard<T>(&self, op: impl Future<Output = Result<T>>) -> Result<T> {
        if self.is_closed() {
            return Err(self.closed_error());
        }

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(self.closed_error()),
            result = op => result,
        }
    }

    fn closed_error(&self) -> HardwareError {
        HardwareError::disconnected(format!("{} (transport closed)", self.device))
    }
}

impl fmt::Debug for TransportCloser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportCloser")
            .field("device", &self.device)
            .field("closed", &self.is_closed())
            .field("has_hook", &self.hook.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn test_hook_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let closer = TransportCloser::with_hook("/dev/ttyAMA0", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(HardwareError::communication("fd already released"))
        });

        assert!(closer.close().is_err());
        assert!(closer.close().is_ok());
        assert!(closer.clone().close().is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(closer.is_closed());
    }

    #[tokio::test]
    async fn test_guard_interrupted_by_close() {
        let closer = TransportCloser::new("/dev/i2c-1");
        let remote = closer.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            remote.close().unwrap();
        });

        let result: Result<()> = closer
            .guard(futures::future::pending::<Result<()>>())
            .await;
        assert!(matches!(result, Err(HardwareError::Disconnected { .. })));
    }

    #[tokio::test]
    async fn test_guard_passes_through_when_open() {
        let closer = TransportCloser::new("/dev/spidev0.0");
        let value = closer.guard(async { Ok(7u8) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_guard_rejects_after_close() {
        let closer = TransportCloser::new("/dev/spidev0.0");
        closer.close().unwrap();

        let result = closer.guard(async { Ok(()) }).await;
        assert!(result.unwrap_err().is_disconnect());
    }
}
