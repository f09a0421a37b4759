//! Single-slot "await next scan" channel.
//!
//! The slot holds at most one [`ScanSnapshot`]. Publishing overwrites any
//! unconsumed snapshot, so a waiter always receives the freshest detection,
//! and never blocks the polling worker.

use crate::state::ScanSnapshot;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a wait ended without a snapshot.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AwaitError {
    #[error("deadline elapsed")]
    Timeout,

    #[error("cancelled")]
    Cancelled,
}

#[derive(Debug, Default)]
pub struct ScanSlot {
    slot: Mutex<Option<ScanSnapshot>>,
    notify: Notify,
}

impl ScanSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `snapshot`, replacing any unconsumed one, and wake one waiter.
    pub fn publish(&self, snapshot: ScanSnapshot) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(snapshot);
        self.notify.notify_one();
    }

    /// The buffered snapshot, if any, without consuming it.
    pub fn peek(&self) -> Option<ScanSnapshot> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn take(&self) -> Option<ScanSnapshot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    /// Consume the next snapshot.
    ///
    /// A snapshot already buffered is returned immediately, even if the
    /// deadline has passed or `cancel` has fired. Otherwise waits until a
    /// snapshot is published, `deadline` passes or `cancel` fires, checking
    /// cancellation first. `None` waits without a deadline.
    ///
    /// # Errors
    ///
    /// Returns [`AwaitError::Timeout`] or [`AwaitError::Cancelled`].
    pub async fn await_next(
        &self,
        deadline: Option<Instant>,
        cancel: &CancellationToken,
    ) -> Result<ScanSnapshot, AwaitError> {
        if let Some(snapshot) = self.take() {
            return Ok(snapshot);
        }

        let expired = async {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(expired);

        loop {
            // Register before checking the slot so a publish in between is not missed.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if cancel.is_cancelled() {
                return Err(AwaitError::Cancelled);
            }
            if let Some(snapshot) = self.take() {
                return Ok(snapshot);
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AwaitError::Cancelled),
                _ = &mut notified => continue,
                _ = &mut expired => return Err(AwaitError::Timeout),
            }
        }
    }
}
