//! Background polling session.
//!
//! A [`PollingSession`] owns a reader device and drives a
//! [`TagEventHandler`] from a single task: detection, removal and
//! disconnection callbacks are serialized, and `on_detected` borrows the
//! device for its duration. Foreground code reaches the device only through
//! [`SessionControl::pause_and_run`], which pauses polling and lends the
//! device out.
//!
//! # Architecture
//!
//! ```text
//!                     ┌──────────────────────────┐
//!  SessionControl ───►│ request (mpsc)           │
//!                     │                          │
//!       ◄── grant ────│  PollingSession::run     │──► TagEventHandler
//!       ─── release ─►│  (owns the device)       │
//!                     └──────────────────────────┘
//! ```
//!
//! Shutdown is cooperative: cancelling the token ends `run` at the next
//! await point, and closing the device's [`TransportCloser`] interrupts an
//! operation already stuck in hardware I/O.
//!
//! [`TransportCloser`]: crate::transport::TransportCloser

use crate::{
    HardwareError, Result,
    traits::{ReaderDevice, TagEventHandler},
};
use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

/// Pending pause requests the session buffers before senders wait.
const REQUEST_CAPACITY: usize = 4;

/// Lower bound on the poll interval to prevent busy-waiting.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Polling cadence of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Delay between detection polls.
    pub poll_interval: Duration,

    /// How long a tag may go unseen before it counts as removed.
    pub card_removal_timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(250),
            card_removal_timeout: Duration::from_millis(600),
        }
    }
}

/// A request to borrow the device.
///
/// The session sends the device through `grant` and waits for it on
/// `release`.
struct PauseRequest<D> {
    grant: oneshot::Sender<D>,
    release: oneshot::Receiver<D>,
}

enum Wake<D> {
    Cancelled,
    Pause(PauseRequest<D>),
    Poll,
}

enum Lent<D> {
    Returned(D),
    Cancelled,
    Lost,
}

/// The tag currently considered present.
struct Presence {
    uid: String,
    last_seen: Instant,
}

/// Background polling loop over one reader device.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use tagsense_hardware::mock::MockReader;
/// use tagsense_hardware::session::{PollConfig, PollingSession};
/// # use tagsense_hardware::traits::{DetectedTag, ReaderDevice, TagEventHandler};
/// # use tagsense_hardware::HardwareError;
/// # struct Printer;
/// # impl TagEventHandler<MockReader> for Printer {
/// #     async fn on_detected(&self, _: &mut MockReader, tag: &DetectedTag) -> tagsense_hardware::Result<()> {
/// #         println!("{}", tag.uid);
/// #         Ok(())
/// #     }
/// #     fn on_removed(&self) {}
/// #     fn on_disconnected(&self, _: &HardwareError) {}
/// # }
/// use tokio_util::sync::CancellationToken;
///
/// #[tokio::main]
/// async fn main() -> tagsense_hardware::Result<()> {
///     let (reader, _handle) = MockReader::new("/dev/i2c-1");
///     let (session, control) = PollingSession::new(reader, PollConfig::default());
///
///     let cancel = CancellationToken::new();
///     let worker = tokio::spawn(session.run(Arc::new(Printer), cancel.clone()));
///
///     let firmware = control
///         .pause_and_run(|device| Box::pin(async move { device.firmware_version().await }))
///         .await??;
///     println!("firmware {}", firmware.version);
///
///     cancel.cancel();
///     worker.await.ok();
///     Ok(())
/// }
/// ```
pub struct PollingSession<D> {
    device: D,
    config: PollConfig,
    requests: mpsc::Receiver<PauseRequest<D>>,
}

impl<D: ReaderDevice> PollingSession<D> {
    /// Create a session and the control used to borrow its device.
    pub fn new(device: D, config: PollConfig) -> (Self, SessionControl<D>) {
        let (tx, rx) = mpsc::channel(REQUEST_CAPACITY);

        let session = Self {
            device,
            config,
            requests: rx,
        };

        (session, SessionControl { requests: tx })
    }

    /// Poll until cancelled or the reader disconnects.
    ///
    /// Returns `Ok(())` when cancelled. No callback runs once `cancel` has
    /// fired.
    ///
    /// # Errors
    ///
    /// Returns the disconnection error after `on_disconnected` has been
    /// called, or [`HardwareError::SessionUnavailable`] if a borrower never
    /// returned the device.
    pub async fn run<H>(self, handler: Arc<H>, cancel: CancellationToken) -> Result<()>
    where
        H: TagEventHandler<D>,
    {
        let Self {
            mut device,
            config,
            mut requests,
        } = self;

        let mut ticker = tokio::time::interval(config.poll_interval.max(MIN_POLL_INTERVAL));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut present: Option<Presence> = None;

        debug!(
            poll_interval_ms = config.poll_interval.as_millis() as u64,
            removal_timeout_ms = config.card_removal_timeout.as_millis() as u64,
            "Polling session started"
        );

        loop {
            let wake = tokio::select! {
                biased;
                _ = cancel.cancelled() => Wake::Cancelled,
                Some(request) = requests.recv() => Wake::Pause(request),
                _ = ticker.tick() => Wake::Poll,
            };

            match wake {
                Wake::Cancelled => break,
                Wake::Pause(request) => match Self::lend(device, request, &cancel).await {
                    Lent::Returned(returned) => device = returned,
                    Lent::Cancelled => break,
                    Lent::Lost => {
                        error!("Device was not returned by a paused operation");
                        return Err(HardwareError::session_unavailable(
                            "device was not returned after pause",
                        ));
                    }
                },
                Wake::Poll => {
                    let polled = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        polled = device.poll_tag() => polled,
                    };
                    trace!(found = matches!(polled, Ok(Some(_))), "Poll cycle");

                    match polled {
                        Ok(Some(tag)) => {
                            let now = Instant::now();
                            if let Some(presence) = present.as_mut()
                                && presence.uid == tag.uid
                            {
                                presence.last_seen = now;
                                continue;
                            }

                            if cancel.is_cancelled() {
                                break;
                            }
                            if present.take().is_some() {
                                handler.on_removed();
                            }
                            present = Some(Presence {
                                uid: tag.uid.clone(),
                                last_seen: now,
                            });

                            let detected = tokio::select! {
                                biased;
                                _ = cancel.cancelled() => break,
                                detected = handler.on_detected(&mut device, &tag) => detected,
                            };
                            if let Err(e) = detected {
                                warn!(uid = %tag.uid, error = %e, "Detection handler failed");
                            }
                        }
                        Ok(None) => {
                            if let Some(presence) = &present
                                && presence.last_seen.elapsed() >= config.card_removal_timeout
                            {
                                if cancel.is_cancelled() {
                                    break;
                                }
                                debug!(uid = %presence.uid, "Tag left the field");
                                present = None;
                                handler.on_removed();
                            }
                        }
                        Err(e) if e.is_disconnect() => {
                            if cancel.is_cancelled() {
                                break;
                            }
                            error!(error = %e, "Reader disconnected, ending polling session");
                            handler.on_disconnected(&e);
                            return Err(e);
                        }
                        Err(e) => {
                            debug!(error = %e, "Transient poll failure");
                        }
                    }
                }
            }
        }

        debug!("Polling session cancelled");
        Ok(())
    }

    async fn lend(device: D, request: PauseRequest<D>, cancel: &CancellationToken) -> Lent<D> {
        let PauseRequest { grant, release } = request;

        if let Err(device) = grant.send(device) {
            trace!("Pause requester went away before the grant");
            return Lent::Returned(device);
        }
        trace!("Device lent to paused operation");

        tokio::select! {
            biased;
            returned = release => match returned {
                Ok(device) => {
                    trace!("Device returned, resuming polling");
                    Lent::Returned(device)
                }
                Err(_) => Lent::Lost,
            },
            _ = cancel.cancelled() => Lent::Cancelled,
        }
    }
}

impl<D> fmt::Debug for PollingSession<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollingSession")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Foreground handle of a [`PollingSession`].
///
/// Clones share the same session. Dropping every control does not stop the
/// session; cancellation does.
pub struct SessionControl<D> {
    requests: mpsc::Sender<PauseRequest<D>>,
}

impl<D: Send + 'static> SessionControl<D> {
    /// Whether the session is still accepting requests.
    pub fn is_running(&self) -> bool {
        !self.requests.is_closed()
    }

    /// Pause polling, run `op` with exclusive access to the device, resume.
    ///
    /// The device is handed back to the session even if the returned future
    /// is dropped while `op` runs.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError::SessionUnavailable`] if the session has ended
    /// or ends before granting the device. Errors of `op` itself are part of
    /// `T`.
    pub async fn pause_and_run<F, T>(&self, op: F) -> Result<T>
    where
        F: for<'a> FnOnce(&'a mut D) -> BoxFuture<'a, T> + Send,
        T: Send,
    {
        let (grant_tx, grant_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();

        self.requests
            .send(PauseRequest {
                grant: grant_tx,
                release: release_rx,
            })
            .await
            .map_err(|_| HardwareError::session_unavailable("polling session has ended"))?;

        let device = grant_rx.await.map_err(|_| {
            HardwareError::session_unavailable("polling session ended before granting the device")
        })?;

        let mut lease = Lease {
            device: None,
            release: Some(release_tx),
        };
        let device = lease.device.insert(device);

        let result = op(device).await;
        drop(lease);
        Ok(result)
    }
}

impl<D> Clone for SessionControl<D> {
    fn clone(&self) -> Self {
        Self {
            requests: self.requests.clone(),
        }
    }
}

impl<D> fmt::Debug for SessionControl<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionControl")
            .field("running", &!self.requests.is_closed())
            .finish()
    }
}

/// Returns a borrowed device to the session when dropped.
struct Lease<D> {
    device: Option<D>,
    release: Option<oneshot::Sender<D>>,
}

impl<D> Drop for Lease<D> {
    fn drop(&mut self) {
        if let (Some(device), Some(release)) = (self.device.take(), self.release.take()) {
            let _ = release.send(device);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockReader, MockReaderHandle, MockTag};
    use crate::traits::DetectedTag;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Detected(String),
        Removed,
        Disconnected,
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<Event>>,
    }

    impl Recorder {
        fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }
    }

    impl TagEventHandler<MockReader> for Recorder {
        async fn on_detected(&self, device: &mut MockReader, tag: &DetectedTag) -> Result<()> {
            device.select_tag(tag).await?;
            self.events
                .lock()
                .unwrap()
                .push(Event::Detected(tag.uid.clone()));
            Ok(())
        }

        fn on_removed(&self) {
            self.events.lock().unwrap().push(Event::Removed);
        }

        fn on_disconnected(&self, _error: &HardwareError) {
            self.events.lock().unwrap().push(Event::Disconnected);
        }
    }

    fn fast() -> PollConfig {
        PollConfig {
            poll_interval: Duration::from_millis(10),
            card_removal_timeout: Duration::from_millis(30),
        }
    }

    fn start(
        config: PollConfig,
    ) -> (
        MockReaderHandle,
        SessionControl<MockReader>,
        Arc<Recorder>,
        CancellationToken,
        tokio::task::JoinHandle<Result<()>>,
    ) {
        let (reader, handle) = MockReader::new("/dev/i2c-1");
        let (session, control) = PollingSession::new(reader, config);
        let recorder = Arc::new(Recorder::default());
        let cancel = CancellationToken::new();
        let worker = tokio::spawn(session.run(Arc::clone(&recorder), cancel.clone()));
        (handle, control, recorder, cancel, worker)
    }

    #[test]
    fn test_poll_config_default() {
        let config = PollConfig::default();
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.card_removal_timeout, Duration::from_millis(600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_detect_then_remove() {
        let (handle, _control, recorder, cancel, worker) = start(fast());

        handle.present(MockTag::ntag215("04aaaaaa").unwrap());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(recorder.events(), vec![Event::Detected("04aaaaaa".into())]);

        handle.remove();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(
            recorder.events(),
            vec![Event::Detected("04aaaaaa".into()), Event::Removed]
        );

        cancel.cancel();
        assert!(worker.await.unwrap().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tag_swap_emits_removal_first() {
        let (handle, _control, recorder, cancel, worker) = start(fast());

        handle.present(MockTag::ntag215("04aaaaaa").unwrap());
        tokio::time::sleep(Duration::from_millis(25)).await;
        handle.present(MockTag::ntag215("04bbbbbb").unwrap());
        tokio::time::sleep(Duration::from_millis(25)).await;

        assert_eq!(
            recorder.events(),
            vec![
                Event::Detected("04aaaaaa".into()),
                Event::Removed,
                Event::Detected("04bbbbbb".into()),
            ]
        );

        cancel.cancel();
        worker.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_poll_errors_keep_polling() {
        let (handle, _control, recorder, cancel, worker) = start(fast());

        handle.fail_poll(Some("CRC mismatch"));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(recorder.events().is_empty());
        assert!(!worker.is_finished());

        handle.clear_failures();
        handle.present(MockTag::ntag215("04aaaaaa").unwrap());
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(recorder.events(), vec![Event::Detected("04aaaaaa".into())]);

        cancel.cancel();
        worker.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_ends_session() {
        let (handle, control, recorder, _cancel, worker) = start(fast());

        handle.disconnect();
        let result = worker.await.unwrap();

        assert!(result.unwrap_err().is_disconnect());
        assert_eq!(recorder.events(), vec![Event::Disconnected]);
        assert!(!control.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_callbacks_after_cancel() {
        let (handle, _control, recorder, cancel, worker) = start(fast());

        cancel.cancel();
        handle.present(MockTag::ntag215("04aaaaaa").unwrap());
        handle.disconnect();

        worker.await.unwrap().unwrap();
        assert!(recorder.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_and_run_lends_device() {
        let (handle, control, _recorder, cancel, worker) = start(fast());
        tokio::time::sleep(Duration::from_millis(30)).await;

        let polls_before = handle.poll_count();
        let firmware = control
            .pause_and_run(|device| {
                Box::pin(async move {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    device.firmware_version().await
                })
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(firmware.version, "1.6");
        assert!(handle.poll_count() <= polls_before + 1);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(handle.poll_count() > polls_before + 1);

        cancel.cancel();
        worker.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_back_to_back_pauses_reuse_device() {
        let (_handle, control, _recorder, cancel, worker) = start(fast());

        for _ in 0..3 {
            let status = control
                .pause_and_run(|device| Box::pin(async move { device.general_status().await }))
                .await
                .unwrap();
            assert!(status.is_ok());
        }

        cancel.cancel();
        worker.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_pause_returns_device() {
        let (handle, control, _recorder, cancel, worker) = start(fast());

        let pause = control.pause_and_run(|_device| Box::pin(futures::future::pending::<()>()));
        let timed_out = tokio::time::timeout(Duration::from_millis(50), pause).await;
        assert!(timed_out.is_err());

        let polls = handle.poll_count();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(handle.poll_count() > polls);

        cancel.cancel();
        worker.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_after_session_ended() {
        let (_handle, control, _recorder, cancel, worker) = start(fast());
        cancel.cancel();
        worker.await.unwrap().unwrap();

        let result = control
            .pause_and_run(|_device| Box::pin(async {}))
            .await;
        assert!(matches!(result, Err(HardwareError::SessionUnavailable { .. })));
    }
}
