//! Sensor lifecycle: connect, run the polling worker, shut down.
//!
//! # Shutdown
//!
//! `close()` runs these steps in order, each at most once:
//!
//! 1. set the closed flag under the cache write lock
//! 2. cancel the shared token, waking every waiter
//! 3. close the reader transport, interrupting in-flight I/O
//! 4. await the polling worker
//! 5. release the session control
//!
//! Dropping the sensor without `close()` performs steps 2 and 3 and detaches
//! the worker.

use crate::config::{ResolvedConfig, SensorConfig};
use crate::error::{Result, SensorError};
use crate::handlers::SensorCore;
use crate::state::{Readings, TagState};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tagsense_hardware::{
    AnyReader, PollingSession, ReaderConnector, ReaderDevice, SessionControl, TransportCloser,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Lifecycle phase of a sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Created, no polling session yet.
    Unstarted,

    /// Polling session started. The worker may have ended on disconnect.
    Running,

    /// Closed; terminal.
    Closed,
}

struct Worker {
    join: JoinHandle<tagsense_hardware::Result<()>>,
    closer: TransportCloser,
    control: SessionControl<AnyReader>,
}

/// Proximity-card reader sensor.
///
/// # Example
///
/// ```no_run
/// use tagsense_hardware::mock::{MockConnector, MockReader};
/// use tagsense_sensor::{Pn532Sensor, SensorConfig};
///
/// #[tokio::main]
/// async fn main() -> tagsense_sensor::Result<()> {
///     let (reader, _handle) = MockReader::new("/dev/i2c-1");
///     let config = SensorConfig::from_json(r#"{"transport": "i2c", "device_path": "/dev/i2c-1"}"#)?;
///
///     let sensor = Pn532Sensor::connect(config, &MockConnector::new(reader)).await?;
///     println!("{:?}", sensor.readings());
///
///     sensor.close().await
/// }
/// ```
pub struct Pn532Sensor {
    pub(crate) core: Arc<SensorCore>,
    pub(crate) cancel: CancellationToken,
    config: ResolvedConfig,
    worker: Mutex<Option<Worker>>,
}

impl Pn532Sensor {
    /// Create a sensor without a reader.
    ///
    /// # Errors
    ///
    /// Returns [`SensorError::Config`] if the config is invalid.
    pub fn new(config: SensorConfig) -> Result<Self> {
        let config = config.resolve()?;

        Ok(Self {
            core: Arc::new(SensorCore::new(config.read_ndef, config.debug)),
            cancel: CancellationToken::new(),
            config,
            worker: Mutex::new(None),
        })
    }

    /// Connect to the configured reader and start polling.
    ///
    /// Must be called within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`SensorError::Config`] if the config is invalid, or
    /// [`SensorError::Connection`] if the reader cannot be opened. Nothing is
    /// left running on error.
    pub async fn connect<C: ReaderConnector>(config: SensorConfig, connector: &C) -> Result<Self> {
        let sensor = Self::new(config)?;
        let cfg = &sensor.config;

        info!(
            transport = %cfg.transport,
            device_path = %cfg.device_path,
            "Connecting to reader"
        );

        let device = connector
            .connect(&cfg.device_path, cfg.transport, cfg.connect_timeout)
            .await
            .map_err(|e| {
                error!(device_path = %cfg.device_path, error = %e, "Reader connection failed");
                SensorError::Connection(e)
            })?;

        sensor.start_session(device)?;
        Ok(sensor)
    }

    /// Start the polling worker on a connected device.
    ///
    /// Marks the device healthy before the first poll. Must be called within
    /// a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`SensorError::Closed`] after `close()`, or
    /// [`SensorError::AlreadyStarted`] if a session was already started.
    pub fn start_session(&self, device: AnyReader) -> Result<()> {
        let mut worker = self.worker();
        if worker.is_some() {
            return Err(SensorError::AlreadyStarted);
        }

        self.core
            .cache
            .update(|state| state.device_healthy = true)
            .ok_or(SensorError::Closed)?;

        let closer = device.closer();
        let (session, control) = PollingSession::new(device, self.config.poll);
        let handler = Arc::clone(&self.core);
        let cancel = self.cancel.clone();

        let join = tokio::spawn(async move {
            let result = session.run(handler, cancel.clone()).await;
            if let Err(e) = &result
                && !cancel.is_cancelled()
            {
                error!(error = %e, "Polling session exited with error");
            }
            result
        });

        info!(
            device = %closer.device(),
            poll_interval_ms = self.config.poll.poll_interval.as_millis() as u64,
            "Polling session started"
        );

        *worker = Some(Worker {
            join,
            closer,
            control,
        });
        Ok(())
    }

    fn worker(&self) -> MutexGuard<'_, Option<Worker>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current readings. Never blocks on hardware I/O.
    pub fn readings(&self) -> Readings {
        self.core.cache.readings()
    }

    /// Copy of the cached state.
    pub fn state(&self) -> TagState {
        self.core.cache.state()
    }

    pub fn phase(&self) -> Phase {
        if self.core.cache.is_closed() {
            Phase::Closed
        } else if self.worker().is_some() {
            Phase::Running
        } else {
            Phase::Unstarted
        }
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    /// Control of the running session, if any.
    pub(crate) fn session_control(&self) -> Option<SessionControl<AnyReader>> {
        self.worker().as_ref().map(|worker| worker.control.clone())
    }

    /// Shut the sensor down.
    ///
    /// Idempotent: calls after the first return `Ok(())` immediately.
    /// Returns once the polling worker has finished, which closing the
    /// transport bounds even if the worker is stuck in hardware I/O.
    ///
    /// # Errors
    ///
    /// Currently always succeeds; transport and worker failures are logged.
    pub async fn close(&self) -> Result<()> {
        if !self.core.cache.mark_closed() {
            debug!("Sensor already closed");
            return Ok(());
        }

        self.cancel.cancel();

        let worker = self.worker().take();
        let Some(Worker {
            join,
            closer,
            control,
        }) = worker
        else {
            info!("Sensor closed");
            return Ok(());
        };

        if let Err(e) = closer.close() {
            warn!(device = %closer.device(), error = %e, "Failed to close reader transport");
        }

        match join.await {
            Ok(Ok(())) => debug!("Polling worker stopped"),
            Ok(Err(e)) => debug!(error = %e, "Polling worker had ended with error"),
            Err(e) => error!(error = %e, "Polling worker panicked or was aborted"),
        }

        drop(control);
        info!(device = %closer.device(), "Sensor closed");
        Ok(())
    }
}

impl Drop for Pn532Sensor {
    fn drop(&mut self) {
        self.cancel.cancel();

        let worker = self
            .worker
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(worker) = worker.as_ref() {
            let _ = worker.closer.close();
        }
    }
}

impl std::fmt::Debug for Pn532Sensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pn532Sensor")
            .field("config", &self.config)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}
