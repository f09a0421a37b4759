//! Mock proximity-card reader for testing and development.
//!
//! This module provides a simulated reader whose RF field, tag contents,
//! failures and latency can be scripted through a [`MockReaderHandle`]
//! without requiring physical hardware.

use crate::{
    HardwareError, Result,
    traits::{DetectedTag, ReaderDevice, TagType},
    transport::TransportCloser,
    types::{DiagnoseResult, FirmwareVersion, GeneralStatus, NdefMessage, NdefRecord, TagInfo},
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// A tag the mock reader can present, with its scripted contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockTag {
    /// What the detection poll reports.
    pub tag: DetectedTag,

    /// What the capability probe reports.
    pub info: TagInfo,

    /// What the NDEF read returns.
    pub ndef: Option<NdefMessage>,
}

impl MockTag {
    /// A tag with empty capabilities and no NDEF message.
    pub fn new(tag: DetectedTag) -> Self {
        Self {
            tag,
            info: TagInfo::default(),
            ndef: None,
        }
    }

    /// An NTAG215 (504 bytes user memory) with the given display UID.
    ///
    /// # Errors
    ///
    /// Returns an error if `uid` is empty.
    pub fn ntag215(uid: impl Into<String>) -> Result<Self> {
        let tag = DetectedTag::builder(
            vec![0x04, 0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC],
            TagType::Ntag,
        )
        .uid(uid)
        .sak(0x00)
        .build()?;

        Ok(Self::new(tag).with_info(TagInfo::ntag("NTAG215", 504)))
    }

    /// Set the capability probe result.
    pub fn with_info(mut self, info: TagInfo) -> Self {
        self.info = info;
        self
    }

    /// Set the NDEF message.
    pub fn with_ndef(mut self, ndef: NdefMessage) -> Self {
        self.ndef = Some(ndef);
        self
    }

    /// Set a single-text-record NDEF message.
    pub fn with_text(self, text: impl Into<String>) -> Self {
        self.with_ndef(NdefMessage::new(vec![NdefRecord::text(text)]))
    }
}

/// Scripted failures, one per operation. `None` means the operation succeeds.
#[derive(Debug, Clone, Default)]
struct Failures {
    poll: Option<String>,
    select: Option<String>,
    tag_info: Option<String>,
    ndef: Option<String>,
    comm_test: Option<String>,
    general_status: Option<String>,
    firmware: Option<String>,
}

#[derive(Debug)]
struct MockState {
    field: Option<MockTag>,
    connected: bool,
    hang: bool,
    io_delay: Duration,
    failures: Failures,
    poll_count: u64,
    status: GeneralStatus,
    firmware: FirmwareVersion,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            field: None,
            connected: true,
            hang: false,
            io_delay: Duration::ZERO,
            failures: Failures::default(),
            poll_count: 0,
            status: GeneralStatus {
                field_present: false,
                last_error: 0,
                targets: 0,
            },
            firmware: FirmwareVersion {
                version: "1.6".to_string(),
                support_iso14443a: true,
                support_iso14443b: true,
                support_iso18092: true,
            },
        }
    }
}

type Shared = Arc<Mutex<MockState>>;

fn lock(state: &Shared) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn scripted(failure: &Option<String>) -> Result<()> {
    match failure {
        Some(message) => Err(HardwareError::communication(message.clone())),
        None => Ok(()),
    }
}

/// Mock reader for testing and development.
///
/// Every operation first honours the scripted hang and latency, both of which
/// are interrupted by closing the transport, then fails with
/// [`HardwareError::Disconnected`] if the reader was disconnected.
///
/// # Examples
///
/// ```
/// use tagsense_hardware::mock::{MockReader, MockTag};
/// use tagsense_hardware::traits::ReaderDevice;
///
/// #[tokio::main]
/// async fn main() -> tagsense_hardware::Result<()> {
///     let (mut reader, handle) = MockReader::new("/dev/i2c-1");
///
///     assert!(reader.poll_tag().await?.is_none());
///
///     handle.present(MockTag::ntag215("04aaaaaa")?);
///     let tag = reader.poll_tag().await?.expect("tag in field");
///     assert_eq!(tag.uid, "04aaaaaa");
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MockReader {
    state: Shared,
    closer: TransportCloser,
}

impl MockReader {
    /// Create a mock reader for the transport at `path`.
    ///
    /// Returns a tuple of (MockReader, MockReaderHandle) where the handle
    /// scripts the reader's behaviour.
    pub fn new(path: impl Into<String>) -> (Self, MockReaderHandle) {
        let state: Shared = Arc::new(Mutex::new(MockState::default()));
        let closer = TransportCloser::new(path);

        let reader = Self {
            state: Arc::clone(&state),
            closer: closer.clone(),
        };
        let handle = MockReaderHandle { state, closer };

        (reader, handle)
    }

    async fn io<T>(&self, op: impl FnOnce(&mut MockState) -> Result<T> + Send) -> Result<T> {
        let state = Arc::clone(&self.state);

        self.closer
            .guard(async move {
                let (hang, delay) = {
                    let state = lock(&state);
                    (state.hang, state.io_delay)
                };

                if hang {
                    futures::future::pending::<()>().await;
                }
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }

                let mut state = lock(&state);
                if !state.connected {
                    return Err(HardwareError::disconnected("mock reader unplugged"));
                }
                op(&mut state)
            })
            .await
    }

    fn tag_in_field<'s>(state: &'s MockState, tag: &DetectedTag) -> Result<&'s MockTag> {
        state
            .field
            .as_ref()
            .filter(|present| present.tag.uid == tag.uid)
            .ok_or_else(|| HardwareError::tag_read(format!("tag {} left the field", tag.uid)))
    }
}

impl ReaderDevice for MockReader {
    async fn poll_tag(&mut self) -> Result<Option<DetectedTag>> {
        self.io(|state| {
            state.poll_count += 1;
            scripted(&state.failures.poll)?;
            Ok(state.field.as_ref().map(|present| present.tag.clone()))
        })
        .await
    }

    async fn select_tag(&mut self, tag: &DetectedTag) -> Result<()> {
        self.io(|state| {
            scripted(&state.failures.select)?;
            Self::tag_in_field(state, tag).map(|_| ())
        })
        .await
    }

    async fn tag_info(&mut self, tag: &DetectedTag) -> Result<TagInfo> {
        self.io(|state| {
            scripted(&state.failures.tag_info)?;
            Self::tag_in_field(state, tag).map(|present| present.info.clone())
        })
        .await
    }

    async fn read_ndef(&mut self, tag: &DetectedTag) -> Result<Option<NdefMessage>> {
        self.io(|state| {
            scripted(&state.failures.ndef)?;
            Self::tag_in_field(state, tag).map(|present| present.ndef.clone())
        })
        .await
    }

    async fn diagnose_communication(&mut self, payload: &[u8]) -> Result<DiagnoseResult> {
        let echoed = !payload.is_empty();
        self.io(move |state| {
            scripted(&state.failures.comm_test)?;
            Ok(DiagnoseResult { success: echoed })
        })
        .await
    }

    async fn general_status(&mut self) -> Result<GeneralStatus> {
        self.io(|state| {
            scripted(&state.failures.general_status)?;
            let targets = u8::from(state.field.is_some());
            Ok(GeneralStatus {
                targets,
                ..state.status
            })
        })
        .await
    }

    async fn firmware_version(&mut self) -> Result<FirmwareVersion> {
        self.io(|state| {
            scripted(&state.failures.firmware)?;
            Ok(state.firmware.clone())
        })
        .await
    }

    fn closer(&self) -> TransportCloser {
        self.closer.clone()
    }
}

/// Handle for controlling a mock reader.
///
/// Clones share the same reader state.
#[derive(Debug, Clone)]
pub struct MockReaderHandle {
    state: Shared,
    closer: TransportCloser,
}

impl MockReaderHandle {
    /// Place a tag in the RF field, replacing any present tag.
    pub fn present(&self, tag: MockTag) {
        lock(&self.state).field = Some(tag);
    }

    /// Take the tag out of the RF field.
    pub fn remove(&self) {
        lock(&self.state).field = None;
    }

    /// UID of the tag currently in the field, if any.
    pub fn current_uid(&self) -> Option<String> {
        lock(&self.state)
            .field
            .as_ref()
            .map(|present| present.tag.uid.clone())
    }

    /// Simulate the reader being unplugged. Every later operation fails
    /// with [`HardwareError::Disconnected`].
    pub fn disconnect(&self) {
        lock(&self.state).connected = false;
    }

    /// Make every operation block until the transport is closed.
    pub fn set_hang(&self, hang: bool) {
        lock(&self.state).hang = hang;
    }

    /// Add latency to every operation.
    pub fn set_io_delay(&self, delay: Duration) {
        lock(&self.state).io_delay = delay;
    }

    /// Script a transient failure of the detection poll.
    pub fn fail_poll(&self, message: Option<&str>) {
        lock(&self.state).failures.poll = message.map(str::to_string);
    }

    /// Script a failure of tag selection.
    pub fn fail_select(&self, message: Option<&str>) {
        lock(&self.state).failures.select = message.map(str::to_string);
    }

    /// Script a failure of the capability probe.
    pub fn fail_tag_info(&self, message: Option<&str>) {
        lock(&self.state).failures.tag_info = message.map(str::to_string);
    }

    /// Script a failure of the NDEF read.
    pub fn fail_ndef(&self, message: Option<&str>) {
        lock(&self.state).failures.ndef = message.map(str::to_string);
    }

    /// Script failures of the three diagnostic probes.
    pub fn fail_diagnostics(
        &self,
        comm_test: Option<&str>,
        general_status: Option<&str>,
        firmware: Option<&str>,
    ) {
        let mut state = lock(&self.state);
        state.failures.comm_test = comm_test.map(str::to_string);
        state.failures.general_status = general_status.map(str::to_string);
        state.failures.firmware = firmware.map(str::to_string);
    }

    /// Clear every scripted failure.
    pub fn clear_failures(&self) {
        lock(&self.state).failures = Failures::default();
    }

    /// Number of detection polls the reader has answered.
    pub fn poll_count(&self) -> u64 {
        lock(&self.state).poll_count
    }

    /// Whether the transport has been closed.
    pub fn is_closed(&self) -> bool {
        self.closer.is_closed()
    }

    /// The reader's transport closer.
    pub fn closer(&self) -> TransportCloser {
        self.closer.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_reader_present_and_poll() {
        let (mut reader, handle) = MockReader::new("/dev/i2c-1");

        assert!(reader.poll_tag().await.unwrap().is_none());

        handle.present(MockTag::ntag215("04aaaaaa").unwrap());
        let tag = reader.poll_tag().await.unwrap().unwrap();
        assert_eq!(tag.uid, "04aaaaaa");
        assert_eq!(handle.current_uid().as_deref(), Some("04aaaaaa"));

        handle.remove();
        assert!(reader.poll_tag().await.unwrap().is_none());
        assert_eq!(handle.poll_count(), 3);
    }

    #[tokio::test]
    async fn test_mock_reader_tag_contents() {
        let (mut reader, handle) = MockReader::new("/dev/i2c-1");
        let mock = MockTag::ntag215("04abcdef").unwrap().with_text("hello");
        let tag = mock.tag.clone();
        handle.present(mock);

        reader.select_tag(&tag).await.unwrap();
        let info = reader.tag_info(&tag).await.unwrap();
        assert_eq!(info.ntag_variant, "NTAG215");
        assert_eq!(info.user_memory_bytes, 504);

        let ndef = reader.read_ndef(&tag).await.unwrap().unwrap();
        assert_eq!(ndef.first_text(), Some("hello"));
    }

    #[tokio::test]
    async fn test_mock_reader_tag_left_field() {
        let (mut reader, handle) = MockReader::new("/dev/i2c-1");
        let mock = MockTag::ntag215("04abcdef").unwrap();
        let tag = mock.tag.clone();
        handle.present(mock);
        handle.remove();

        let result = reader.tag_info(&tag).await;
        assert!(matches!(result, Err(HardwareError::TagReadError { .. })));
    }

    #[tokio::test]
    async fn test_mock_reader_scripted_failures() {
        let (mut reader, handle) = MockReader::new("/dev/i2c-1");
        handle.fail_poll(Some("CRC mismatch"));

        let error = reader.poll_tag().await.unwrap_err();
        assert!(!error.is_disconnect());

        handle.clear_failures();
        assert!(reader.poll_tag().await.is_ok());

        handle.fail_diagnostics(Some("no echo"), None, Some("timeout"));
        assert!(reader.diagnose_communication(&[0xAB]).await.is_err());
        assert!(reader.general_status().await.is_ok());
        assert!(reader.firmware_version().await.is_err());
    }

    #[tokio::test]
    async fn test_mock_reader_disconnect() {
        let (mut reader, handle) = MockReader::new("/dev/ttyAMA0");
        handle.disconnect();

        let error = reader.poll_tag().await.unwrap_err();
        assert!(error.is_disconnect());
    }

    #[tokio::test]
    async fn test_mock_reader_hang_interrupted_by_close() {
        let (mut reader, handle) = MockReader::new("/dev/ttyAMA0");
        handle.set_hang(true);

        let closer = handle.closer();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            closer.close().unwrap();
        });

        let result = tokio::time::timeout(Duration::from_secs(2), reader.poll_tag()).await;
        let error = result.expect("close should interrupt the hang").unwrap_err();
        assert!(error.is_disconnect());
        assert!(handle.is_closed());
    }

    #[tokio::test]
    async fn test_mock_reader_general_status_counts_targets() {
        let (mut reader, handle) = MockReader::new("/dev/i2c-1");
        assert_eq!(reader.general_status().await.unwrap().targets, 0);

        handle.present(MockTag::ntag215("04aaaaaa").unwrap());
        assert_eq!(reader.general_status().await.unwrap().targets, 1);
    }
}
