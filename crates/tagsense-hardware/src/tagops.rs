//! Tag-level operations on a detected tag.
//!
//! [`TagOperations`] borrows the device for the duration of one detection and
//! remembers which tag has been selected, so capability and NDEF reads cannot
//! be issued against a tag that was never initialized.

use crate::{
    HardwareError, Result,
    traits::{DetectedTag, ReaderDevice},
    types::{NdefMessage, TagInfo},
};

/// Operations on a single detected tag.
///
/// # Examples
///
/// ```
/// use tagsense_hardware::mock::{MockReader, MockTag};
/// use tagsense_hardware::tagops::TagOperations;
///
/// #[tokio::main]
/// async fn main() -> tagsense_hardware::Result<()> {
///     let (mut reader, handle) = MockReader::new("/dev/i2c-1");
///     let mock = MockTag::ntag215("04aaaaaa")?.with_text("hello");
///     let tag = mock.tag.clone();
///     handle.present(mock);
///
///     let mut ops = TagOperations::new(&mut reader);
///     ops.init_from_detected(&tag).await?;
///     assert_eq!(ops.tag_info().await?.ntag_variant, "NTAG215");
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct TagOperations<'d, D> {
    device: &'d mut D,
    tag: Option<DetectedTag>,
}

impl<'d, D: ReaderDevice> TagOperations<'d, D> {
    /// Borrow `device` for tag operations.
    pub fn new(device: &'d mut D) -> Self {
        Self { device, tag: None }
    }

    /// Select `tag` so that later reads target it.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError::InitializationFailed`] if the tag did not
    /// answer the selection, or [`HardwareError::Disconnected`] if the reader
    /// is gone. The operations stay uninitialized on error.
    pub async fn init_from_detected(&mut self, tag: &DetectedTag) -> Result<()> {
        self.tag = None;

        self.device.select_tag(tag).await.map_err(|e| {
            if e.is_disconnect() {
                e
            } else {
                HardwareError::initialization_failed(format!("select {}: {}", tag.uid, e))
            }
        })?;

        self.tag = Some(tag.clone());
        Ok(())
    }

    /// The initialized tag, if any.
    pub fn tag(&self) -> Option<&DetectedTag> {
        self.tag.as_ref()
    }

    /// Read capability information of the initialized tag.
    ///
    /// # Errors
    ///
    /// Returns an error if no tag is initialized or the read fails.
    pub async fn tag_info(&mut self) -> Result<TagInfo> {
        let tag = self.initialized()?;
        self.device.tag_info(&tag).await
    }

    /// Read the NDEF message of the initialized tag.
    ///
    /// # Errors
    ///
    /// Returns an error if no tag is initialized or the read fails.
    pub async fn read_ndef(&mut self) -> Result<Option<NdefMessage>> {
        let tag = self.initialized()?;
        self.device.read_ndef(&tag).await
    }

    fn initialized(&self) -> Result<DetectedTag> {
        self.tag
            .clone()
            .ok_or_else(|| HardwareError::tag_read("tag not initialized"))
    }
}
