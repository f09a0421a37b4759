//! Event callbacks driven by the polling session.
//!
//! The session serializes these calls. `on_detected` does its tag I/O
//! without holding the cache lock, then commits all tag fields under a single
//! write lock.

use crate::notify::ScanSlot;
use crate::state::{ScanSnapshot, StateCache, TagFields};
use tagsense_hardware::{
    DetectedTag, HardwareError, ReaderDevice, Result, TagEventHandler, TagOperations,
};
use tracing::{debug, error, info, trace, warn};

/// State shared by the sensor's foreground API and its polling worker.
#[derive(Debug)]
pub(crate) struct SensorCore {
    pub(crate) cache: StateCache,
    pub(crate) slot: ScanSlot,
    read_ndef: bool,
    debug: bool,
}

impl SensorCore {
    pub(crate) fn new(read_ndef: bool, debug: bool) -> Self {
        Self {
            cache: StateCache::new(),
            slot: ScanSlot::new(),
            read_ndef,
            debug,
        }
    }

    async fn read_fields<D: ReaderDevice>(&self, device: &mut D, tag: &DetectedTag) -> TagFields {
        let mut fields = TagFields::identity(tag);
        let mut ops = TagOperations::new(device);

        if let Err(e) = ops.init_from_detected(tag).await {
            warn!(uid = %tag.uid, error = %e, "Failed to initialize tag operations");
            return fields;
        }

        match ops.tag_info().await {
            Ok(info) => fields.apply_info(&info),
            Err(e) => warn!(uid = %tag.uid, error = %e, "Failed to read tag capabilities"),
        }

        if self.read_ndef {
            match ops.read_ndef().await {
                Ok(Some(message)) => fields.apply_ndef(&message),
                Ok(None) => {}
                Err(e) => warn!(uid = %tag.uid, error = %e, "Failed to read NDEF"),
            }
        }

        fields
    }
}

impl<D: ReaderDevice> TagEventHandler<D> for SensorCore {
    async fn on_detected(&self, device: &mut D, tag: &DetectedTag) -> Result<()> {
        let fields = self.read_fields(device, tag).await;

        if self.debug {
            info!(
                uid = %fields.uid,
                tag_type = %fields.tag_type,
                ndef_records = fields.ndef_record_count,
                "Tag detected"
            );
        } else {
            debug!(uid = %fields.uid, tag_type = %fields.tag_type, "Tag detected");
        }

        let committed = self.cache.update(|state| {
            // A tag can only be present on a healthy device.
            if !state.device_healthy {
                return false;
            }
            state.tag = Some(fields.clone());
            self.slot.publish(ScanSnapshot::new(fields));
            true
        });

        if committed != Some(true) {
            trace!(uid = %tag.uid, "Detection discarded");
        }
        Ok(())
    }

    fn on_removed(&self) {
        if self.cache.update(|state| state.tag = None).is_some() {
            if self.debug {
                info!("Tag removed");
            } else {
                debug!("Tag removed");
            }
        }
    }

    fn on_disconnected(&self, cause: &HardwareError) {
        error!(error = %cause, "Reader disconnected");
        self.cache.update(|state| state.mark_unhealthy());
    }
}
