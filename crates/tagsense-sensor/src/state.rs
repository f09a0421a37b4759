//! Tag-presence state cache.
//!
//! The cache is written only by the polling worker's event handlers and read
//! by any number of foreground callers. All tag fields live in one
//! `Option<TagFields>` so a detection or removal replaces them as a group.

use chrono::{DateTime, TimeDelta, Utc};
use serde_json::{Map, Value};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tagsense_hardware::{DetectedTag, NdefMessage, TagInfo};

/// Key/value readings returned to callers.
pub type Readings = Map<String, Value>;

/// Fields describing the tag currently in the field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagFields {
    pub uid: String,
    pub tag_type: String,
    pub manufacturer: String,
    pub is_genuine: bool,
    pub ntag_variant: String,
    pub mifare_variant: String,
    pub user_memory_bytes: u32,
    pub ndef_text: String,
    pub ndef_record_count: usize,
}

impl TagFields {
    /// Identity fields of a detected tag; capability and payload fields empty.
    pub fn identity(tag: &DetectedTag) -> Self {
        Self {
            uid: tag.uid.clone(),
            tag_type: tag.tag_type.as_str().to_string(),
            manufacturer: tag.manufacturer().as_str().to_string(),
            is_genuine: tag.is_genuine(),
            ..Default::default()
        }
    }

    /// Fill the capability fields.
    pub fn apply_info(&mut self, info: &TagInfo) {
        self.ntag_variant = info.ntag_variant.clone();
        self.mifare_variant = info.mifare_variant.clone();
        self.user_memory_bytes = info.user_memory_bytes;
    }

    /// Fill the payload fields.
    pub fn apply_ndef(&mut self, message: &NdefMessage) {
        self.ndef_record_count = message.records.len();
        self.ndef_text = message.first_text().unwrap_or_default().to_string();
    }
}

/// Cached view of the reader and the tag in its field.
///
/// A tag is only ever present on a healthy device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagState {
    pub device_healthy: bool,
    pub tag: Option<TagFields>,
}

impl TagState {
    /// The tag to report. An unhealthy device reports none.
    pub fn visible_tag(&self) -> Option<&TagFields> {
        self.tag.as_ref().filter(|_| self.device_healthy)
    }

    pub fn tag_present(&self) -> bool {
        self.visible_tag().is_some()
    }

    /// Mark the device unreachable, dropping any tag.
    pub fn mark_unhealthy(&mut self) {
        self.device_healthy = false;
        self.tag = None;
    }
}

/// Immutable record of one detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSnapshot {
    pub fields: TagFields,
    pub captured_at: DateTime<Utc>,
}

impl ScanSnapshot {
    pub fn new(fields: TagFields) -> Self {
        Self {
            fields,
            captured_at: Utc::now(),
        }
    }

    /// Time elapsed since the detection, zero if the clock went backwards.
    pub fn age(&self) -> TimeDelta {
        (Utc::now() - self.captured_at).max(TimeDelta::zero())
    }

    /// Readings as they were at detection time.
    pub fn readings(&self) -> Readings {
        project(&TagState {
            device_healthy: true,
            tag: Some(self.fields.clone()),
        })
    }
}

/// Project a state into readings.
///
/// Tag fields appear only while a tag is present on a healthy device,
/// including empty ones.
pub fn project(state: &TagState) -> Readings {
    let tag = state.visible_tag();

    let mut readings = Map::new();
    readings.insert("status".into(), Value::from("connected"));
    readings.insert("device_healthy".into(), Value::from(state.device_healthy));
    readings.insert("tag_present".into(), Value::from(tag.is_some()));

    if let Some(tag) = tag {
        readings.insert("uid".into(), Value::from(tag.uid.as_str()));
        readings.insert("tag_type".into(), Value::from(tag.tag_type.as_str()));
        readings.insert("manufacturer".into(), Value::from(tag.manufacturer.as_str()));
        readings.insert("is_genuine".into(), Value::from(tag.is_genuine));
        readings.insert("ntag_variant".into(), Value::from(tag.ntag_variant.as_str()));
        readings.insert("mifare_variant".into(), Value::from(tag.mifare_variant.as_str()));
        readings.insert("user_memory_bytes".into(), Value::from(tag.user_memory_bytes));
        readings.insert("ndef_text".into(), Value::from(tag.ndef_text.as_str()));
        readings.insert("ndef_record_count".into(), Value::from(tag.ndef_record_count));
    }

    readings
}

#[derive(Debug, Default)]
struct Guarded {
    state: TagState,
    closed: bool,
}

/// The state plus the sensor's closed flag, behind one reader-writer lock.
///
/// The lock is never held across an await point. A poisoned lock is
/// recovered, since every write leaves the state consistent.
#[derive(Debug, Default)]
pub struct StateCache {
    inner: RwLock<Guarded>,
}

impl StateCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Guarded> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Guarded> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current readings, taking the shared lock only.
    pub fn readings(&self) -> Readings {
        project(&self.read().state)
    }

    /// Copy of the current state.
    pub fn state(&self) -> TagState {
        self.read().state.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.read().closed
    }

    /// Apply `f` under the write lock unless the sensor is closed.
    ///
    /// Returns `None` without calling `f` once closed.
    pub fn update<R>(&self, f: impl FnOnce(&mut TagState) -> R) -> Option<R> {
        let mut guard = self.write();
        if guard.closed {
            return None;
        }
        Some(f(&mut guard.state))
    }

    /// Set the closed flag. Returns `true` only for the call that set it.
    pub fn mark_closed(&self) -> bool {
        let mut guard = self.write();
        !std::mem::replace(&mut guard.closed, true)
    }
}
