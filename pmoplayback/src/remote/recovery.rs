use std::time::{Duration, Instant};

use tracing::debug;

use crate::model::{DeviceKind, MediaItem, RendererId, RendererScope};

/// What is needed to resume on a device that dropped uncleanly.
#[derive(Clone, Debug, PartialEq)]
pub struct RecoveryRecord {
    pub device_id: RendererId,
    pub device_kind: DeviceKind,
    pub scope: RendererScope,
    /// Media that was playing, with its resume position.
    pub last_media: Option<MediaItem>,
    pub armed_at: Instant,
}

/// Holds at most one record; expiry is checked when the record is read.
#[derive(Debug)]
pub struct RecoveryWindow {
    window: Duration,
    record: Option<RecoveryRecord>,
}

impl RecoveryWindow {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            record: None,
        }
    }

    /// Replaces any previous record.
    pub fn arm(&mut self, record: RecoveryRecord) {
        debug!(device = %record.device_id, "Recovery record armed");
        self.record = Some(record);
    }

    pub fn clear(&mut self) {
        if let Some(record) = self.record.take() {
            debug!(device = %record.device_id, "Recovery record cleared");
        }
    }

    /// The live record, dropping it first if the window elapsed.
    pub fn current(&mut self) -> Option<&RecoveryRecord> {
        self.expire(Instant::now());
        self.record.as_ref()
    }

    /// Takes the record if it is live and belongs to `device_id`.
    pub fn take_for(&mut self, device_id: &RendererId) -> Option<RecoveryRecord> {
        self.expire(Instant::now());
        if self.record.as_ref().is_some_and(|r| &r.device_id == device_id) {
            self.record.take()
        } else {
            None
        }
    }

    fn expire(&mut self, now: Instant) {
        let expired = self
            .record
            .as_ref()
            .is_some_and(|r| now.saturating_duration_since(r.armed_at) > self.window);
        if expired {
            debug!("Recovery window elapsed");
            self.record = None;
        }
    }
}
