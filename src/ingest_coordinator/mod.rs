//! IngestCoordinator - Device event ingestion
//!
//! ## Responsibilities
//!
//! - Photo path: store artifact → log → update device metadata → publish
//! - Motion path: publish directly
//!
//! Storage is the only hard requirement. Once the artifact is stored, log and
//! metadata failures are logged and the event is still published.

use crate::artifact_storage::ArtifactStorage;
use crate::device_registry::{DeviceRegistry, MAX_DEVICE_ID_LEN};
use crate::error::{Error, Result};
use crate::event_bus::{EventBus, EventRecord};
use crate::photo_log::{PhotoEntry, PhotoLog};
use chrono::Utc;
use std::sync::Arc;

/// Device id used when the caller does not provide one
pub const UNKNOWN_DEVICE: &str = "unknown";

/// Message used when a motion report carries none
pub const DEFAULT_MOTION_MESSAGE: &str = "motion detected";

/// Default upload limit (5 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

/// Resolve a caller-supplied device id
///
/// Trims whitespace, falls back to [`UNKNOWN_DEVICE`] when absent or blank,
/// and rejects ids longer than the registry accepts.
pub fn resolve_device_id(raw: Option<&str>) -> Result<String> {
    let trimmed = raw.map(str::trim).unwrap_or_default();
    if trimmed.is_empty() {
        return Ok(UNKNOWN_DEVICE.to_string());
    }
    if trimmed.chars().count() > MAX_DEVICE_ID_LEN {
        return Err(Error::Validation(format!(
            "device_id must be at most {} characters",
            MAX_DEVICE_ID_LEN
        )));
    }
    Ok(trimmed.to_string())
}

/// IngestCoordinator instance
pub struct IngestCoordinator {
    storage: Arc<dyn ArtifactStorage>,
    registry: Arc<dyn DeviceRegistry>,
    photo_log: Arc<dyn PhotoLog>,
    bus: Arc<EventBus>,
    max_upload_bytes: usize,
}

impl IngestCoordinator {
    /// Create new IngestCoordinator
    pub fn new(
        storage: Arc<dyn ArtifactStorage>,
        registry: Arc<dyn DeviceRegistry>,
        photo_log: Arc<dyn PhotoLog>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            storage,
            registry,
            photo_log,
            bus,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    /// Set the upload size limit
    pub fn with_max_upload_bytes(mut self, max_upload_bytes: usize) -> Self {
        self.max_upload_bytes = max_upload_bytes;
        self
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    /// Ingest a captured photo
    ///
    /// Fails without side effects on invalid input or storage failure.
    pub async fn ingest_photo(
        &self,
        device_id: &str,
        data: &[u8],
        filename_hint: Option<&str>,
    ) -> Result<EventRecord> {
        if data.is_empty() {
            return Err(Error::Validation("Uploaded file is empty".to_string()));
        }
        if data.len() > self.max_upload_bytes {
            return Err(Error::PayloadTooLarge {
                limit: self.max_upload_bytes,
            });
        }

        let stored = self
            .storage
            .store(data, filename_hint)
            .await
            .map_err(|e| match e {
                Error::Storage(_) => e,
                other => Error::Storage(other.to_string()),
            })?;

        let timestamp = Utc::now();

        let entry = PhotoEntry {
            device_id: device_id.to_string(),
            filename: stored.filename.clone(),
            url: stored.url.clone(),
            timestamp,
        };
        if let Err(e) = self.photo_log.append(&entry).await {
            tracing::warn!(
                device_id = %device_id,
                filename = %stored.filename,
                error = %e,
                "Photo log append failed"
            );
        }

        if let Err(e) = self
            .registry
            .touch(device_id, timestamp, Some(&stored.filename))
            .await
        {
            tracing::warn!(
                device_id = %device_id,
                filename = %stored.filename,
                error = %e,
                "Device metadata update failed"
            );
        }

        tracing::info!(
            device_id = %device_id,
            filename = %stored.filename,
            size = data.len(),
            "Saved photo"
        );

        let record = EventRecord::Photo {
            device_id: device_id.to_string(),
            filename: stored.filename,
            url: stored.url,
            timestamp,
        };
        self.bus.publish(&record).await;

        Ok(record)
    }

    /// Report a motion event
    pub async fn report_motion(&self, device_id: &str, message: &str) -> EventRecord {
        let record = EventRecord::motion(device_id, message);
        let delivered = self.bus.publish(&record).await;

        tracing::info!(
            device_id = %device_id,
            delivered = delivered,
            "Motion reported"
        );

        record
    }
}
