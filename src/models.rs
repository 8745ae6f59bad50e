//! Request and response bodies shared by the HTTP layer

use crate::command_store::DeviceCommandState;
use crate::device_registry::DeviceRecord;
use crate::event_bus::EventRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_sec: u64,
    pub subscribers: usize,
    pub mailboxes: usize,
    pub db_connected: bool,
}

/// Body of `POST /api/devices/:id/unlock`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UnlockRequest {
    pub user: Option<String>,
}

/// Unlock accepted into the mailbox
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnlockQueued {
    pub status: String,
    pub device: String,
}

/// Answer to a device poll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockStatus {
    pub unlock: bool,
}

/// `GET /api/devices/:id`: registry record and unlock mailbox, either may be absent
#[derive(Debug, Clone, Serialize)]
pub struct DeviceStatusResponse {
    pub device_id: String,
    pub device: Option<DeviceRecord>,
    pub unlock: Option<DeviceCommandState>,
}

/// Body of `POST /api/motion`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MotionReport {
    pub device_id: Option<String>,
    pub message: Option<String>,
}

/// Motion report acknowledgement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MotionAck {
    pub status: String,
    pub payload: EventRecord,
}

/// Photo upload acknowledgement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub status: String,
    pub device_id: String,
    pub filename: String,
    pub url: String,
    pub timestamp: DateTime<Utc>,
}

/// Query for `GET /api/photos`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PhotoQuery {
    pub limit: Option<usize>,
}

/// Listing of the upload directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileListResponse {
    pub count: usize,
    pub files: Vec<String>,
}
