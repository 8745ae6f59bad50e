//! DeviceRegistry - Device tracking metadata
//!
//! ## Responsibilities
//!
//! - Upsert last-seen time and last artifact per device
//! - Create the record on first write (no separate registration step)
//!
//! Two backends: in-memory (default) and MySQL (`DATABASE_URL` set).

mod repository;

pub use repository::MySqlDeviceRegistry;

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Maximum device id length accepted by the registry
pub const MAX_DEVICE_ID_LEN: usize = 50;

/// Tracked device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct DeviceRecord {
    pub device_id: String,
    pub last_seen: DateTime<Utc>,
    pub last_photo: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Device registry collaborator
#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    /// Record that the device was seen, optionally with its latest artifact
    ///
    /// A `None` artifact leaves the stored one untouched.
    async fn touch(
        &self,
        device_id: &str,
        last_seen: DateTime<Utc>,
        last_artifact: Option<&str>,
    ) -> Result<()>;

    /// Get device by ID
    async fn get(&self, device_id: &str) -> Result<Option<DeviceRecord>>;
}

/// In-memory registry
pub struct InMemoryDeviceRegistry {
    devices: RwLock<HashMap<String, DeviceRecord>>,
}

impl InMemoryDeviceRegistry {
    pub fn new() -> Self {
        Self {
            devices: RwLock::new(HashMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.devices.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.devices.read().await.is_empty()
    }
}

impl Default for InMemoryDeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeviceRegistry for InMemoryDeviceRegistry {
    async fn touch(
        &self,
        device_id: &str,
        last_seen: DateTime<Utc>,
        last_artifact: Option<&str>,
    ) -> Result<()> {
        let now = Utc::now();
        let mut devices = self.devices.write().await;
        let record = devices
            .entry(device_id.to_string())
            .or_insert_with(|| DeviceRecord {
                device_id: device_id.to_string(),
                last_seen,
                last_photo: None,
                created_at: now,
                updated_at: now,
            });

        record.last_seen = last_seen;
        if let Some(artifact) = last_artifact {
            record.last_photo = Some(artifact.to_string());
        }
        record.updated_at = now;

        Ok(())
    }

    async fn get(&self, device_id: &str) -> Result<Option<DeviceRecord>> {
        Ok(self.devices.read().await.get(device_id).cloned())
    }
}
