//! DeviceRegistry Repository
//!
//! MySQL access layer for device tracking

use super::{DeviceRecord, DeviceRegistry};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::MySqlPool;

/// MySQL-backed device registry
#[derive(Clone)]
pub struct MySqlDeviceRegistry {
    pool: MySqlPool,
}

impl MySqlDeviceRegistry {
    /// Create new repository
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Create the `devices` table if missing
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS devices (
                device_id VARCHAR(50) NOT NULL PRIMARY KEY,
                last_seen DATETIME(3) NOT NULL,
                last_photo VARCHAR(500) NULL,
                created_at DATETIME(3) NOT NULL,
                updated_at DATETIME(3) NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl DeviceRegistry for MySqlDeviceRegistry {
    async fn touch(
        &self,
        device_id: &str,
        last_seen: DateTime<Utc>,
        last_artifact: Option<&str>,
    ) -> Result<()> {
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO devices (device_id, last_seen, last_photo, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON DUPLICATE KEY UPDATE
                last_seen = VALUES(last_seen),
                last_photo = COALESCE(VALUES(last_photo), last_photo),
                updated_at = VALUES(updated_at)
            "#,
        )
        .bind(device_id)
        .bind(last_seen)
        .bind(last_artifact)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, device_id: &str) -> Result<Option<DeviceRecord>> {
        let record = sqlx::query_as::<_, DeviceRecord>(
            "SELECT device_id, last_seen, last_photo, created_at, updated_at FROM devices WHERE device_id = ?",
        )
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }
}
