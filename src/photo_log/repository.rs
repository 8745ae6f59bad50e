//! PhotoLog Repository
//!
//! MySQL access layer for the photo history

use super::{PhotoEntry, PhotoLog};
use crate::error::Result;
use async_trait::async_trait;
use sqlx::MySqlPool;

/// MySQL-backed photo log
#[derive(Clone)]
pub struct MySqlPhotoLog {
    pool: MySqlPool,
}

impl MySqlPhotoLog {
    /// Create new repository
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Create the `photos` table if missing
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS photos (
                id BIGINT UNSIGNED NOT NULL AUTO_INCREMENT PRIMARY KEY,
                device_id VARCHAR(50) NOT NULL,
                filename VARCHAR(100) NOT NULL,
                url VARCHAR(500) NOT NULL,
                timestamp DATETIME(3) NOT NULL,
                INDEX idx_photos_device_time (device_id, timestamp DESC)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl PhotoLog for MySqlPhotoLog {
    async fn append(&self, entry: &PhotoEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO photos (device_id, filename, url, timestamp) VALUES (?, ?, ?, ?)",
        )
        .bind(&entry.device_id)
        .bind(&entry.filename)
        .bind(&entry.url)
        .bind(entry.timestamp)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<PhotoEntry>> {
        let entries = sqlx::query_as::<_, PhotoEntry>(
            "SELECT device_id, filename, url, timestamp FROM photos ORDER BY timestamp DESC LIMIT ?",
        )
        .bind(limit as u64)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }
}
