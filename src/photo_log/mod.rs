//! PhotoLog - Historical photo event log
//!
//! ## Responsibilities
//!
//! - Append finalized photo events
//! - Serve them back newest first (read side for `/api/photos`)
//!
//! In-memory backend is a ring buffer; MySQL backend when `DATABASE_URL` is set.

mod repository;

pub use repository::MySqlPhotoLog;

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::RwLock;

/// Default in-memory capacity
pub const DEFAULT_CAPACITY: usize = 2000;

/// Logged photo event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PhotoEntry {
    pub device_id: String,
    pub filename: String,
    pub url: String,
    pub timestamp: DateTime<Utc>,
}

/// Historical log collaborator
#[async_trait]
pub trait PhotoLog: Send + Sync {
    /// Append an entry
    async fn append(&self, entry: &PhotoEntry) -> Result<()>;

    /// Latest entries, newest first
    async fn recent(&self, limit: usize) -> Result<Vec<PhotoEntry>>;
}

/// Ring buffer log
pub struct InMemoryPhotoLog {
    entries: RwLock<VecDeque<PhotoEntry>>,
    capacity: usize,
}

impl InMemoryPhotoLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }
}

impl Default for InMemoryPhotoLog {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[async_trait]
impl PhotoLog for InMemoryPhotoLog {
    async fn append(&self, entry: &PhotoEntry) -> Result<()> {
        let mut entries = self.entries.write().await;
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry.clone());
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<PhotoEntry>> {
        let entries = self.entries.read().await;
        let mut latest: Vec<PhotoEntry> = entries.iter().cloned().collect();
        // Appends may arrive out of timestamp order under concurrency
        latest.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        latest.truncate(limit);
        Ok(latest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entry(name: &str, timestamp: DateTime<Utc>) -> PhotoEntry {
        PhotoEntry {
            device_id: "door-1".to_string(),
            filename: name.to_string(),
            url: format!("/uploads/{}", name),
            timestamp,
        }
    }

    #[tokio::test]
    async fn test_recent_is_newest_first() {
        let log = InMemoryPhotoLog::default();
        let base = Utc::now();
        log.append(&entry("b.jpg", base + Duration::seconds(1))).await.unwrap();
        log.append(&entry("a.jpg", base)).await.unwrap();
        log.append(&entry("c.jpg", base + Duration::seconds(2))).await.unwrap();

        let names: Vec<String> = log
            .recent(10)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.filename)
            .collect();
        assert_eq!(names, vec!["c.jpg", "b.jpg", "a.jpg"]);
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest() {
        let log = InMemoryPhotoLog::new(2);
        let base = Utc::now();
        for (i, name) in ["a.jpg", "b.jpg", "c.jpg"].iter().enumerate() {
            log.append(&entry(name, base + Duration::seconds(i as i64)))
                .await
                .unwrap();
        }

        let recent = log.recent(10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[1].filename, "b.jpg");
        assert_eq!(log.recent(1).await.unwrap()[0].filename, "c.jpg");
    }
}
