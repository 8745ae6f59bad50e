//! Application state
//!
//! Holds all shared components and state

use crate::artifact_storage::LocalArtifactStorage;
use crate::command_store::CommandStore;
use crate::device_registry::{DeviceRegistry, InMemoryDeviceRegistry, MySqlDeviceRegistry};
use crate::error::{Error, Result};
use crate::event_bus::{EventBus, DEFAULT_SUBSCRIBER_BUFFER};
use crate::ingest_coordinator::{IngestCoordinator, DEFAULT_MAX_UPLOAD_BYTES};
use crate::photo_log::{InMemoryPhotoLog, MySqlPhotoLog, PhotoLog};
use crate::subscription_session::DEFAULT_HEARTBEAT_INTERVAL;
use chrono::{DateTime, Utc};
use sqlx::mysql::MySqlPoolOptions;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Read an env var, falling back to `default` when unset or malformed
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Directory uploaded photos are written to
    pub upload_dir: PathBuf,
    /// URL path the upload directory is served under
    pub upload_url_prefix: String,
    /// Upload size limit in bytes
    pub max_upload_bytes: usize,
    /// MySQL URL; in-memory collaborators when unset
    pub database_url: Option<String>,
    /// Event stream heartbeat interval
    pub heartbeat_interval: Duration,
    /// Frames a subscriber may fall behind before it is dropped
    pub subscriber_buffer: usize,
    /// Idle time after which an empty unlock mailbox is forgotten
    pub mailbox_idle_ttl: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_or("PORT", 3000),
            upload_dir: std::env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./uploads")),
            upload_url_prefix: std::env::var("UPLOAD_URL_PREFIX")
                .unwrap_or_else(|_| "/uploads".to_string()),
            max_upload_bytes: env_or("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES),
            database_url: std::env::var("DATABASE_URL")
                .or_else(|_| std::env::var("MYSQL_URL"))
                .ok()
                .filter(|url| !url.trim().is_empty()),
            heartbeat_interval: Duration::from_secs(env_or(
                "SSE_HEARTBEAT_SEC",
                DEFAULT_HEARTBEAT_INTERVAL.as_secs(),
            ))
            .max(Duration::from_secs(1)),
            subscriber_buffer: env_or("SSE_BUFFER_FRAMES", DEFAULT_SUBSCRIBER_BUFFER),
            mailbox_idle_ttl: Duration::from_secs(env_or("MAILBOX_IDLE_TTL_SEC", 86_400)),
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application config
    pub config: AppConfig,
    /// CommandStore (unlock mailboxes)
    pub commands: Arc<CommandStore>,
    /// EventBus (live observers)
    pub bus: Arc<EventBus>,
    /// IngestCoordinator (photo/motion intake)
    pub ingest: Arc<IngestCoordinator>,
    /// Local upload storage
    pub storage: Arc<LocalArtifactStorage>,
    /// Device metadata
    pub devices: Arc<dyn DeviceRegistry>,
    /// Photo history
    pub photo_log: Arc<dyn PhotoLog>,
    /// Process start time
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Build state from config, connecting to MySQL when configured
    pub async fn build(config: AppConfig) -> Result<Self> {
        let (devices, photo_log): (Arc<dyn DeviceRegistry>, Arc<dyn PhotoLog>) =
            match &config.database_url {
                Some(url) => {
                    let pool = MySqlPoolOptions::new()
                        .max_connections(10)
                        .acquire_timeout(Duration::from_secs(10))
                        .connect(url)
                        .await
                        .map_err(|e| Error::Database(format!("Cannot connect to MySQL: {}", e)))?;
                    tracing::info!("Database connected");

                    let devices = MySqlDeviceRegistry::new(pool.clone());
                    devices.ensure_schema().await?;
                    let photos = MySqlPhotoLog::new(pool);
                    photos.ensure_schema().await?;

                    (Arc::new(devices), Arc::new(photos))
                }
                None => {
                    tracing::info!("DATABASE_URL not set, keeping device and photo records in memory");
                    (
                        Arc::new(InMemoryDeviceRegistry::new()),
                        Arc::new(InMemoryPhotoLog::default()),
                    )
                }
            };

        Self::with_collaborators(config, devices, photo_log).await
    }

    /// Build state around the given record-keeping collaborators
    pub async fn with_collaborators(
        config: AppConfig,
        devices: Arc<dyn DeviceRegistry>,
        photo_log: Arc<dyn PhotoLog>,
    ) -> Result<Self> {
        let storage = Arc::new(
            LocalArtifactStorage::new(config.upload_dir.clone(), config.upload_url_prefix.clone())
                .await?,
        );
        let bus = Arc::new(EventBus::with_buffer(config.subscriber_buffer));
        let ingest = Arc::new(
            IngestCoordinator::new(
                storage.clone(),
                devices.clone(),
                photo_log.clone(),
                bus.clone(),
            )
            .with_max_upload_bytes(config.max_upload_bytes),
        );

        Ok(Self {
            config,
            commands: Arc::new(CommandStore::new()),
            bus,
            ingest,
            storage,
            devices,
            photo_log,
            started_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_or_falls_back_on_garbage() {
        std::env::set_var("SMARTDOOR_TEST_PORT", "not-a-number");
        assert_eq!(env_or::<u16>("SMARTDOOR_TEST_PORT", 3000), 3000);

        std::env::set_var("SMARTDOOR_TEST_PORT", " 8080 ");
        assert_eq!(env_or::<u16>("SMARTDOOR_TEST_PORT", 3000), 8080);

        std::env::remove_var("SMARTDOOR_TEST_PORT");
        assert_eq!(env_or::<u16>("SMARTDOOR_TEST_PORT", 3000), 3000);
    }
}
