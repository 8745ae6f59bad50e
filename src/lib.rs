//! Smart Door Hub Library
//!
//! Relay between door controllers and the people watching them.
//!
//! ## Architecture
//!
//! 1. CommandStore - Per-device one-shot unlock mailboxes
//! 2. EventBus - Fan-out of motion/photo events to live observers
//! 3. SubscriptionSession - One event-stream connection with heartbeat
//! 4. IngestCoordinator - Photo and motion intake
//! 5. ArtifactStorage - Uploaded photo persistence
//! 6. DeviceRegistry - Device last-seen metadata
//! 7. PhotoLog - Photo history
//! 8. WebAPI - HTTP endpoints

pub mod artifact_storage;
pub mod command_store;
pub mod device_registry;
pub mod error;
pub mod event_bus;
pub mod ingest_coordinator;
pub mod models;
pub mod photo_log;
pub mod state;
pub mod subscription_session;
pub mod web_api;

pub use error::{Error, Result};
pub use state::AppState;
