//! EventBus - Live fan-out of device events
//!
//! ## Responsibilities
//!
//! - Subscriber registry
//! - Best-effort delivery of each published event to every live subscriber
//! - Dropping subscribers whose sink is closed or full
//!
//! No retention: a subscriber only sees events published after it joined.
//! Delivery uses `try_send`, so a slow subscriber never stalls `publish`.

mod types;

pub use types::*;

use std::collections::HashMap;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, RwLock};
use uuid::Uuid;

/// Default per-subscriber frame buffer
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 64;

/// Subscriber identifier
pub type SubscriberId = Uuid;

/// Registry entry for one live subscriber
struct Subscriber {
    sink: mpsc::Sender<String>,
    /// Dropped together with the entry; wakes the owning session
    _release: oneshot::Sender<()>,
}

/// Proof of registration returned by [`EventBus::register`]
#[derive(Debug)]
pub struct Registration {
    pub id: SubscriberId,
    /// Resolves once the bus has let go of the subscriber
    pub released: oneshot::Receiver<()>,
}

/// Handle returned by [`EventBus::subscribe`]
#[derive(Debug)]
pub struct SubscriptionHandle {
    pub id: SubscriberId,
    /// Encoded frames, in publish order
    pub frames: mpsc::Receiver<String>,
    pub released: oneshot::Receiver<()>,
}

/// EventBus instance
pub struct EventBus {
    subscribers: RwLock<HashMap<SubscriberId, Subscriber>>,
    buffer: usize,
}

impl EventBus {
    /// Create new EventBus with the default subscriber buffer
    pub fn new() -> Self {
        Self::with_buffer(DEFAULT_SUBSCRIBER_BUFFER)
    }

    /// Create new EventBus; a subscriber more than `buffer` frames behind is dropped
    pub fn with_buffer(buffer: usize) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            buffer: buffer.max(1),
        }
    }

    /// Per-subscriber frame buffer
    pub fn buffer(&self) -> usize {
        self.buffer
    }

    /// Register a new subscriber with its own frame channel
    pub async fn subscribe(&self) -> SubscriptionHandle {
        let (tx, frames) = mpsc::channel(self.buffer);
        let Registration { id, released } = self.register(tx).await;
        SubscriptionHandle {
            id,
            frames,
            released,
        }
    }

    /// Register an existing sink
    pub async fn register(&self, sink: mpsc::Sender<String>) -> Registration {
        let id = Uuid::new_v4();
        let (release_tx, released) = oneshot::channel();

        let count = {
            let mut subscribers = self.subscribers.write().await;
            subscribers.insert(
                id,
                Subscriber {
                    sink,
                    _release: release_tx,
                },
            );
            subscribers.len()
        };

        tracing::info!(subscriber_id = %id, subscribers = count, "Subscriber connected");

        Registration { id, released }
    }

    /// Unregister a subscriber
    ///
    /// Returns `false` if it was already gone.
    pub async fn unsubscribe(&self, id: &SubscriberId) -> bool {
        let removed = self.subscribers.write().await.remove(id);
        if removed.is_some() {
            tracing::info!(subscriber_id = %id, "Subscriber disconnected");
            true
        } else {
            false
        }
    }

    /// Deliver a record to every registered subscriber
    ///
    /// Never fails; returns the number of subscribers the frame was handed to.
    pub async fn publish(&self, record: &EventRecord) -> usize {
        let frame = match Frame::event(record) {
            Ok(frame) => frame.encode(),
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize event");
                return 0;
            }
        };

        let mut delivered = 0;
        let mut failed = Vec::new();
        {
            let subscribers = self.subscribers.read().await;
            tracing::debug!(
                kind = %record.kind(),
                device_id = %record.device_id(),
                subscribers = subscribers.len(),
                "Publishing event"
            );

            for (id, subscriber) in subscribers.iter() {
                match subscriber.sink.try_send(frame.clone()) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => failed.push((*id, "buffer full")),
                    Err(TrySendError::Closed(_)) => failed.push((*id, "sink closed")),
                }
            }
        }

        // Removal happens after iteration, under the write lock.
        if !failed.is_empty() {
            let mut subscribers = self.subscribers.write().await;
            for (id, reason) in failed {
                if subscribers.remove(&id).is_some() {
                    tracing::warn!(subscriber_id = %id, reason = reason, "Dropping subscriber");
                }
            }
        }

        delivered
    }

    /// Get subscriber count
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    /// True if the subscriber is still registered
    pub async fn is_registered(&self, id: &SubscriberId) -> bool {
        self.subscribers.read().await.contains_key(id)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
