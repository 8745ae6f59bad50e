//! CommandStore - One-shot unlock mailbox per device
//!
//! ## Responsibilities
//!
//! - Hold at most one pending unlock flag per device id
//! - Hand the flag to the polling device exactly once
//! - Forget idle mailboxes
//!
//! Devices cannot receive pushed commands; they poll. Repeated requests
//! before a poll coalesce into a single pending flag.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;

/// Requester label used when the caller does not name itself
pub const DEFAULT_REQUESTER: &str = "app";

/// Point-in-time view of a device mailbox
#[derive(Debug, Clone, Serialize)]
pub struct DeviceCommandState {
    pub device_id: String,
    pub pending: bool,
    pub requested_by: Option<String>,
    pub last_activity: DateTime<Utc>,
}

#[derive(Debug)]
struct MailboxMeta {
    requested_by: Option<String>,
    last_activity: DateTime<Utc>,
}

/// Single-slot mailbox
#[derive(Debug)]
struct Mailbox {
    pending: AtomicBool,
    meta: Mutex<MailboxMeta>,
}

impl Mailbox {
    fn new() -> Self {
        Self {
            pending: AtomicBool::new(false),
            meta: Mutex::new(MailboxMeta {
                requested_by: None,
                last_activity: Utc::now(),
            }),
        }
    }

    fn meta(&self) -> std::sync::MutexGuard<'_, MailboxMeta> {
        // The guarded data is plain bookkeeping; a poisoned lock is still usable.
        self.meta.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn touch(&self) {
        self.meta().last_activity = Utc::now();
    }

    fn request(&self, requested_by: &str) {
        {
            let mut meta = self.meta();
            meta.requested_by = Some(requested_by.to_string());
            meta.last_activity = Utc::now();
        }
        self.pending.store(true, Ordering::Release);
    }

    /// Read-and-clear in one step
    fn consume(&self) -> bool {
        self.touch();
        self.pending
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn state(&self, device_id: &str) -> DeviceCommandState {
        let meta = self.meta();
        DeviceCommandState {
            device_id: device_id.to_string(),
            pending: self.pending.load(Ordering::Acquire),
            requested_by: meta.requested_by.clone(),
            last_activity: meta.last_activity,
        }
    }
}

/// CommandStore instance
pub struct CommandStore {
    mailboxes: RwLock<HashMap<String, Arc<Mailbox>>>,
}

impl CommandStore {
    /// Create new CommandStore
    pub fn new() -> Self {
        Self {
            mailboxes: RwLock::new(HashMap::new()),
        }
    }

    /// Request an unlock for a device
    ///
    /// Idempotent until consumed. Overwrites the requester label.
    pub async fn request_unlock(&self, device_id: &str, requested_by: &str) {
        // The flag is set while the map lock is held so `prune_idle` cannot
        // remove the mailbox between lookup and store.
        {
            let mailboxes = self.mailboxes.read().await;
            if let Some(mailbox) = mailboxes.get(device_id) {
                mailbox.request(requested_by);
                tracing::info!(device_id = %device_id, requested_by = %requested_by, "Unlock requested");
                return;
            }
        }

        let mut mailboxes = self.mailboxes.write().await;
        mailboxes
            .entry(device_id.to_string())
            .or_insert_with(|| Arc::new(Mailbox::new()))
            .request(requested_by);

        tracing::info!(device_id = %device_id, requested_by = %requested_by, "Unlock requested");
    }

    /// Poll for a pending unlock and consume it
    ///
    /// Returns `true` at most once per pending request. Unknown devices get
    /// a fresh mailbox and `false`.
    pub async fn poll_and_consume(&self, device_id: &str) -> bool {
        let mailbox = self.get_or_create(device_id).await;
        let consumed = mailbox.consume();

        if consumed {
            tracing::info!(device_id = %device_id, "Unlock delivered to device");
        } else {
            tracing::trace!(device_id = %device_id, "Poll: nothing pending");
        }

        consumed
    }

    /// Current mailbox state, if the device has one
    pub async fn state(&self, device_id: &str) -> Option<DeviceCommandState> {
        let mailboxes = self.mailboxes.read().await;
        mailboxes.get(device_id).map(|m| m.state(device_id))
    }

    /// Number of mailboxes currently held
    pub async fn mailbox_count(&self) -> usize {
        self.mailboxes.read().await.len()
    }

    /// Drop mailboxes with nothing pending and no activity within `idle_ttl`
    ///
    /// Returns the number of mailboxes removed.
    pub async fn prune_idle(&self, idle_ttl: Duration) -> usize {
        let ttl = chrono::Duration::from_std(idle_ttl)
            .unwrap_or_else(|_| chrono::Duration::days(36_500));
        let cutoff = Utc::now() - ttl;

        let mut mailboxes = self.mailboxes.write().await;
        let before = mailboxes.len();
        mailboxes.retain(|_, mailbox| {
            mailbox.pending.load(Ordering::Acquire) || mailbox.meta().last_activity > cutoff
        });
        let removed = before - mailboxes.len();

        if removed > 0 {
            tracing::debug!(removed = removed, remaining = mailboxes.len(), "Pruned idle mailboxes");
        }

        removed
    }

    async fn get_or_create(&self, device_id: &str) -> Arc<Mailbox> {
        {
            let mailboxes = self.mailboxes.read().await;
            if let Some(mailbox) = mailboxes.get(device_id) {
                return mailbox.clone();
            }
        }

        let mut mailboxes = self.mailboxes.write().await;
        mailboxes
            .entry(device_id.to_string())
            .or_insert_with(|| Arc::new(Mailbox::new()))
            .clone()
    }
}

impl Default for CommandStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_request_then_poll_is_one_shot() {
        let store = CommandStore::new();
        store.request_unlock("door-1", "alice").await;

        assert!(store.poll_and_consume("door-1").await);
        assert!(!store.poll_and_consume("door-1").await);
        assert!(!store.poll_and_consume("door-1").await);
    }

    #[tokio::test]
    async fn test_unknown_device_polls_false() {
        let store = CommandStore::new();
        assert!(!store.poll_and_consume("never-seen").await);

        // Mailbox is created lazily on first poll
        let state = store.state("never-seen").await.unwrap();
        assert!(!state.pending);
        assert!(state.requested_by.is_none());
    }

    #[tokio::test]
    async fn test_repeated_requests_coalesce() {
        let store = CommandStore::new();
        store.request_unlock("door-1", "alice").await;
        store.request_unlock("door-1", "bob").await;
        store.request_unlock("door-1", "carol").await;

        let state = store.state("door-1").await.unwrap();
        assert!(state.pending);
        assert_eq!(state.requested_by.as_deref(), Some("carol"));

        assert!(store.poll_and_consume("door-1").await);
        assert!(!store.poll_and_consume("door-1").await);
    }

    #[tokio::test]
    async fn test_devices_are_independent() {
        let store = CommandStore::new();
        store.request_unlock("door-1", "alice").await;

        assert!(!store.poll_and_consume("door-2").await);
        assert!(store.poll_and_consume("door-1").await);
    }

    #[tokio::test]
    async fn test_new_request_after_consume() {
        let store = CommandStore::new();
        store.request_unlock("door-1", "alice").await;
        assert!(store.poll_and_consume("door-1").await);

        store.request_unlock("door-1", "alice").await;
        assert!(store.poll_and_consume("door-1").await);
        assert!(!store.poll_and_consume("door-1").await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_polls_deliver_exactly_once() {
        for _ in 0..20 {
            let store = Arc::new(CommandStore::new());
            store.request_unlock("door-1", "alice").await;

            let mut handles = Vec::new();
            for _ in 0..32 {
                let store = store.clone();
                handles.push(tokio::spawn(async move {
                    store.poll_and_consume("door-1").await
                }));
            }

            let mut delivered = 0;
            for handle in handles {
                if handle.await.unwrap() {
                    delivered += 1;
                }
            }
            assert_eq!(delivered, 1);
        }
    }

    #[tokio::test]
    async fn test_prune_keeps_pending_mailboxes() {
        let store = CommandStore::new();
        store.request_unlock("door-1", "alice").await;
        store.poll_and_consume("door-2").await;
        assert_eq!(store.mailbox_count().await, 2);

        let removed = store.prune_idle(Duration::ZERO).await;
        assert_eq!(removed, 1);
        assert!(store.state("door-1").await.is_some());
        assert!(store.state("door-2").await.is_none());

        // Pending request survives pruning
        assert!(store.poll_and_consume("door-1").await);
    }

    #[tokio::test]
    async fn test_prune_keeps_recent_mailboxes() {
        let store = CommandStore::new();
        store.poll_and_consume("door-1").await;

        let removed = store.prune_idle(Duration::from_secs(3600)).await;
        assert_eq!(removed, 0);
        assert_eq!(store.mailbox_count().await, 1);
    }
}
