//! SubscriptionSession - One observer's live event stream
//!
//! ## Responsibilities
//!
//! - Send the `connected` marker before anything else
//! - Periodic heartbeat on the same sink
//! - Tear down exactly once on peer disconnect, heartbeat failure,
//!   explicit close or removal by the EventBus
//!
//! The heartbeat runs in a detached task that owns the timer. Every exit
//! path leaves the loop first and only then releases the sink, so no
//! heartbeat is written after cleanup.

use crate::event_bus::{EventBus, Frame, Registration, SubscriberId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Default heartbeat interval
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Shortest heartbeat interval a session will run with
pub const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(1);

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The observer went away (frame receiver dropped)
    PeerDisconnected,
    /// A heartbeat could not be written
    HeartbeatFailed,
    /// The EventBus dropped the subscriber, or `close` was called
    Unregistered,
}

impl SessionEnd {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionEnd::PeerDisconnected => "peer_disconnected",
            SessionEnd::HeartbeatFailed => "heartbeat_failed",
            SessionEnd::Unregistered => "unregistered",
        }
    }
}

/// Live session handle
///
/// Dropping the handle does not end the session; the stream ends when the
/// frame receiver is dropped or [`SubscriptionSession::close`] is called.
pub struct SubscriptionSession {
    id: SubscriberId,
    bus: Arc<EventBus>,
    task: JoinHandle<SessionEnd>,
}

impl SubscriptionSession {
    /// Open a session on `bus`
    ///
    /// Returns the session handle and the receiver of encoded frames to be
    /// written to the observer's connection. `heartbeat` is raised to
    /// [`MIN_HEARTBEAT_INTERVAL`] if shorter.
    pub async fn open(
        bus: Arc<EventBus>,
        heartbeat: Duration,
    ) -> (Self, mpsc::Receiver<String>) {
        let heartbeat = heartbeat.max(MIN_HEARTBEAT_INTERVAL);

        // One extra slot for the marker, so the subscriber still gets the
        // bus's full frame allowance.
        let (sink, frames) = mpsc::channel(bus.buffer() + 1);

        // The marker goes in before the sink is visible to publishers.
        let _ = sink.try_send(Frame::Connected.encode());

        let Registration { id, released } = bus.register(sink.clone()).await;

        let task = tokio::spawn(run(bus.clone(), id, sink, released, heartbeat));

        (Self { id, bus, task }, frames)
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Close the session. Safe to call more than once.
    pub async fn close(&self) {
        self.bus.unsubscribe(&self.id).await;
    }

    /// Wait for the session to end
    pub async fn finished(self) -> Option<SessionEnd> {
        self.task.await.ok()
    }
}

async fn run(
    bus: Arc<EventBus>,
    id: SubscriberId,
    sink: mpsc::Sender<String>,
    mut released: oneshot::Receiver<()>,
    period: Duration,
) -> SessionEnd {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let end = loop {
        tokio::select! {
            biased;
            _ = &mut released => break SessionEnd::Unregistered,
            _ = sink.closed() => break SessionEnd::PeerDisconnected,
            _ = ticker.tick() => {
                if let Err(e) = sink.try_send(Frame::Heartbeat.encode()) {
                    tracing::warn!(subscriber_id = %id, error = %e, "Heartbeat failed");
                    break SessionEnd::HeartbeatFailed;
                }
                tracing::trace!(subscriber_id = %id, "Heartbeat sent");
            }
        }
    };

    drop(ticker);
    drop(sink);
    bus.unsubscribe(&id).await;

    tracing::debug!(subscriber_id = %id, reason = end.as_str(), "Session closed");
    end
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_bus::EventRecord;

    #[tokio::test]
    async fn test_marker_is_first_frame() {
        let bus = Arc::new(EventBus::new());
        let (session, mut frames) =
            SubscriptionSession::open(bus.clone(), Duration::from_secs(60)).await;

        bus.publish(&EventRecord::motion("door-1", "motion detected")).await;

        assert_eq!(frames.recv().await.unwrap(), ": connected\n\n");
        let data = frames.recv().await.unwrap();
        assert!(data.starts_with("data: "));
        assert!(data.contains("\"type\":\"motion\""));

        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_is_periodic() {
        let bus = Arc::new(EventBus::new());
        let (session, mut frames) =
            SubscriptionSession::open(bus.clone(), Duration::from_secs(15)).await;

        assert_eq!(frames.recv().await.unwrap(), ": connected\n\n");
        assert!(frames.try_recv().is_err());

        tokio::time::sleep(Duration::from_secs(16)).await;
        assert_eq!(frames.recv().await.unwrap(), ": heartbeat\n\n");

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(frames.recv().await.unwrap(), ": heartbeat\n\n");

        session.close().await;
        assert_eq!(session.finished().await, Some(SessionEnd::Unregistered));
    }

    #[tokio::test]
    async fn test_peer_disconnect_cleans_up() {
        let bus = Arc::new(EventBus::new());
        let (session, frames) =
            SubscriptionSession::open(bus.clone(), Duration::from_secs(60)).await;
        let id = session.id();
        assert!(bus.is_registered(&id).await);

        drop(frames);

        assert_eq!(session.finished().await, Some(SessionEnd::PeerDisconnected));
        assert!(!bus.is_registered(&id).await);
        assert_eq!(bus.subscriber_count().await, 0);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let bus = Arc::new(EventBus::new());
        let (session, mut frames) =
            SubscriptionSession::open(bus.clone(), Duration::from_secs(60)).await;

        session.close().await;
        session.close().await;

        assert_eq!(session.finished().await, Some(SessionEnd::Unregistered));
        assert_eq!(bus.subscriber_count().await, 0);

        // Marker, then end of stream once every sink clone is gone
        assert_eq!(frames.recv().await.unwrap(), ": connected\n\n");
        assert!(frames.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_failure_unregisters() {
        // Buffer of one plus the marker slot: the first heartbeat fits,
        // the second finds the unread sink full
        let bus = Arc::new(EventBus::with_buffer(1));
        let (session, _frames) =
            SubscriptionSession::open(bus.clone(), Duration::from_secs(15)).await;
        let id = session.id();

        tokio::time::sleep(Duration::from_secs(31)).await;

        assert_eq!(session.finished().await, Some(SessionEnd::HeartbeatFailed));
        assert!(!bus.is_registered(&id).await);
    }

    #[tokio::test]
    async fn test_bus_drop_ends_session() {
        // Buffer of one: the first publish fits, the second drops us
        let bus = Arc::new(EventBus::with_buffer(1));
        let (session, _frames) =
            SubscriptionSession::open(bus.clone(), Duration::from_secs(60)).await;

        assert_eq!(bus.publish(&EventRecord::motion("door-1", "x")).await, 1);
        assert_eq!(bus.publish(&EventRecord::motion("door-1", "y")).await, 0);
        assert_eq!(session.finished().await, Some(SessionEnd::Unregistered));
    }

    #[tokio::test]
    async fn test_marker_does_not_use_frame_allowance() {
        let bus = Arc::new(EventBus::with_buffer(1));
        let (session, mut frames) =
            SubscriptionSession::open(bus.clone(), Duration::from_secs(60)).await;

        let event = EventRecord::motion("door-1", "first");
        assert_eq!(bus.publish(&event).await, 1);
        assert!(bus.is_registered(&session.id()).await);

        assert_eq!(frames.recv().await.unwrap(), ": connected\n\n");
        assert!(frames.recv().await.unwrap().starts_with("data: "));

        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_heartbeat_is_clamped() {
        let bus = Arc::new(EventBus::new());
        let (session, mut frames) = SubscriptionSession::open(bus.clone(), Duration::ZERO).await;
        let id = session.id();

        assert_eq!(frames.recv().await.unwrap(), ": connected\n\n");
        assert_eq!(frames.recv().await.unwrap(), ": heartbeat\n\n");
        assert!(bus.is_registered(&id).await);

        session.close().await;
        assert_eq!(session.finished().await, Some(SessionEnd::Unregistered));
        assert!(!bus.is_registered(&id).await);
    }
}
