//! Filtered error-event broadcaster.
//!
//! Fan-out is push-based: each subscriber owns a bounded channel and the
//! broadcaster `try_send`s matching events into it. A slow or dead
//! subscriber loses events (at-most-once) but can never block the publisher
//! or other subscribers; per-subscriber ordering is preserved by the channel.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::types::{ErrorFilter, GameError};

/// Per-subscriber channel capacity before events are dropped.
const SUBSCRIBER_BUFFER_SIZE: usize = 256;

struct Subscriber {
    filter: ErrorFilter,
    sender: mpsc::Sender<GameError>,
}

/// Broadcaster of [`GameError`] events to filtered subscribers.
///
/// Cheap to clone; all clones share the same subscriber table.
#[derive(Clone, Default)]
pub struct ErrorBroadcaster {
    subscribers: Arc<DashMap<Uuid, Subscriber>>,
}

impl ErrorBroadcaster {
    /// Creates an empty broadcaster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes an event to every subscriber whose filter matches.
    ///
    /// Returns the number of subscribers the event was handed to. Events
    /// for subscribers with a full buffer are dropped and logged.
    pub fn publish(&self, error: &GameError) -> usize {
        let mut delivered = 0;
        for entry in self.subscribers.iter() {
            if !entry.filter.matches(error) {
                continue;
            }
            match entry.sender.try_send(error.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(
                        subscriber = %entry.key(),
                        error_id = %error.id,
                        "Subscriber buffer full, dropping error event"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    // Receiver dropped without unsubscribing; reaped lazily below.
                }
            }
        }
        delivered
    }

    /// Subscribes to all error events.
    #[must_use]
    pub fn subscribe(&self) -> ErrorSubscription {
        self.subscribe_filtered(ErrorFilter::all())
    }

    /// Subscribes to events for one match (plus global events).
    #[must_use]
    pub fn subscribe_to_match(&self, match_id: impl Into<String>) -> ErrorSubscription {
        self.subscribe_filtered(ErrorFilter::for_match(match_id))
    }

    /// Subscribes to events for one player in one match (plus match-wide
    /// and global events).
    #[must_use]
    pub fn subscribe_to_player(
        &self,
        match_id: impl Into<String>,
        player_id: u64,
    ) -> ErrorSubscription {
        self.subscribe_filtered(ErrorFilter::for_player(match_id, player_id))
    }

    fn subscribe_filtered(&self, filter: ErrorFilter) -> ErrorSubscription {
        let (sender, receiver) = mpsc::channel(SUBSCRIBER_BUFFER_SIZE);
        let id = Uuid::new_v4();
        self.subscribers.insert(id, Subscriber { filter, sender });
        ErrorSubscription {
            id,
            receiver,
            subscribers: Arc::clone(&self.subscribers),
        }
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Drops subscriptions whose receiver has gone away.
    pub fn reap_closed(&self) {
        self.subscribers.retain(|_, sub| !sub.sender.is_closed());
    }
}

impl std::fmt::Debug for ErrorBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorBroadcaster")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

/// Handle to a live error subscription.
///
/// Dropping the subscription removes it from the broadcaster.
pub struct ErrorSubscription {
    id: Uuid,
    receiver: mpsc::Receiver<GameError>,
    subscribers: Arc<DashMap<Uuid, Subscriber>>,
}

impl ErrorSubscription {
    /// Receives the next matching event; `None` once unsubscribed.
    pub async fn recv(&mut self) -> Option<GameError> {
        self.receiver.recv().await
    }

    /// Non-blocking receive.
    pub fn try_recv(&mut self) -> Option<GameError> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for ErrorSubscription {
    fn drop(&mut self) {
        self.subscribers.remove(&self.id);
    }
}
