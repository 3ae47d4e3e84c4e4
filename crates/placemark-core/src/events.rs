//! Store change events and the broadcast bus that carries them.
//!
//! Cache containers emit a [`StoreEvent`] after every state transition.
//! Subscribers (UI bindings, tests) read the new state through the store's
//! selectors; the event only says what changed.

use serde::Serialize;
use tokio::sync::broadcast;

/// What changed in a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreEvent {
    /// Reviews were inserted or replaced.
    ReviewsChanged { ids: Vec<String> },
    /// A review left the cache.
    ReviewRemoved { id: String },
    /// Hydrating flags or freshness bookkeeping changed.
    HydrationChanged,
    /// A hydrate or refresh failed; cached data was kept.
    HydrateFailed { error: String },
    /// Like state of a review changed.
    LikeChanged { review_id: String },
    /// Comment list or its flags changed.
    CommentsChanged { review_id: String },
    /// A store was reset (sign-out).
    Cleared,
}

impl StoreEvent {
    /// Dot-namespaced name for logs.
    pub fn event_type(&self) -> &'static str {
        match self {
            StoreEvent::ReviewsChanged { .. } => "reviews.changed",
            StoreEvent::ReviewRemoved { .. } => "reviews.removed",
            StoreEvent::HydrationChanged => "reviews.hydration",
            StoreEvent::HydrateFailed { .. } => "reviews.hydrate_failed",
            StoreEvent::LikeChanged { .. } => "engagement.like",
            StoreEvent::CommentsChanged { .. } => "engagement.comments",
            StoreEvent::Cleared => "store.cleared",
        }
    }
}

/// Broadcast bus for store events.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<StoreEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(crate::defaults::EVENT_BUS_CAPACITY)
    }
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Emit an event to all subscribers. Dropped silently when nobody listens.
    pub fn emit(&self, event: StoreEvent) {
        tracing::trace!(
            event_type = event.event_type(),
            subscriber_count = self.tx.receiver_count(),
            "EventBus emit"
        );
        let _ = self.tx.send(event);
    }

    /// Subscribe to events. Each subscriber gets its own independent stream.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.tx.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
