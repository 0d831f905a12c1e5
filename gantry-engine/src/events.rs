//! Broadcast bus for session domain events.
//!
//! Transitions return their events and the services publish them while the
//! session-execution lock is still held, so subscribers observe a causal
//! order per session. Cross-session order is unspecified.

use gantry_core::SessionEvent;
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 256;

/// Fan-out bus for [`SessionEvent`]s.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish one event. Delivery is best effort; without subscribers the
    /// event is dropped.
    pub fn publish(&self, event: SessionEvent) {
        tracing::debug!(
            event_type = event.event_type(),
            session_id = %event.session_id(),
            "publishing event"
        );
        let _ = self.tx.send(event);
    }

    /// Publish a batch in order.
    pub fn publish_all(&self, events: Vec<SessionEvent>) {
        for event in events {
            self.publish(event);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
