//! Broker event bus: two independent multicast topics.

use {
    petrel_protocol::EventEnvelope,
    tokio::sync::broadcast,
    tracing::{debug, trace},
};

/// Fan-out bus for lifecycle envelopes and operator notices.
///
/// Both topics share the same delivery contract: subscribers attach lazily
/// and see only what is published afterwards (no replay), every subscriber
/// observes one publication order, and the ring is bounded: a subscriber
/// that falls more than the topic capacity behind skips ahead to the oldest
/// retained message (`RecvError::Lagged`) instead of blocking publishers.
pub struct EventBus {
    events: broadcast::Sender<EventEnvelope>,
    notices: broadcast::Sender<String>,
}

impl EventBus {
    pub fn new(event_capacity: usize, notice_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        let (notices, _) = broadcast::channel(notice_capacity.max(1));
        Self { events, notices }
    }

    /// Structured lifecycle/topology topic.
    pub fn subscribe_events(&self) -> broadcast::Receiver<EventEnvelope> {
        self.events.subscribe()
    }

    /// Human-readable operator-notice topic.
    pub fn subscribe_notices(&self) -> broadcast::Receiver<String> {
        self.notices.subscribe()
    }

    /// Publish a lifecycle envelope. Never blocks and never fails the
    /// caller: with no live subscribers the envelope is dropped.
    pub fn publish_event(&self, envelope: EventEnvelope) {
        trace!(event = %envelope.r#type, source = %envelope.source, "bus: publish");
        if self.events.send(envelope).is_err() {
            debug!("bus: no event subscribers, envelope dropped");
        }
    }

    /// Publish an operator notice. Same non-blocking contract as events.
    pub fn publish_notice(&self, notice: impl Into<String>) {
        let notice = notice.into();
        trace!(notice = %notice, "bus: notice");
        if self.notices.send(notice).is_err() {
            debug!("bus: no notice subscribers, message dropped");
        }
    }
}
