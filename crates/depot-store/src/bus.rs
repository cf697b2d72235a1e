//! Named fan-out channels carrying replication events
//!
//! Channels are created on first use. Delivery is at-least-once to
//! every live subscriber; a publish with no subscribers is dropped,
//! which matches the semantics of a fire-and-forget pub/sub transport.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::debug;

use depot_common::ReplicationEvent;

const CHANNEL_CAPACITY: usize = 256;

/// Process-local pub/sub transport
#[derive(Clone)]
pub struct EventBus {
    channels: Arc<DashMap<String, broadcast::Sender<ReplicationEvent>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self {
            channels: Arc::new(DashMap::new()),
        }
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<ReplicationEvent> {
        self.channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Publish an event to every current subscriber of `channel`
    pub fn publish(&self, channel: &str, event: ReplicationEvent) {
        let sender = self.sender(channel);
        if sender.send(event).is_err() {
            debug!(channel, "Published event with no subscribers");
        }
    }

    /// Subscribe to `channel`; events published after this call are
    /// delivered to the returned receiver
    pub fn subscribe(&self, channel: &str) -> broadcast::Receiver<ReplicationEvent> {
        self.sender(channel).subscribe()
    }
}
