//! Application-facing events re-emitted by the shadow client.

use crate::constants::events as names;
use serde_json::Value;
use tokio::sync::broadcast;

/// Event delivered to application subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum ShadowEvent {
    Connected,
    Closed,
    Offline,
    /// Own-request result or remote change of a thing's shadow
    ThingShadowChanged { thing_name: String, shadow: Value },
}

impl ShadowEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connected => names::CONNECT,
            Self::Closed => names::CLOSE,
            Self::Offline => names::OFFLINE,
            Self::ThingShadowChanged { .. } => names::THING_SHADOW_CHANGED,
        }
    }
}

/// Broadcast fan-out of [`ShadowEvent`]s
#[derive(Debug, Clone)]
pub struct ShadowEventPublisher {
    sender: broadcast::Sender<ShadowEvent>,
}

impl ShadowEventPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish to current subscribers. Having no subscribers is not an error.
    pub fn publish(&self, event: ShadowEvent) {
        tracing::trace!(event = event.name(), "Publishing shadow event");
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ShadowEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ShadowEventPublisher {
    fn default() -> Self {
        Self::new(crate::config::ShadowClientConfig::default().event_channel_capacity)
    }
}
