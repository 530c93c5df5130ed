use serde::Serialize;
use tokio::sync::broadcast;
use tracing::warn;

use crate::dto::sse::ServerEvent;

/// Broadcast hub feeding the public presentation stream.
pub struct SseHub {
    sender: broadcast::Sender<ServerEvent>,
}

impl SseHub {
    /// Construct a new hub backed by a Tokio broadcast channel with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Register a new subscriber that will receive subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }

    /// Number of connected presentation clients.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Send an event to all current subscribers, ignoring delivery errors.
    pub fn broadcast(&self, event: ServerEvent) {
        let _ = self.sender.send(event);
    }

    /// Serialize `payload` and publish it under `event`.
    pub fn publish<T: Serialize>(&self, event: &str, payload: &T) {
        if self.subscriber_count() == 0 {
            return;
        }
        match ServerEvent::json(Some(event.to_string()), payload) {
            Ok(message) => self.broadcast(message),
            Err(err) => warn!(event, error = %err, "failed to serialize SSE payload"),
        }
    }
}
