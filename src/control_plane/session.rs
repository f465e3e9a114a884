//! Client registry for the control plane: every connected client sees the
//! same fan-out of events. There is no per-client addressed message today
//! — every event is broadcast — which keeps the registry itself a thin
//! wrapper around a [`tokio::sync::broadcast`] channel.

use tokio::sync::broadcast;

use super::protocol::ServerEvent;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ServerEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }
}

impl EventBus {
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.tx.subscribe()
    }

    /// Publishes an event. Returns the number of subscribers it reached;
    /// zero (no clients connected) is not an error.
    pub fn publish(&self, event: ServerEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn client_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_with_no_subscribers_is_not_an_error() {
        let bus = EventBus::default();
        assert_eq!(bus.publish(ServerEvent::Pong), 0);
    }

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        bus.publish(ServerEvent::Pong);
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, ServerEvent::Pong));
    }
}
