//! Events pushed by the backends

use tokio::sync::broadcast;
use tracing::trace;

const EVENT_CAPACITY: usize = 64;

/// Normalized event reported by a backend.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    /// Media started, or resumed after a pause
    Playing,
    Paused,
    /// Media reached its end
    EndReached,
    /// Media could not be played
    Error { message: String },
    /// Native process is gone
    Exited { code: Option<i32> },
}

/// Broadcast bus that several listeners can subscribe to.
#[derive(Debug, Clone)]
pub struct EventBus<T: Clone> {
    sender: broadcast::Sender<T>,
}

impl<T: Clone + std::fmt::Debug> EventBus<T> {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }

    pub fn publish(&self, event: T) {
        trace!("Publishing event {:?}", event);
        // no subscriber is not an error
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.sender.subscribe()
    }
}

impl<T: Clone + std::fmt::Debug> Default for EventBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_subscriber_receives_events() {
        let bus = EventBus::new();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        bus.publish(BackendEvent::Playing);
        bus.publish(BackendEvent::EndReached);

        assert_eq!(first.recv().await.unwrap(), BackendEvent::Playing);
        assert_eq!(first.recv().await.unwrap(), BackendEvent::EndReached);
        assert_eq!(second.recv().await.unwrap(), BackendEvent::Playing);
    }

    #[test]
    fn publish_without_subscriber() {
        let bus = EventBus::new();
        bus.publish(BackendEvent::Paused);
    }
}
