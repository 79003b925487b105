//! Ordered, non-blocking event fan-out.
//!
//! Every subscriber owns an unbounded queue. `publish` only enqueues, so
//! the publishing session never waits on an observer, and each queue is
//! drained in publish order.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::{DeviceEvent, Observer};

#[derive(Default)]
struct Registry {
    next_id: u64,
    subscribers: HashMap<u64, mpsc::UnboundedSender<DeviceEvent>>,
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Publishes [`DeviceEvent`]s to registered observers.
#[derive(Clone, Default)]
pub struct EventNotifier {
    registry: Arc<Mutex<Registry>>,
}

impl EventNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self, tx: mpsc::UnboundedSender<DeviceEvent>) -> SubscriptionHandle {
        let mut registry = lock(&self.registry);
        registry.next_id += 1;
        let id = registry.next_id;
        registry.subscribers.insert(id, tx);
        trace!(subscription = id, "subscribed");

        SubscriptionHandle {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Register an observer.
    ///
    /// The observer runs on a dedicated task, so this must be called from
    /// within a tokio runtime. The subscription ends when the returned
    /// handle is dropped; events already queued are still delivered.
    pub fn subscribe(&self, observer: Arc<dyn Observer>) -> SubscriptionHandle {
        let (tx, mut rx) = mpsc::unbounded_channel::<DeviceEvent>();
        let handle = self.register(tx);
        let id = handle.id;

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                observer.on_event(&event).await;
            }
            debug!(subscription = id, "observer drained");
        });

        handle
    }

    /// Register a channel subscriber and return its receiving end.
    pub fn subscribe_channel(&self) -> (SubscriptionHandle, mpsc::UnboundedReceiver<DeviceEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (self.register(tx), rx)
    }

    /// Enqueue an event for every subscriber.
    pub fn publish(&self, event: DeviceEvent) {
        let mut registry = lock(&self.registry);
        registry
            .subscribers
            .retain(|_, tx| tx.send(event.clone()).is_ok());
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        lock(&self.registry).subscribers.len()
    }
}

/// Keeps a subscription alive. Dropping it unsubscribes.
#[must_use = "dropping the handle ends the subscription"]
#[derive(Debug)]
pub struct SubscriptionHandle {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl SubscriptionHandle {
    /// End the subscription now.
    pub fn unsubscribe(self) {
        // Drop does the work
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            lock(&registry).subscribers.remove(&self.id);
            trace!(subscription = self.id, "unsubscribed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceIdentity, DeviceType};
    use crate::events::EventKind;
    use crate::session::SessionState;
    use async_trait::async_trait;
    use std::time::Duration;

    fn device() -> DeviceIdentity {
        DeviceIdentity::new("AA:BB:CC:DD:EE:FF", DeviceType::Sesame2)
    }

    fn transition(old: SessionState, new: SessionState) -> DeviceEvent {
        DeviceEvent::state_changed(device(), old, new)
    }

    struct Forward(mpsc::UnboundedSender<DeviceEvent>);

    #[async_trait]
    impl Observer for Forward {
        async fn on_event(&self, event: &DeviceEvent) {
            let _ = self.0.send(event.clone());
        }
    }

    struct Slow;

    #[async_trait]
    impl Observer for Slow {
        async fn on_event(&self, _event: &DeviceEvent) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
    }

    #[tokio::test]
    async fn test_channel_subscriber_receives_in_order() {
        let notifier = EventNotifier::new();
        let (_sub, mut rx) = notifier.subscribe_channel();

        notifier.publish(transition(SessionState::Disconnected, SessionState::Connecting));
        notifier.publish(transition(
            SessionState::Connecting,
            SessionState::ConnectedUnauthenticated,
        ));

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(
            first.kind,
            EventKind::StateChanged {
                old: SessionState::Disconnected,
                new: SessionState::Connecting
            }
        );
        assert_eq!(
            second.kind,
            EventKind::StateChanged {
                old: SessionState::Connecting,
                new: SessionState::ConnectedUnauthenticated
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_observer_does_not_block_others() {
        let notifier = EventNotifier::new();
        let _slow = notifier.subscribe(Arc::new(Slow));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _fast = notifier.subscribe(Arc::new(Forward(tx)));

        let sequence = [
            transition(SessionState::Disconnected, SessionState::Connecting),
            transition(SessionState::Connecting, SessionState::ConnectedUnauthenticated),
            transition(SessionState::ConnectedUnauthenticated, SessionState::Authenticating),
        ];
        for event in sequence.iter().cloned() {
            notifier.publish(event);
        }

        for expected in sequence {
            assert_eq!(rx.recv().await.unwrap(), expected);
        }
    }

    #[tokio::test]
    async fn test_drop_handle_unsubscribes() {
        let notifier = EventNotifier::new();
        let (sub, mut rx) = notifier.subscribe_channel();
        assert_eq!(notifier.subscriber_count(), 1);

        sub.unsubscribe();
        assert_eq!(notifier.subscriber_count(), 0);

        notifier.publish(transition(SessionState::Disconnected, SessionState::Connecting));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_closed_receiver_is_pruned() {
        let notifier = EventNotifier::new();
        let (_sub, rx) = notifier.subscribe_channel();
        drop(rx);

        notifier.publish(transition(SessionState::Disconnected, SessionState::Connecting));
        assert_eq!(notifier.subscriber_count(), 0);
    }
}
