//! Topic-keyed, in-process publish/subscribe bus.
//!
//! Each `subscribe` call gets its own bounded queue; `publish` snapshots
//! the topic's subscriber list under a lock, releases the lock, then
//! delivers to each subscriber on its own spawned task. A slow subscriber
//! only delays its own delivery task, never the publisher or its siblings.

use crate::event::Event;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

const DEFAULT_BUFFER_SIZE: usize = 10_000;

struct SubscriberEntry {
    id: u64,
    sender: mpsc::Sender<Event>,
}

struct Inner {
    topics: DashMap<String, RwLock<Vec<SubscriberEntry>>>,
    buffer_size: usize,
    next_id: AtomicU64,
}

/// A handle to the bus. Cheap to clone; all clones share the same topic
/// table.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl EventBus {
    pub fn new(buffer_size: usize) -> Self {
        let buffer_size = if buffer_size == 0 {
            DEFAULT_BUFFER_SIZE
        } else {
            buffer_size
        };
        Self {
            inner: Arc::new(Inner {
                topics: DashMap::new(),
                buffer_size,
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Register a fresh subscriber queue under `topic`.
    pub fn subscribe(&self, topic: impl Into<String>) -> Subscription {
        let topic = topic.into();
        let (tx, rx) = mpsc::channel(self.inner.buffer_size);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

        self.inner
            .topics
            .entry(topic.clone())
            .or_insert_with(|| RwLock::new(Vec::new()))
            .write()
            .push(SubscriberEntry { id, sender: tx });

        Subscription {
            bus: self.inner.clone(),
            topic,
            id,
            receiver: rx,
        }
    }

    /// Remove a subscription's queue from its topic. Safe to call more
    /// than once; a second call is a no-op.
    pub fn unsubscribe(&self, subscription: &Subscription) {
        self.unsubscribe_raw(&subscription.topic, subscription.id);
    }

    fn unsubscribe_raw(&self, topic: &str, id: u64) {
        if let Some(entry) = self.inner.topics.get(topic) {
            entry.write().retain(|s| s.id != id);
        }
    }

    /// Deliver `event` to every current subscriber of its topic. A no-op if
    /// the topic has never been subscribed to. Never blocks on subscriber
    /// I/O: the subscriber list is snapshotted, the lock released, and
    /// delivery to each subscriber happens on its own spawned task.
    pub fn publish(&self, event: Event) {
        let Some(entry) = self.inner.topics.get(&event.topic) else {
            debug!(topic = %event.topic, "publish to topic with no subscribers");
            return;
        };

        let snapshot: Vec<mpsc::Sender<Event>> =
            entry.read().iter().map(|s| s.sender.clone()).collect();
        drop(entry);

        for sender in snapshot {
            let event = event.clone();
            tokio::spawn(async move {
                if sender.send(event).await.is_err() {
                    // Receiver dropped (unsubscribed or went away); the
                    // event is lost for this subscriber only.
                    warn!("delivery to a closed subscriber queue dropped an event");
                }
            });
        }
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.inner
            .topics
            .get(topic)
            .map(|e| e.read().len())
            .unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_SIZE)
    }
}

/// A live subscription: the consumer half of a subscriber queue.
///
/// Dropping a `Subscription` unsubscribes it automatically, so a plugin
/// that exits without calling `unsubscribe` explicitly never leaves a
/// dangling entry in the topic table.
pub struct Subscription {
    bus: Arc<Inner>,
    topic: String,
    id: u64,
    receiver: mpsc::Receiver<Event>,
}

impl Subscription {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub async fn recv(&mut self) -> Option<Event> {
        self.receiver.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(entry) = self.bus.topics.get(&self.topic) {
            entry.write().retain(|s| s.id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Clone)]
    struct Payload(String);

    #[tokio::test]
    async fn publish_subscribe_roundtrip() {
        let bus = EventBus::new(100);
        let mut sub = bus.subscribe("t");
        bus.publish(Event::new("t", Payload("hello".into())));

        let event = sub.recv().await.unwrap();
        assert_eq!(*event.downcast::<Payload>().unwrap(), Payload("hello".into()));
    }

    #[tokio::test]
    async fn fan_out_to_multiple_subscribers() {
        let bus = EventBus::new(100);
        let mut q1 = bus.subscribe("b");
        let mut q2 = bus.subscribe("b");
        let mut q3 = bus.subscribe("b");

        bus.publish(Event::new("b", Payload("x".into())));

        for q in [&mut q1, &mut q2, &mut q3] {
            let event = q.recv().await.unwrap();
            assert_eq!(*event.downcast::<Payload>().unwrap(), Payload("x".into()));
        }
    }

    #[tokio::test]
    async fn publish_to_unknown_topic_is_noop() {
        let bus = EventBus::new(100);
        let mut q2 = bus.subscribe("t2");
        bus.publish(Event::new("t1", Payload("x".into())));

        let result = tokio::time::timeout(std::time::Duration::from_millis(50), q2.recv()).await;
        assert!(result.is_err(), "t2 subscriber should not have received anything");
    }

    #[tokio::test]
    async fn unsubscribe_stops_future_delivery() {
        let bus = EventBus::new(100);
        let sub = bus.subscribe("t");
        bus.unsubscribe(&sub);
        assert_eq!(bus.subscriber_count("t"), 0);
    }

    #[tokio::test]
    async fn unsubscribe_unknown_subscription_is_noop() {
        let bus = EventBus::new(100);
        let sub_a = bus.subscribe("a");
        bus.unsubscribe_raw("never-subscribed", 999);
        assert_eq!(bus.subscriber_count("a"), 1);
        drop(sub_a);
    }

    #[tokio::test]
    async fn drop_unsubscribes_automatically() {
        let bus = EventBus::new(100);
        let sub = bus.subscribe("t");
        assert_eq!(bus.subscriber_count("t"), 1);
        drop(sub);
        assert_eq!(bus.subscriber_count("t"), 0);
    }

    #[tokio::test]
    async fn many_subscribers_many_publishes() {
        let bus = EventBus::new(100);
        let mut subs: Vec<Subscription> = (0..20).map(|_| bus.subscribe("c")).collect();

        for i in 0..50u32 {
            bus.publish(Event::new("c", i));
        }

        for sub in &mut subs {
            let mut seen = std::collections::HashSet::new();
            for _ in 0..50 {
                let event = sub.recv().await.unwrap();
                seen.insert(*event.downcast::<u32>().unwrap());
            }
            assert_eq!(seen.len(), 50);
        }
    }
}
