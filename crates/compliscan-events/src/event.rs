//! The event envelope carried on the bus.

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_SEQ: AtomicU64 = AtomicU64::new(1);

/// An opaque, type-erased message published to a topic.
///
/// The bus never inspects the payload; typed helpers at the producer and
/// consumer edges wrap construction and downcast.
#[derive(Clone)]
pub struct Event {
    pub topic: String,
    pub seq: u64,
    payload: Arc<dyn Any + Send + Sync>,
}

impl Event {
    pub fn new<T: Any + Send + Sync>(topic: impl Into<String>, payload: T) -> Self {
        Self {
            topic: topic.into(),
            seq: NEXT_SEQ.fetch_add(1, Ordering::Relaxed),
            payload: Arc::new(payload),
        }
    }

    /// Downcast the payload to its concrete type. Returns `None` on a type
    /// mismatch; callers should log and drop the event rather than panic.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.payload.clone().downcast::<T>().ok()
    }
}

impl std::fmt::Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event")
            .field("topic", &self.topic)
            .field("seq", &self.seq)
            .finish_non_exhaustive()
    }
}
