// Troupe Runtime - Operation event bus
//
// Copy-on-broadcast: the subscriber list is snapshotted under a short
// lock, the lock is released, then callbacks run. A subscriber may
// (un)subscribe from inside a callback without deadlocking. The last 100
// events are retained for late joiners.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::warn;

use troupe_core::{Event, EVENT_RING_CAPACITY};

/// Subscriber callback
pub type EventCallback = Arc<dyn Fn(&Event) + Send + Sync>;

#[derive(Default)]
struct BusInner {
    subscribers: HashMap<String, EventCallback>,
    ring: VecDeque<Event>,
}

/// Thread-safe broadcast bus with a bounded history
#[derive(Default)]
pub struct EventBus {
    inner: Mutex<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, subscriber_id: impl Into<String>, callback: EventCallback) {
        self.inner
            .lock()
            .subscribers
            .insert(subscriber_id.into(), callback);
    }

    pub fn unsubscribe(&self, subscriber_id: &str) -> bool {
        self.inner.lock().subscribers.remove(subscriber_id).is_some()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }

    /// Deliver to every current subscriber; a panicking callback is
    /// logged and skipped, the rest still run.
    pub fn broadcast(&self, event: Event) {
        let subscribers: Vec<(String, EventCallback)> = {
            let mut inner = self.inner.lock();
            if inner.ring.len() == EVENT_RING_CAPACITY {
                inner.ring.pop_front();
            }
            inner.ring.push_back(event.clone());
            inner
                .subscribers
                .iter()
                .map(|(id, cb)| (id.clone(), cb.clone()))
                .collect()
        };

        for (id, callback) in subscribers {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                callback(&event);
            }));
            if outcome.is_err() {
                warn!(subscriber = %id, "event subscriber panicked, skipping");
            }
        }
    }

    /// The retained tail of the event stream, oldest first
    pub fn recent(&self) -> Vec<Event> {
        self.inner.lock().ring.iter().cloned().collect()
    }
}
