// =============================================================================
// BroadcastHub — in-process pub/sub with bounded, slow-subscriber-tolerant
// per-subscriber queues
// =============================================================================
//
// Every subscriber owns its own bounded FIFO (a `Mutex<VecDeque<Event>>`
// behind a `Notify`). A publish enqueues into every current subscriber
// independently; a full queue drops its oldest element before enqueuing the
// new one ("keep the newest" policy) rather than blocking the publisher or
// dropping the new payload. Within one subscriber, publish order is
// preserved; across subscribers, none is promised.
// =============================================================================

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Notify;
use uuid::Uuid;

pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// The envelope pushed to every subscriber: `{type, data}`.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub data: Value,
}

impl Event {
    pub fn new(kind: &'static str, data: impl Serialize) -> Self {
        Self { kind, data: serde_json::to_value(data).unwrap_or(Value::Null) }
    }
}

struct Inner {
    queue: Mutex<VecDeque<Event>>,
    capacity: usize,
    notify: Notify,
    closed: Mutex<bool>,
}

/// A receiving handle returned by `subscribe`. Dropping it has no effect on
/// the hub's bookkeeping by itself — call `BroadcastHub::unsubscribe` (or let
/// `close` tear everything down) to actually remove the entry.
pub struct Subscription {
    pub id: Uuid,
    inner: Arc<Inner>,
}

impl Subscription {
    /// Wait for and pop the next event, or `None` once the hub has closed
    /// this subscription and the queue has drained.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            if let Some(event) = self.inner.queue.lock().pop_front() {
                return Some(event);
            }
            if *self.inner.closed.lock() {
                return None;
            }
            self.inner.notify.notified().await;
        }
    }

    pub fn try_recv(&mut self) -> Option<Event> {
        self.inner.queue.lock().pop_front()
    }
}

pub struct BroadcastHub {
    subscribers: Mutex<HashMap<Uuid, Arc<Inner>>>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self { subscribers: Mutex::new(HashMap::new()) }
    }

    pub fn subscribe(&self) -> Subscription {
        self.subscribe_with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    pub fn subscribe_with_capacity(&self, capacity: usize) -> Subscription {
        let id = Uuid::new_v4();
        let inner = Arc::new(Inner {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            notify: Notify::new(),
            closed: Mutex::new(false),
        });
        self.subscribers.lock().insert(id, inner.clone());
        Subscription { id, inner }
    }

    pub fn unsubscribe(&self, id: Uuid) {
        if let Some(inner) = self.subscribers.lock().remove(&id) {
            *inner.closed.lock() = true;
            inner.notify.notify_waiters();
        }
    }

    /// Drop all subscribers, closing their channels.
    pub fn close(&self) {
        let subs = std::mem::take(&mut *self.subscribers.lock());
        for inner in subs.into_values() {
            *inner.closed.lock() = true;
            inner.notify.notify_waiters();
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Publish `event` to every current subscriber, dropping each
    /// subscriber's oldest queued event if it is already at capacity.
    pub fn publish(&self, event: Event) {
        let subscribers = self.subscribers.lock();
        for inner in subscribers.values() {
            {
                let mut queue = inner.queue.lock();
                if queue.len() >= inner.capacity {
                    queue.pop_front();
                }
                queue.push_back(event.clone());
            }
            inner.notify.notify_waiters();
        }
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn publish_delivers_to_all_subscribers() {
        let hub = BroadcastHub::new();
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();

        hub.publish(Event::new("ticker", json!({"price": 1.0})));

        assert!(a.recv().await.is_some());
        assert!(b.recv().await.is_some());
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let hub = BroadcastHub::new();
        let sub = hub.subscribe();
        hub.unsubscribe(sub.id);
        hub.publish(Event::new("ticker", json!({})));
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn full_queue_drops_oldest_and_keeps_ordering_of_survivors() {
        let hub = BroadcastHub::new();
        let mut sub = hub.subscribe_with_capacity(2);

        hub.publish(Event::new("ticker", json!({"n": 1})));
        hub.publish(Event::new("ticker", json!({"n": 2})));
        hub.publish(Event::new("ticker", json!({"n": 3})));

        let first = sub.try_recv().unwrap();
        assert_eq!(first.data["n"], 2);
        let second = sub.try_recv().unwrap();
        assert_eq!(second.data["n"], 3);
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn close_drops_all_subscribers() {
        let hub = BroadcastHub::new();
        hub.subscribe();
        hub.subscribe();
        hub.close();
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn recv_returns_none_after_close_and_drain() {
        let hub = BroadcastHub::new();
        let mut sub = hub.subscribe();
        hub.publish(Event::new("ticker", json!({"n": 1})));
        hub.close();
        assert!(sub.recv().await.is_some());
        assert!(sub.recv().await.is_none());
    }
}
