//! C1 — event broker: per-task fan-out of structured events to N subscribers.
//!
//! Generalizes `skynet-gateway`'s single global `tokio::sync::broadcast`
//! fan-out (one channel for every WS client) into one bounded `mpsc` sink per
//! `(task_id, subscriber)`, stored behind a `DashMap`. A single global
//! broadcast channel can't give the per-subscriber back-pressure isolation
//! spec §4.1 requires: one lagging `broadcast::Receiver` there poisons every
//! other receiver with `RecvError::Lagged`, whereas here a slow subscriber
//! only ever drops its own events.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tetora_core::types::{SseEvent, TaskId};
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Default bounded buffer size per subscriber sink, per spec §4.1.
pub const DEFAULT_SINK_CAPACITY: usize = 64;

type SubscriberId = u64;

struct Subscriber {
    tx: mpsc::Sender<SseEvent>,
}

/// Shared event broker. Cheap to clone (wraps an `Arc`); clone it into every
/// component that needs to publish or subscribe.
#[derive(Clone)]
pub struct EventBroker {
    inner: Arc<Inner>,
}

struct Inner {
    subscribers: DashMap<TaskId, DashMap<SubscriberId, Subscriber>>,
    next_sub_id: AtomicU64,
    dropped_events: AtomicU64,
}

/// Handle returned by `subscribe`. Dropping it (or calling `unsubscribe`
/// explicitly) removes the sink; both are safe to do more than once.
pub struct Subscription {
    broker: EventBroker,
    task_id: TaskId,
    sub_id: SubscriberId,
    unsubscribed: bool,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        self.do_unsubscribe();
    }

    fn do_unsubscribe(&mut self) {
        if self.unsubscribed {
            return;
        }
        self.unsubscribed = true;
        if let Some(map) = self.broker.inner.subscribers.get(&self.task_id) {
            map.remove(&self.sub_id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.do_unsubscribe();
    }
}

impl EventBroker {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                subscribers: DashMap::new(),
                next_sub_id: AtomicU64::new(0),
                dropped_events: AtomicU64::new(0),
            }),
        }
    }

    /// Register a new sink for `task_id`. Returns the receiving half and an
    /// idempotent unsubscribe handle.
    pub fn subscribe(&self, task_id: TaskId) -> (mpsc::Receiver<SseEvent>, Subscription) {
        let (tx, rx) = mpsc::channel(DEFAULT_SINK_CAPACITY);
        let sub_id = self.inner.next_sub_id.fetch_add(1, Ordering::Relaxed);

        self.inner
            .subscribers
            .entry(task_id.clone())
            .or_default()
            .insert(sub_id, Subscriber { tx });

        debug!(task_id = %task_id, sub_id, "subscribed to task events");

        (
            rx,
            Subscription {
                broker: self.clone(),
                task_id,
                sub_id,
                unsubscribed: false,
            },
        )
    }

    /// Fan out `event` to every sink registered under `event.task_id`.
    ///
    /// Never blocks the publisher: a full sink has its event dropped and the
    /// broker's drop counter incremented, but other subscribers are
    /// unaffected. Ordering is preserved per-subscriber (events for one task
    /// are sent in publish order); no ordering is guaranteed across tasks.
    pub fn publish(&self, event: SseEvent) {
        let Some(subs) = self.inner.subscribers.get(&event.task_id) else {
            trace!(task_id = %event.task_id, "publish with no subscribers");
            return;
        };

        for entry in subs.iter() {
            match entry.value().tx.try_send(event.clone()) {
                Ok(()) => {}
                Err(_) => {
                    self.inner.dropped_events.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        task_id = %event.task_id,
                        sub_id = *entry.key(),
                        "subscriber sink full — event dropped"
                    );
                }
            }
        }
    }

    /// Remove every subscriber for `task_id`, e.g. after task completion or
    /// on broker shutdown.
    pub fn unsubscribe_all(&self, task_id: &TaskId) {
        self.inner.subscribers.remove(task_id);
    }

    /// Total number of events dropped due to a full subscriber sink, across
    /// all tasks, since broker creation.
    pub fn dropped_events(&self) -> u64 {
        self.inner.dropped_events.load(Ordering::Relaxed)
    }

    pub fn subscriber_count(&self, task_id: &TaskId) -> usize {
        self.inner
            .subscribers
            .get(task_id)
            .map(|m| m.len())
            .unwrap_or(0)
    }
}

impl Default for EventBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tetora_core::types::SseEventType;

    fn evt(task_id: &TaskId) -> SseEvent {
        SseEvent::new(SseEventType::OutputChunk, task_id.clone(), json!({"chunk": "hi"}))
    }

    #[tokio::test]
    async fn publish_delivers_in_order_to_one_subscriber() {
        let broker = EventBroker::new();
        let task_id = TaskId::new();
        let (mut rx, _sub) = broker.subscribe(task_id.clone());

        broker.publish(evt(&task_id));
        broker.publish(evt(&task_id));

        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn slow_subscriber_does_not_block_other_subscribers() {
        let broker = EventBroker::new();
        let task_id = TaskId::new();

        // Subscriber A never reads — its sink will fill and start dropping.
        let (rx_a, _sub_a) = broker.subscribe(task_id.clone());
        let (mut rx_b, _sub_b) = broker.subscribe(task_id.clone());

        for _ in 0..(DEFAULT_SINK_CAPACITY + 10) {
            broker.publish(evt(&task_id));
        }

        // B must still have received everything it has room for without
        // waiting on A.
        assert!(rx_b.recv().await.is_some());
        assert!(broker.dropped_events() > 0);
        drop(rx_a);
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent() {
        let broker = EventBroker::new();
        let task_id = TaskId::new();
        let (_rx, sub) = broker.subscribe(task_id.clone());
        assert_eq!(broker.subscriber_count(&task_id), 1);
        sub.unsubscribe();
        assert_eq!(broker.subscriber_count(&task_id), 0);

        // Dropping a handle after explicit unsubscribe must not panic or
        // double-decrement anything.
        broker.unsubscribe_all(&task_id);
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_is_a_noop() {
        let broker = EventBroker::new();
        broker.publish(evt(&TaskId::new()));
        assert_eq!(broker.dropped_events(), 0);
    }

    #[tokio::test]
    async fn cross_task_events_are_isolated() {
        let broker = EventBroker::new();
        let task_a = TaskId::new();
        let task_b = TaskId::new();
        let (mut rx_a, _a) = broker.subscribe(task_a.clone());
        let (mut rx_b, _b) = broker.subscribe(task_b.clone());

        broker.publish(evt(&task_a));

        assert!(rx_a.recv().await.is_some());
        assert!(rx_b.try_recv().is_err());
    }
}
