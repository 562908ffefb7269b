//! Lightweight pub-sub used to fan a single scan's `ScanEvent` stream out
//! to however many subscribers the stream dispatcher has attached (SSE
//! clients, WS clients). Each scan owns one channel rather than sharing
//! a single global, history-buffered bus.
//!
//! Each subscriber queue is bounded. When a slow subscriber falls behind
//! and the queue fills, the oldest droppable event
//! ([`ScanEvent::is_droppable`]) is evicted to make room for the new one;
//! `open_port`/`tier_complete`/`scan_complete`/`error` are never evicted,
//! so a slow SSE/WS client loses only coarse progress updates, never a
//! result.

use crate::types::ScanEvent;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use tokio::sync::Notify;

/// Queue depth per subscriber before eviction kicks in.
const SUBSCRIBER_CAPACITY: usize = 256;

struct Subscriber {
    queue: Mutex<VecDeque<ScanEvent>>,
    notify: Notify,
    capacity: usize,
}

impl Subscriber {
    fn push(&self, event: ScanEvent) {
        let mut queue = self.queue.lock();
        if queue.len() >= self.capacity {
            if let Some(pos) = queue.iter().position(ScanEvent::is_droppable) {
                queue.remove(pos);
            } else if event.is_droppable() {
                return;
            }
        }
        queue.push_back(event);
        drop(queue);
        self.notify.notify_one();
    }
}

#[derive(Default)]
struct Inner {
    subscribers: Mutex<Vec<Weak<Subscriber>>>,
}

impl Drop for Inner {
    /// Wakes every still-registered subscriber so a `recv()` parked on
    /// `notified()` re-checks liveness and returns `None` instead of
    /// waiting forever for an event that will never come.
    fn drop(&mut self) {
        for weak in self.subscribers.lock().iter() {
            if let Some(subscriber) = weak.upgrade() {
                subscriber.notify.notify_one();
            }
        }
    }
}

/// Per-scan broadcaster. `subscribe` can be called at any point in the
/// scan's lifetime; all events published after that point are delivered.
#[derive(Clone, Default)]
pub struct ScanEventBus {
    inner: Arc<Inner>,
}

impl ScanEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> EventReceiver {
        let subscriber = Arc::new(Subscriber {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            capacity: SUBSCRIBER_CAPACITY,
        });
        self.inner.subscribers.lock().push(Arc::downgrade(&subscriber));
        EventReceiver {
            subscriber,
            bus_alive: Arc::downgrade(&self.inner),
        }
    }

    /// Publish to every live subscriber, applying per-subscriber
    /// back-pressure; dead receivers are pruned.
    pub fn publish(&self, event: ScanEvent) {
        let mut subs = self.inner.subscribers.lock();
        subs.retain(|weak| match weak.upgrade() {
            Some(subscriber) => {
                subscriber.push(event.clone());
                true
            }
            None => false,
        });
    }

    pub fn subscriber_count(&self) -> usize {
        let mut subs = self.inner.subscribers.lock();
        subs.retain(|weak| weak.strong_count() > 0);
        subs.len()
    }
}

/// Receiving half returned by [`ScanEventBus::subscribe`].
pub struct EventReceiver {
    subscriber: Arc<Subscriber>,
    bus_alive: Weak<Inner>,
}

impl EventReceiver {
    /// Waits for the next event, or returns `None` once every clone of the
    /// originating bus has been dropped and the queue has drained.
    pub async fn recv(&mut self) -> Option<ScanEvent> {
        loop {
            if let Some(event) = self.subscriber.queue.lock().pop_front() {
                return Some(event);
            }
            if self.bus_alive.upgrade().is_none() {
                return None;
            }
            self.subscriber.notify.notified().await;
        }
    }
}

impl Clone for ScanEvent {
    fn clone(&self) -> Self {
        match self {
            ScanEvent::ScanStart { target, total_ports } => ScanEvent::ScanStart {
                target: target.clone(),
                total_ports: *total_ports,
            },
            ScanEvent::TierStart { tier, count, progress } => ScanEvent::TierStart {
                tier: *tier,
                count: *count,
                progress: *progress,
            },
            ScanEvent::OpenPort { port, progress } => ScanEvent::OpenPort {
                port: port.clone(),
                progress: *progress,
            },
            ScanEvent::TierComplete { tier, open_count, progress } => ScanEvent::TierComplete {
                tier: *tier,
                open_count: *open_count,
                progress: *progress,
            },
            ScanEvent::ScanComplete => ScanEvent::ScanComplete,
            ScanEvent::Error { message } => ScanEvent::Error {
                message: message.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_events_published_after_subscribe() {
        let bus = ScanEventBus::new();
        let mut rx = bus.subscribe();
        bus.publish(ScanEvent::ScanComplete);
        let got = rx.recv().await.unwrap();
        assert!(matches!(got, ScanEvent::ScanComplete));
    }

    #[tokio::test]
    async fn dead_subscriber_is_pruned_without_error() {
        let bus = ScanEventBus::new();
        {
            let _rx = bus.subscribe();
        }
        bus.publish(ScanEvent::ScanComplete);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn recv_returns_none_once_bus_is_dropped() {
        let bus = ScanEventBus::new();
        let mut rx = bus.subscribe();
        drop(bus);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn full_queue_evicts_droppable_events_before_results() {
        let bus = ScanEventBus::new();
        let rx = bus.subscribe();

        for _ in 0..SUBSCRIBER_CAPACITY {
            bus.publish(ScanEvent::TierStart {
                tier: crate::types::TierKind::Low,
                count: 0,
                progress: 0.0,
            });
        }
        bus.publish(ScanEvent::ScanComplete);

        let remaining: Vec<ScanEvent> = rx.subscriber.queue.lock().drain(..).collect();
        assert!(remaining.iter().any(|e| matches!(e, ScanEvent::ScanComplete)));
        assert!(remaining.len() <= SUBSCRIBER_CAPACITY);
    }
}
