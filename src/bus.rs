//! In-process event fan-out with leak-free subscriptions.
//!
//! Both the auth flow and the launch channel publish through an [`EventBus`].
//! A [`Subscription`] can be unsubscribed exactly once, explicitly or on
//! drop, and never sees another event afterwards, even across overlapping
//! subscribe/unsubscribe cycles.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::mpsc;

struct BusInner<T> {
    subscribers: Mutex<HashMap<u64, mpsc::UnboundedSender<T>>>,
    next_id: AtomicU64,
}

/// Clonable publish/subscribe handle.
pub struct EventBus<T> {
    inner: Arc<BusInner<T>>,
}

impl<T> Clone for EventBus<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Default for EventBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> EventBus<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                subscribers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    pub fn subscribe(&self) -> Subscription<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(id, tx);
        Subscription {
            id,
            bus: Arc::downgrade(&self.inner),
            rx,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

impl<T: Clone> EventBus<T> {
    pub fn publish(&self, event: T) {
        let mut subscribers = self
            .inner
            .subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        subscribers.retain(|_, tx| tx.send(event.clone()).is_ok());
    }
}

/// A live subscription to an [`EventBus`].
pub struct Subscription<T> {
    id: u64,
    bus: Weak<BusInner<T>>,
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> Subscription<T> {
    /// Receive the next event; `None` once unsubscribed (after the already
    /// delivered backlog is dropped) or when the bus is gone and drained.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Non-blocking receive for synchronous call sites.
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Stop receiving events. Idempotent; also runs on drop.
    ///
    /// Events published before unsubscription but not yet consumed are
    /// discarded; an unsubscribed listener observes nothing further.
    pub fn unsubscribe(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.subscribers
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .remove(&self.id);
        }
        self.bus = Weak::new();
        self.rx.close();
        while self.rx.try_recv().is_ok() {}
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_to_all_subscribers() {
        let bus: EventBus<u32> = EventBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.publish(7);
        assert_eq!(a.recv().await, Some(7));
        assert_eq!(b.recv().await, Some(7));
    }

    #[tokio::test]
    async fn unsubscribed_listener_sees_nothing() {
        let bus: EventBus<u32> = EventBus::new();
        let mut sub = bus.subscribe();

        bus.publish(1);
        sub.unsubscribe();
        bus.publish(2);

        assert_eq!(sub.recv().await, None);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent() {
        let bus: EventBus<u32> = EventBus::new();
        let mut sub = bus.subscribe();
        sub.unsubscribe();
        sub.unsubscribe();
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn drop_unsubscribes() {
        let bus: EventBus<u32> = EventBus::new();
        {
            let _sub = bus.subscribe();
            assert_eq!(bus.subscriber_count(), 1);
        }
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn overlapping_cycles_do_not_cross_deliver() {
        let bus: EventBus<u32> = EventBus::new();
        let mut first = bus.subscribe();
        bus.publish(1);
        first.unsubscribe();

        let mut second = bus.subscribe();
        bus.publish(2);

        assert_eq!(first.recv().await, None);
        assert_eq!(second.recv().await, Some(2));
    }
}
