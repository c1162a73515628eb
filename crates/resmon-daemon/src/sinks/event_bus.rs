//! In-process publish/subscribe channel for snapshots.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use futures::future::BoxFuture;
use futures::FutureExt;
use resmon_client::TelemetrySnapshot;

use super::{Sink, SinkError};

type Observer = Arc<dyn Fn(&TelemetrySnapshot) + Send + Sync>;

#[derive(Default)]
struct Observers {
    next_id: u64,
    entries: BTreeMap<u64, Observer>,
}

/// Delivers published snapshots synchronously to every subscribed observer.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<Observers>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an observer. It stays subscribed until the returned
    /// subscription is dropped.
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&TelemetrySnapshot) + Send + Sync + 'static,
    {
        let mut observers = lock(&self.inner);
        let id = observers.next_id;
        observers.next_id += 1;
        observers.entries.insert(id, Arc::new(observer));
        Subscription {
            id,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Calls every observer registered at the time of the call.
    ///
    /// Observers run outside the lock, so they may subscribe or unsubscribe.
    /// Returns the number of observers called.
    pub fn publish(&self, snapshot: &TelemetrySnapshot) -> usize {
        let observers: Vec<Observer> = lock(&self.inner).entries.values().cloned().collect();
        for observer in &observers {
            observer(snapshot);
        }
        observers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.inner).entries.len()
    }
}

fn lock(inner: &Mutex<Observers>) -> MutexGuard<'_, Observers> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Keeps an observer registered on an [`EventBus`].
#[must_use = "dropping a subscription unsubscribes the observer"]
pub struct Subscription {
    id: u64,
    bus: Weak<Mutex<Observers>>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            lock(&bus).entries.remove(&self.id);
        }
    }
}

/// Sink publishing each snapshot on an event bus.
pub struct EventBusSink {
    bus: EventBus,
}

impl EventBusSink {
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }
}

impl Sink for EventBusSink {
    fn name(&self) -> &str {
        "event-bus"
    }

    fn consume<'a>(
        &'a self,
        snapshot: &'a TelemetrySnapshot,
    ) -> BoxFuture<'a, Result<(), SinkError>> {
        self.bus.publish(snapshot);
        async { Ok(()) }.boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_publish_reaches_all_subscribers() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s1 = seen.clone();
        let _a = bus.subscribe(move |s| s1.lock().unwrap().push(("a", s.cpu_load_total)));
        let s2 = seen.clone();
        let _b = bus.subscribe(move |s| s2.lock().unwrap().push(("b", s.cpu_load_total)));

        let snapshot = TelemetrySnapshot {
            cpu_load_total: 3.0,
            ..Default::default()
        };
        assert_eq!(bus.publish(&snapshot), 2);
        assert_eq!(*seen.lock().unwrap(), vec![("a", 3.0), ("b", 3.0)]);
    }

    #[test]
    fn test_dropping_subscription_unsubscribes() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let c = calls.clone();
        let first = bus.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        let c = calls.clone();
        let second = bus.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(bus.subscriber_count(), 2);

        drop(first);
        assert_eq!(bus.subscriber_count(), 1);
        drop(second);
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.publish(&TelemetrySnapshot::default()), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_subscription_outlives_bus() {
        let bus = EventBus::new();
        let sub = bus.subscribe(|_| {});
        drop(bus);
        drop(sub);
    }

    #[tokio::test]
    async fn test_sink_publishes() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let _sub = bus.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        let sink = EventBusSink::new(bus.clone());
        sink.consume(&TelemetrySnapshot::default()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
