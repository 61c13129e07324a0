//! In-process publish/subscribe bus for domain events.
//!
//! # Guarantees
//!
//! - **Synchronous fan-out**: `publish` calls every current subscriber of the
//!   event's channel, in registration order, before returning
//! - **Isolation**: a handler that errors or panics is logged and skipped; the
//!   remaining handlers still run
//! - **Snapshot iteration**: subscribing or unsubscribing (even from inside a
//!   handler) never disturbs an in-flight publish
//! - **In-memory only**: no persistence, no replay, no cross-process delivery.
//!   Each process has its own bus, so clients connected to another instance do
//!   not see these events
//!
//! # Usage
//!
//! ```ignore
//! let bus: EventBus<DomainEvent> = EventBus::new();
//! let subscription = bus.subscribe("group:created", |event| {
//!     tracing::info!(?event, "group created");
//!     Ok(())
//! });
//! bus.publish(&DomainEvent::GroupCreated(payload));
//! subscription.unsubscribe();
//! ```

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use tracing::{error, warn};

/// An event the bus can route and a stream can serialize.
pub trait BusEvent: Send + Sync + 'static {
    /// Channel name, e.g. `joinRequest:created`.
    fn channel(&self) -> &'static str;

    /// Fully-materialized payload sent to stream clients.
    fn payload(&self) -> serde_json::Result<serde_json::Value>;
}

type Handler<E> = dyn Fn(&E) -> anyhow::Result<()> + Send + Sync;

struct Subscriber<E> {
    id: u64,
    active: AtomicBool,
    handler: Box<Handler<E>>,
}

struct BusInner<E> {
    channels: DashMap<&'static str, Vec<Arc<Subscriber<E>>>>,
    next_id: AtomicU64,
}

/// Per-publish delivery counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Cloneable handle to a process-wide bus. Clones share subscribers.
pub struct EventBus<E> {
    inner: Arc<BusInner<E>>,
}

impl<E> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<E: BusEvent> EventBus<E> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                channels: DashMap::new(),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Register a handler on `channel`.
    ///
    /// The handler stays registered until the returned [`Subscription`] is
    /// unsubscribed or dropped.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe<F>(&self, channel: &'static str, handler: F) -> Subscription<E>
    where
        F: Fn(&E) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let subscriber = Arc::new(Subscriber {
            id: self.inner.next_id.fetch_add(1, Ordering::Relaxed),
            active: AtomicBool::new(true),
            handler: Box::new(handler),
        });

        self.inner
            .channels
            .entry(channel)
            .or_default()
            .push(subscriber.clone());

        Subscription {
            bus: Arc::downgrade(&self.inner),
            channel,
            subscriber,
        }
    }

    /// Deliver `event` to every current subscriber of its channel.
    ///
    /// Never fails. Handler errors and panics are logged and counted.
    pub fn publish(&self, event: &E) -> PublishReport {
        let channel = event.channel();

        // Snapshot, then release the shard lock before running any handler.
        let snapshot: Vec<Arc<Subscriber<E>>> = match self.inner.channels.get(channel) {
            Some(subscribers) => subscribers.clone(),
            None => return PublishReport::default(),
        };

        let mut report = PublishReport::default();
        for subscriber in snapshot {
            // Unsubscribed earlier in this same publish.
            if !subscriber.active.load(Ordering::Acquire) {
                continue;
            }

            match catch_unwind(AssertUnwindSafe(|| (subscriber.handler)(event))) {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    warn!(channel, subscriber = subscriber.id, error = %e, "Subscriber failed");
                    report.failed += 1;
                }
                Err(panic_info) => {
                    let panic_msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
                        (*s).to_string()
                    } else if let Some(s) = panic_info.downcast_ref::<String>() {
                        s.clone()
                    } else {
                        "unknown panic".to_string()
                    };
                    error!(channel, subscriber = subscriber.id, panic = %panic_msg, "Subscriber panicked");
                    report.failed += 1;
                }
            }
        }
        report
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.inner
            .channels
            .get(channel)
            .map(|subscribers| subscribers.len())
            .unwrap_or(0)
    }
}

impl<E: BusEvent> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> std::fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("channels", &self.inner.channels.len())
            .finish()
    }
}

/// Capability to deregister one handler.
///
/// `unsubscribe` is idempotent and safe to call from inside a handler.
/// Dropping the subscription unsubscribes.
pub struct Subscription<E> {
    bus: Weak<BusInner<E>>,
    channel: &'static str,
    subscriber: Arc<Subscriber<E>>,
}

impl<E> Subscription<E> {
    pub fn channel(&self) -> &'static str {
        self.channel
    }

    pub fn is_active(&self) -> bool {
        self.subscriber.active.load(Ordering::Acquire)
    }

    pub fn unsubscribe(&self) {
        if !self.subscriber.active.swap(false, Ordering::AcqRel) {
            return;
        }
        let Some(bus) = self.bus.upgrade() else {
            return;
        };
        if let Some(mut subscribers) = bus.channels.get_mut(self.channel) {
            subscribers.retain(|s| s.id != self.subscriber.id);
        };
    }
}

impl<E> Drop for Subscription<E> {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    struct Ping(&'static str, u32);

    impl BusEvent for Ping {
        fn channel(&self) -> &'static str {
            self.0
        }

        fn payload(&self) -> serde_json::Result<serde_json::Value> {
            Ok(serde_json::json!({ "n": self.1 }))
        }
    }

    fn recorder() -> (Arc<Mutex<Vec<(String, u32)>>>, impl Fn(&'static str) -> Box<dyn Fn(&Ping) -> anyhow::Result<()> + Send + Sync>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let make = move |label: &'static str| {
            let sink = sink.clone();
            Box::new(move |ping: &Ping| {
                sink.lock().unwrap().push((label.to_string(), ping.1));
                Ok(())
            }) as Box<dyn Fn(&Ping) -> anyhow::Result<()> + Send + Sync>
        };
        (seen, make)
    }

    #[test]
    fn test_delivers_in_registration_order() {
        let bus = EventBus::new();
        let (seen, make) = recorder();
        let _a = bus.subscribe("ping", make("a"));
        let _b = bus.subscribe("ping", make("b"));

        let report = bus.publish(&Ping("ping", 1));

        assert_eq!(report, PublishReport { delivered: 2, failed: 0 });
        assert_eq!(
            *seen.lock().unwrap(),
            vec![("a".to_string(), 1), ("b".to_string(), 1)]
        );
    }

    #[test]
    fn test_channels_are_isolated() {
        let bus = EventBus::new();
        let (seen, make) = recorder();
        let _a = bus.subscribe("ping", make("a"));

        let report = bus.publish(&Ping("pong", 1));

        assert_eq!(report, PublishReport::default());
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_failing_subscriber_does_not_block_others() {
        let bus = EventBus::new();
        let (seen, make) = recorder();
        let _erroring = bus.subscribe("ping", |_| anyhow::bail!("boom"));
        let _panicking = bus.subscribe("ping", |_| panic!("subscriber exploded"));
        let _healthy = bus.subscribe("ping", make("healthy"));

        let report = bus.publish(&Ping("ping", 7));

        assert_eq!(report, PublishReport { delivered: 1, failed: 2 });
        assert_eq!(*seen.lock().unwrap(), vec![("healthy".to_string(), 7)]);
    }

    #[test]
    fn test_unsubscribe_is_idempotent_and_stops_delivery() {
        let bus = EventBus::new();
        let (seen, make) = recorder();
        let subscription = bus.subscribe("ping", make("a"));

        subscription.unsubscribe();
        subscription.unsubscribe();
        bus.publish(&Ping("ping", 1));

        assert!(!subscription.is_active());
        assert_eq!(bus.subscriber_count("ping"), 0);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_drop_unsubscribes() {
        let bus = EventBus::new();
        let (_seen, make) = recorder();
        {
            let _subscription = bus.subscribe("ping", make("a"));
            assert_eq!(bus.subscriber_count("ping"), 1);
        }
        assert_eq!(bus.subscriber_count("ping"), 0);
    }

    #[test]
    fn test_unsubscribe_from_inside_handler_skips_later_subscriber() {
        let bus: EventBus<Ping> = EventBus::new();
        let (seen, make) = recorder();

        // The first handler tears down the second mid-publish.
        let victim: Arc<Mutex<Option<Subscription<Ping>>>> = Arc::new(Mutex::new(None));
        let slot = victim.clone();
        let _killer = bus.subscribe("ping", move |_| {
            if let Some(subscription) = slot.lock().unwrap().as_ref() {
                subscription.unsubscribe();
            }
            Ok(())
        });
        *victim.lock().unwrap() = Some(bus.subscribe("ping", make("victim")));
        let _survivor = bus.subscribe("ping", make("survivor"));

        let report = bus.publish(&Ping("ping", 1));

        assert_eq!(report.delivered, 2);
        assert_eq!(*seen.lock().unwrap(), vec![("survivor".to_string(), 1)]);
    }

    #[test]
    fn test_subscribe_during_publish_applies_to_next_publish() {
        let bus: EventBus<Ping> = EventBus::new();
        let (seen, make) = recorder();
        let late: Arc<Mutex<Vec<Subscription<Ping>>>> = Arc::new(Mutex::new(Vec::new()));

        let bus_handle = bus.clone();
        let late_slot = late.clone();
        let make = Arc::new(make);
        let factory = make.clone();
        let _spawner = bus.subscribe("ping", move |_| {
            let mut late = late_slot.lock().unwrap();
            if late.is_empty() {
                late.push(bus_handle.subscribe("ping", factory("late")));
            }
            Ok(())
        });

        bus.publish(&Ping("ping", 1));
        assert!(seen.lock().unwrap().is_empty());

        bus.publish(&Ping("ping", 2));
        assert_eq!(*seen.lock().unwrap(), vec![("late".to_string(), 2)]);
    }
}
