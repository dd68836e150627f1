//! Memory events and the subscriber bus
//!
//! Every structural change to the cache is described by a [`MemoryEvent`].
//! Subscribers register per [`MemoryEventKind`] and are invoked after the
//! store lock has been released. A panicking subscriber is caught and logged;
//! it never unwinds into the manager or into the caller that triggered it.

use crate::memory::types::PressureLevel;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::error;

/// Why an item left the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalReason {
    /// Removed by the caller
    Manual,

    /// TTL elapsed
    Expired,

    /// Replaced by a newer value under the same key
    Replaced,
}

impl std::fmt::Display for RemovalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemovalReason::Manual => write!(f, "manual removal"),
            RemovalReason::Expired => write!(f, "TTL expired"),
            RemovalReason::Replaced => write!(f, "replaced"),
        }
    }
}

/// Event kinds subscribers can register for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryEventKind {
    ItemAdded,
    ItemRemoved,
    NamespaceCleared,
    ItemsEvicted,
    GcCompleted,
    PressureDetected,
}

/// A change to the cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MemoryEvent {
    ItemAdded {
        namespace: String,
        key: String,
        size: usize,
    },
    ItemRemoved {
        namespace: String,
        key: String,
        size: usize,
        reason: RemovalReason,
    },
    NamespaceCleared {
        namespace: String,
        items: usize,
        freed_bytes: usize,
    },
    ItemsEvicted {
        namespace: String,
        keys: Vec<String>,
        freed_bytes: usize,
    },
    GcCompleted {
        expired: usize,
        evicted: usize,
        freed_bytes: usize,
        total_allocated: usize,
    },
    PressureDetected {
        level: PressureLevel,
        utilization: f64,
    },
}

impl MemoryEvent {
    pub fn kind(&self) -> MemoryEventKind {
        match self {
            MemoryEvent::ItemAdded { .. } => MemoryEventKind::ItemAdded,
            MemoryEvent::ItemRemoved { .. } => MemoryEventKind::ItemRemoved,
            MemoryEvent::NamespaceCleared { .. } => MemoryEventKind::NamespaceCleared,
            MemoryEvent::ItemsEvicted { .. } => MemoryEventKind::ItemsEvicted,
            MemoryEvent::GcCompleted { .. } => MemoryEventKind::GcCompleted,
            MemoryEvent::PressureDetected { .. } => MemoryEventKind::PressureDetected,
        }
    }
}

/// An event with the time it was published
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub event: MemoryEvent,
    pub timestamp: DateTime<Utc>,
}

/// Handle returned by [`EventBus::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

type Callback = Arc<dyn Fn(&EventRecord) + Send + Sync>;

/// Per-kind subscriber registry
#[derive(Default)]
pub struct EventBus {
    next_id: AtomicU64,
    subscribers: RwLock<HashMap<MemoryEventKind, Vec<(SubscriptionId, Callback)>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for one event kind
    pub fn subscribe<F>(&self, kind: MemoryEventKind, callback: F) -> SubscriptionId
    where
        F: Fn(&EventRecord) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .write()
            .entry(kind)
            .or_default()
            .push((id, Arc::new(callback)));
        id
    }

    /// Remove a subscription; returns whether it existed
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write();
        let mut found = false;
        for list in subscribers.values_mut() {
            let before = list.len();
            list.retain(|(sub, _)| *sub != id);
            found |= list.len() != before;
        }
        found
    }

    /// Drop every subscription
    pub fn clear(&self) {
        self.subscribers.write().clear();
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().values().map(Vec::len).sum()
    }

    /// Deliver events to their subscribers
    ///
    /// Callbacks are cloned out of the registry first so a subscriber may
    /// (un)subscribe from inside its own callback.
    pub fn publish(&self, events: Vec<MemoryEvent>) {
        for event in events {
            let callbacks: Vec<(SubscriptionId, Callback)> = match self.subscribers.read().get(&event.kind()) {
                Some(list) if !list.is_empty() => list.clone(),
                _ => continue,
            };

            let record = EventRecord {
                event,
                timestamp: Utc::now(),
            };

            for (id, callback) in callbacks {
                let outcome = catch_unwind(AssertUnwindSafe(|| callback(&record)));
                if let Err(panic) = outcome {
                    let message = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    error!(
                        "Memory event subscriber {:?} panicked on {:?}: {}",
                        id,
                        record.event.kind(),
                        message
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn added(key: &str) -> MemoryEvent {
        MemoryEvent::ItemAdded {
            namespace: "ns".to_string(),
            key: key.to_string(),
            size: 1,
        }
    }

    #[test]
    fn test_subscribe_and_publish() {
        let bus = EventBus::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        bus.subscribe(MemoryEventKind::ItemAdded, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(vec![added("a"), added("b")]);
        bus.publish(vec![MemoryEvent::GcCompleted {
            expired: 0,
            evicted: 0,
            freed_bytes: 0,
            total_allocated: 0,
        }]);

        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unsubscribe() {
        let bus = EventBus::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let id = bus.subscribe(MemoryEventKind::ItemAdded, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.publish(vec![added("a")]);
        assert_eq!(seen.load(Ordering::SeqCst), 0);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_panicking_subscriber_is_contained() {
        let bus = EventBus::new();
        let seen = Arc::new(AtomicUsize::new(0));
        bus.subscribe(MemoryEventKind::ItemAdded, |_| panic!("subscriber bug"));
        let counter = seen.clone();
        bus.subscribe(MemoryEventKind::ItemAdded, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(vec![added("a")]);

        // The second subscriber still ran.
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_event_kind_and_serialization() {
        let event = MemoryEvent::PressureDetected {
            level: PressureLevel::Warning,
            utilization: 80.0,
        };
        assert_eq!(event.kind(), MemoryEventKind::PressureDetected);

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"kind\":\"pressure_detected\""));
        assert!(json.contains("\"level\":\"warning\""));
    }
}
