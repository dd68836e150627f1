//! Memory manager: namespaced cache with size accounting, TTL, priority
//! eviction, periodic garbage collection and pressure handling

use crate::memory::{
    config::MemoryConfig,
    entry::{CacheItem, CacheOptions, CacheValue},
    events::{EventBus, EventRecord, MemoryEvent, MemoryEventKind, RemovalReason, SubscriptionId},
    sizing::estimate_size,
    types::{MemoryStats, NamespaceStats, PressureLevel},
};
use parking_lot::Mutex;
use serde::Serialize;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Process-wide bounded cache
///
/// This implementation provides:
/// - Named namespaces created lazily on first write
/// - A byte ceiling enforced before every insert
/// - Eviction by `(priority, last access)`
/// - TTL expiry on read and during garbage collection
/// - Watermark-driven pressure cleanup
/// - A typed event bus for observers
///
/// Every compound operation (check, evict, insert) runs under one lock
/// acquisition. Events are published after the lock is released.
pub struct MemoryManager {
    config: MemoryConfig,
    store: Mutex<Store>,
    events: EventBus,
    gc_task: Mutex<Option<JoinHandle<()>>>,
}

/// Outcome of one garbage collection pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GcReport {
    pub expired: usize,
    pub evicted: usize,
    pub freed_bytes: usize,
}

#[derive(Default)]
struct Store {
    namespaces: HashMap<String, HashMap<String, CacheItem>>,
    total_allocated: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
    gc_runs: u64,
    seq: u64,
    pressure: Option<PressureLevel>,
}

impl Store {
    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn remove_item(&mut self, namespace: &str, key: &str) -> Option<CacheItem> {
        let items = self.namespaces.get_mut(namespace)?;
        let item = items.remove(key)?;
        if items.is_empty() {
            self.namespaces.remove(namespace);
        }
        self.total_allocated = self.total_allocated.saturating_sub(item.size);
        Some(item)
    }

    fn namespace_size(&self, namespace: &str) -> usize {
        self.namespaces
            .get(namespace)
            .map(|items| items.values().map(|i| i.size).sum())
            .unwrap_or(0)
    }

    /// Keys of a namespace in eviction order
    fn eviction_order(&self, namespace: &str) -> Vec<(String, usize)> {
        let Some(items) = self.namespaces.get(namespace) else {
            return Vec::new();
        };
        let mut ordered: Vec<_> = items
            .iter()
            .map(|(key, item)| (item.eviction_key(), key.clone(), item.size))
            .collect();
        ordered.sort_by(|a, b| a.0.cmp(&b.0));
        ordered.into_iter().map(|(_, key, size)| (key, size)).collect()
    }
}

impl MemoryManager {
    /// Create a new manager with the given configuration
    pub fn new(config: MemoryConfig) -> Arc<Self> {
        info!(
            "Initializing memory manager (ceiling: {} bytes, gc interval: {:?})",
            config.max_bytes, config.gc_interval
        );
        if let Err(e) = config.validate() {
            warn!("Memory configuration is inconsistent: {}", e);
        }

        Arc::new(Self {
            config,
            store: Mutex::new(Store::default()),
            events: EventBus::new(),
            gc_task: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Start the periodic garbage collection task
    ///
    /// The task holds a weak reference and ends once the manager is dropped.
    /// Returns `false` when called outside a tokio runtime.
    pub fn start_gc(self: &Arc<Self>) -> bool {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("No tokio runtime available; periodic garbage collection disabled");
            return false;
        };

        let weak = Arc::downgrade(self);
        let interval = self.config.gc_interval;
        let task = handle.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(manager) = weak.upgrade() else {
                    break;
                };
                let report = manager.run_garbage_collection();
                if report.freed_bytes > 0 {
                    debug!("Periodic GC: {:?}", report);
                }
                manager.handle_memory_pressure();
            }
        });

        if let Some(previous) = self.gc_task.lock().replace(task) {
            previous.abort();
        }
        info!("Started periodic garbage collection (interval: {:?})", interval);
        true
    }

    /// Stop the GC task, clear every namespace and drop all subscribers
    pub fn destroy(&self) {
        if let Some(task) = self.gc_task.lock().take() {
            task.abort();
        }

        let namespaces: Vec<String> = self.store.lock().namespaces.keys().cloned().collect();
        for namespace in namespaces {
            self.clear_namespace(&namespace);
        }
        self.events.clear();
        info!("Memory manager destroyed");
    }

    /// Register an observer for one event kind
    pub fn subscribe<F>(&self, kind: MemoryEventKind, callback: F) -> SubscriptionId
    where
        F: Fn(&EventRecord) + Send + Sync + 'static,
    {
        self.events.subscribe(kind, callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    /// Cache a serializable value, estimating its size from its structure
    ///
    /// Returns `false` only when the value alone exceeds the ceiling.
    pub fn set<T>(&self, namespace: &str, key: &str, value: T, options: CacheOptions) -> bool
    where
        T: Serialize + Any + Send + Sync,
    {
        let size = estimate_size(&value);
        self.set_value(namespace, key, Arc::new(value), size, options)
    }

    /// Cache a value whose size the caller already knows
    pub fn set_with_size<T>(
        &self,
        namespace: &str,
        key: &str,
        value: T,
        size: usize,
        options: CacheOptions,
    ) -> bool
    where
        T: Any + Send + Sync,
    {
        self.set_value(namespace, key, Arc::new(value), size, options)
    }

    fn set_value(
        &self,
        namespace: &str,
        key: &str,
        value: CacheValue,
        size: usize,
        options: CacheOptions,
    ) -> bool {
        let ttl = options.ttl.unwrap_or(self.config.default_ttl);
        let priority = options.priority.unwrap_or(self.config.default_priority);
        let mut events = Vec::new();

        let stored = {
            let mut store = self.store.lock();

            // An oversized value leaves any existing entry in place.
            if size > self.config.max_bytes {
                warn!(
                    "Refusing to cache {}/{}: {} bytes exceeds the {} byte ceiling",
                    namespace, key, size, self.config.max_bytes
                );
                false
            } else {
                if let Some(old) = store.remove_item(namespace, key) {
                    events.push(MemoryEvent::ItemRemoved {
                        namespace: namespace.to_string(),
                        key: key.to_string(),
                        size: old.size,
                        reason: RemovalReason::Replaced,
                    });
                }

                if store.total_allocated + size > self.config.max_bytes {
                    let required = store.total_allocated + size - self.config.max_bytes;
                    let freed = self.evict_bytes_locked(&mut store, namespace, required, &mut events);
                    if freed < required {
                        self.evict_global_locked(&mut store, required - freed, &mut events);
                    }
                }

                let seq = store.next_seq();
                let item = CacheItem::new(value, size, ttl, priority, seq);
                store
                    .namespaces
                    .entry(namespace.to_string())
                    .or_default()
                    .insert(key.to_string(), item);
                store.total_allocated += size;
                debug!("Cached {}/{} ({} bytes, priority {})", namespace, key, size, priority);

                events.push(MemoryEvent::ItemAdded {
                    namespace: namespace.to_string(),
                    key: key.to_string(),
                    size,
                });
                true
            }
        };

        self.events.publish(events);
        stored
    }

    /// Get a live value of type `T`
    ///
    /// Expired items are removed and reported as misses. A value stored under
    /// a different type is also a miss.
    pub fn get<T>(&self, namespace: &str, key: &str) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        let mut events = Vec::new();

        let value = {
            let mut store = self.store.lock();
            let state = store
                .namespaces
                .get(namespace)
                .and_then(|items| items.get(key))
                .map(|item| item.is_expired());

            match state {
                None => {
                    store.misses += 1;
                    None
                }
                Some(true) => {
                    store.misses += 1;
                    store.expirations += 1;
                    if let Some(item) = store.remove_item(namespace, key) {
                        debug!("Cache entry expired: {}/{}", namespace, key);
                        events.push(MemoryEvent::ItemRemoved {
                            namespace: namespace.to_string(),
                            key: key.to_string(),
                            size: item.size,
                            reason: RemovalReason::Expired,
                        });
                    }
                    None
                }
                Some(false) => {
                    let seq = store.next_seq();
                    let typed = store
                        .namespaces
                        .get_mut(namespace)
                        .and_then(|items| items.get_mut(key))
                        .and_then(|item| {
                            let typed = item.value.clone().downcast::<T>().ok()?;
                            item.mark_accessed(seq);
                            Some(typed)
                        });
                    if typed.is_some() {
                        store.hits += 1;
                    } else {
                        store.misses += 1;
                    }
                    typed
                }
            }
        };

        self.events.publish(events);
        value
    }

    /// Presence check that leaves recency and counters untouched
    pub fn contains(&self, namespace: &str, key: &str) -> bool {
        let store = self.store.lock();
        store
            .namespaces
            .get(namespace)
            .and_then(|items| items.get(key))
            .map(|item| !item.is_expired())
            .unwrap_or(false)
    }

    /// Remove one item; returns whether it was present
    pub fn remove(&self, namespace: &str, key: &str) -> bool {
        let removed = self.store.lock().remove_item(namespace, key);
        match removed {
            Some(item) => {
                self.events.publish(vec![MemoryEvent::ItemRemoved {
                    namespace: namespace.to_string(),
                    key: key.to_string(),
                    size: item.size,
                    reason: RemovalReason::Manual,
                }]);
                true
            }
            None => false,
        }
    }

    /// Remove every item whose key matches the predicate
    pub fn remove_matching<F>(&self, namespace: &str, predicate: F) -> usize
    where
        F: Fn(&str) -> bool,
    {
        let mut events = Vec::new();
        {
            let mut store = self.store.lock();
            let keys: Vec<String> = store
                .namespaces
                .get(namespace)
                .map(|items| items.keys().filter(|k| predicate(k)).cloned().collect())
                .unwrap_or_default();

            for key in keys {
                if let Some(item) = store.remove_item(namespace, &key) {
                    events.push(MemoryEvent::ItemRemoved {
                        namespace: namespace.to_string(),
                        key,
                        size: item.size,
                        reason: RemovalReason::Manual,
                    });
                }
            }
        }

        let removed = events.len();
        self.events.publish(events);
        removed
    }

    /// Drop a whole namespace; returns the number of items removed
    pub fn clear_namespace(&self, namespace: &str) -> usize {
        let mut events = Vec::new();
        let count = Self::clear_namespace_locked(&mut self.store.lock(), namespace, &mut events);
        self.events.publish(events);
        count
    }

    fn clear_namespace_locked(store: &mut Store, namespace: &str, events: &mut Vec<MemoryEvent>) -> usize {
        let Some(items) = store.namespaces.remove(namespace) else {
            return 0;
        };
        let freed: usize = items.values().map(|i| i.size).sum();
        store.total_allocated = store.total_allocated.saturating_sub(freed);
        info!("Cleared namespace {} ({} items, {} bytes)", namespace, items.len(), freed);
        events.push(MemoryEvent::NamespaceCleared {
            namespace: namespace.to_string(),
            items: items.len(),
            freed_bytes: freed,
        });
        items.len()
    }

    /// Keys currently stored in a namespace (including not-yet-collected expired ones)
    pub fn keys(&self, namespace: &str) -> Vec<String> {
        self.store
            .lock()
            .namespaces
            .get(namespace)
            .map(|items| items.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Evict from one namespace until `required_bytes` are freed
    ///
    /// Lower priority goes first, then least recently used. Returns the bytes
    /// actually freed, which is less than requested once the namespace is empty.
    pub fn evict(&self, namespace: &str, required_bytes: usize) -> usize {
        let mut events = Vec::new();
        let freed = self.evict_bytes_locked(&mut self.store.lock(), namespace, required_bytes, &mut events);
        self.events.publish(events);
        freed
    }

    fn evict_bytes_locked(
        &self,
        store: &mut Store,
        namespace: &str,
        required_bytes: usize,
        events: &mut Vec<MemoryEvent>,
    ) -> usize {
        if required_bytes == 0 {
            return 0;
        }

        let mut freed = 0;
        let mut keys = Vec::new();
        for (key, size) in store.eviction_order(namespace) {
            if freed >= required_bytes {
                break;
            }
            store.remove_item(namespace, &key);
            freed += size;
            keys.push(key);
        }

        Self::record_eviction(store, namespace, keys, freed, events);
        freed
    }

    fn evict_count_locked(
        &self,
        store: &mut Store,
        namespace: &str,
        count: usize,
        events: &mut Vec<MemoryEvent>,
    ) -> usize {
        let mut freed = 0;
        let mut keys = Vec::new();
        for (key, size) in store.eviction_order(namespace).into_iter().take(count) {
            store.remove_item(namespace, &key);
            freed += size;
            keys.push(key);
        }

        Self::record_eviction(store, namespace, keys, freed, events);
        freed
    }

    /// Evict across all namespaces, lowest priority / least recent first
    fn evict_global_locked(&self, store: &mut Store, required_bytes: usize, events: &mut Vec<MemoryEvent>) -> usize {
        let mut ordered: Vec<_> = store
            .namespaces
            .iter()
            .flat_map(|(ns, items)| {
                items
                    .iter()
                    .map(move |(key, item)| (item.eviction_key(), ns.clone(), key.clone(), item.size))
            })
            .collect();
        ordered.sort_by(|a, b| a.0.cmp(&b.0));

        let mut freed = 0;
        let mut per_namespace: HashMap<String, (Vec<String>, usize)> = HashMap::new();
        for (_, ns, key, size) in ordered {
            if freed >= required_bytes {
                break;
            }
            store.remove_item(&ns, &key);
            freed += size;
            let slot = per_namespace.entry(ns).or_default();
            slot.0.push(key);
            slot.1 += size;
        }

        for (ns, (keys, bytes)) in per_namespace {
            Self::record_eviction(store, &ns, keys, bytes, events);
        }
        freed
    }

    fn record_eviction(
        store: &mut Store,
        namespace: &str,
        keys: Vec<String>,
        freed: usize,
        events: &mut Vec<MemoryEvent>,
    ) {
        if keys.is_empty() {
            return;
        }
        store.evictions += keys.len() as u64;
        debug!("Evicted {} items ({} bytes) from {}", keys.len(), freed, namespace);
        events.push(MemoryEvent::ItemsEvicted {
            namespace: namespace.to_string(),
            keys,
            freed_bytes: freed,
        });
    }

    /// Remove expired items everywhere, then shed load above the GC watermark
    ///
    /// Idempotent: a pass with nothing expired and utilization below the
    /// watermark changes nothing but the run counter.
    pub fn run_garbage_collection(&self) -> GcReport {
        let mut events = Vec::new();
        let mut report = GcReport::default();

        {
            let mut store = self.store.lock();
            let now = Instant::now();

            let expired: Vec<(String, String)> = store
                .namespaces
                .iter()
                .flat_map(|(ns, items)| {
                    items
                        .iter()
                        .filter(|(_, item)| item.is_expired_at(now))
                        .map(move |(key, _)| (ns.clone(), key.clone()))
                })
                .collect();

            for (ns, key) in expired {
                if let Some(item) = store.remove_item(&ns, &key) {
                    report.expired += 1;
                    report.freed_bytes += item.size;
                    events.push(MemoryEvent::ItemRemoved {
                        namespace: ns,
                        key,
                        size: item.size,
                        reason: RemovalReason::Expired,
                    });
                }
            }
            store.expirations += report.expired as u64;

            let high = (self.config.max_bytes as f64 * self.config.gc_high_watermark) as usize;
            if store.total_allocated > high {
                let target = (self.config.max_bytes as f64 * self.config.gc_target) as usize;
                let mut remaining = store.total_allocated - target;
                let evictions_before = store.evictions;

                // Largest namespaces shed first.
                let mut by_size: Vec<(String, usize)> = store
                    .namespaces
                    .keys()
                    .map(|ns| (ns.clone(), store.namespace_size(ns)))
                    .collect();
                by_size.sort_by(|a, b| b.1.cmp(&a.1));

                for (ns, _) in by_size {
                    if remaining == 0 {
                        break;
                    }
                    let freed = self.evict_bytes_locked(&mut store, &ns, remaining, &mut events);
                    report.freed_bytes += freed;
                    remaining = remaining.saturating_sub(freed);
                }
                report.evicted = (store.evictions - evictions_before) as usize;
            }

            store.gc_runs += 1;
            events.push(MemoryEvent::GcCompleted {
                expired: report.expired,
                evicted: report.evicted,
                freed_bytes: report.freed_bytes,
                total_allocated: store.total_allocated,
            });
        }

        if report.expired > 0 || report.evicted > 0 {
            info!(
                "GC removed {} expired and {} evicted items ({} bytes)",
                report.expired, report.evicted, report.freed_bytes
            );
        }
        self.events.publish(events);
        report
    }

    /// Classify utilization and clean up accordingly
    ///
    /// Critical: transient namespaces are dropped, then half of every other
    /// namespace is evicted. Warning: a fifth of every namespace is evicted.
    /// Level changes are published as `PressureDetected`.
    pub fn handle_memory_pressure(&self) -> PressureLevel {
        let mut events = Vec::new();

        let level = {
            let mut store = self.store.lock();
            let utilization = store.total_allocated as f64 / self.config.max_bytes as f64;
            let level = if utilization >= self.config.critical_threshold {
                PressureLevel::Critical
            } else if utilization >= self.config.warning_threshold {
                PressureLevel::Warning
            } else {
                PressureLevel::Normal
            };

            if store.pressure != Some(level) {
                store.pressure = Some(level);
                events.push(MemoryEvent::PressureDetected {
                    level,
                    utilization: utilization * 100.0,
                });
            }

            match level {
                PressureLevel::Critical => {
                    warn!("Critical memory pressure ({:.1}%), aggressive cleanup", utilization * 100.0);
                    let transient: Vec<String> = store
                        .namespaces
                        .keys()
                        .filter(|ns| self.config.is_transient(ns))
                        .cloned()
                        .collect();
                    for ns in transient {
                        Self::clear_namespace_locked(&mut store, &ns, &mut events);
                    }
                    self.evict_ratio_locked(&mut store, self.config.aggressive_eviction_ratio, &mut events);
                }
                PressureLevel::Warning => {
                    info!("Memory pressure warning ({:.1}%), moderate cleanup", utilization * 100.0);
                    self.evict_ratio_locked(&mut store, self.config.moderate_eviction_ratio, &mut events);
                }
                PressureLevel::Normal => {}
            }
            level
        };

        self.events.publish(events);
        level
    }

    fn evict_ratio_locked(&self, store: &mut Store, ratio: f64, events: &mut Vec<MemoryEvent>) {
        let counts: Vec<(String, usize)> = store
            .namespaces
            .iter()
            .map(|(ns, items)| (ns.clone(), (items.len() as f64 * ratio).ceil() as usize))
            .collect();
        for (ns, count) in counts {
            self.evict_count_locked(store, &ns, count, events);
        }
    }

    /// Estimated bytes currently accounted
    pub fn total_allocated(&self) -> usize {
        self.store.lock().total_allocated
    }

    /// Statistics snapshot
    pub fn stats(&self) -> MemoryStats {
        let store = self.store.lock();
        let namespaces = store
            .namespaces
            .iter()
            .map(|(ns, items)| {
                (
                    ns.clone(),
                    NamespaceStats {
                        items: items.len(),
                        size_bytes: items.values().map(|i| i.size).sum(),
                    },
                )
            })
            .collect();

        MemoryStats {
            total_allocated: store.total_allocated,
            max_bytes: self.config.max_bytes,
            hits: store.hits,
            misses: store.misses,
            evictions: store.evictions,
            expirations: store.expirations,
            gc_runs: store.gc_runs,
            namespaces,
        }
    }
}

impl Drop for MemoryManager {
    fn drop(&mut self) {
        if let Some(task) = self.gc_task.get_mut().take() {
            task.abort();
        }
    }
}
