//! Cache item bookkeeping with TTL support

use chrono::{DateTime, Utc};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Type-erased cached value
pub type CacheValue = Arc<dyn Any + Send + Sync>;

/// Per-insert options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheOptions {
    /// Maximum age; the manager default applies when `None`
    pub ttl: Option<Duration>,

    /// Eviction weight (higher = more protected); the manager default applies when `None`
    pub priority: Option<i32>,
}

impl CacheOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }
}

/// A cached value plus the metadata the eviction policy works from
#[derive(Clone)]
pub struct CacheItem {
    /// The cached value
    pub value: CacheValue,

    /// Estimated byte cost
    pub size: usize,

    /// Eviction weight
    pub priority: i32,

    /// Creation instant
    pub timestamp: Instant,

    /// Wall-clock creation time, for reporting
    pub created_at: DateTime<Utc>,

    /// Maximum age
    pub ttl: Duration,

    /// Number of successful reads
    pub access_count: u64,

    /// Last read (or creation) instant
    pub last_access: Instant,

    /// Monotonic tie-breaker for items touched within the same clock tick
    pub(crate) access_seq: u64,
}

impl CacheItem {
    pub(crate) fn new(value: CacheValue, size: usize, ttl: Duration, priority: i32, seq: u64) -> Self {
        let now = Instant::now();
        Self {
            value,
            size,
            priority,
            timestamp: now,
            created_at: Utc::now(),
            ttl,
            access_count: 0,
            last_access: now,
            access_seq: seq,
        }
    }

    /// Check if the item has outlived its TTL
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    pub fn is_expired_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.timestamp) > self.ttl
    }

    /// Get the age of the item
    pub fn age(&self) -> Duration {
        self.timestamp.elapsed()
    }

    /// Time until expiration, `None` once expired
    pub fn time_until_expiration(&self) -> Option<Duration> {
        self.ttl.checked_sub(self.age())
    }

    pub(crate) fn mark_accessed(&mut self, seq: u64) {
        self.last_access = Instant::now();
        self.access_count += 1;
        self.access_seq = seq;
    }

    /// Sort key for eviction: lower priority first, then least recently used
    pub(crate) fn eviction_key(&self) -> (i32, Instant, u64) {
        (self.priority, self.last_access, self.access_seq)
    }
}

impl fmt::Debug for CacheItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheItem")
            .field("size", &self.size)
            .field("priority", &self.priority)
            .field("ttl", &self.ttl)
            .field("access_count", &self.access_count)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}
