//! # Bounded Memory Manager
//!
//! A process-wide cache partitioned into named namespaces. Every value carries
//! an estimated size, a priority and a TTL; the manager keeps the total under a
//! configured ceiling.
//!
//! ## Features
//!
//! - **Size Accounting**: Values are sized from their serde representation
//! - **Priority/LRU Eviction**: Lowest priority first, then least recently used
//! - **TTL Expiration**: Expired items are treated as absent and removed on read
//! - **Garbage Collection**: Periodic and on-demand sweeps with a high watermark
//! - **Pressure Handling**: Moderate and aggressive cleanup tiers
//! - **Observers**: A typed event bus with panic-isolated callbacks
//!
//! ## Example
//!
//! ```rust
//! use ledgerlens_core::memory::{CacheOptions, MemoryConfig, MemoryManager};
//! use std::time::Duration;
//!
//! let memory = MemoryManager::new(
//!     MemoryConfig::builder()
//!         .max_bytes(10 * 1024 * 1024)
//!         .default_ttl(Duration::from_secs(300))
//!         .build(),
//! );
//!
//! memory.set("search", "q:rent", vec![1u32, 2, 3], CacheOptions::new().priority(2));
//! let hits = memory.get::<Vec<u32>>("search", "q:rent");
//! assert_eq!(hits.map(|v| v.len()), Some(3));
//! ```

pub mod config;
pub mod entry;
pub mod events;
pub mod manager;
pub mod sizing;
pub mod types;

pub use config::{MemoryConfig, MemoryConfigBuilder};
pub use entry::{CacheItem, CacheOptions, CacheValue};
pub use events::{EventBus, EventRecord, MemoryEvent, MemoryEventKind, RemovalReason, SubscriptionId};
pub use manager::{GcReport, MemoryManager};
pub use sizing::{estimate_size, structural_size};
pub use types::{MemoryStats, NamespaceStats, PressureLevel};
