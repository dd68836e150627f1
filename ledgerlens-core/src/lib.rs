//! # LedgerLens Core (ledgerlens-core)
//!
//! Bounded-memory building blocks for browsing large bank-statement datasets.
//!
//! ## Features
//!
//! - Namespaced cache with a byte ceiling, priority/LRU eviction and TTLs
//! - Periodic garbage collection and tiered memory-pressure handling
//! - Typed event bus for cache activity with panic-isolated observers
//! - Chunked, deduplicated, lazily loaded access to ordered datasets
//! - Virtualized windows that only ever materialize the visible rows
//!
//! ## Memory Manager
//!
//! One manager is created per process and shared by the chunker and the
//! virtual lists built on top of it.
//!
//! ```rust
//! use ledgerlens_core::memory::{CacheOptions, MemoryConfig, MemoryManager};
//!
//! let memory = MemoryManager::new(MemoryConfig::default());
//! memory.set("reports", "summary", "ok".to_string(), CacheOptions::new());
//! assert!(memory.contains("reports", "summary"));
//! println!("{}", memory.stats());
//! ```
//!
//! ## Chunked Loading
//!
//! ```no_run
//! use ledgerlens_core::chunk::{ChunkerConfig, DataChunker};
//! use ledgerlens_core::memory::{MemoryConfig, MemoryManager};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let memory = MemoryManager::new(MemoryConfig::default());
//!     memory.start_gc();
//!
//!     let chunker: DataChunker<u64> = DataChunker::new(memory, ChunkerConfig::default());
//!     chunker.register_dataset("statement-2024", 25_000);
//!
//!     let rows = chunker
//!         .get_data_range(1_200, 1_250, |spec| async move {
//!             Ok((spec.start_index as u64..spec.end_index as u64).collect::<Vec<u64>>())
//!         }, "statement-2024")
//!         .await?;
//!     assert_eq!(rows.len(), 50);
//!     Ok(())
//! }
//! ```

pub mod chunk;
pub mod error;
pub mod memory;
pub mod viewport;

// Re-export main types for convenience
pub use chunk::{ChunkDescriptor, ChunkSpec, ChunkerConfig, ChunkerStats, DataChunker};
pub use error::{CoreError, Result};
pub use memory::{
    CacheOptions, EventRecord, GcReport, MemoryConfig, MemoryEvent, MemoryEventKind, MemoryManager,
    MemoryStats, PressureLevel,
};
pub use viewport::{IndexedItem, ViewportConfig, VirtualList, VisibleRange, WindowState};
