//! # Virtualization Consumer
//!
//! Computes the minimal index window for a scroll position and materializes
//! only that window, caching rendered slices in the memory manager.
//!
//! ## Example
//!
//! ```rust
//! use ledgerlens_core::memory::{MemoryConfig, MemoryManager};
//! use ledgerlens_core::viewport::{ViewportConfig, VirtualList};
//!
//! let memory = MemoryManager::new(MemoryConfig::default());
//! let mut list: VirtualList<u32> = VirtualList::new(memory, ViewportConfig::default());
//! list.set_dataset("statement", (0..1000).collect::<Vec<u32>>());
//!
//! let rows = list.render(0);
//! assert_eq!(rows.len(), 23);
//! ```

pub mod config;
pub mod consumer;
pub mod window;

pub use config::ViewportConfig;
pub use consumer::{IndexedItem, VirtualList, VIRTUAL_SCROLL_NAMESPACE};
pub use window::{VisibleRange, WindowState};
