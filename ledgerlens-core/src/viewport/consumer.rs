//! Virtualized list over an in-memory or chunk-backed dataset

use crate::chunk::{ChunkItem, ChunkSpec, DataChunker};
use crate::error::Result;
use crate::memory::{CacheOptions, MemoryManager};
use crate::viewport::config::ViewportConfig;
use crate::viewport::window::{VisibleRange, WindowState};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Cache namespace holding rendered slices
pub const VIRTUAL_SCROLL_NAMESPACE: &str = "virtualScroll";

/// A record tagged with its absolute position in the dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedItem<T> {
    pub index: usize,
    pub item: T,
}

enum Source<T> {
    Empty,
    InMemory(Arc<Vec<T>>),
    /// Length only; records come from a chunk loader
    Chunked(usize),
}

/// Renders a bounded window of a large ordered dataset
///
/// Time is passed in explicitly as milliseconds so scroll debouncing is
/// deterministic; callers typically feed a monotonic clock.
pub struct VirtualList<T: ChunkItem> {
    memory: Arc<MemoryManager>,
    config: ViewportConfig,
    window: WindowState,
    identifier: Option<String>,
    source: Source<T>,
    is_scrolling: bool,
    last_scroll_ms: Option<u64>,
}

impl<T: ChunkItem> VirtualList<T> {
    pub fn new(memory: Arc<MemoryManager>, config: ViewportConfig) -> Self {
        if let Err(e) = config.validate() {
            warn!("Viewport configuration is inconsistent: {}", e);
        }
        let window = WindowState::new(config.container_height, config.item_height, config.buffer_size);

        Self {
            memory,
            config,
            window,
            identifier: None,
            source: Source::Empty,
            is_scrolling: false,
            last_scroll_ms: None,
        }
    }

    pub fn config(&self) -> &ViewportConfig {
        &self.config
    }

    pub fn identifier(&self) -> Option<&str> {
        self.identifier.as_deref()
    }

    pub fn len(&self) -> usize {
        match &self.source {
            Source::Empty => 0,
            Source::InMemory(items) => items.len(),
            Source::Chunked(len) => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn scroll_offset(&self) -> f64 {
        self.window.scroll_offset
    }

    pub fn is_scrolling(&self) -> bool {
        self.is_scrolling
    }

    pub fn window(&self) -> &WindowState {
        &self.window
    }

    /// Replace the dataset with an in-memory sequence
    ///
    /// A different identifier resets the scroll position to the top.
    pub fn set_dataset(&mut self, identifier: &str, items: impl Into<Arc<Vec<T>>>) {
        self.replace_source(identifier, Source::InMemory(items.into()));
    }

    /// Replace the dataset with one of `len` records served by a chunk loader
    pub fn set_chunked_dataset(&mut self, identifier: &str, len: usize) {
        self.replace_source(identifier, Source::Chunked(len));
    }

    fn replace_source(&mut self, identifier: &str, source: Source<T>) {
        if let Some(previous) = self.identifier.take() {
            self.drop_cached_slices(&previous);
            if previous != identifier {
                debug!("Dataset changed from {} to {}; resetting scroll", previous, identifier);
                self.reset_scroll();
            }
        }

        self.identifier = Some(identifier.to_string());
        self.source = source;
        self.clamp_offset();
        info!("Virtual list bound to {} ({} records)", identifier, self.len());
    }

    fn reset_scroll(&mut self) {
        self.window.scroll_offset = 0.0;
        self.is_scrolling = false;
        self.last_scroll_ms = None;
    }

    fn clamp_offset(&mut self) {
        let max = self.window.max_offset(self.len());
        self.window.scroll_offset = self.window.scroll_offset.clamp(0.0, max);
    }

    fn drop_cached_slices(&self, identifier: &str) {
        let prefix = format!("{}:", identifier);
        self.memory
            .remove_matching(VIRTUAL_SCROLL_NAMESPACE, |key| key.starts_with(&prefix));
    }

    /// Resize the viewport, keeping the scroll offset where possible
    pub fn set_container_height(&mut self, height: f64) {
        self.config.container_height = height;
        self.window.viewport_height = height;
        self.clamp_offset();
    }

    /// Record a scroll event
    pub fn on_scroll(&mut self, offset: f64, now_ms: u64) {
        self.window.scroll_offset = offset;
        self.clamp_offset();
        self.is_scrolling = true;
        self.last_scroll_ms = Some(now_ms);
    }

    /// Advance the idle timer
    ///
    /// Returns `true` when this call ended a scroll; the current slice is then
    /// demoted to the idle TTL and priority and a GC pass runs.
    pub fn tick(&mut self, now_ms: u64) -> bool {
        if !self.is_scrolling {
            return false;
        }
        let Some(last) = self.last_scroll_ms else {
            return false;
        };
        if now_ms.saturating_sub(last) < self.config.idle_timeout.as_millis() as u64 {
            return false;
        }

        self.is_scrolling = false;
        if let Some(key) = self.cache_key(self.visible_range()) {
            if let Some(slice) = self.memory.get::<Vec<IndexedItem<T>>>(VIRTUAL_SCROLL_NAMESPACE, &key) {
                self.memory
                    .set(VIRTUAL_SCROLL_NAMESPACE, &key, (*slice).clone(), self.slice_options());
            }
        }

        let report = self.memory.run_garbage_collection();
        debug!(
            "Scroll idle; GC expired {} and evicted {} items",
            report.expired, report.evicted
        );
        true
    }

    pub fn visible_range(&self) -> VisibleRange {
        self.window.range(self.len())
    }

    fn cache_key(&self, range: VisibleRange) -> Option<String> {
        let identifier = self.identifier.as_ref()?;
        Some(format!("{}:{}:{}", identifier, range.start_index, range.end_index))
    }

    fn slice_options(&self) -> CacheOptions {
        if self.is_scrolling {
            CacheOptions::new()
                .ttl(self.config.active_ttl)
                .priority(self.config.active_priority)
        } else {
            CacheOptions::new()
                .ttl(self.config.idle_ttl)
                .priority(self.config.idle_priority)
        }
    }

    fn cached_slice(&self, range: VisibleRange) -> Option<Vec<IndexedItem<T>>> {
        let key = self.cache_key(range)?;
        let slice = self.memory.get::<Vec<IndexedItem<T>>>(VIRTUAL_SCROLL_NAMESPACE, &key)?;
        Some((*slice).clone())
    }

    fn cache_slice(&self, range: VisibleRange, slice: &[IndexedItem<T>]) {
        if let Some(key) = self.cache_key(range) {
            self.memory
                .set(VIRTUAL_SCROLL_NAMESPACE, &key, slice.to_vec(), self.slice_options());
        }
    }

    /// Materialize the current window of an in-memory dataset
    ///
    /// A chunk-backed dataset renders from cache only; use [`Self::load_window`]
    /// to fetch it.
    pub fn render(&mut self, now_ms: u64) -> Vec<IndexedItem<T>> {
        self.tick(now_ms);

        let range = self.visible_range();
        if range.is_empty() {
            return Vec::new();
        }
        if let Some(slice) = self.cached_slice(range) {
            return slice;
        }

        let Source::InMemory(items) = &self.source else {
            return Vec::new();
        };
        let slice: Vec<IndexedItem<T>> = items[range.start_index..range.end_index]
            .iter()
            .enumerate()
            .map(|(offset, item)| IndexedItem {
                index: range.start_index + offset,
                item: item.clone(),
            })
            .collect();

        self.cache_slice(range, &slice);
        slice
    }

    /// Fetch the current window through a chunker
    pub async fn load_window<L, Fut>(&mut self, chunker: &DataChunker<T>, loader: L) -> Result<Vec<IndexedItem<T>>>
    where
        L: Fn(ChunkSpec) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Vec<T>>> + Send + 'static,
    {
        let Some(identifier) = self.identifier.clone() else {
            return Ok(Vec::new());
        };
        if chunker.dataset_len(&identifier).is_none() {
            chunker.register_dataset(&identifier, self.len());
        }

        let range = self.visible_range();
        if range.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(slice) = self.cached_slice(range) {
            return Ok(slice);
        }

        let records = chunker
            .get_data_range(range.start_index, range.end_index, loader, &identifier)
            .await?;
        let slice: Vec<IndexedItem<T>> = records
            .into_iter()
            .take(range.len())
            .enumerate()
            .map(|(offset, item)| IndexedItem {
                index: range.start_index + offset,
                item,
            })
            .collect();

        self.cache_slice(range, &slice);
        Ok(slice)
    }

    pub fn total_height(&self) -> f64 {
        self.window.total_height(self.len())
    }

    pub fn offset_for_index(&self, index: usize) -> f64 {
        self.window.offset_for_index(index)
    }

    /// Jump so that `index` is the first visible row, or as close as the end allows
    pub fn scroll_to_index(&mut self, index: usize) -> f64 {
        self.window.scroll_offset = self.offset_for_index(index.min(self.len()));
        self.clamp_offset();
        self.window.scroll_offset
    }
}
