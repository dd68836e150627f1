//! Lazy, deduplicated chunk loading backed by the memory manager

use crate::chunk::{
    compress::{ChunkCompressor, NoCompression},
    config::ChunkerConfig,
    descriptor::{chunk_prefix, ChunkDescriptor, ChunkItem, ChunkPayload, ChunkSpec, StoredChunk, DATA_CHUNKS_NAMESPACE},
};
use crate::error::{CoreError, Result};
use crate::memory::{estimate_size, CacheOptions, MemoryManager};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

type LoadFuture<T> = Shared<BoxFuture<'static, Result<ChunkDescriptor<T>>>>;

/// Counters for chunk activity since creation or the last `clear_chunks`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChunkerStats {
    /// Loader invocations that completed successfully
    pub loads: u64,
    /// Requests answered from the cache
    pub cache_hits: u64,
    /// Requests that joined a load already in flight
    pub dedup_waits: u64,
    /// Background prefetches scheduled
    pub prefetches: u64,
    /// Chunks stored in compressed form
    pub compressed: u64,
    /// Loader invocations that failed
    pub load_failures: u64,
}

/// Splits large ordered datasets into fixed-size chunks and loads them on demand
///
/// Cloning is cheap; clones share the in-flight map and statistics.
pub struct DataChunker<T: ChunkItem> {
    inner: Arc<Inner<T>>,
}

impl<T: ChunkItem> Clone for DataChunker<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct Inner<T: ChunkItem> {
    memory: Arc<MemoryManager>,
    config: ChunkerConfig,
    compressor: Arc<dyn ChunkCompressor>,
    in_flight: Mutex<HashMap<String, InFlight<T>>>,
    dataset_lens: Mutex<HashMap<String, usize>>,
    /// Bumped by `clear_chunks`; loads started under an older generation are not cached
    generations: Mutex<HashMap<String, u64>>,
    next_token: AtomicU64,
    stats: Mutex<ChunkerStats>,
}

struct InFlight<T: ChunkItem> {
    token: u64,
    future: LoadFuture<T>,
}

enum LoadStart<T> {
    Ready(ChunkDescriptor<T>),
    Pending(LoadFuture<T>),
}

impl<T: ChunkItem> DataChunker<T> {
    /// Create a chunker that stores chunks uncompressed
    pub fn new(memory: Arc<MemoryManager>, config: ChunkerConfig) -> Self {
        Self::with_compressor(memory, config, Arc::new(NoCompression))
    }

    pub fn with_compressor(
        memory: Arc<MemoryManager>,
        config: ChunkerConfig,
        compressor: Arc<dyn ChunkCompressor>,
    ) -> Self {
        info!(
            "Initializing data chunker (chunk size: {}, preload: {}, compression: {})",
            config.chunk_size,
            config.preload_buffer,
            compressor.name()
        );
        Self {
            inner: Arc::new(Inner {
                memory,
                config,
                compressor,
                in_flight: Mutex::new(HashMap::new()),
                dataset_lens: Mutex::new(HashMap::new()),
                generations: Mutex::new(HashMap::new()),
                next_token: AtomicU64::new(0),
                stats: Mutex::new(ChunkerStats::default()),
            }),
        }
    }

    pub fn config(&self) -> &ChunkerConfig {
        &self.inner.config
    }

    pub fn stats(&self) -> ChunkerStats {
        *self.inner.stats.lock()
    }

    /// Number of chunks covering a dataset of `len` records
    pub fn chunk_count(&self, len: usize) -> usize {
        len.div_ceil(self.inner.config.chunk_size)
    }

    /// Record the dataset length so range requests and prefetch stop at its end
    pub fn register_dataset(&self, identifier: &str, len: usize) {
        self.inner.dataset_lens.lock().insert(identifier.to_string(), len);
    }

    pub fn dataset_len(&self, identifier: &str) -> Option<usize> {
        self.inner.dataset_lens.lock().get(identifier).copied()
    }

    /// Spec for chunk `index` of a dataset
    pub fn spec_for(&self, identifier: &str, index: usize) -> ChunkSpec {
        ChunkSpec::new(
            identifier,
            index,
            self.inner.config.chunk_size,
            self.dataset_len(identifier),
        )
    }

    /// Partition a dataset into contiguous, gapless chunks
    pub fn create_chunks(&self, dataset: &[T], identifier: &str) -> Vec<ChunkDescriptor<T>> {
        self.register_dataset(identifier, dataset.len());
        let chunk_size = self.inner.config.chunk_size;

        dataset
            .chunks(chunk_size)
            .enumerate()
            .map(|(index, slice)| {
                let spec = ChunkSpec::new(identifier, index, chunk_size, Some(dataset.len()));
                ChunkDescriptor {
                    id: spec.id,
                    index,
                    start_index: spec.start_index,
                    end_index: spec.end_index,
                    size: estimate_size(slice),
                    data: Arc::new(slice.to_vec()),
                }
            })
            .collect()
    }

    /// Whether a chunk is cached or currently loading
    pub fn is_available_or_loading(&self, chunk_id: &str) -> bool {
        self.inner.in_flight.lock().contains_key(chunk_id)
            || self.inner.memory.contains(DATA_CHUNKS_NAMESPACE, chunk_id)
    }

    /// Load one chunk
    ///
    /// A cached chunk is returned directly. If a load for the same id is in
    /// flight, the caller awaits that load instead of starting another.
    /// Failures are returned to every waiter and are not cached.
    pub async fn load_chunk<L, Fut>(&self, spec: ChunkSpec, loader: L) -> Result<ChunkDescriptor<T>>
    where
        L: FnOnce(ChunkSpec) -> Fut,
        Fut: Future<Output = anyhow::Result<Vec<T>>> + Send + 'static,
    {
        match self.begin_load(spec, loader) {
            LoadStart::Ready(chunk) => Ok(chunk),
            LoadStart::Pending(pending) => pending.await,
        }
    }

    fn begin_load<L, Fut>(&self, spec: ChunkSpec, loader: L) -> LoadStart<T>
    where
        L: FnOnce(ChunkSpec) -> Fut,
        Fut: Future<Output = anyhow::Result<Vec<T>>> + Send + 'static,
    {
        if let Some(chunk) = self.inner.cached(&spec.id) {
            self.inner.stats.lock().cache_hits += 1;
            return LoadStart::Ready(chunk);
        }

        let mut in_flight = self.inner.in_flight.lock();
        if let Some(entry) = in_flight.get(&spec.id) {
            debug!("Joining in-flight load of {}", spec.id);
            self.inner.stats.lock().dedup_waits += 1;
            return LoadStart::Pending(entry.future.clone());
        }

        // A load may have finished between the cache check and taking the lock.
        if self.inner.memory.contains(DATA_CHUNKS_NAMESPACE, &spec.id) {
            if let Some(chunk) = self.inner.cached(&spec.id) {
                self.inner.stats.lock().cache_hits += 1;
                return LoadStart::Ready(chunk);
            }
        }

        debug!("Loading chunk {} [{}, {})", spec.id, spec.start_index, spec.end_index);
        let inner = self.inner.clone();
        let load = loader(spec.clone());
        let id = spec.id.clone();
        let generation = self.inner.generation(&spec.identifier);
        let token = self.inner.next_token.fetch_add(1, Ordering::Relaxed);
        let pending = async move {
            let result = match load.await {
                Ok(data) if inner.generation(&spec.identifier) != generation => {
                    debug!("Chunk {} was cleared while loading; result not cached", spec.id);
                    Ok(ChunkDescriptor::detached(&spec, data))
                }
                Ok(data) => {
                    let stored = inner.store(&spec, data);
                    // A clear that raced the store wins.
                    if inner.generation(&spec.identifier) != generation {
                        inner.memory.remove(DATA_CHUNKS_NAMESPACE, &spec.id);
                    }
                    stored
                }
                Err(e) => {
                    inner.stats.lock().load_failures += 1;
                    warn!("Loader failed for {}: {:#}", spec.id, e);
                    Err(CoreError::ChunkLoad {
                        chunk_id: spec.id.clone(),
                        message: format!("{:#}", e),
                    })
                }
            };
            {
                // Only unregister this load, never a newer one for the same id
                let mut in_flight = inner.in_flight.lock();
                if in_flight.get(&spec.id).is_some_and(|entry| entry.token == token) {
                    in_flight.remove(&spec.id);
                }
            }
            result
        }
        .boxed()
        .shared();

        in_flight.insert(
            id,
            InFlight {
                token,
                future: pending.clone(),
            },
        );
        LoadStart::Pending(pending)
    }

    /// Records `[start_index, end_index)` of a dataset, loaded through its chunks
    ///
    /// Covering chunks load concurrently and are all awaited. Neighboring
    /// chunks are then prefetched in the background without being awaited.
    pub async fn get_data_range<L, Fut>(
        &self,
        start_index: usize,
        end_index: usize,
        loader: L,
        identifier: &str,
    ) -> Result<Vec<T>>
    where
        L: Fn(ChunkSpec) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Vec<T>>> + Send + 'static,
    {
        let dataset_len = self.dataset_len(identifier);
        let end_index = dataset_len.map_or(end_index, |len| end_index.min(len));
        if start_index >= end_index {
            return Ok(Vec::new());
        }

        let chunk_size = self.inner.config.chunk_size;
        let first = start_index / chunk_size;
        let last = (end_index - 1) / chunk_size;

        let loads = (first..=last).map(|index| self.load_chunk(self.spec_for(identifier, index), loader.clone()));
        let chunks = futures::future::try_join_all(loads).await?;

        let mut records = Vec::with_capacity(end_index - start_index);
        for chunk in &chunks {
            records.extend_from_slice(chunk.overlap(start_index, end_index));
        }

        self.prefetch_neighbors(first, last, identifier, loader);
        Ok(records)
    }

    fn prefetch_neighbors<L, Fut>(&self, first: usize, last: usize, identifier: &str, loader: L)
    where
        L: Fn(ChunkSpec) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Vec<T>>> + Send + 'static,
    {
        let preload = self.inner.config.preload_buffer;
        if preload == 0 {
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };

        let before = first.saturating_sub(preload)..first;
        // Forward prefetch needs a known end; past-the-end chunks would be empty loads.
        let after = match self.dataset_len(identifier) {
            Some(len) => (last + 1)..(last + 1 + preload).min(self.chunk_count(len)),
            None => 0..0,
        };

        for index in before.rev().chain(after) {
            let spec = self.spec_for(identifier, index);
            if self.is_available_or_loading(&spec.id) {
                continue;
            }
            if self.inner.in_flight.lock().len() >= self.inner.config.max_concurrent_loads {
                debug!("Prefetch skipped for {}: too many loads in flight", spec.id);
                break;
            }

            self.inner.stats.lock().prefetches += 1;
            let chunker = self.clone();
            let loader = loader.clone();
            // Register the load before spawning so the next check sees it.
            let start = chunker.begin_load(spec, loader);
            if let LoadStart::Pending(pending) = start {
                runtime.spawn(async move {
                    if let Err(e) = pending.await {
                        debug!("Prefetch failed: {}", e);
                    }
                });
            }
        }
    }

    /// Drop every cached chunk of a dataset and reset bookkeeping
    ///
    /// Loads still running for the dataset complete for their waiters but
    /// are not written back to the cache.
    pub fn clear_chunks(&self, identifier: &str) -> usize {
        *self.inner.generations.lock().entry(identifier.to_string()).or_insert(0) += 1;
        let prefix = chunk_prefix(identifier);
        let removed = self
            .inner
            .memory
            .remove_matching(DATA_CHUNKS_NAMESPACE, |key| key.starts_with(&prefix));
        self.inner.in_flight.lock().retain(|id, _| !id.starts_with(&prefix));
        *self.inner.stats.lock() = ChunkerStats::default();

        info!("Cleared {} cached chunks for {}", removed, identifier);
        removed
    }
}

impl<T: ChunkItem> Inner<T> {
    fn generation(&self, identifier: &str) -> u64 {
        self.generations.lock().get(identifier).copied().unwrap_or(0)
    }

    fn cached(&self, chunk_id: &str) -> Option<ChunkDescriptor<T>> {
        let stored = self.memory.get::<StoredChunk<T>>(DATA_CHUNKS_NAMESPACE, chunk_id)?;
        match self.decode(&stored) {
            Ok(chunk) => Some(chunk),
            Err(e) => {
                warn!("Discarding unreadable cached chunk: {}", e);
                self.memory.remove(DATA_CHUNKS_NAMESPACE, chunk_id);
                None
            }
        }
    }

    fn decode(&self, stored: &StoredChunk<T>) -> Result<ChunkDescriptor<T>> {
        let data = match &stored.payload {
            ChunkPayload::Plain(data) => data.clone(),
            ChunkPayload::Compressed { bytes, raw_size } => {
                let codec_error = |message: String| CoreError::ChunkCodec {
                    chunk_id: stored.spec.id.clone(),
                    message,
                };
                let raw = self.compressor.decompress(bytes).map_err(codec_error)?;
                if raw.len() != *raw_size {
                    return Err(codec_error(format!(
                        "decompressed {} bytes, expected {}",
                        raw.len(),
                        raw_size
                    )));
                }
                let records: Vec<T> = serde_json::from_slice(&raw).map_err(|e| codec_error(e.to_string()))?;
                Arc::new(records)
            }
        };

        Ok(ChunkDescriptor {
            id: stored.spec.id.clone(),
            index: stored.spec.index,
            start_index: stored.spec.start_index,
            end_index: stored.spec.end_index,
            data,
            size: stored.size,
        })
    }

    fn store(&self, spec: &ChunkSpec, data: Vec<T>) -> Result<ChunkDescriptor<T>> {
        let data = Arc::new(data);
        let mut payload = ChunkPayload::Plain(data.clone());
        let mut size = estimate_size(data.as_slice());
        let mut stored_size = size;

        if self.compressor.enabled() && size > self.config.compression_threshold {
            let raw = serde_json::to_vec(data.as_slice()).map_err(|e| CoreError::ChunkCodec {
                chunk_id: spec.id.clone(),
                message: e.to_string(),
            })?;
            size = raw.len();
            stored_size = size;
            let compressed = self.compressor.compress(&raw);
            let savings = 1.0 - compressed.len() as f64 / raw.len() as f64;
            if savings >= self.config.min_compression_savings {
                debug!(
                    "Compressed chunk {} from {} to {} bytes",
                    spec.id,
                    raw.len(),
                    compressed.len()
                );
                stored_size = compressed.len();
                payload = ChunkPayload::Compressed {
                    bytes: compressed,
                    raw_size: raw.len(),
                };
                self.stats.lock().compressed += 1;
            }
        }

        let options = CacheOptions::new()
            .ttl(self.config.ttl_for_size(size))
            .priority(self.config.priority);
        let stored = StoredChunk {
            spec: ChunkSpec {
                end_index: spec.start_index + data.len(),
                ..spec.clone()
            },
            payload,
            size,
        };
        self.memory
            .set_with_size(DATA_CHUNKS_NAMESPACE, &spec.id, stored, stored_size, options);
        self.stats.lock().loads += 1;

        Ok(ChunkDescriptor {
            id: spec.id.clone(),
            index: spec.index,
            start_index: spec.start_index,
            end_index: spec.start_index + data.len(),
            data,
            size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::compress::Lz4Compressor;
    use crate::memory::MemoryConfig;
    use std::time::Duration;

    fn chunker(chunk_size: usize) -> DataChunker<u32> {
        let memory = MemoryManager::new(MemoryConfig::default());
        DataChunker::new(
            memory,
            ChunkerConfig {
                chunk_size,
                preload_buffer: 0,
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_create_chunks_coverage() {
        let chunker = chunker(1000);
        let dataset: Vec<u32> = (0..2500).collect();
        let chunks = chunker.create_chunks(&dataset, "stmt");

        let bounds: Vec<(usize, usize)> = chunks.iter().map(|c| (c.start_index, c.end_index)).collect();
        assert_eq!(bounds, vec![(0, 1000), (1000, 2000), (2000, 2500)]);
        assert_eq!(chunks[2].len(), 500);
        assert_eq!(chunks[1].id, "stmt:chunk:1");
        assert_eq!(chunker.dataset_len("stmt"), Some(2500));
    }

    #[test]
    fn test_create_chunks_empty_dataset() {
        let chunker = chunker(10);
        assert!(chunker.create_chunks(&[], "empty").is_empty());
        assert_eq!(chunker.chunk_count(0), 0);
    }

    #[tokio::test]
    async fn test_load_chunk_caches_result() {
        let chunker = chunker(10);
        let spec = chunker.spec_for("ds", 0);

        let first = chunker
            .load_chunk(spec.clone(), |s| async move { Ok((s.start_index as u32..s.end_index as u32).collect::<Vec<u32>>()) })
            .await
            .unwrap();
        assert_eq!(first.len(), 10);

        let second = chunker
            .load_chunk(spec, |_| async { Err(anyhow::anyhow!("loader must not run for a cached chunk")) })
            .await
            .unwrap();
        assert_eq!(second.data, first.data);

        let stats = chunker.stats();
        assert_eq!(stats.loads, 1);
        assert_eq!(stats.cache_hits, 1);
    }

    #[tokio::test]
    async fn test_compressed_chunk_round_trips() {
        let memory = MemoryManager::new(MemoryConfig::default());
        let chunker: DataChunker<String> = DataChunker::with_compressor(
            memory,
            ChunkerConfig {
                chunk_size: 100,
                compression_threshold: 64,
                preload_buffer: 0,
                ..Default::default()
            },
            Arc::new(Lz4Compressor),
        );
        let spec = chunker.spec_for("ds", 0);
        let rows: Vec<String> = (0..100).map(|_| "TRANSFER FROM SALARY ACCOUNT".to_string()).collect();

        let expected = rows.clone();
        chunker
            .load_chunk(spec.clone(), move |_| async move { Ok(rows) })
            .await
            .unwrap();
        assert_eq!(chunker.stats().compressed, 1);

        let cached = chunker
            .load_chunk(spec, |_| async { Err(anyhow::anyhow!("unexpected load")) })
            .await
            .unwrap();
        assert_eq!(cached.data.as_slice(), expected.as_slice());
    }

    #[tokio::test]
    async fn test_clear_chunks() {
        let chunker = chunker(5);
        chunker
            .get_data_range(0, 12, |s| async move { Ok(vec![0u32; s.len()]) }, "a")
            .await
            .unwrap();
        chunker
            .get_data_range(0, 5, |s| async move { Ok(vec![1u32; s.len()]) }, "b")
            .await
            .unwrap();

        assert_eq!(chunker.clear_chunks("a"), 3);
        assert_eq!(chunker.stats(), ChunkerStats::default());
        assert!(!chunker.is_available_or_loading("a:chunk:0"));
        assert!(chunker.is_available_or_loading("b:chunk:0"));
    }

    #[tokio::test]
    async fn test_clear_chunks_discards_running_loads() {
        let chunker = chunker(5);
        let spec = chunker.spec_for("ds", 0);

        let stale = {
            let chunker = chunker.clone();
            let spec = spec.clone();
            tokio::spawn(async move {
                chunker
                    .load_chunk(spec, |_| async {
                        tokio::time::sleep(Duration::from_millis(60)).await;
                        Ok(vec![1u32])
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        chunker.clear_chunks("ds");

        let fresh = {
            let chunker = chunker.clone();
            let spec = spec.clone();
            tokio::spawn(async move {
                chunker
                    .load_chunk(spec, |_| async {
                        tokio::time::sleep(Duration::from_millis(120)).await;
                        Ok(vec![2u32])
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        // The pre-clear load still answers its own waiter
        let old = stale.await.unwrap().unwrap();
        assert_eq!(old.data.as_slice(), &[1]);
        // but neither caches its data nor unregisters the newer load
        assert!(!chunker.inner.memory.contains(DATA_CHUNKS_NAMESPACE, &spec.id));
        assert!(chunker.inner.in_flight.lock().contains_key(&spec.id));

        let new = fresh.await.unwrap().unwrap();
        assert_eq!(new.data.as_slice(), &[2]);

        let cached = chunker
            .load_chunk(spec, |_| async { Err(anyhow::anyhow!("unexpected load")) })
            .await
            .unwrap();
        assert_eq!(cached.data.as_slice(), &[2]);
        assert_eq!(chunker.stats().loads, 1);
    }
}
