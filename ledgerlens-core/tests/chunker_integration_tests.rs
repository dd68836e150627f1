//! Integration tests for the data chunker
//!
//! - Deduplication of concurrent loads
//! - No negative caching of loader failures
//! - Range assembly across chunk boundaries
//! - Background prefetch around a requested range

use ledgerlens_core::chunk::{ChunkSpec, ChunkerConfig, DataChunker, Lz4Compressor, DATA_CHUNKS_NAMESPACE};
use ledgerlens_core::memory::{MemoryConfig, MemoryManager};
use ledgerlens_core::CoreError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn chunker(chunk_size: usize, preload_buffer: usize) -> (Arc<MemoryManager>, DataChunker<u64>) {
    let memory = MemoryManager::new(MemoryConfig::default());
    let chunker = DataChunker::new(
        memory.clone(),
        ChunkerConfig {
            chunk_size,
            preload_buffer,
            ..Default::default()
        },
    );
    (memory, chunker)
}

fn counting_loader(
    calls: Arc<AtomicUsize>,
) -> impl Fn(ChunkSpec) -> futures::future::BoxFuture<'static, anyhow::Result<Vec<u64>>> + Clone + Send + Sync + 'static
{
    move |spec: ChunkSpec| {
        calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok((spec.start_index as u64..spec.end_index as u64).collect())
        })
    }
}

#[tokio::test]
async fn test_concurrent_loads_run_loader_once() {
    let (_memory, chunker) = chunker(100, 0);
    let calls = Arc::new(AtomicUsize::new(0));
    let spec = chunker.spec_for("stmt", 0);

    let (a, b) = tokio::join!(
        chunker.load_chunk(spec.clone(), counting_loader(calls.clone())),
        chunker.load_chunk(spec, counting_loader(calls.clone())),
    );

    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(Arc::ptr_eq(&a.data, &b.data));
    assert_eq!(chunker.stats().dedup_waits, 1);
}

#[tokio::test]
async fn test_failed_load_is_not_cached() {
    let (memory, chunker) = chunker(10, 0);
    let attempts = Arc::new(AtomicUsize::new(0));

    let loader = {
        let attempts = attempts.clone();
        move |spec: ChunkSpec| {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    anyhow::bail!("backend unavailable");
                }
                Ok(vec![7u64; spec.len()])
            }
        }
    };

    let err = chunker.get_data_range(0, 5, loader.clone(), "flaky").await.unwrap_err();
    assert!(matches!(err, CoreError::ChunkLoad { ref chunk_id, .. } if chunk_id == "flaky:chunk:0"));
    assert!(memory.keys(DATA_CHUNKS_NAMESPACE).is_empty());
    assert!(!chunker.is_available_or_loading("flaky:chunk:0"));

    let rows = chunker.get_data_range(0, 5, loader, "flaky").await.unwrap();
    assert_eq!(rows, vec![7; 5]);
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_eq!(chunker.stats().load_failures, 1);
}

#[tokio::test]
async fn test_range_spans_chunks() {
    let (_memory, chunker) = chunker(100, 0);
    let calls = Arc::new(AtomicUsize::new(0));
    chunker.register_dataset("stmt", 1_000);

    let rows = chunker
        .get_data_range(150, 420, counting_loader(calls.clone()), "stmt")
        .await
        .unwrap();

    assert_eq!(rows.len(), 270);
    assert_eq!(rows.first(), Some(&150));
    assert_eq!(rows.last(), Some(&419));
    // chunks 1..=4
    assert_eq!(calls.load(Ordering::SeqCst), 4);

    let tail = chunker
        .get_data_range(950, 5_000, counting_loader(calls.clone()), "stmt")
        .await
        .unwrap();
    assert_eq!(tail.len(), 50);
    assert!(chunker
        .get_data_range(2_000, 3_000, counting_loader(calls), "stmt")
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_prefetch_loads_neighbors() {
    let (_memory, chunker) = chunker(100, 2);
    let calls = Arc::new(AtomicUsize::new(0));
    chunker.register_dataset("stmt", 10_000);

    chunker
        .get_data_range(500, 550, counting_loader(calls.clone()), "stmt")
        .await
        .unwrap();

    // Three concurrent loads are allowed, so chunk 7 waits for a later request.
    assert_eq!(chunker.stats().prefetches, 3);
    tokio::time::sleep(Duration::from_millis(50)).await;

    for id in ["stmt:chunk:3", "stmt:chunk:4", "stmt:chunk:5", "stmt:chunk:6"] {
        assert!(chunker.is_available_or_loading(id), "{} should be cached", id);
    }
    assert!(!chunker.is_available_or_loading("stmt:chunk:7"));
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_prefetch_stops_at_dataset_end() {
    let (_memory, chunker) = chunker(100, 2);
    let calls = Arc::new(AtomicUsize::new(0));
    chunker.register_dataset("stmt", 250);

    chunker
        .get_data_range(0, 50, counting_loader(calls.clone()), "stmt")
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(chunker.is_available_or_loading("stmt:chunk:2"));
    assert!(!chunker.is_available_or_loading("stmt:chunk:3"));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_large_chunks_are_compressed_and_expire_sooner() {
    let memory = MemoryManager::new(MemoryConfig::default());
    let chunker: DataChunker<String> = DataChunker::with_compressor(
        memory.clone(),
        ChunkerConfig {
            chunk_size: 2_000,
            compression_threshold: 1_024,
            preload_buffer: 0,
            ttl_jitter: 0.0,
            ..Default::default()
        },
        Arc::new(Lz4Compressor),
    );

    let rows = chunker
        .get_data_range(
            0,
            2_000,
            |spec: ChunkSpec| async move {
                Ok((spec.start_index..spec.end_index)
                    .map(|i| format!("NIP TRANSFER TO SAVINGS {:06}", i))
                    .collect::<Vec<String>>())
            },
            "big",
        )
        .await
        .unwrap();
    assert_eq!(rows.len(), 2_000);
    assert_eq!(chunker.stats().compressed, 1);

    let raw_size = serde_json::to_vec(&rows).unwrap().len();
    let stored = memory.stats().namespaces[DATA_CHUNKS_NAMESPACE].size_bytes;
    assert!(stored < raw_size);

    let again = chunker
        .get_data_range(10, 12, |_| async { Err(anyhow::anyhow!("should be cached")) }, "big")
        .await
        .unwrap();
    assert_eq!(again, vec!["NIP TRANSFER TO SAVINGS 000010", "NIP TRANSFER TO SAVINGS 000011"]);
}

#[test]
fn test_create_chunks_is_gapless() {
    let (_memory, chunker) = chunker(333, 0);
    let dataset: Vec<u64> = (0..1_000).collect();
    let chunks = chunker.create_chunks(&dataset, "ds");

    assert_eq!(chunks.len(), 4);
    let mut expected_start = 0;
    for chunk in &chunks {
        assert_eq!(chunk.start_index, expected_start);
        assert!(chunk.end_index - chunk.start_index <= 333);
        expected_start = chunk.end_index;
    }
    assert_eq!(expected_start, 1_000);

    let flattened: Vec<u64> = chunks.iter().flat_map(|c| c.data.iter().copied()).collect();
    assert_eq!(flattened, dataset);
}

#[test]
fn test_blocking_callers_can_drive_loads() {
    let (_memory, chunker) = chunker(10, 0);
    let spec = chunker.spec_for("sync", 1);

    let chunk = tokio_test::block_on(chunker.load_chunk(spec, |s| async move {
        Ok((s.start_index as u64..s.end_index as u64).collect::<Vec<u64>>())
    }))
    .unwrap();

    assert_eq!(chunk.start_index, 10);
    assert_eq!(chunk.data.first(), Some(&10));
}
