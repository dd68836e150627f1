//! Memory Pressure Demo
//!
//! Fills a small cache through the chunker, prints every pressure transition
//! and eviction, then browses a window through a virtual list.
//!
//! Usage:
//!   cargo run --example memory_pressure_demo
//!
//! Environment variables:
//!   DEMO_ROWS      - Number of synthetic rows (default: 50000)
//!   DEMO_CACHE_KB  - Cache ceiling in KiB (default: 512)

use ledgerlens_core::chunk::{ChunkSpec, ChunkerConfig, DataChunker};
use ledgerlens_core::memory::{MemoryConfig, MemoryEvent, MemoryEventKind, MemoryManager};
use ledgerlens_core::viewport::{ViewportConfig, VirtualList};
use serde::{Deserialize, Serialize};
use tracing::{info, Level};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Row {
    narration: String,
    amount: f64,
}

async fn synthesize(spec: ChunkSpec) -> anyhow::Result<Vec<Row>> {
    Ok((spec.start_index..spec.end_index)
        .map(|i| Row {
            narration: format!("TRANSFER {:06}", i),
            amount: (i % 977) as f64 * 1.25,
        })
        .collect())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    info!("=== Memory Pressure Demo ===");

    let rows: usize = std::env::var("DEMO_ROWS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(50_000);
    let cache_kb: usize = std::env::var("DEMO_CACHE_KB")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(512);

    let memory = MemoryManager::new(MemoryConfig::builder().max_bytes(cache_kb * 1024).build());
    memory.start_gc();

    memory.subscribe(MemoryEventKind::PressureDetected, |record| {
        if let MemoryEvent::PressureDetected { level, utilization } = &record.event {
            info!("Pressure {} at {:.0}%", level, utilization);
        }
    });
    memory.subscribe(MemoryEventKind::ItemsEvicted, |record| {
        if let MemoryEvent::ItemsEvicted { namespace, keys, freed_bytes } = &record.event {
            info!("Evicted {} items ({} bytes) from {}", keys.len(), freed_bytes, namespace);
        }
    });

    let chunker: DataChunker<Row> = DataChunker::new(
        memory.clone(),
        ChunkerConfig {
            chunk_size: 500,
            ..Default::default()
        },
    );
    chunker.register_dataset("demo", rows);

    info!("\n--- Sequential sweep ---");
    for start in (0..rows).step_by(2_500) {
        let slice = chunker.get_data_range(start, start + 100, synthesize, "demo").await?;
        info!("Rows {}..{}: {} loaded", start, start + 100, slice.len());
    }

    info!("\n--- Virtual list ---");
    let mut list = VirtualList::new(memory.clone(), ViewportConfig::default());
    list.set_chunked_dataset("demo", rows);
    let offset = list.scroll_to_index(rows / 2);
    list.on_scroll(offset, 0);
    let window = list.load_window(&chunker, synthesize).await?;
    if let (Some(first), Some(last)) = (window.first(), window.last()) {
        info!("Window {}..={} ({} rows)", first.index, last.index, window.len());
    }

    info!("\n--- Statistics ---");
    info!("{:?}", chunker.stats());
    info!("\n{}", memory.stats());

    memory.destroy();
    Ok(())
}
