//! Integration tests for the memory manager
//!
//! These tests exercise the public API end to end:
//! - Ceiling enforcement across namespaces and threads
//! - Event delivery and unsubscription
//! - Statistics and pressure handling

use ledgerlens_core::memory::{
    CacheOptions, MemoryConfig, MemoryEvent, MemoryEventKind, MemoryManager, PressureLevel, RemovalReason,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Txn {
    narration: String,
    debit: f64,
    credit: f64,
}

fn txn(i: usize) -> Txn {
    Txn {
        narration: format!("POS PURCHASE {}", i),
        debit: i as f64,
        credit: 0.0,
    }
}

#[test]
fn test_structured_values_round_trip() {
    let memory = MemoryManager::new(MemoryConfig::default());
    let rows: Vec<Txn> = (0..50).map(txn).collect();

    assert!(memory.set("search", "q:pos", rows.clone(), CacheOptions::new()));
    let cached = memory.get::<Vec<Txn>>("search", "q:pos").unwrap();
    assert_eq!(*cached, rows);

    let stats = memory.stats();
    assert_eq!(stats.namespaces["search"].items, 1);
    assert_eq!(
        stats.namespaces["search"].size_bytes,
        serde_json::to_vec(&rows).unwrap().len()
    );
}

#[test]
fn test_ceiling_holds_after_every_insert() {
    let memory = MemoryManager::new(MemoryConfig::builder().max_bytes(2_000).build());

    for i in 0..200 {
        let ns = ["dataChunks", "virtualScroll", "search"][i % 3];
        memory.set(ns, &format!("k{}", i), txn(i), CacheOptions::new().priority((i % 4) as i32));
        assert!(memory.total_allocated() <= 2_000);
    }
    assert!(memory.stats().evictions > 0);
}

#[test]
fn test_concurrent_writers_respect_ceiling() {
    let memory = MemoryManager::new(MemoryConfig::builder().max_bytes(4_096).build());

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let memory = memory.clone();
            std::thread::spawn(move || {
                for i in 0..250 {
                    memory.set_with_size(&format!("ns{}", t), &format!("k{}", i), i, 64, CacheOptions::new());
                    memory.get::<usize>(&format!("ns{}", t), &format!("k{}", i / 2));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let stats = memory.stats();
    assert!(stats.total_allocated <= 4_096);
    let accounted: usize = stats.namespaces.values().map(|ns| ns.size_bytes).sum();
    assert_eq!(accounted, stats.total_allocated);
}

#[test]
fn test_event_stream() {
    let memory = MemoryManager::new(MemoryConfig::builder().max_bytes(100).build());
    let seen = Arc::new(Mutex::new(Vec::new()));

    let mut ids = Vec::new();
    for kind in [
        MemoryEventKind::ItemAdded,
        MemoryEventKind::ItemRemoved,
        MemoryEventKind::ItemsEvicted,
        MemoryEventKind::NamespaceCleared,
    ] {
        let seen = seen.clone();
        ids.push(memory.subscribe(kind, move |record| seen.lock().push(record.event.clone())));
    }

    memory.set_with_size("ns", "a", 1u8, 60, CacheOptions::new());
    memory.set_with_size("ns", "b", 2u8, 50, CacheOptions::new());
    memory.remove("ns", "b");
    memory.set_with_size("ns", "c", 3u8, 10, CacheOptions::new());
    memory.clear_namespace("ns");

    let events = seen.lock().clone();
    assert!(matches!(&events[0], MemoryEvent::ItemAdded { key, size: 60, .. } if key == "a"));
    assert!(events.iter().any(|e| matches!(e, MemoryEvent::ItemsEvicted { keys, .. } if keys == &vec!["a".to_string()])));
    assert!(events.iter().any(|e| matches!(
        e,
        MemoryEvent::ItemRemoved { key, reason: RemovalReason::Manual, .. } if key == "b"
    )));
    assert!(matches!(
        events.last(),
        Some(MemoryEvent::NamespaceCleared { items: 1, freed_bytes: 10, .. })
    ));

    for id in ids {
        assert!(memory.unsubscribe(id));
    }
    let before = seen.lock().len();
    memory.set_with_size("ns", "d", 4u8, 10, CacheOptions::new());
    assert_eq!(seen.lock().len(), before);
}

#[test]
fn test_stats_report_hit_rate_and_utilization() {
    let memory = MemoryManager::new(MemoryConfig::builder().max_bytes(1_000).build());
    memory.set_with_size("ns", "a", 1u8, 250, CacheOptions::new());

    memory.get::<u8>("ns", "a");
    memory.get::<u8>("ns", "a");
    memory.get::<u8>("ns", "a");
    memory.get::<u8>("ns", "missing");

    let stats = memory.stats();
    assert_eq!(stats.hits, 3);
    assert_eq!(stats.misses, 1);
    assert!((stats.hit_rate() - 0.75).abs() < f64::EPSILON);
    assert!((stats.utilization() - 25.0).abs() < f64::EPSILON);
    assert_eq!(stats.total_items(), 1);
}

#[test]
fn test_pressure_transitions_are_reported_once() {
    let memory = MemoryManager::new(MemoryConfig::builder().max_bytes(100).build());
    let levels = Arc::new(Mutex::new(Vec::new()));
    let sink = levels.clone();
    memory.subscribe(MemoryEventKind::PressureDetected, move |record| {
        if let MemoryEvent::PressureDetected { level, .. } = &record.event {
            sink.lock().push(*level);
        }
    });

    for i in 0..4 {
        memory.set_with_size("reports", &format!("k{}", i), 0u8, 20, CacheOptions::new().priority(5));
    }
    // 80%: warning evicts a fifth of each namespace
    assert_eq!(memory.handle_memory_pressure(), PressureLevel::Warning);
    assert_eq!(memory.stats().namespaces["reports"].items, 3);
    assert_eq!(memory.handle_memory_pressure(), PressureLevel::Normal);
    assert_eq!(memory.handle_memory_pressure(), PressureLevel::Normal);

    assert_eq!(*levels.lock(), vec![PressureLevel::Warning, PressureLevel::Normal]);
}

#[tokio::test]
async fn test_background_gc_stops_when_manager_dropped() {
    let memory = MemoryManager::new(
        MemoryConfig::builder()
            .max_bytes(1_000)
            .gc_interval(Duration::from_millis(10))
            .build(),
    );
    assert!(memory.start_gc());
    let weak = Arc::downgrade(&memory);
    drop(memory);

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(weak.upgrade().is_none());
}
