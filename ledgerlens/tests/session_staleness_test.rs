//! Integration tests for host session handling
//!
//! Tests cover:
//! - Messages of a superseded session never reach the caller
//! - A terminal message ends the current session
//! - Sessions run back to back on one worker

use anyhow::Result;
use ledgerlens::{IngestConfig, IngestHost, WorkerMessage};

fn statement(rows: usize, narration: &str) -> Vec<u8> {
    let mut csv = String::from("Date,Narration,Debit,Credit,Balance\n");
    for i in 0..rows {
        csv.push_str(&format!("{:02}/01/2024,{} {},10.00,,{}\n", i % 28 + 1, narration, i, 1000 - i));
    }
    csv.into_bytes()
}

#[tokio::test]
async fn test_superseded_session_is_discarded() -> Result<()> {
    let config = IngestConfig {
        batch_size: 50,
        channel_capacity: 4,
        ..Default::default()
    };
    let mut host = IngestHost::new(config)?;

    let first = host.start("first.csv", statement(1000, "OLD"))?;
    let second = host.start("second.csv", statement(25, "NEW"))?;
    assert_ne!(first, second);
    assert_eq!(host.current_session(), Some(second));

    let mut records = Vec::new();
    let mut terminal = None;
    while let Some(message) = host.next_event().await {
        assert_eq!(message.id(), second, "stale message leaked: {:?}", message);
        match message {
            WorkerMessage::Batch { data, .. } => records.extend(data.transactions),
            WorkerMessage::Result { .. } | WorkerMessage::Error { .. } => terminal = Some(message),
            _ => {}
        }
    }

    assert!(matches!(terminal, Some(WorkerMessage::Result { ref data, .. }) if data.transaction_count == 25));
    assert_eq!(records.len(), 25);
    assert!(records.iter().all(|r| r.narration.starts_with("NEW")));
    assert!(host.current_session().is_none());
    Ok(())
}

#[tokio::test]
async fn test_sessions_run_back_to_back() -> Result<()> {
    let mut host = IngestHost::new(IngestConfig::default())?;

    let a = host.ingest("a.csv", statement(10, "A")).await?;
    let b = host.ingest("b.csv", statement(20, "B")).await?;

    assert_ne!(a.session, b.session);
    assert_eq!(a.records.len(), 10);
    assert_eq!(b.records.len(), 20);
    assert_eq!(b.account_info.account_name, "b");
    assert_eq!(b.account_info.closing_balance, Some(981.0));
    Ok(())
}

#[tokio::test]
async fn test_failure_ends_session() -> Result<()> {
    let mut host = IngestHost::new(IngestConfig::default())?;
    host.start("broken.csv", Vec::new())?;

    let mut last = None;
    while let Some(message) = host.next_event().await {
        last = Some(message);
    }

    assert!(matches!(last, Some(WorkerMessage::Error { .. })));
    assert!(host.current_session().is_none());

    // The worker is still usable
    let parsed = host.ingest("ok.csv", statement(3, "OK")).await?;
    assert_eq!(parsed.records.len(), 3);
    Ok(())
}
