//! # LedgerLens
//!
//! Bank-statement ingestion on a background worker, plus the glue that
//! feeds parsed records into the bounded-memory chunker and virtual lists of
//! `ledgerlens-core`.
//!
//! ```no_run
//! use ledgerlens::{IngestConfig, IngestHost};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let bytes = std::fs::read("statement.xlsx")?;
//!     let mut host = IngestHost::new(IngestConfig::default())?;
//!     let parsed = host.ingest("statement.xlsx", bytes).await?;
//!     println!("{} transactions", parsed.account_info.transaction_count);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod host;
pub mod ingest;

pub use config::AppConfig;
pub use host::{IngestHost, ParsedStatement};
pub use ingest::{
    AccountInfo, IngestConfig, IngestError, IngestErrorKind, IngestFailure, IngestWorker, NormalizedRecord,
    SessionId, StatementMetadata, WorkerMessage,
};
