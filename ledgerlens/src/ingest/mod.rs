//! Tabular statement ingestion
//!
//! Spreadsheet and CSV statements are parsed off the host's thread by an
//! [`IngestWorker`]. The worker locates the header row, pulls account
//! details out of the preamble, and normalizes every transaction row into a
//! [`NormalizedRecord`]. Results stream back as [`WorkerMessage`]s tagged
//! with the session id of the request that produced them:
//!
//! ```text
//! progress* meta? (batch | progress)* (result | error)
//! ```
//!
//! Exactly one terminal message (`result` or `error`) ends each session.

pub mod classifier;
pub mod config;
pub mod error;
pub mod header;
pub mod metadata;
pub mod parser;
pub mod protocol;
pub mod record;
pub mod values;
pub mod workbook;
pub mod worker;

pub use classifier::{Direction, DirectionClassifier, KeywordClassifier, DEFAULT_CREDIT_KEYWORDS};
pub use config::IngestConfig;
pub use error::{IngestError, IngestErrorKind, IngestFailure};
pub use header::{ColumnMap, HeaderDetector, HeaderSignature, StatementLayout};
pub use metadata::MetadataExtractor;
pub use parser::parse_statement;
pub use protocol::{BatchData, ParseRequest, ParseSummary, SessionId, WorkerMessage, WorkerRequest};
pub use record::{AccountInfo, NormalizedRecord, StatementMetadata};
pub use workbook::{load_sheet, Cell, Sheet};
pub use worker::IngestWorker;
