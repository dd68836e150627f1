//! Messages exchanged between the host and the ingestion worker
//!
//! Everything moves by value. Each message carries the id of the session it
//! belongs to; the host decides which session is authoritative.

use crate::ingest::error::{IngestError, IngestErrorKind};
use crate::ingest::record::{AccountInfo, NormalizedRecord, StatementMetadata};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Correlation id of one parse request
pub type SessionId = Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseRequest {
    pub id: SessionId,
    pub file_name: String,
    pub buffer: Vec<u8>,
}

/// Host to worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WorkerRequest {
    Parse(ParseRequest),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchData {
    pub transactions: Vec<NormalizedRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseSummary {
    pub file_name: String,
    pub account_info: AccountInfo,
    pub transaction_count: usize,
}

/// Worker to host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WorkerMessage {
    /// Monotonic percentage within a session
    Progress { id: SessionId, value: u8 },
    /// At most one per session
    Meta { id: SessionId, data: StatementMetadata },
    /// Records in row order
    Batch { id: SessionId, data: BatchData },
    /// Terminal success
    Result { id: SessionId, data: ParseSummary },
    /// Terminal failure
    Error {
        id: SessionId,
        message: String,
        kind: IngestErrorKind,
    },
}

impl WorkerMessage {
    pub fn id(&self) -> SessionId {
        match self {
            WorkerMessage::Progress { id, .. }
            | WorkerMessage::Meta { id, .. }
            | WorkerMessage::Batch { id, .. }
            | WorkerMessage::Result { id, .. }
            | WorkerMessage::Error { id, .. } => *id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkerMessage::Result { .. } | WorkerMessage::Error { .. })
    }

    pub fn error(id: SessionId, error: &IngestError) -> Self {
        WorkerMessage::Error {
            id,
            message: error.to_string(),
            kind: error.kind(),
        }
    }
}
