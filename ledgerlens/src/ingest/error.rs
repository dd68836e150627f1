//! Typed ingestion failures
//!
//! Every failure is terminal for its session and carries a message that can
//! be shown to a user as is.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum IngestError {
    #[error("The file is empty")]
    Empty,

    #[error("The file is too large ({size} bytes); the limit is {limit} bytes")]
    TooLarge { size: usize, limit: usize },

    #[error("The file is password protected; remove the password and upload it again")]
    Encrypted,

    #[error("The file could not be read as a spreadsheet: {0}")]
    Corrupt(String),

    #[error("The file does not contain any worksheet")]
    MissingWorksheet,

    #[error(
        "Could not find the transaction header row. Expected columns such as \
         Date, Narration, Reference, Debit, Credit, Balance or \
         Settlement Debit and Settlement Credit"
    )]
    MissingHeader,

    #[error("The statement is missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("No valid transactions were found in the statement")]
    NoTransactions,

    #[error("Unexpected failure while parsing the statement: {0}")]
    Internal(String),
}

/// Discriminant of [`IngestError`], carried on the wire next to the message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestErrorKind {
    Empty,
    TooLarge,
    Encrypted,
    Corrupt,
    MissingWorksheet,
    MissingHeader,
    MissingColumns,
    NoTransactions,
    Internal,
}

impl IngestError {
    pub fn kind(&self) -> IngestErrorKind {
        match self {
            IngestError::Empty => IngestErrorKind::Empty,
            IngestError::TooLarge { .. } => IngestErrorKind::TooLarge,
            IngestError::Encrypted => IngestErrorKind::Encrypted,
            IngestError::Corrupt(_) => IngestErrorKind::Corrupt,
            IngestError::MissingWorksheet => IngestErrorKind::MissingWorksheet,
            IngestError::MissingHeader => IngestErrorKind::MissingHeader,
            IngestError::MissingColumns(_) => IngestErrorKind::MissingColumns,
            IngestError::NoTransactions => IngestErrorKind::NoTransactions,
            IngestError::Internal(_) => IngestErrorKind::Internal,
        }
    }
}

/// A failed session as seen by the host
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct IngestFailure {
    pub kind: IngestErrorKind,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_are_cause_specific() {
        let err = IngestError::TooLarge {
            size: 60 * 1024 * 1024,
            limit: 50 * 1024 * 1024,
        };
        assert!(err.to_string().contains("62914560"));
        assert_eq!(err.kind(), IngestErrorKind::TooLarge);

        let missing = IngestError::MissingColumns(vec!["Date".to_string(), "Debit".to_string()]);
        assert_eq!(
            missing.to_string(),
            "The statement is missing required columns: Date, Debit"
        );
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&IngestErrorKind::MissingHeader).unwrap();
        assert_eq!(json, "\"missing_header\"");
    }
}
