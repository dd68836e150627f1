//! Normalized statement data produced by the ingestion worker

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One transaction row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub id: String,
    pub date: DateTime<Utc>,
    pub narration: String,
    pub reference: String,
    /// Money out, never negative
    pub debit: f64,
    /// Money in, never negative
    pub credit: f64,
    pub balance: f64,
}

impl NormalizedRecord {
    /// Signed movement: credits positive, debits negative
    pub fn net_amount(&self) -> f64 {
        self.credit - self.debit
    }
}

/// Account details found in the preamble and footer rows
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatementMetadata {
    pub account_name: Option<String>,
    pub account_number: Option<String>,
    pub currency: Option<String>,
    pub statement_period: Option<String>,
    pub opening_balance: Option<f64>,
    pub closing_balance: Option<f64>,
    pub total_debit: Option<f64>,
    pub total_credit: Option<f64>,
}

impl StatementMetadata {
    pub fn is_empty(&self) -> bool {
        *self == StatementMetadata::default()
    }
}

/// Summary of a parsed statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub account_name: String,
    pub account_number: Option<String>,
    pub currency: Option<String>,
    pub statement_period: Option<String>,
    pub opening_balance: Option<f64>,
    pub closing_balance: Option<f64>,
    /// Stated total debit, else the sum of parsed debits
    pub total_debit: f64,
    /// Stated total credit, else the sum of parsed credits
    pub total_credit: f64,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub transaction_count: usize,
    /// Rows with a date cell that could not be parsed
    pub skipped_rows: usize,
    pub is_extended_format: bool,
}
