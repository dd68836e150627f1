//! Account details found in the preamble above the transaction table

use crate::ingest::record::StatementMetadata;
use crate::ingest::values::parse_amount;
use crate::ingest::workbook::Cell;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    AccountName,
    AccountNumber,
    Currency,
    Period,
    OpeningBalance,
    ClosingBalance,
    TotalDebit,
    TotalCredit,
}

const LABELS: &[(&str, Field)] = &[
    ("account name", Field::AccountName),
    ("customer name", Field::AccountName),
    ("name", Field::AccountName),
    ("account number", Field::AccountNumber),
    ("account no", Field::AccountNumber),
    ("acct no", Field::AccountNumber),
    ("nuban", Field::AccountNumber),
    ("currency", Field::Currency),
    ("statement period", Field::Period),
    ("period", Field::Period),
    ("opening balance", Field::OpeningBalance),
    ("balance b/f", Field::OpeningBalance),
    ("closing balance", Field::ClosingBalance),
    ("balance c/f", Field::ClosingBalance),
    ("total debit", Field::TotalDebit),
    ("total debits", Field::TotalDebit),
    ("total withdrawals", Field::TotalDebit),
    ("total credit", Field::TotalCredit),
    ("total credits", Field::TotalCredit),
    ("total lodgements", Field::TotalCredit),
];

fn field_for(label: &str) -> Option<Field> {
    let label = label
        .trim()
        .trim_end_matches(':')
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    LABELS.iter().find(|(name, _)| *name == label).map(|(_, field)| *field)
}

/// Collects metadata from label/value pairs
///
/// Two shapes are recognized: a label cell followed by a value in the next
/// non-empty cell, and a single `Label: value` cell.
#[derive(Debug, Default)]
pub struct MetadataExtractor {
    metadata: StatementMetadata,
}

impl MetadataExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metadata(&self) -> &StatementMetadata {
        &self.metadata
    }

    pub fn into_metadata(self) -> StatementMetadata {
        self.metadata
    }

    /// Scan one row; known fields are never overwritten
    pub fn observe(&mut self, row: &[Cell]) {
        let mut i = 0;
        while i < row.len() {
            let Cell::Text(text) = &row[i] else {
                i += 1;
                continue;
            };

            if let Some(field) = field_for(text) {
                if let Some((offset, value)) = row[i + 1..].iter().enumerate().find(|(_, c)| !c.is_empty()) {
                    self.assign(field, value);
                    i += offset + 2;
                    continue;
                }
            } else if let Some((label, value)) = text.split_once(':') {
                if let Some(field) = field_for(label) {
                    let value = value.trim();
                    if !value.is_empty() {
                        self.assign(field, &Cell::Text(value.to_string()));
                    }
                }
            }
            i += 1;
        }
    }

    fn assign(&mut self, field: Field, value: &Cell) {
        let text = value.text();
        let amount = || match value {
            Cell::Number(n) => Some(*n),
            _ => parse_amount(&text),
        };

        let meta = &mut self.metadata;
        match field {
            Field::AccountName => set_once(&mut meta.account_name, Some(text.clone())),
            Field::AccountNumber => set_once(&mut meta.account_number, Some(text.clone())),
            Field::Currency => set_once(&mut meta.currency, Some(text.to_uppercase())),
            Field::Period => set_once(&mut meta.statement_period, Some(text.clone())),
            Field::OpeningBalance => set_once(&mut meta.opening_balance, amount()),
            Field::ClosingBalance => set_once(&mut meta.closing_balance, amount()),
            Field::TotalDebit => set_once(&mut meta.total_debit, amount()),
            Field::TotalCredit => set_once(&mut meta.total_credit, amount()),
        }
    }
}

fn set_once<T>(slot: &mut Option<T>, value: Option<T>) {
    if slot.is_none() {
        *slot = value;
    }
}
