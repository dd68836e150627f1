//! Header row detection
//!
//! A header row is recognized by a prioritized list of signatures, evaluated
//! in order; the first one that matches decides the column layout.

use crate::ingest::workbook::Cell;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementLayout {
    /// Date / Narration / Reference / Debit / Credit / Balance
    Standard,
    /// Settlement debit and credit columns plus transaction amount and type
    Extended,
}

/// Column positions of a detected header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    pub layout: StatementLayout,
    pub date: Option<usize>,
    pub narration: Option<usize>,
    pub reference: Option<usize>,
    pub debit: Option<usize>,
    pub credit: Option<usize>,
    pub balance: Option<usize>,
    pub transaction_amount: Option<usize>,
    pub transaction_type: Option<usize>,
    pub account_name: Option<usize>,
}

impl ColumnMap {
    fn empty(layout: StatementLayout) -> Self {
        Self {
            layout,
            date: None,
            narration: None,
            reference: None,
            debit: None,
            credit: None,
            balance: None,
            transaction_amount: None,
            transaction_type: None,
            account_name: None,
        }
    }

    pub fn is_extended_format(&self) -> bool {
        self.layout == StatementLayout::Extended
    }

    /// Essential columns that were not found: a date and a way to read amounts
    pub fn missing_essentials(&self) -> Vec<String> {
        let mut missing = Vec::new();
        if self.date.is_none() {
            missing.push("Date".to_string());
        }
        let has_amounts = match self.layout {
            StatementLayout::Standard => self.debit.is_some() || self.credit.is_some(),
            StatementLayout::Extended => {
                (self.debit.is_some() && self.credit.is_some()) || self.transaction_amount.is_some()
            }
        };
        if !has_amounts {
            missing.push("Debit/Credit".to_string());
        }
        missing
    }
}

/// Lower-cased, whitespace-collapsed header labels of a row
pub fn normalize_labels(row: &[Cell]) -> Vec<String> {
    row.iter()
        .map(|cell| {
            cell.text()
                .to_lowercase()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect()
}

fn find(labels: &[String], needles: &[&str]) -> Option<usize> {
    needles
        .iter()
        .find_map(|needle| labels.iter().position(|label| label.contains(needle)))
}

fn find_exact(labels: &[String], names: &[&str]) -> Option<usize> {
    labels.iter().position(|label| {
        let label = label.trim_end_matches(['.', ':']);
        names.contains(&label)
    })
}

fn is_value_cell(cell: &Cell) -> bool {
    match cell {
        Cell::Number(_) | Cell::Date(_) | Cell::Bool(_) => true,
        Cell::Text(text) => {
            text.chars().any(|c| c.is_ascii_digit()) && !text.chars().any(char::is_alphabetic)
        }
        Cell::Empty => false,
    }
}

/// One recognizable header layout
pub trait HeaderSignature: Send + Sync {
    fn name(&self) -> &'static str;

    /// Column positions if the labels match this layout
    fn detect(&self, labels: &[String]) -> Option<ColumnMap>;
}

pub struct StandardSignature;

impl StandardSignature {
    /// Roles that must be present for a row to count as a header
    pub const MIN_ROLES: usize = 3;
}

impl HeaderSignature for StandardSignature {
    fn name(&self) -> &'static str {
        "standard"
    }

    fn detect(&self, labels: &[String]) -> Option<ColumnMap> {
        let mut map = ColumnMap::empty(StatementLayout::Standard);
        map.date = find_exact(labels, &["date", "trans date", "transaction date", "txn date", "value date"])
            .or_else(|| find(labels, &["date"]));
        map.narration = find(labels, &["narration", "description", "details", "remarks"]);
        map.reference = find(labels, &["reference", "ref no", "ref."]);
        map.debit = find(labels, &["debit", "withdrawal"]);
        map.credit = find(labels, &["credit", "deposit", "lodgement"]);
        map.balance = find(labels, &["balance"]);

        let found = [map.date, map.narration, map.reference, map.debit, map.credit, map.balance]
            .iter()
            .filter(|c| c.is_some())
            .count();
        (found >= Self::MIN_ROLES).then_some(map)
    }
}

pub struct ExtendedSignature;

impl HeaderSignature for ExtendedSignature {
    fn name(&self) -> &'static str {
        "extended"
    }

    fn detect(&self, labels: &[String]) -> Option<ColumnMap> {
        let debit = find(labels, &["settlement debit"])?;
        let credit = find(labels, &["settlement credit"])?;

        let mut map = ColumnMap::empty(StatementLayout::Extended);
        map.debit = Some(debit);
        map.credit = Some(credit);
        map.date = find(labels, &["transaction date", "trans date", "date"]);
        map.narration = find(labels, &["narration", "description", "remarks"]);
        map.reference = find(labels, &["reference", "session id"]);
        map.balance = find(labels, &["balance"]);
        map.transaction_amount = find(labels, &["transaction amount", "amount"]).filter(|&i| i != debit && i != credit);
        map.transaction_type = find(labels, &["transaction type", "type"]);
        map.account_name = find(labels, &["account name", "beneficiary", "counterparty"]);
        Some(map)
    }
}

/// Ordered header signatures; the first match wins
pub struct HeaderDetector {
    signatures: Vec<Box<dyn HeaderSignature>>,
}

impl Default for HeaderDetector {
    /// The extended signature is more specific, so it is tried first: its
    /// settlement columns would also satisfy the standard debit/credit roles.
    fn default() -> Self {
        Self::new(vec![Box::new(ExtendedSignature), Box::new(StandardSignature)])
    }
}

impl HeaderDetector {
    pub fn new(signatures: Vec<Box<dyn HeaderSignature>>) -> Self {
        Self { signatures }
    }

    pub fn detect(&self, row: &[Cell]) -> Option<ColumnMap> {
        // Summary rows ("Total Debit", 500, "Total Credit", 600) carry values; headers do not.
        if row.iter().any(is_value_cell) {
            return None;
        }
        let labels = normalize_labels(row);
        if labels.iter().all(|l| l.is_empty()) {
            return None;
        }
        self.signatures.iter().find_map(|signature| {
            let map = signature.detect(&labels)?;
            tracing::debug!("Header matched the {} signature", signature.name());
            Some(map)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(labels: &[&str]) -> Vec<Cell> {
        labels.iter().map(|l| Cell::Text(l.to_string())).collect()
    }

    #[test]
    fn test_standard_header() {
        let detector = HeaderDetector::default();
        let map = detector
            .detect(&row(&["Date", "Narration", "Reference", "Debit", "Credit", "Balance"]))
            .unwrap();

        assert!(!map.is_extended_format());
        assert_eq!(
            (map.date, map.narration, map.reference, map.debit, map.credit, map.balance),
            (Some(0), Some(1), Some(2), Some(3), Some(4), Some(5))
        );
        assert!(map.missing_essentials().is_empty());
    }

    #[test]
    fn test_extended_header() {
        let detector = HeaderDetector::default();
        let map = detector
            .detect(&row(&[
                "Transaction Date",
                "Transaction Type",
                "Account Name",
                "Transaction Amount",
                "Settlement Debit (NGN)",
                "Settlement Credit (NGN)",
                "Balance After (NGN)",
                "Reference",
            ]))
            .unwrap();

        assert!(map.is_extended_format());
        assert_eq!(map.date, Some(0));
        assert_eq!(map.transaction_type, Some(1));
        assert_eq!(map.account_name, Some(2));
        assert_eq!(map.transaction_amount, Some(3));
        assert_eq!((map.debit, map.credit), (Some(4), Some(5)));
        assert_eq!(map.balance, Some(6));
        assert_eq!(map.reference, Some(7));
    }

    #[test]
    fn test_needs_three_standard_roles() {
        let detector = HeaderDetector::default();
        assert!(detector.detect(&row(&["Date", "Amount"])).is_none());
        assert!(detector.detect(&row(&["Account Name:", "ADA OBI"])).is_none());
        assert!(detector.detect(&row(&["", ""])).is_none());
        assert!(detector
            .detect(&row(&["Opening Balance", "1,000.00", "Total Debit", "50", "Total Credit", "20"]))
            .is_none());

        let partial = detector.detect(&row(&["Narration", "Debit", "Credit"])).unwrap();
        assert_eq!(partial.missing_essentials(), vec!["Date".to_string()]);
    }

    #[test]
    fn test_labels_are_normalized() {
        let labels = normalize_labels(&row(&["  Trans   Date ", "DEBIT"]));
        assert_eq!(labels, vec!["trans date", "debit"]);
    }
}
