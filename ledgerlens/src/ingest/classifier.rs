//! Direction of extended-format rows that only carry a transaction amount

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Debit,
    Credit,
}

/// Decides whether an unsigned movement is money in or money out
///
/// Only consulted when both settlement columns are zero. The textual signals
/// are approximate; callers can supply their own rules.
pub trait DirectionClassifier: Send + Sync {
    fn classify(&self, amount: f64, transaction_type: &str, account_name: &str) -> Direction;
}

/// Keyword rules: a negative amount is a debit, a credit keyword in the type
/// or account-name text makes a credit, anything else is a debit
#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    credit_keywords: Vec<String>,
}

pub const DEFAULT_CREDIT_KEYWORDS: &[&str] = &["credit", "deposit", "inflow", "received", "refund", "reversal"];

impl KeywordClassifier {
    pub fn new<I, S>(credit_keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            credit_keywords: credit_keywords
                .into_iter()
                .map(|k| k.as_ref().trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_CREDIT_KEYWORDS)
    }
}

impl DirectionClassifier for KeywordClassifier {
    fn classify(&self, amount: f64, transaction_type: &str, account_name: &str) -> Direction {
        if amount < 0.0 {
            return Direction::Debit;
        }

        let haystack = format!("{} {}", transaction_type, account_name).to_lowercase();
        if self.credit_keywords.iter().any(|k| haystack.contains(k.as_str())) {
            Direction::Credit
        } else {
            Direction::Debit
        }
    }
}
