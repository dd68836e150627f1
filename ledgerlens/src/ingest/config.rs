//! Configuration for the ingestion worker

use crate::ingest::classifier::DEFAULT_CREDIT_KEYWORDS;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Largest accepted input buffer
    pub max_file_bytes: usize,

    /// Records per `batch` message
    pub batch_size: usize,

    /// Rows between progress updates while reading the table
    pub progress_interval: usize,

    /// Worker messages buffered before the worker blocks
    pub channel_capacity: usize,

    /// Keywords that mark an extended-format row as a credit
    pub credit_keywords: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            // 50 MiB
            max_file_bytes: 50 * 1024 * 1024,
            batch_size: 500,
            progress_interval: 1000,
            channel_capacity: 64,
            credit_keywords: DEFAULT_CREDIT_KEYWORDS.iter().map(|k| k.to_string()).collect(),
        }
    }
}

impl IngestConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_file_bytes == 0 {
            return Err("max_file_bytes must be greater than 0".to_string());
        }
        if self.batch_size == 0 {
            return Err("batch_size must be greater than 0".to_string());
        }
        if self.progress_interval == 0 {
            return Err("progress_interval must be greater than 0".to_string());
        }
        if self.channel_capacity == 0 {
            return Err("channel_capacity must be greater than 0".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = IngestConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.batch_size, 500);
        assert_eq!(config.max_file_bytes, 52_428_800);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let config = IngestConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
