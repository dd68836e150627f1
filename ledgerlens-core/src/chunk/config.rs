//! Configuration for the data chunker

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the data chunker
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkerConfig {
    /// Records per chunk
    pub chunk_size: usize,

    /// Chunks prefetched on each side of a requested range
    pub preload_buffer: usize,

    /// Upper bound on in-flight loads when scheduling background prefetch
    pub max_concurrent_loads: usize,

    /// Estimated size above which a chunk is considered for compression
    pub compression_threshold: usize,

    /// Minimum fraction compression must save for the compressed form to be kept
    pub min_compression_savings: f64,

    /// TTL for small chunks; larger chunks get a fraction of it
    pub base_ttl: Duration,

    /// Random TTL variation (0.0 - 1.0) so chunks loaded together do not expire together
    pub ttl_jitter: f64,

    /// Cache priority of stored chunks
    pub priority: i32,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            preload_buffer: 2,
            max_concurrent_loads: 3,
            compression_threshold: 256 * 1024,
            min_compression_savings: 0.2,
            base_ttl: Duration::from_secs(600),
            ttl_jitter: 0.1,
            priority: 2,
        }
    }
}

impl ChunkerConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.chunk_size == 0 {
            return Err("chunk_size must be greater than 0".to_string());
        }

        if self.max_concurrent_loads == 0 {
            return Err("max_concurrent_loads must be greater than 0".to_string());
        }

        if !(0.0..=1.0).contains(&self.min_compression_savings) {
            return Err("min_compression_savings must be between 0.0 and 1.0".to_string());
        }

        if !(0.0..=1.0).contains(&self.ttl_jitter) {
            return Err("ttl_jitter must be between 0.0 and 1.0".to_string());
        }

        Ok(())
    }

    /// TTL for a chunk of the given estimated size, jitter applied
    pub fn ttl_for_size(&self, size: usize) -> Duration {
        let factor = match size {
            s if s <= 64 * 1024 => 1.0,
            s if s <= 256 * 1024 => 0.5,
            s if s <= 1024 * 1024 => 0.25,
            _ => 0.125,
        };

        let base_secs = self.base_ttl.as_secs_f64() * factor;
        if self.ttl_jitter == 0.0 {
            return Duration::from_secs_f64(base_secs);
        }

        let jitter_range = base_secs * self.ttl_jitter;
        let jitter = (rand::random::<f64>() * 2.0 - 1.0) * jitter_range;
        Duration::from_secs_f64((base_secs + jitter).max(1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ChunkerConfig::default();
        assert_eq!(config.chunk_size, 1000);
        assert_eq!(config.preload_buffer, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let mut config = ChunkerConfig::default();
        config.chunk_size = 0;
        assert!(config.validate().is_err());

        let mut config = ChunkerConfig::default();
        config.min_compression_savings = 2.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_larger_chunks_get_shorter_ttl() {
        let config = ChunkerConfig {
            ttl_jitter: 0.0,
            ..Default::default()
        };
        let small = config.ttl_for_size(10 * 1024);
        let medium = config.ttl_for_size(200 * 1024);
        let large = config.ttl_for_size(4 * 1024 * 1024);

        assert_eq!(small, Duration::from_secs(600));
        assert!(medium < small);
        assert!(large < medium);
    }

    #[test]
    fn test_ttl_jitter_bounds() {
        let config = ChunkerConfig::default();
        let ttl = config.ttl_for_size(1024).as_secs_f64();
        assert!(ttl >= 540.0 && ttl <= 660.0);
    }
}
