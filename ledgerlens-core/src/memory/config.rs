//! Configuration for the memory manager

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the memory manager
///
/// Sizes are estimates, not measured heap usage. The ceiling is enforced on
/// every insert; the watermarks drive garbage collection and pressure handling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Maximum total estimated size of cached data in bytes
    pub max_bytes: usize,

    /// TTL used when a caller does not supply one
    pub default_ttl: Duration,

    /// Priority used when a caller does not supply one
    pub default_priority: i32,

    /// Interval between periodic garbage collection passes
    pub gc_interval: Duration,

    /// Utilization (0.0 - 1.0) above which GC starts evicting live items
    pub gc_high_watermark: f64,

    /// Utilization GC evicts down to once above the high watermark
    pub gc_target: f64,

    /// Utilization that triggers moderate cleanup
    pub warning_threshold: f64,

    /// Utilization that triggers aggressive cleanup
    pub critical_threshold: f64,

    /// Fraction of each namespace evicted during moderate cleanup
    pub moderate_eviction_ratio: f64,

    /// Fraction of each namespace evicted during aggressive cleanup
    pub aggressive_eviction_ratio: f64,

    /// Namespaces that are dropped wholesale under critical pressure
    pub transient_namespaces: Vec<String>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            // 100 MB default ceiling
            max_bytes: 100 * 1024 * 1024,
            default_ttl: Duration::from_secs(600),
            default_priority: 1,
            // GC every 2 minutes
            gc_interval: Duration::from_secs(120),
            gc_high_watermark: 0.9,
            gc_target: 0.8,
            warning_threshold: 0.75,
            critical_threshold: 0.9,
            moderate_eviction_ratio: 0.2,
            aggressive_eviction_ratio: 0.5,
            transient_namespaces: vec![
                "virtualScroll".to_string(),
                "searchResults".to_string(),
                "temp".to_string(),
            ],
        }
    }
}

impl MemoryConfig {
    /// Create a new builder for memory configuration
    pub fn builder() -> MemoryConfigBuilder {
        MemoryConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_bytes == 0 {
            return Err("max_bytes must be greater than 0".to_string());
        }

        for (name, value) in [
            ("gc_high_watermark", self.gc_high_watermark),
            ("gc_target", self.gc_target),
            ("warning_threshold", self.warning_threshold),
            ("critical_threshold", self.critical_threshold),
            ("moderate_eviction_ratio", self.moderate_eviction_ratio),
            ("aggressive_eviction_ratio", self.aggressive_eviction_ratio),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!("{} must be between 0.0 and 1.0", name));
            }
        }

        if self.gc_target > self.gc_high_watermark {
            return Err("gc_target must not exceed gc_high_watermark".to_string());
        }

        if self.warning_threshold > self.critical_threshold {
            return Err("warning_threshold must not exceed critical_threshold".to_string());
        }

        if self.gc_interval.is_zero() {
            return Err("gc_interval must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Whether a namespace is dropped wholesale under critical pressure
    pub fn is_transient(&self, namespace: &str) -> bool {
        self.transient_namespaces.iter().any(|n| n == namespace)
    }
}

/// Builder for memory configuration
#[derive(Debug, Default)]
pub struct MemoryConfigBuilder {
    max_bytes: Option<usize>,
    default_ttl: Option<Duration>,
    default_priority: Option<i32>,
    gc_interval: Option<Duration>,
    warning_threshold: Option<f64>,
    critical_threshold: Option<f64>,
    transient_namespaces: Option<Vec<String>>,
}

impl MemoryConfigBuilder {
    /// Set the byte ceiling
    pub fn max_bytes(mut self, max: usize) -> Self {
        self.max_bytes = Some(max);
        self
    }

    /// Set the default TTL
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Set the default priority
    pub fn default_priority(mut self, priority: i32) -> Self {
        self.default_priority = Some(priority);
        self
    }

    /// Set the periodic GC interval
    pub fn gc_interval(mut self, interval: Duration) -> Self {
        self.gc_interval = Some(interval);
        self
    }

    /// Set the moderate-cleanup watermark
    pub fn warning_threshold(mut self, threshold: f64) -> Self {
        self.warning_threshold = Some(threshold);
        self
    }

    /// Set the aggressive-cleanup watermark
    pub fn critical_threshold(mut self, threshold: f64) -> Self {
        self.critical_threshold = Some(threshold);
        self
    }

    /// Replace the set of transient namespaces
    pub fn transient_namespaces(mut self, namespaces: Vec<String>) -> Self {
        self.transient_namespaces = Some(namespaces);
        self
    }

    /// Build the memory configuration
    pub fn build(self) -> MemoryConfig {
        let defaults = MemoryConfig::default();

        MemoryConfig {
            max_bytes: self.max_bytes.unwrap_or(defaults.max_bytes),
            default_ttl: self.default_ttl.unwrap_or(defaults.default_ttl),
            default_priority: self.default_priority.unwrap_or(defaults.default_priority),
            gc_interval: self.gc_interval.unwrap_or(defaults.gc_interval),
            warning_threshold: self.warning_threshold.unwrap_or(defaults.warning_threshold),
            critical_threshold: self
                .critical_threshold
                .unwrap_or(defaults.critical_threshold),
            transient_namespaces: self
                .transient_namespaces
                .unwrap_or(defaults.transient_namespaces),
            ..defaults
        }
    }
}

/// Preset configurations
impl MemoryConfig {
    /// Configuration for memory-constrained environments
    pub fn small() -> Self {
        Self {
            max_bytes: 16 * 1024 * 1024, // 16 MB
            default_ttl: Duration::from_secs(300),
            gc_interval: Duration::from_secs(60),
            ..Default::default()
        }
    }

    /// Configuration for hosts with plenty of headroom
    pub fn large() -> Self {
        Self {
            max_bytes: 512 * 1024 * 1024, // 512 MB
            default_ttl: Duration::from_secs(1800),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MemoryConfig::default();
        assert_eq!(config.max_bytes, 100 * 1024 * 1024);
        assert_eq!(config.gc_interval, Duration::from_secs(120));
        assert!(config.is_transient("virtualScroll"));
        assert!(!config.is_transient("dataChunks"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut invalid = MemoryConfig::default();
        invalid.max_bytes = 0;
        assert!(invalid.validate().is_err());

        let mut invalid = MemoryConfig::default();
        invalid.gc_target = 0.95;
        assert!(invalid.validate().is_err());

        let mut invalid = MemoryConfig::default();
        invalid.warning_threshold = 1.5;
        assert!(invalid.validate().is_err());

        let mut invalid = MemoryConfig::default();
        invalid.warning_threshold = 0.95;
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_config_builder() {
        let config = MemoryConfig::builder()
            .max_bytes(1024)
            .default_ttl(Duration::from_secs(5))
            .default_priority(3)
            .transient_namespaces(vec!["scratch".to_string()])
            .build();

        assert_eq!(config.max_bytes, 1024);
        assert_eq!(config.default_ttl, Duration::from_secs(5));
        assert_eq!(config.default_priority, 3);
        assert!(config.is_transient("scratch"));
        assert!(!config.is_transient("virtualScroll"));
        assert_eq!(config.gc_target, 0.8);
    }

    #[test]
    fn test_presets() {
        assert_eq!(MemoryConfig::small().max_bytes, 16 * 1024 * 1024);
        assert_eq!(MemoryConfig::large().max_bytes, 512 * 1024 * 1024);
        assert!(MemoryConfig::small().validate().is_ok());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: MemoryConfig = serde_json::from_str(r#"{"max_bytes": 2048}"#).unwrap();
        assert_eq!(config.max_bytes, 2048);
        assert_eq!(config.default_priority, 1);
    }
}
