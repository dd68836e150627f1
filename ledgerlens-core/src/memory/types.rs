//! Core type definitions for the memory manager

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Size and population of one namespace
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceStats {
    pub items: usize,
    pub size_bytes: usize,
}

/// Statistics snapshot for the memory manager
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryStats {
    /// Estimated bytes currently accounted across all namespaces
    pub total_allocated: usize,

    /// Configured ceiling
    pub max_bytes: usize,

    /// Total number of cache hits
    pub hits: u64,

    /// Total number of cache misses (including expired reads)
    pub misses: u64,

    /// Items removed by the eviction policy
    pub evictions: u64,

    /// Items removed because their TTL elapsed
    pub expirations: u64,

    /// Completed garbage collection passes
    pub gc_runs: u64,

    /// Per-namespace population
    pub namespaces: BTreeMap<String, NamespaceStats>,
}

impl MemoryStats {
    /// Utilization of the ceiling as a percentage
    pub fn utilization(&self) -> f64 {
        if self.max_bytes == 0 {
            0.0
        } else {
            (self.total_allocated as f64 / self.max_bytes as f64) * 100.0
        }
    }

    /// Cache hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }

    /// Total number of cached items
    pub fn total_items(&self) -> usize {
        self.namespaces.values().map(|n| n.items).sum()
    }
}

impl fmt::Display for MemoryStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MemoryStats {{ allocated: {} / {} bytes ({:.1}%), hits: {}, misses: {}, hit_rate: {:.2}%, items: {}, evictions: {}, expirations: {} }}",
            self.total_allocated,
            self.max_bytes,
            self.utilization(),
            self.hits,
            self.misses,
            self.hit_rate(),
            self.total_items(),
            self.evictions,
            self.expirations
        )
    }
}

/// Memory pressure classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PressureLevel {
    Normal,
    Warning,
    Critical,
}

impl fmt::Display for PressureLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PressureLevel::Normal => write!(f, "normal"),
            PressureLevel::Warning => write!(f, "warning"),
            PressureLevel::Critical => write!(f, "critical"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate() {
        let stats = MemoryStats {
            hits: 80,
            misses: 20,
            ..Default::default()
        };
        assert_eq!(stats.hit_rate(), 80.0);
        assert_eq!(MemoryStats::default().hit_rate(), 0.0);
    }

    #[test]
    fn test_utilization() {
        let stats = MemoryStats {
            total_allocated: 25,
            max_bytes: 100,
            ..Default::default()
        };
        assert_eq!(stats.utilization(), 25.0);
    }

    #[test]
    fn test_display() {
        let mut stats = MemoryStats {
            hits: 3,
            max_bytes: 10,
            ..Default::default()
        };
        stats.namespaces.insert(
            "dataChunks".to_string(),
            NamespaceStats {
                items: 2,
                size_bytes: 7,
            },
        );
        let display = stats.to_string();
        assert!(display.contains("hits: 3"));
        assert!(display.contains("items: 2"));
    }

    #[test]
    fn test_pressure_ordering() {
        assert!(PressureLevel::Critical > PressureLevel::Warning);
        assert!(PressureLevel::Warning > PressureLevel::Normal);
        assert_eq!(PressureLevel::Critical.to_string(), "critical");
    }
}
