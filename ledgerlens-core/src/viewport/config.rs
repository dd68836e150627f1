//! Configuration for virtualized lists

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportConfig {
    /// Fixed row height in pixels
    pub item_height: f64,

    /// Height of the scroll container in pixels
    pub container_height: f64,

    /// Rows rendered above and below the visible area
    pub buffer_size: usize,

    /// Quiet period after the last scroll event before the list counts as idle
    pub idle_timeout: Duration,

    /// TTL of cached slices while scrolling
    pub active_ttl: Duration,

    /// Priority of cached slices while scrolling
    pub active_priority: i32,

    /// TTL cached slices are demoted to once scrolling stops
    pub idle_ttl: Duration,

    /// Priority cached slices are demoted to once scrolling stops
    pub idle_priority: i32,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            item_height: 48.0,
            container_height: 600.0,
            buffer_size: 10,
            idle_timeout: Duration::from_millis(150),
            active_ttl: Duration::from_secs(300),
            active_priority: 2,
            idle_ttl: Duration::from_secs(60),
            idle_priority: 0,
        }
    }
}

impl ViewportConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.item_height <= 0.0 {
            return Err("item_height must be greater than 0".to_string());
        }

        if self.container_height < 0.0 {
            return Err("container_height must not be negative".to_string());
        }

        if self.idle_ttl > self.active_ttl {
            return Err("idle_ttl must not exceed active_ttl".to_string());
        }

        Ok(())
    }
}
