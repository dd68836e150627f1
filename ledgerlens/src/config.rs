//! Application configuration
//!
//! Settings come from a YAML file (`--config`, or
//! `<config dir>/ledgerlens/config.yaml` when present), then a handful of
//! environment variables override the most commonly tuned values. A `.env`
//! file in the working directory is loaded first.

use crate::ingest::IngestConfig;
use anyhow::{anyhow, Context, Result};
use ledgerlens_core::chunk::ChunkerConfig;
use ledgerlens_core::memory::MemoryConfig;
use ledgerlens_core::viewport::ViewportConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const ENV_MAX_CACHE_MB: &str = "LEDGERLENS_MAX_CACHE_MB";
pub const ENV_CHUNK_SIZE: &str = "LEDGERLENS_CHUNK_SIZE";
pub const ENV_BATCH_SIZE: &str = "LEDGERLENS_BATCH_SIZE";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub memory: MemoryConfig,
    pub chunker: ChunkerConfig,
    pub viewport: ViewportConfig,
    pub ingest: IngestConfig,
}

/// Default location of the config file
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("ledgerlens").join("config.yaml"))
}

impl AppConfig {
    /// Load from `path`, or the default location, then apply the environment
    ///
    /// An explicit path must exist; the default location is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenv::dotenv().ok();

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => {
                    debug!("No configuration file found; using defaults");
                    Self::default()
                }
            },
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let config: AppConfig =
            serde_yaml::from_str(&content).with_context(|| format!("Failed to parse config file {:?}", path))?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Apply environment-style overrides through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(mb) = parse_override(&lookup, ENV_MAX_CACHE_MB)? {
            self.memory.max_bytes = mb * 1024 * 1024;
        }
        if let Some(size) = parse_override(&lookup, ENV_CHUNK_SIZE)? {
            self.chunker.chunk_size = size;
        }
        if let Some(size) = parse_override(&lookup, ENV_BATCH_SIZE)? {
            self.ingest.batch_size = size;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.memory
            .validate()
            .map_err(|e| anyhow!("Invalid memory configuration: {}", e))?;
        self.chunker
            .validate()
            .map_err(|e| anyhow!("Invalid chunker configuration: {}", e))?;
        self.viewport
            .validate()
            .map_err(|e| anyhow!("Invalid viewport configuration: {}", e))?;
        self.ingest
            .validate()
            .map_err(|e| anyhow!("Invalid ingest configuration: {}", e))?;
        Ok(())
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize configuration")
    }
}

fn parse_override<F>(lookup: &F, key: &str) -> Result<Option<usize>>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => {
            let value = raw
                .trim()
                .parse::<usize>()
                .with_context(|| format!("{} must be a positive integer, got {:?}", key, raw))?;
            debug!("{} overrides configuration with {}", key, value);
            Ok(Some(value))
        }
        None => Ok(None),
    }
}
