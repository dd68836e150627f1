//! Error types for core operations
//!
//! Cache and memory operations never fail; eviction and garbage collection are
//! best-effort. The errors here cover chunk loading and configuration.

use thiserror::Error;

/// Main error type for core operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    /// The caller-supplied chunk loader failed
    #[error("Failed to load chunk {chunk_id}: {message}")]
    ChunkLoad { chunk_id: String, message: String },

    /// A chunk payload could not be (de)serialized or (de)compressed
    #[error("Chunk codec error for {chunk_id}: {message}")]
    ChunkCodec { chunk_id: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic error with context
    #[error("Error: {0}")]
    Other(String),
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

impl From<String> for CoreError {
    fn from(s: String) -> Self {
        CoreError::Other(s)
    }
}

impl From<&str> for CoreError {
    fn from(s: &str) -> Self {
        CoreError::Other(s.to_string())
    }
}
