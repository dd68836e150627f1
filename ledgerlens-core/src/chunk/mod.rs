//! # Data Chunker
//!
//! Splits large ordered datasets into fixed-size chunks that are loaded on
//! demand, cached in the memory manager's `dataChunks` namespace and shared
//! between concurrent requests for the same chunk.
//!
//! Large chunks are optionally compressed when it saves enough space, and
//! cached chunks get a shorter TTL the larger they are.

pub mod chunker;
pub mod compress;
pub mod config;
pub mod descriptor;

pub use chunker::{ChunkerStats, DataChunker};
pub use compress::{ChunkCompressor, Lz4Compressor, NoCompression};
pub use config::ChunkerConfig;
pub use descriptor::{chunk_id, chunk_prefix, ChunkDescriptor, ChunkItem, ChunkSpec, DATA_CHUNKS_NAMESPACE};
