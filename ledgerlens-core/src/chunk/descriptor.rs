//! Chunk identities and descriptors

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Cache namespace holding loaded chunks
pub const DATA_CHUNKS_NAMESPACE: &str = "dataChunks";

/// Records that can be chunked, cached and compressed
pub trait ChunkItem: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> ChunkItem for T where T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Deterministic chunk id for a dataset identifier and chunk index
pub fn chunk_id(identifier: &str, index: usize) -> String {
    format!("{}{}", chunk_prefix(identifier), index)
}

/// Prefix shared by every chunk id of a dataset
pub fn chunk_prefix(identifier: &str) -> String {
    format!("{}:chunk:", identifier)
}

/// What a loader is asked to produce
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkSpec {
    pub id: String,
    pub identifier: String,
    pub index: usize,
    /// First record index (inclusive)
    pub start_index: usize,
    /// Last record index (exclusive)
    pub end_index: usize,
}

impl ChunkSpec {
    pub fn new(identifier: &str, index: usize, chunk_size: usize, dataset_len: Option<usize>) -> Self {
        let start_index = index * chunk_size;
        let mut end_index = start_index + chunk_size;
        if let Some(len) = dataset_len {
            end_index = end_index.min(len).max(start_index);
        }

        Self {
            id: chunk_id(identifier, index),
            identifier: identifier.to_string(),
            index,
            start_index,
            end_index,
        }
    }

    pub fn len(&self) -> usize {
        self.end_index - self.start_index
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A contiguous slice of a dataset
#[derive(Debug, Clone)]
pub struct ChunkDescriptor<T> {
    pub id: String,
    pub index: usize,
    pub start_index: usize,
    pub end_index: usize,
    pub data: Arc<Vec<T>>,
    /// Estimated uncompressed size in bytes
    pub size: usize,
}

impl<T> ChunkDescriptor<T> {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Records of this chunk that fall inside `[start, end)`
    pub fn overlap(&self, start: usize, end: usize) -> &[T] {
        let lo = start.max(self.start_index);
        let hi = end.min(self.end_index);
        if lo >= hi {
            return &[];
        }
        let from = (lo - self.start_index).min(self.data.len());
        let to = (hi - self.start_index).min(self.data.len());
        &self.data[from..to]
    }
}

impl<T: ChunkItem> ChunkDescriptor<T> {
    /// Descriptor for loaded data that is handed out without being cached
    pub(crate) fn detached(spec: &ChunkSpec, data: Vec<T>) -> Self {
        Self {
            id: spec.id.clone(),
            index: spec.index,
            start_index: spec.start_index,
            end_index: spec.start_index + data.len(),
            size: crate::memory::estimate_size(data.as_slice()),
            data: Arc::new(data),
        }
    }
}

/// Cached representation of a chunk
pub(crate) enum ChunkPayload<T> {
    Plain(Arc<Vec<T>>),
    Compressed { bytes: Vec<u8>, raw_size: usize },
}

pub(crate) struct StoredChunk<T> {
    pub spec: ChunkSpec,
    pub payload: ChunkPayload<T>,
    pub size: usize,
}
