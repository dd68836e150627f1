//! Pluggable chunk compression

/// Byte-level codec applied to serialized chunks
pub trait ChunkCompressor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether the chunker should attempt compression at all
    fn enabled(&self) -> bool {
        true
    }

    fn compress(&self, raw: &[u8]) -> Vec<u8>;

    fn decompress(&self, compressed: &[u8]) -> Result<Vec<u8>, String>;
}

/// Pass-through codec; chunks are always stored uncompressed
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCompression;

impl ChunkCompressor for NoCompression {
    fn name(&self) -> &'static str {
        "none"
    }

    fn enabled(&self) -> bool {
        false
    }

    fn compress(&self, raw: &[u8]) -> Vec<u8> {
        raw.to_vec()
    }

    fn decompress(&self, compressed: &[u8]) -> Result<Vec<u8>, String> {
        Ok(compressed.to_vec())
    }
}

/// LZ4 block compression with the uncompressed length prepended
#[derive(Debug, Clone, Copy, Default)]
pub struct Lz4Compressor;

impl ChunkCompressor for Lz4Compressor {
    fn name(&self) -> &'static str {
        "lz4"
    }

    fn compress(&self, raw: &[u8]) -> Vec<u8> {
        lz4_flex::compress_prepend_size(raw)
    }

    fn decompress(&self, compressed: &[u8]) -> Result<Vec<u8>, String> {
        lz4_flex::decompress_size_prepended(compressed).map_err(|e| e.to_string())
    }
}
