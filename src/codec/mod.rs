//! Compression codec for history snapshots.
//!
//! Only history entries are compressed; the live article stays plain text so
//! reading the current version never pays for decompression.

use crate::errors::AppError;

/// Lossless, deterministic text compressor.
pub trait Codec: Send + Sync {
    fn encode(&self, text: &str) -> Vec<u8>;
    fn decode(&self, data: &[u8]) -> Result<String, AppError>;
}

/// LZ4 block compression with the uncompressed length prepended.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lz4Codec;

impl Codec for Lz4Codec {
    fn encode(&self, text: &str) -> Vec<u8> {
        lz4_flex::compress_prepend_size(text.as_bytes())
    }

    fn decode(&self, data: &[u8]) -> Result<String, AppError> {
        let bytes = lz4_flex::decompress_size_prepended(data)
            .map_err(|e| AppError::Storage(format!("Corrupt history snapshot: {}", e)))?;
        String::from_utf8(bytes)
            .map_err(|e| AppError::Storage(format!("History snapshot is not UTF-8: {}", e)))
    }
}
