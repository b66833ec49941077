//! LZ4 block compression for frame payloads.
//!
//! Payloads are only compressed when they exceed a size threshold and the
//! compressed block, including its 4-byte size prefix, is strictly smaller.

use crate::core::{Error, Result};
use lz4_flex::{compress_prepend_size, decompress_size_prepended};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Default threshold above which compression is attempted.
pub const DEFAULT_LZ4_THRESHOLD: usize = 256;

/// Largest decompressed size accepted from a block header.
pub const MAX_DECOMPRESSED_SIZE: usize = 16 * 1024 * 1024;

/// Compression statistics for the last attempt.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CompressionStats {
    /// Original size in bytes
    pub original_size: usize,
    /// Compressed size in bytes (equal to the original when not compressed)
    pub compressed_size: usize,
    /// Compression ratio (original / compressed)
    pub ratio: f64,
    /// Compression time in microseconds
    pub compress_time_us: u64,
    /// Whether the compressed block was kept
    pub applied: bool,
}

/// Threshold-gated LZ4 compressor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockCompressor {
    enabled: bool,
    threshold: usize,
}

impl BlockCompressor {
    /// Compressor that tries payloads larger than `threshold` bytes.
    pub fn new(threshold: usize) -> Self {
        Self {
            enabled: true,
            threshold,
        }
    }

    /// Compressor that never compresses.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            threshold: usize::MAX,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Compress `data` if it is large enough and compression pays off.
    ///
    /// Returns the compressed block, or `None` when the payload should be
    /// sent as is, together with statistics for the attempt.
    pub fn maybe_compress(&self, data: &[u8]) -> (Option<Vec<u8>>, CompressionStats) {
        let mut stats = CompressionStats {
            original_size: data.len(),
            compressed_size: data.len(),
            ratio: 1.0,
            ..Default::default()
        };

        if !self.enabled || data.len() <= self.threshold {
            return (None, stats);
        }

        let start = Instant::now();
        let compressed = compress_prepend_size(data);
        stats.compress_time_us = start.elapsed().as_micros() as u64;

        if compressed.len() >= data.len() {
            return (None, stats);
        }

        stats.compressed_size = compressed.len();
        stats.ratio = data.len() as f64 / compressed.len() as f64;
        stats.applied = true;
        (Some(compressed), stats)
    }
}

impl Default for BlockCompressor {
    fn default() -> Self {
        Self::new(DEFAULT_LZ4_THRESHOLD)
    }
}

/// Compress a block unconditionally.
pub fn compress_block(data: &[u8]) -> Vec<u8> {
    compress_prepend_size(data)
}

/// Decompress a size-prefixed block.
pub fn decompress_block(data: &[u8]) -> Result<Vec<u8>> {
    let declared = data
        .get(..4)
        .and_then(|prefix| prefix.try_into().ok())
        .map(|prefix: [u8; 4]| u32::from_le_bytes(prefix) as usize)
        .ok_or_else(|| Error::DecompressionFailed("block shorter than its size prefix".into()))?;

    if declared > MAX_DECOMPRESSED_SIZE {
        return Err(Error::DecompressionFailed(format!(
            "declared size {} exceeds limit {}",
            declared, MAX_DECOMPRESSED_SIZE
        )));
    }

    decompress_size_prepended(data).map_err(|e| Error::DecompressionFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repetitive(len: usize) -> Vec<u8> {
        b"analysis: revenue up, churn down; "
            .iter()
            .cycle()
            .take(len)
            .copied()
            .collect()
    }

    #[test]
    fn test_compression_simple() {
        let data = b"Hello, this is a test message for compression!";
        let compressed = compress_block(data);
        let decompressed = decompress_block(&compressed).unwrap();
        assert_eq!(decompressed, data);
    }

    #[test]
    fn test_below_threshold_is_untouched() {
        let compressor = BlockCompressor::default();
        let (block, stats) = compressor.maybe_compress(&repetitive(256));
        assert!(block.is_none());
        assert!(!stats.applied);
        assert_eq!(stats.compressed_size, 256);
    }

    #[test]
    fn test_large_repetitive_payload_is_compressed() {
        let compressor = BlockCompressor::default();
        let data = repetitive(4096);
        let (block, stats) = compressor.maybe_compress(&data);
        let block = block.unwrap();
        assert!(stats.applied);
        assert!(stats.ratio > 4.0);
        assert_eq!(decompress_block(&block).unwrap(), data);
    }

    #[test]
    fn test_incompressible_payload_is_kept() {
        let compressor = BlockCompressor::new(0);
        // Every byte distinct: nothing for LZ4 to match
        let data: Vec<u8> = (0..=255u8).collect();
        let (block, stats) = compressor.maybe_compress(&data);
        assert!(block.is_none());
        assert!(!stats.applied);
    }

    #[test]
    fn test_disabled() {
        let (block, _) = BlockCompressor::disabled().maybe_compress(&repetitive(10_000));
        assert!(block.is_none());
    }

    #[test]
    fn test_corrupt_block() {
        assert!(decompress_block(&[1, 2]).is_err());
        assert!(decompress_block(&[0xff, 0xff, 0xff, 0x7f, 0]).is_err());
        assert!(decompress_block(&[10, 0, 0, 0, 0xf0]).is_err());
    }
}
