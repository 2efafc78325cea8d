//! Compression Engine for Sample Buffers
//!
//! ## Overview
//!
//! Reading buffers are compressed before the host stores or forwards them.
//! The engine is deliberately lossless: samples are serialized to
//! little-endian bytes and deflated at maximum effort, so decompression
//! reproduces every float bit-identically. No re-quantization, ever -
//! downstream analysis guarantees ±1% accuracy against raw calibrated
//! values and silent rounding here would invalidate that.
//!
//! ## Ratio Enforcement
//!
//! Storage budgets assume a minimum ratio
//! ([`TARGET_COMPRESSION_RATIO`](crate::constants::TARGET_COMPRESSION_RATIO)).
//! Falling short is not silently accepted; [`compress`] returns
//! [`CompressionError::Shortfall`] carrying the compressed payload, and the
//! caller decides whether the degraded ratio is acceptable. Sensor windows
//! at rest (repeated idle samples) compress far past the target; active
//! movement windows are the ones that may fall short.

use serde::{Deserialize, Serialize};

use crate::constants::{COMPRESSION_LEVEL, TARGET_COMPRESSION_RATIO};
use crate::errors::CompressionError;

/// A compressed sample buffer plus the ratio it achieved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Compressed {
    /// Deflate stream
    pub bytes: Vec<u8>,
    /// `raw_size / compressed_size`
    pub ratio: f32,
    /// Original byte length, kept for the audit record
    pub raw_len: usize,
}

/// Compress a sample buffer, enforcing the configured ratio target.
///
/// Returns [`CompressionError::Shortfall`] when the achieved ratio is below
/// `target`; the shortfall carries the compressed result so the caller can
/// still accept it.
pub fn compress_with_target(
    samples: &[f32],
    target: f32,
) -> Result<Compressed, CompressionError> {
    let raw = sample_bytes(samples);
    let bytes = miniz_oxide::deflate::compress_to_vec(&raw, COMPRESSION_LEVEL);

    let ratio = if bytes.is_empty() {
        0.0
    } else {
        raw.len() as f32 / bytes.len() as f32
    };

    let compressed = Compressed {
        bytes,
        ratio,
        raw_len: raw.len(),
    };

    if ratio < target {
        return Err(CompressionError::Shortfall { compressed, target });
    }

    Ok(compressed)
}

/// Compress against the design-constant target ratio
pub fn compress(samples: &[f32]) -> Result<Compressed, CompressionError> {
    compress_with_target(samples, TARGET_COMPRESSION_RATIO)
}

/// Inflate a compressed buffer back into samples, bit-identically.
pub fn decompress(bytes: &[u8]) -> Result<Vec<f32>, CompressionError> {
    let raw = miniz_oxide::inflate::decompress_to_vec(bytes)
        .map_err(|_| CompressionError::Corrupt)?;

    if raw.len() % 4 != 0 {
        return Err(CompressionError::Misaligned { len: raw.len() });
    }

    Ok(raw
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Little-endian serialization of a sample buffer
pub(crate) fn sample_bytes(samples: &[f32]) -> Vec<u8> {
    let mut raw = Vec::with_capacity(samples.len() * 4);
    for s in samples {
        raw.extend_from_slice(&s.to_le_bytes());
    }
    raw
}
