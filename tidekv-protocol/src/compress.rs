//! Snappy value compression.
//!
//! Compression is an opt-in transform on the value payload: it is applied only
//! when the connection negotiated it, the payload is large enough to bother,
//! and the compressed form actually beats the configured ratio. Anything else
//! ships the original bytes with the compression datatype bit clear.

use crate::error::ProtocolError;

/// Default minimum payload size eligible for compression.
pub const DEFAULT_MIN_SIZE: usize = 32;

/// Default maximum ratio (compressed / original) still considered a win.
pub const DEFAULT_MIN_RATIO: f64 = 0.83;

/// Compression settings for outbound values.
#[derive(Debug, Clone, Copy)]
pub struct CompressionConfig {
    /// Compress outbound values at all.
    pub enabled: bool,
    /// Payloads below this size are never compressed.
    pub min_size: usize,
    /// Compressed output must be at most `min_ratio * original` bytes.
    pub min_ratio: f64,
}

impl CompressionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn with_min_size(mut self, min_size: usize) -> Self {
        self.min_size = min_size;
        self
    }

    pub fn with_min_ratio(mut self, min_ratio: f64) -> Self {
        self.min_ratio = min_ratio;
        self
    }
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_size: DEFAULT_MIN_SIZE,
            min_ratio: DEFAULT_MIN_RATIO,
        }
    }
}

/// Compresses `value` if the config allows it and the result is worth it.
///
/// Returns `None` when the original bytes should be sent instead; the caller
/// sets the compression datatype bit iff this returns `Some`.
pub fn maybe_compress(value: &[u8], config: &CompressionConfig) -> Option<Vec<u8>> {
    if !config.enabled || value.len() < config.min_size {
        return None;
    }
    let compressed = snap::raw::Encoder::new().compress_vec(value).ok()?;
    if (compressed.len() as f64) <= (value.len() as f64) * config.min_ratio {
        Some(compressed)
    } else {
        None
    }
}

/// Decompresses a snappy-encoded value payload.
pub fn decompress(value: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    snap::raw::Decoder::new()
        .decompress_vec(value)
        .map_err(|e| ProtocolError::Decompression(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_compressible_payload() {
        let value = vec![b'a'; 4096];
        let compressed = maybe_compress(&value, &CompressionConfig::default()).unwrap();
        assert!(compressed.len() < value.len());
        assert_eq!(decompress(&compressed).unwrap(), value);
    }

    #[test]
    fn test_below_min_size_not_compressed() {
        let value = vec![b'a'; DEFAULT_MIN_SIZE - 1];
        assert!(maybe_compress(&value, &CompressionConfig::default()).is_none());
    }

    #[test]
    fn test_disabled_config() {
        let value = vec![b'a'; 4096];
        assert!(maybe_compress(&value, &CompressionConfig::disabled()).is_none());
    }

    #[test]
    fn test_incompressible_payload_skipped() {
        // A pseudo-random buffer does not reach the default ratio.
        let mut value = Vec::with_capacity(4096);
        let mut state = 0x12345678u32;
        for _ in 0..4096 {
            state = state.wrapping_mul(1664525).wrapping_add(1013904223);
            value.push((state >> 24) as u8);
        }
        assert!(maybe_compress(&value, &CompressionConfig::default()).is_none());
    }

    #[test]
    fn test_decompress_garbage() {
        assert!(matches!(
            decompress(&[0xff, 0xfe, 0xfd]),
            Err(ProtocolError::Decompression(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_compression_roundtrip_and_ratio(value in proptest::collection::vec(any::<u8>(), 0..2048)) {
            let config = CompressionConfig::default();
            match maybe_compress(&value, &config) {
                Some(compressed) => {
                    prop_assert!(value.len() >= config.min_size);
                    prop_assert!(
                        (compressed.len() as f64) <= (value.len() as f64) * config.min_ratio
                    );
                    prop_assert_eq!(decompress(&compressed).unwrap(), value);
                }
                None => {
                    // Original bytes are shipped unchanged; nothing to verify.
                }
            }
        }
    }
}
