//! Protocol error types.

use thiserror::Error;

/// Errors that can occur while encoding or decoding wire frames.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid magic byte: {0:#04x}")]
    InvalidMagic(u8),

    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("key too long: {len} bytes (max {max})")]
    KeyTooLong { len: usize, max: usize },

    #[error(
        "inconsistent body lengths: framing {framing} + extras {extras} + key {key} \
         exceeds total body {total}"
    )]
    InvalidBodyLengths {
        framing: usize,
        extras: usize,
        key: usize,
        total: usize,
    },

    #[error("response extras truncated: got {len} bytes, need {needed}")]
    TruncatedExtras { len: usize, needed: usize },

    #[error("synchronous replication negotiated without alternate request framing")]
    SyncReplicationWithoutAltRequest,

    #[error("invalid error map code {0:?}: not a hexadecimal status")]
    InvalidErrorMapCode(String),

    #[error("error map JSON error: {0}")]
    ErrorMapJson(#[from] serde_json::Error),

    #[error("snappy decompression failed: {0}")]
    Decompression(String),
}
