//! Engine error types.

use thiserror::Error;
use tidekv_protocol::{DurabilityLevel, ProtocolError};

/// Errors a single request can be completed with.
///
/// These are all fatal to one request only; conditions fatal to the whole
/// connection are expressed as proactive closes plus a drain into retries,
/// never as an error on an unrelated request.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("protocol negotiation failed: {0}")]
    Negotiation(#[source] ProtocolError),

    #[error("durability level {0:?} is not available on this connection")]
    DurabilityUnavailable(DurabilityLevel),

    #[error("request encoding failed: {0}")]
    Encode(#[source] ProtocolError),

    #[error("failed to decode response body: {0}")]
    DecodeFailure(#[source] ProtocolError),

    #[error("connection is not active")]
    NotActive,
}
