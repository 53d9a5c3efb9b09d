//! Structured observability events.
//!
//! Events are purely informational: the sink never feeds back into control
//! flow, and publishing must not block frame processing.

use std::time::Duration;

/// Why the engine proactively closed its connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// A response arrived whose opaque matched no in-flight request.
    UnknownOpaque,
    /// The response status (or an error map attribute) marked the
    /// connection as unsafe to keep open.
    CloseIndication,
    /// Inbound bytes could not be decoded as a protocol frame.
    InvalidResponseFormat,
}

/// Events emitted by the protocol engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A response arrived that no in-flight request owns.
    UnexpectedResponse {
        opaque: u32,
        opcode: u8,
        status: u16,
    },
    /// A status code neither the canonical table nor the error map knows.
    UnknownResponseStatus { status: u16 },
    /// An unrecognized status was reinterpreted through the error map.
    ErrorMapCodeHandled { status: u16, name: String },
    /// The engine asked the transport to close the connection.
    ConnectionClosedProactively { reason: CloseReason },
    /// A fire-and-forget collection map refresh failed.
    CollectionMapRefreshFailed {
        bucket: String,
        elapsed: Duration,
        cause: String,
    },
}
