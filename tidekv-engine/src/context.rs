//! Connection and request contexts.

use std::time::Duration;

/// Immutable identity of the connection an engine instance drives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionContext {
    peer: String,
    bucket: Option<String>,
}

impl ConnectionContext {
    pub fn new(peer: impl Into<String>) -> Self {
        Self {
            peer: peer.into(),
            bucket: None,
        }
    }

    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    /// Address of the node this connection talks to.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Bucket selected on this connection, if any.
    pub fn bucket(&self) -> Option<&str> {
        self.bucket.as_deref()
    }
}

/// Per-request observability context, filled in by the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    dispatched_to: Option<String>,
    dispatch_latency: Option<Duration>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Node the request was last written to.
    pub fn dispatched_to(&self) -> Option<&str> {
        self.dispatched_to.as_deref()
    }

    /// Time between dispatch and the matching response arriving.
    pub fn dispatch_latency(&self) -> Option<Duration> {
        self.dispatch_latency
    }

    pub(crate) fn mark_dispatched_to(&mut self, peer: &str) {
        self.dispatched_to = Some(peer.to_string());
    }

    pub(crate) fn record_dispatch_latency(&mut self, latency: Duration) {
        self.dispatch_latency = Some(latency);
    }
}
