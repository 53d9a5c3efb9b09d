//! External collaborator interfaces.
//!
//! The engine owns none of these concerns: it writes frames through the
//! transport, reports retry candidates to the retry policy, requests topology
//! work, and publishes events. All calls are fire-and-forget from the
//! engine's perspective.

use crate::context::ConnectionContext;
use crate::events::EngineEvent;
use crate::request::KvRequest;
use crate::retry::RetryReason;
use bytes::Bytes;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Error produced by a failed collection map refresh.
pub type RefreshError = Box<dyn std::error::Error + Send + Sync>;

/// Future returned by [`TopologyProvider::refresh_collection_map`].
pub type RefreshFuture = Pin<Box<dyn Future<Output = Result<(), RefreshError>> + Send>>;

/// Outbound side of the connection the engine drives.
pub trait Transport: Send {
    /// Hands a fully encoded frame to the connection.
    fn send(&mut self, frame: Bytes);

    /// Asks the connection to close. Deactivation is reported back to the
    /// engine separately once the close takes effect.
    fn close(&mut self);
}

/// External retry orchestration; the engine derives reasons, never backoff.
pub trait RetryPolicy: Send + Sync {
    fn maybe_retry(&self, ctx: &ConnectionContext, request: KvRequest, reason: RetryReason);
}

/// A topology fragment a server volunteered in a "wrong partition" response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposedConfig {
    pub bucket: String,
    /// Raw JSON fragment, passed through unparsed.
    pub fragment: String,
    /// Node the originating request was dispatched to.
    pub origin: String,
}

/// Cluster topology and collection map maintenance.
pub trait TopologyProvider: Send + Sync {
    /// Forwards a proposed cluster configuration; the result is not awaited.
    fn propose_config(&self, proposal: ProposedConfig);

    /// Requests a collection map refresh. The engine spawns the returned
    /// future detached and only reports failures as events.
    fn refresh_collection_map(&self, bucket: &str, force: bool) -> RefreshFuture;
}

/// Sink for structured observability events.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: EngineEvent);
}

/// Bundle of the collaborators one engine instance is wired to.
pub struct Collaborators {
    pub transport: Box<dyn Transport>,
    pub retry: Arc<dyn RetryPolicy>,
    pub topology: Arc<dyn TopologyProvider>,
    pub events: Arc<dyn EventSink>,
}
