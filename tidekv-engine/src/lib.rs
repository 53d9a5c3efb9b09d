//! # tidekv-engine
//!
//! Per-connection protocol engine for the tidekv key-value service.
//!
//! This crate provides:
//! - Typed KV requests with single-use completion slots
//! - Request/response correlation by opaque with lifecycle draining
//! - Response classification against the canonical status table and the
//!   negotiated error map
//! - Side-effect dispatch back into cluster topology maintenance
//!
//! The engine decides *what* a response means; whether to actually retry,
//! how connections are pooled, and how topology is stored all live in the
//! external collaborators wired in at construction.

pub mod codec;
pub mod collaborators;
pub mod context;
pub mod engine;
pub mod error;
pub mod events;
pub mod request;
pub mod response;
pub mod retry;

pub use collaborators::{
    Collaborators, EventSink, ProposedConfig, RefreshError, RefreshFuture, RetryPolicy,
    TopologyProvider, Transport,
};
pub use context::{ConnectionContext, RequestContext};
pub use engine::ProtocolEngine;
pub use error::EngineError;
pub use events::{CloseReason, EngineEvent};
pub use request::{KvCommand, KvRequest, KvResult, MutationPayload};
pub use response::{KvResponse, MutationToken};
pub use retry::{BestEffortRetryStrategy, FailFastRetryStrategy, RetryReason, RetryStrategy};
