//! The per-connection protocol engine.
//!
//! One engine instance drives exactly one connection and is itself driven by
//! one sequential execution context: outbound encodes and inbound decodes on
//! a connection never run concurrently, so no locking happens here. Multiple
//! connections run independent engine instances in parallel.

use crate::codec;
use crate::collaborators::{Collaborators, EventSink, ProposedConfig, RetryPolicy, TopologyProvider, Transport};
use crate::context::ConnectionContext;
use crate::error::EngineError;
use crate::events::{CloseReason, EngineEvent};
use crate::request::KvRequest;
use crate::retry::RetryReason;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tidekv_protocol::error_map::ErrorCode;
use tidekv_protocol::{
    CapabilitySnapshot, CompressionConfig, ErrorAttribute, ErrorMap, FrameDecoder, ResponseFrame,
    ServerFeature, Status,
};

/// An outstanding request together with its dispatch timestamp.
struct InFlight {
    request: KvRequest,
    dispatched_at: Instant,
}

/// Protocol engine for one connection.
///
/// Lifecycle is `inactive -> active -> inactive`: [`ProtocolEngine::activate`]
/// builds the capability snapshot from the negotiated features, and
/// [`ProtocolEngine::deactivate`] drains every in-flight request into the
/// retry policy. Reactivation after teardown creates a new instance.
pub struct ProtocolEngine {
    ctx: ConnectionContext,
    transport: Box<dyn Transport>,
    retry: Arc<dyn RetryPolicy>,
    topology: Arc<dyn TopologyProvider>,
    events: Arc<dyn EventSink>,
    compression: CompressionConfig,
    caps: Option<CapabilitySnapshot>,
    error_map: Option<ErrorMap>,
    opaque: u32,
    in_flight: HashMap<u32, InFlight>,
    decoder: FrameDecoder,
}

impl ProtocolEngine {
    /// Creates an engine in the inactive state.
    pub fn new(
        ctx: ConnectionContext,
        collaborators: Collaborators,
        compression: CompressionConfig,
    ) -> Self {
        Self {
            ctx,
            transport: collaborators.transport,
            retry: collaborators.retry,
            topology: collaborators.topology,
            events: collaborators.events,
            compression,
            caps: None,
            error_map: None,
            opaque: 0,
            in_flight: HashMap::new(),
            decoder: FrameDecoder::new(),
        }
    }

    /// Activates the engine with the feature list and error map the transport
    /// negotiated.
    ///
    /// Fails fast when the feature combination is protocol-invalid; that is a
    /// negotiation bug, not a condition to limp along with.
    pub fn activate(
        &mut self,
        features: &[ServerFeature],
        error_map: Option<ErrorMap>,
    ) -> Result<(), EngineError> {
        let caps = CapabilitySnapshot::from_features(features).map_err(EngineError::Negotiation)?;
        tracing::debug!(peer = self.ctx.peer(), ?caps, "connection active");
        self.caps = Some(caps);
        self.error_map = error_map;
        self.opaque = 0;
        self.decoder.clear();
        Ok(())
    }

    /// Encodes and dispatches a request.
    ///
    /// Encode failures complete only this request's slot; nothing is written
    /// and no table entry is created.
    pub fn dispatch(&mut self, mut request: KvRequest) {
        let Some(caps) = self.caps else {
            tracing::debug!("dispatch on inactive engine");
            request.fail(EngineError::NotActive);
            return;
        };

        let opaque = self.next_free_opaque();
        request.context_mut().mark_dispatched_to(self.ctx.peer());

        match codec::encode_request(&request, opaque, &caps, &self.compression) {
            Ok(frame) => {
                self.opaque = opaque;
                tracing::debug!(opaque, op = ?request.command().opcode(), "dispatching request");
                self.in_flight.insert(
                    opaque,
                    InFlight {
                        request,
                        dispatched_at: Instant::now(),
                    },
                );
                self.transport.send(frame.freeze());
            }
            Err(err) => {
                tracing::debug!(%err, "request failed to encode");
                request.fail(err);
            }
        }
    }

    /// Feeds raw inbound bytes from the transport into the engine.
    pub fn receive(&mut self, data: &[u8]) {
        self.decoder.extend(data);
        loop {
            match self.decoder.decode() {
                Ok(Some(frame)) => self.handle_frame(frame),
                Ok(None) => break,
                Err(err) => {
                    tracing::warn!(%err, "undecodable inbound bytes");
                    self.decoder.clear();
                    self.close_with_reason(CloseReason::InvalidResponseFormat);
                    break;
                }
            }
        }
    }

    /// Deactivates the engine, draining every in-flight request into the
    /// retry policy. No entry is ever silently dropped.
    pub fn deactivate(&mut self) {
        self.caps = None;
        let drained: Vec<InFlight> = self.in_flight.drain().map(|(_, v)| v).collect();
        tracing::debug!(
            peer = self.ctx.peer(),
            count = drained.len(),
            "connection inactive, draining in-flight requests"
        );
        for entry in drained {
            self.retry.maybe_retry(
                &self.ctx,
                entry.request,
                RetryReason::ConnectionClosedWhileInFlight,
            );
        }
    }

    pub fn is_active(&self) -> bool {
        self.caps.is_some()
    }

    /// Number of requests currently awaiting a response.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn context(&self) -> &ConnectionContext {
        &self.ctx
    }

    pub fn capabilities(&self) -> Option<&CapabilitySnapshot> {
        self.caps.as_ref()
    }

    /// Allocates the next opaque not currently owned by an in-flight request.
    /// The counter is only committed once the request actually ships.
    fn next_free_opaque(&self) -> u32 {
        let mut candidate = self.opaque;
        loop {
            candidate = candidate.wrapping_add(1);
            if !self.in_flight.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    fn handle_frame(&mut self, frame: ResponseFrame) {
        let Some(entry) = self.in_flight.remove(&frame.opaque) else {
            self.handle_unexpected_response(&frame);
            return;
        };
        let InFlight {
            mut request,
            dispatched_at,
        } = entry;
        request
            .context_mut()
            .record_dispatch_latency(dispatched_at.elapsed());

        let caps = self.caps.unwrap_or_else(CapabilitySnapshot::none);
        let code = frame.status;
        let mut status = Status::decode(code);

        // The error map is consulted only for codes the canonical table does
        // not recognize; it never overrides a recognized status.
        let error_code = if status.is_none() {
            self.error_map.as_ref().and_then(|m| m.get(code)).cloned()
        } else {
            None
        };

        if let Some(entry) = &error_code {
            self.events.publish(EngineEvent::ErrorMapCodeHandled {
                status: code,
                name: entry.name.clone(),
            });
            if entry.has(ErrorAttribute::ConnStateInvalidated) {
                // The request rides the deactivation drain once the close
                // takes effect; completing it here would race the drain.
                self.in_flight.insert(
                    frame.opaque,
                    InFlight {
                        request,
                        dispatched_at,
                    },
                );
                self.close_with_reason(CloseReason::CloseIndication);
                return;
            }
            status = reinterpret_error_code(entry);
        }

        let status = match status {
            Some(s) => s,
            None => {
                self.events
                    .publish(EngineEvent::UnknownResponseStatus { status: code });
                Status::Unknown
            }
        };

        if status == Status::NotMyVbucket {
            self.handle_not_my_vbucket(request, &frame);
        } else if status == Status::UnknownCollection {
            self.handle_outdated_collection(request);
        } else if error_map_indicates_retry(error_code.as_ref()) {
            self.retry
                .maybe_retry(&self.ctx, request, RetryReason::ErrorMapIndicated);
        } else if self.status_indicates_invalid_connection(status) {
            self.in_flight.insert(
                frame.opaque,
                InFlight {
                    request,
                    dispatched_at,
                },
            );
            self.close_with_reason(CloseReason::CloseIndication);
        } else if let Some(reason) = status_indicates_retry(status) {
            self.retry.maybe_retry(&self.ctx, request, reason);
        } else {
            match codec::decode_response(&request, &frame, &caps, status) {
                Ok(response) => request.succeed(response),
                Err(err) => request.fail(EngineError::DecodeFailure(err)),
            }
        }
    }

    /// A response whose opaque matches nothing we own: something is clearly
    /// off on this connection, so close it rather than guess.
    fn handle_unexpected_response(&mut self, frame: &ResponseFrame) {
        tracing::warn!(opaque = frame.opaque, "response with unknown opaque");
        self.events.publish(EngineEvent::UnexpectedResponse {
            opaque: frame.opaque,
            opcode: frame.opcode,
            status: frame.status,
        });
        self.close_with_reason(CloseReason::UnknownOpaque);
    }

    fn close_with_reason(&mut self, reason: CloseReason) {
        tracing::debug!(peer = self.ctx.peer(), ?reason, "closing connection proactively");
        self.transport.close();
        self.events
            .publish(EngineEvent::ConnectionClosedProactively { reason });
    }

    /// Statuses that mark the connection itself as unsafe to keep open.
    fn status_indicates_invalid_connection(&self, status: Status) -> bool {
        status == Status::InternalError
            || (status == Status::NoBucket && self.ctx.bucket().is_some())
            || status == Status::NotInitialized
    }

    /// "Wrong partition": always a retry, and if the server volunteered a
    /// config fragment in the body, propose it tagged with the origin node.
    fn handle_not_my_vbucket(&mut self, request: KvRequest, frame: &ResponseFrame) {
        let origin = request
            .context()
            .dispatched_to()
            .unwrap_or(self.ctx.peer())
            .to_string();
        let bucket = request.bucket().to_string();
        let body = frame.value.clone();

        self.retry
            .maybe_retry(&self.ctx, request, RetryReason::WrongPartition);

        if let Some(fragment) = json_fragment(&body) {
            self.topology.propose_config(ProposedConfig {
                bucket,
                fragment,
                origin,
            });
        }
    }

    /// "Unknown collection": kick off a detached collection map refresh and
    /// hand the request back for a retry. The retry proceeds regardless of
    /// how the refresh turns out; failures are observability only. Watching
    /// the refresh needs a tokio runtime; without one the outcome goes
    /// unobserved rather than panicking.
    fn handle_outdated_collection(&mut self, request: KvRequest) {
        let bucket = request.bucket().to_string();
        let start = Instant::now();
        let refresh = self.topology.refresh_collection_map(&bucket, true);
        let events = Arc::clone(&self.events);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(cause) = refresh.await {
                        events.publish(EngineEvent::CollectionMapRefreshFailed {
                            bucket,
                            elapsed: start.elapsed(),
                            cause: cause.to_string(),
                        });
                    }
                });
            }
            Err(_) => {
                tracing::debug!(bucket = %bucket, "no runtime to watch collection map refresh");
            }
        }

        self.retry
            .maybe_retry(&self.ctx, request, RetryReason::CollectionOutdated);
    }
}

/// Maps error-map attributes onto a canonical category, or `None` when no
/// recognized attribute applies.
fn reinterpret_error_code(entry: &ErrorCode) -> Option<Status> {
    if entry.has(ErrorAttribute::Temporary) {
        Some(Status::TemporaryFailure)
    } else if entry.has(ErrorAttribute::Auth) {
        Some(Status::NoAccess)
    } else if entry.has(ErrorAttribute::ItemLocked) {
        Some(Status::Locked)
    } else {
        None
    }
}

fn error_map_indicates_retry(entry: Option<&ErrorCode>) -> bool {
    entry
        .map(|e| e.has(ErrorAttribute::RetryNow) || e.has(ErrorAttribute::RetryLater))
        .unwrap_or(false)
}

/// Statuses retried transparently instead of being raised to the caller.
fn status_indicates_retry(status: Status) -> Option<RetryReason> {
    match status {
        Status::Locked => Some(RetryReason::Locked),
        Status::TemporaryFailure => Some(RetryReason::TemporaryFailure),
        Status::SyncWriteInProgress => Some(RetryReason::SyncWriteInProgress),
        Status::SyncWriteReCommitInProgress => Some(RetryReason::SyncWriteReCommitInProgress),
        _ => None,
    }
}

/// Extracts a JSON-looking body: first non-whitespace byte must be `{`.
/// Only the leading bytes are inspected; the fragment itself is passed
/// through lossily and left to the topology provider to parse.
fn json_fragment(body: &[u8]) -> Option<String> {
    let first = body.iter().position(|b| !b.is_ascii_whitespace())?;
    if body[first] != b'{' {
        return None;
    }
    Some(String::from_utf8_lossy(&body[first..]).trim_end().to_string())
}
