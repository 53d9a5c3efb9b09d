//! Typed KV requests and their completion slots.

use crate::context::RequestContext;
use crate::error::EngineError;
use crate::response::KvResponse;
use crate::retry::{BestEffortRetryStrategy, RetryStrategy};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tidekv_protocol::{DurabilityRequirement, Opcode};
use tokio::sync::oneshot;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(2500);

/// Outcome delivered through a request's completion slot.
pub type KvResult = Result<KvResponse, EngineError>;

/// Value, flags and expiry of a mutating command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationPayload {
    /// Opaque document bytes; the engine never inspects them.
    pub value: Bytes,
    /// Caller-defined document flags.
    pub flags: u32,
    /// Expiration in seconds, 0 for none.
    pub expiry: u32,
}

impl MutationPayload {
    pub fn new(value: impl Into<Bytes>) -> Self {
        Self {
            value: value.into(),
            flags: 0,
            expiry: 0,
        }
    }

    pub fn with_flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_expiry(mut self, expiry: u32) -> Self {
        self.expiry = expiry;
        self
    }
}

/// The operation a request performs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvCommand {
    /// Fetch a document.
    Get,
    /// Create a document, failing if it already exists.
    Insert(MutationPayload),
    /// Store a document unconditionally.
    Upsert(MutationPayload),
    /// Overwrite a document, failing if it does not exist.
    Replace(MutationPayload),
    /// Delete a document.
    Remove,
}

impl KvCommand {
    pub fn opcode(&self) -> Opcode {
        match self {
            KvCommand::Get => Opcode::Get,
            KvCommand::Insert(_) => Opcode::Add,
            KvCommand::Upsert(_) => Opcode::Set,
            KvCommand::Replace(_) => Opcode::Replace,
            KvCommand::Remove => Opcode::Delete,
        }
    }

    /// The payload carried by mutating commands with content.
    pub fn payload(&self) -> Option<&MutationPayload> {
        match self {
            KvCommand::Insert(p) | KvCommand::Upsert(p) | KvCommand::Replace(p) => Some(p),
            KvCommand::Get | KvCommand::Remove => None,
        }
    }

    /// Whether the command changes server state (and can carry a token).
    pub fn is_mutation(&self) -> bool {
        !matches!(self, KvCommand::Get)
    }
}

/// A single KV request, immutable once constructed.
///
/// The completion slot is filled exactly once: by a decoded response, by an
/// encode failure, or not at all when the request is handed back to the retry
/// policy. A slot whose receiver was dropped completes as a no-op.
#[derive(Debug)]
pub struct KvRequest {
    bucket: String,
    key: Bytes,
    collection_id: Option<u32>,
    partition: u16,
    cas: u64,
    timeout: Duration,
    durability: Option<DurabilityRequirement>,
    command: KvCommand,
    retry_strategy: Arc<dyn RetryStrategy>,
    context: RequestContext,
    slot: CompletionSlot,
}

impl KvRequest {
    /// Creates a request and the receiver its outcome will arrive on.
    pub fn new(
        bucket: impl Into<String>,
        key: impl Into<Bytes>,
        command: KvCommand,
    ) -> (Self, oneshot::Receiver<KvResult>) {
        let (tx, rx) = oneshot::channel();
        let request = Self {
            bucket: bucket.into(),
            key: key.into(),
            collection_id: None,
            partition: 0,
            cas: 0,
            timeout: DEFAULT_TIMEOUT,
            durability: None,
            command,
            retry_strategy: Arc::new(BestEffortRetryStrategy::default()),
            context: RequestContext::new(),
            slot: CompletionSlot::new(tx),
        };
        (request, rx)
    }

    pub fn with_collection(mut self, collection_id: u32) -> Self {
        self.collection_id = Some(collection_id);
        self
    }

    pub fn with_partition(mut self, partition: u16) -> Self {
        self.partition = partition;
        self
    }

    pub fn with_cas(mut self, cas: u64) -> Self {
        self.cas = cas;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_durability(mut self, durability: DurabilityRequirement) -> Self {
        self.durability = Some(durability);
        self
    }

    pub fn with_retry_strategy(mut self, strategy: Arc<dyn RetryStrategy>) -> Self {
        self.retry_strategy = strategy;
        self
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key(&self) -> &Bytes {
        &self.key
    }

    pub fn collection_id(&self) -> Option<u32> {
        self.collection_id
    }

    pub fn partition(&self) -> u16 {
        self.partition
    }

    pub fn cas(&self) -> u64 {
        self.cas
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn durability(&self) -> Option<&DurabilityRequirement> {
        self.durability.as_ref()
    }

    pub fn command(&self) -> &KvCommand {
        &self.command
    }

    pub fn retry_strategy(&self) -> &Arc<dyn RetryStrategy> {
        &self.retry_strategy
    }

    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    pub(crate) fn context_mut(&mut self) -> &mut RequestContext {
        &mut self.context
    }

    /// Completes the request successfully.
    pub fn succeed(self, response: KvResponse) {
        self.slot.complete(Ok(response));
    }

    /// Completes the request with a failure.
    pub fn fail(self, error: EngineError) {
        self.slot.complete(Err(error));
    }
}

/// Single-use completion channel for a request's outcome.
#[derive(Debug)]
struct CompletionSlot {
    tx: Option<oneshot::Sender<KvResult>>,
}

impl CompletionSlot {
    fn new(tx: oneshot::Sender<KvResult>) -> Self {
        Self { tx: Some(tx) }
    }

    fn complete(mut self, result: KvResult) {
        if let Some(tx) = self.tx.take() {
            // The receiver may already be gone (e.g. the caller timed out);
            // completing then is a no-op.
            let _ = tx.send(result);
        }
    }
}
