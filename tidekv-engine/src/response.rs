//! Typed KV responses.

use bytes::Bytes;
use tidekv_protocol::Status;

/// Token identifying a mutation's position in a partition's sequence,
/// present when mutation tokens were negotiated on the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationToken {
    pub partition: u16,
    pub partition_uuid: u64,
    pub sequence: u64,
    pub bucket: String,
}

/// A decoded KV response fragment.
///
/// Carries the canonical status the classifier settled on; document content
/// is only populated for successful reads and stays opaque bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvResponse {
    pub status: Status,
    pub cas: u64,
    pub flags: u32,
    pub content: Bytes,
    pub mutation_token: Option<MutationToken>,
}

impl KvResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}
