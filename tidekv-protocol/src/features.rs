//! Negotiated server features and the per-connection capability snapshot.

use crate::error::ProtocolError;

/// Protocol extensions a server can advertise during the HELLO exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ServerFeature {
    Datatype = 0x01,
    Tls = 0x02,
    TcpNodelay = 0x03,
    MutationSeqno = 0x04,
    TcpDelay = 0x05,
    Xattr = 0x06,
    Xerror = 0x07,
    SelectBucket = 0x08,
    Snappy = 0x0a,
    Json = 0x0b,
    Duplex = 0x0c,
    ClustermapChangeNotification = 0x0d,
    UnorderedExecution = 0x0e,
    Tracing = 0x0f,
    AltRequest = 0x10,
    SyncReplication = 0x11,
    Collections = 0x12,
}

impl ServerFeature {
    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn from_code(code: u16) -> Option<ServerFeature> {
        match code {
            0x01 => Some(ServerFeature::Datatype),
            0x02 => Some(ServerFeature::Tls),
            0x03 => Some(ServerFeature::TcpNodelay),
            0x04 => Some(ServerFeature::MutationSeqno),
            0x05 => Some(ServerFeature::TcpDelay),
            0x06 => Some(ServerFeature::Xattr),
            0x07 => Some(ServerFeature::Xerror),
            0x08 => Some(ServerFeature::SelectBucket),
            0x0a => Some(ServerFeature::Snappy),
            0x0b => Some(ServerFeature::Json),
            0x0c => Some(ServerFeature::Duplex),
            0x0d => Some(ServerFeature::ClustermapChangeNotification),
            0x0e => Some(ServerFeature::UnorderedExecution),
            0x0f => Some(ServerFeature::Tracing),
            0x10 => Some(ServerFeature::AltRequest),
            0x11 => Some(ServerFeature::SyncReplication),
            0x12 => Some(ServerFeature::Collections),
            _ => None,
        }
    }
}

/// Immutable record of the features negotiated on one connection.
///
/// Built once when the connection becomes active and passed by reference into
/// every encode/decode on that connection afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilitySnapshot {
    /// Value payloads may be snappy-compressed in either direction.
    pub snappy: bool,
    /// Keys are collection-qualified with a LEB128 collection id prefix.
    pub collections: bool,
    /// Mutation responses carry a partition uuid / seqno token in the extras.
    pub mutation_tokens: bool,
    /// Durability requirements can be expressed via flexible framing extras.
    pub sync_replication: bool,
    /// The alternate request layout with framing extras is accepted.
    pub alt_request: bool,
}

impl CapabilitySnapshot {
    /// Builds the snapshot from the negotiated feature list.
    ///
    /// Fails when synchronous replication was negotiated without alternate
    /// request framing; that combination is a negotiation bug, not a runtime
    /// condition to recover from.
    pub fn from_features(features: &[ServerFeature]) -> Result<Self, ProtocolError> {
        let has = |f: ServerFeature| features.contains(&f);
        let snapshot = Self {
            snappy: has(ServerFeature::Snappy),
            collections: has(ServerFeature::Collections),
            mutation_tokens: has(ServerFeature::MutationSeqno),
            sync_replication: has(ServerFeature::SyncReplication),
            alt_request: has(ServerFeature::AltRequest),
        };
        if snapshot.sync_replication && !snapshot.alt_request {
            return Err(ProtocolError::SyncReplicationWithoutAltRequest);
        }
        Ok(snapshot)
    }

    /// A snapshot with every capability disabled, as on a legacy connection.
    pub fn none() -> Self {
        Self {
            snappy: false,
            collections: false,
            mutation_tokens: false,
            sync_replication: false,
            alt_request: false,
        }
    }
}
