//! Canonical response status categories.

use std::fmt;

/// Client-visible status categories for KV responses.
///
/// Every variant except [`Status::Unknown`] corresponds to a fixed wire code;
/// `Unknown` is what unrecognized codes collapse into after the error map has
/// been consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Success,
    NotFound,
    Exists,
    TooBig,
    InvalidArgs,
    NotStored,
    NotMyVbucket,
    NoBucket,
    Locked,
    AuthError,
    NoAccess,
    NotInitialized,
    UnknownCommand,
    OutOfMemory,
    NotSupported,
    InternalError,
    Busy,
    TemporaryFailure,
    UnknownCollection,
    DurabilityInvalidLevel,
    DurabilityImpossible,
    SyncWriteInProgress,
    SyncWriteAmbiguous,
    SyncWriteReCommitInProgress,
    Unknown,
}

impl Status {
    /// Decodes a raw wire status into a canonical category.
    ///
    /// Returns `None` for codes outside the canonical table so that callers
    /// can fall back to the negotiated error map.
    pub fn decode(code: u16) -> Option<Status> {
        match code {
            0x00 => Some(Status::Success),
            0x01 => Some(Status::NotFound),
            0x02 => Some(Status::Exists),
            0x03 => Some(Status::TooBig),
            0x04 => Some(Status::InvalidArgs),
            0x05 => Some(Status::NotStored),
            0x07 => Some(Status::NotMyVbucket),
            0x08 => Some(Status::NoBucket),
            0x09 => Some(Status::Locked),
            0x20 => Some(Status::AuthError),
            0x24 => Some(Status::NoAccess),
            0x25 => Some(Status::NotInitialized),
            0x81 => Some(Status::UnknownCommand),
            0x82 => Some(Status::OutOfMemory),
            0x83 => Some(Status::NotSupported),
            0x84 => Some(Status::InternalError),
            0x85 => Some(Status::Busy),
            0x86 => Some(Status::TemporaryFailure),
            0x88 => Some(Status::UnknownCollection),
            0xa0 => Some(Status::DurabilityInvalidLevel),
            0xa1 => Some(Status::DurabilityImpossible),
            0xa2 => Some(Status::SyncWriteInProgress),
            0xa3 => Some(Status::SyncWriteAmbiguous),
            0xa4 => Some(Status::SyncWriteReCommitInProgress),
            _ => None,
        }
    }

    /// Returns whether this status represents a successful operation.
    pub fn is_success(&self) -> bool {
        matches!(self, Status::Success)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_canonical_codes() {
        assert_eq!(Status::decode(0x00), Some(Status::Success));
        assert_eq!(Status::decode(0x01), Some(Status::NotFound));
        assert_eq!(Status::decode(0x07), Some(Status::NotMyVbucket));
        assert_eq!(Status::decode(0x86), Some(Status::TemporaryFailure));
        assert_eq!(Status::decode(0x88), Some(Status::UnknownCollection));
        assert_eq!(Status::decode(0xa2), Some(Status::SyncWriteInProgress));
        assert_eq!(
            Status::decode(0xa4),
            Some(Status::SyncWriteReCommitInProgress)
        );
    }

    #[test]
    fn test_decode_unrecognized_codes() {
        assert_eq!(Status::decode(0x06), None);
        assert_eq!(Status::decode(0x7ff0), None);
        assert_eq!(Status::decode(0xffff), None);
    }

    #[test]
    fn test_success_predicate() {
        assert!(Status::Success.is_success());
        assert!(!Status::NotFound.is_success());
        assert!(!Status::Unknown.is_success());
    }
}
