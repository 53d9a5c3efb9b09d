//! Server-advertised error map.
//!
//! The error map is a JSON document negotiated once per connection that
//! translates raw numeric status codes into named attributes. It is only
//! consulted for codes the canonical status table does not recognize.

use crate::error::ProtocolError;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};

/// Semantic attributes a server can attach to an error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum ErrorAttribute {
    #[serde(rename = "success")]
    Success,
    #[serde(rename = "item-only")]
    ItemOnly,
    #[serde(rename = "invalid-input")]
    InvalidInput,
    #[serde(rename = "fetch-config")]
    FetchConfig,
    #[serde(rename = "conn-state-invalidated")]
    ConnStateInvalidated,
    #[serde(rename = "auth")]
    Auth,
    #[serde(rename = "special-handling")]
    SpecialHandling,
    #[serde(rename = "support")]
    Support,
    #[serde(rename = "temp")]
    Temporary,
    #[serde(rename = "internal")]
    Internal,
    #[serde(rename = "retry-now")]
    RetryNow,
    #[serde(rename = "retry-later")]
    RetryLater,
    #[serde(rename = "subdoc")]
    Subdoc,
    #[serde(rename = "dcp")]
    Dcp,
    #[serde(rename = "auto-retry")]
    AutoRetry,
    #[serde(rename = "item-locked")]
    ItemLocked,
    #[serde(rename = "item-deleted")]
    ItemDeleted,
    #[serde(rename = "rate-limit")]
    RateLimit,
    /// Attribute introduced after this client was built; carried but ignored.
    #[serde(other)]
    Unknown,
}

/// A single error map entry.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorCode {
    pub name: String,
    #[serde(rename = "desc")]
    pub description: String,
    #[serde(rename = "attrs")]
    pub attributes: HashSet<ErrorAttribute>,
}

impl ErrorCode {
    pub fn has(&self, attribute: ErrorAttribute) -> bool {
        self.attributes.contains(&attribute)
    }
}

#[derive(Debug, Deserialize)]
struct RawErrorMap {
    version: u32,
    revision: u32,
    errors: HashMap<String, ErrorCode>,
}

/// The parsed error map, immutable after negotiation.
#[derive(Debug, Clone)]
pub struct ErrorMap {
    pub version: u32,
    pub revision: u32,
    errors: HashMap<u16, ErrorCode>,
}

impl ErrorMap {
    /// Parses the error map from the server's JSON document.
    ///
    /// Status codes arrive as lowercase hex strings ("7ff0").
    pub fn from_json(raw: &[u8]) -> Result<Self, ProtocolError> {
        let raw: RawErrorMap = serde_json::from_slice(raw)?;
        let mut errors = HashMap::with_capacity(raw.errors.len());
        for (code, entry) in raw.errors {
            let parsed = u16::from_str_radix(&code, 16)
                .map_err(|_| ProtocolError::InvalidErrorMapCode(code.clone()))?;
            errors.insert(parsed, entry);
        }
        Ok(Self {
            version: raw.version,
            revision: raw.revision,
            errors,
        })
    }

    /// Looks up the entry for a raw status code.
    pub fn get(&self, code: u16) -> Option<&ErrorCode> {
        self.errors.get(&code)
    }

    /// Returns the number of mapped codes.
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}
