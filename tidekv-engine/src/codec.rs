//! Typed request encoding and response body decoding.
//!
//! Everything here is driven by the connection's capability snapshot: keys are
//! collection-qualified only when collections were negotiated, values are
//! compressed only when snappy was, and durability requires the
//! sync-replication framing or the encode fails for that request alone.

use crate::error::EngineError;
use crate::request::{KvCommand, KvRequest};
use crate::response::{KvResponse, MutationToken};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tidekv_protocol::frame::{self, DATATYPE_COMPRESSED, MAX_KEY_SIZE, MAX_VALUE_SIZE};
use tidekv_protocol::{
    compress, durability, CapabilitySnapshot, CompressionConfig, ProtocolError, ResponseFrame,
    Status,
};

/// Encodes a request into a wire frame under the given opaque.
pub fn encode_request(
    request: &KvRequest,
    opaque: u32,
    caps: &CapabilitySnapshot,
    compression: &CompressionConfig,
) -> Result<BytesMut, EngineError> {
    let key = encode_key(request, caps)?;
    let (value, datatype) = encode_value(request.command(), caps, compression)?;
    let extras = mutation_extras(request.command());
    let opcode = request.command().opcode();

    if let Some(requirement) = request.durability() {
        if !caps.sync_replication {
            return Err(EngineError::DurabilityUnavailable(requirement.level()));
        }
        let framing = durability::durability_framing_extra(requirement, request.timeout());
        Ok(frame::flexible_request(
            opcode,
            datatype,
            request.partition(),
            opaque,
            request.cas(),
            &framing,
            &extras,
            &key,
            &value,
        ))
    } else {
        Ok(frame::request(
            opcode,
            datatype,
            request.partition(),
            opaque,
            request.cas(),
            &extras,
            &key,
            &value,
        ))
    }
}

/// Decodes the typed response body for a request the classifier let through.
pub fn decode_response(
    request: &KvRequest,
    frame: &ResponseFrame,
    caps: &CapabilitySnapshot,
    status: Status,
) -> Result<KvResponse, ProtocolError> {
    let mutation_token = extract_token(request, frame, caps);

    let (flags, content) = match request.command() {
        KvCommand::Get if status.is_success() => {
            if frame.extras.len() < 4 {
                return Err(ProtocolError::TruncatedExtras {
                    len: frame.extras.len(),
                    needed: 4,
                });
            }
            let mut extras = frame.extras.clone();
            let flags = extras.get_u32();
            let content = if frame.datatype & DATATYPE_COMPRESSED != 0 {
                Bytes::from(compress::decompress(&frame.value)?)
            } else {
                frame.value.clone()
            };
            (flags, content)
        }
        _ => (0, Bytes::new()),
    };

    Ok(KvResponse {
        status,
        cas: frame.cas,
        flags,
        content,
        mutation_token,
    })
}

/// Qualifies the key with its collection id when collections are negotiated;
/// otherwise the bare key is used and any collection id is dropped.
fn encode_key(request: &KvRequest, caps: &CapabilitySnapshot) -> Result<BytesMut, EngineError> {
    let key = request.key();
    if key.len() > MAX_KEY_SIZE {
        return Err(EngineError::Encode(ProtocolError::KeyTooLong {
            len: key.len(),
            max: MAX_KEY_SIZE,
        }));
    }

    if caps.collections {
        let mut qualified = frame::leb128(request.collection_id().unwrap_or(0));
        qualified.extend_from_slice(key);
        Ok(qualified)
    } else {
        let mut bare = BytesMut::with_capacity(key.len());
        bare.extend_from_slice(key);
        Ok(bare)
    }
}

/// Returns the value payload and its datatype bitmap, compressing when the
/// snapshot and config allow it and the ratio is actually achieved.
fn encode_value(
    command: &KvCommand,
    caps: &CapabilitySnapshot,
    compression: &CompressionConfig,
) -> Result<(Bytes, u8), EngineError> {
    let Some(payload) = command.payload() else {
        return Ok((Bytes::new(), 0));
    };
    if payload.value.len() > MAX_VALUE_SIZE {
        return Err(EngineError::Encode(ProtocolError::FrameTooLarge {
            size: payload.value.len(),
            max: MAX_VALUE_SIZE,
        }));
    }

    if caps.snappy {
        if let Some(compressed) = compress::maybe_compress(&payload.value, compression) {
            return Ok((Bytes::from(compressed), DATATYPE_COMPRESSED));
        }
    }
    Ok((payload.value.clone(), 0))
}

/// Mutating operations with content carry flags and expiry as two 4-byte
/// big-endian extras fields.
fn mutation_extras(command: &KvCommand) -> BytesMut {
    match command.payload() {
        Some(payload) => {
            let mut extras = BytesMut::with_capacity(8);
            extras.put_u32(payload.flags);
            extras.put_u32(payload.expiry);
            extras
        }
        None => BytesMut::new(),
    }
}

fn extract_token(
    request: &KvRequest,
    frame: &ResponseFrame,
    caps: &CapabilitySnapshot,
) -> Option<MutationToken> {
    if !caps.mutation_tokens || !request.command().is_mutation() || frame.extras.len() < 16 {
        return None;
    }
    let mut extras = frame.extras.clone();
    Some(MutationToken {
        partition: request.partition(),
        partition_uuid: extras.get_u64(),
        sequence: extras.get_u64(),
        bucket: request.bucket().to_string(),
    })
}
