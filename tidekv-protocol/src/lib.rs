//! # tidekv-protocol
//!
//! Binary wire protocol for the tidekv key-value service.
//!
//! This crate provides:
//! - Binary frame building and streaming decode (classic and flexible layouts)
//! - The canonical status code table
//! - Server feature codes and the per-connection capability snapshot
//! - Error map parsing
//! - Durability framing extras and snappy value compression
//!
//! Everything here is pure: no I/O and no connection state beyond the
//! decoder's reassembly buffer.

pub mod compress;
pub mod durability;
pub mod error;
pub mod error_map;
pub mod features;
pub mod frame;
pub mod status;

pub use compress::CompressionConfig;
pub use durability::{DurabilityLevel, DurabilityRequirement};
pub use error::ProtocolError;
pub use error_map::{ErrorAttribute, ErrorMap};
pub use features::{CapabilitySnapshot, ServerFeature};
pub use frame::{FrameDecoder, Opcode, ResponseFrame};
pub use status::Status;
