//! Durability levels and their flexible framing encoding.

use bytes::{BufMut, BytesMut};
use std::time::Duration;

/// Framing extra identifier for a durability requirement.
pub const DURABILITY_FRAME_ID: u8 = 0x01;

/// Share of the request timeout granted to the server-side durability
/// deadline when no explicit durability timeout is given.
const DEADLINE_FACTOR: f64 = 0.9;

/// Server-side replication/persistence guarantee requested for a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DurabilityLevel {
    Majority = 0x01,
    MajorityAndPersistToActive = 0x02,
    PersistToMajority = 0x03,
}

impl DurabilityLevel {
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// A durability level plus an optional explicit timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurabilityRequirement {
    level: DurabilityLevel,
    timeout: Option<Duration>,
}

impl DurabilityRequirement {
    pub fn new(level: DurabilityLevel) -> Self {
        Self {
            level,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn level(&self) -> DurabilityLevel {
        self.level
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

/// Encodes the durability framing extra for the alternate request layout.
///
/// The deadline sent to the server is the explicit durability timeout if one
/// was given, otherwise 90% of the request timeout, clamped to the u16
/// millisecond range of the wire field.
pub fn durability_framing_extra(
    requirement: &DurabilityRequirement,
    request_timeout: Duration,
) -> BytesMut {
    let deadline = requirement
        .timeout
        .unwrap_or_else(|| request_timeout.mul_f64(DEADLINE_FACTOR));
    let millis = deadline.as_millis().min(u128::from(u16::MAX)) as u16;

    let mut buf = BytesMut::with_capacity(4);
    buf.put_u8((DURABILITY_FRAME_ID << 4) | 0x03);
    buf.put_u8(requirement.level.code());
    buf.put_u16(millis);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_framing_extra_layout() {
        let requirement = DurabilityRequirement::new(DurabilityLevel::Majority);
        let extra = durability_framing_extra(&requirement, Duration::from_millis(1000));

        assert_eq!(extra.len(), 4);
        assert_eq!(extra[0], 0x13); // id 1, length 3
        assert_eq!(extra[1], 0x01); // majority
        assert_eq!(u16::from_be_bytes([extra[2], extra[3]]), 900);
    }

    #[test]
    fn test_explicit_timeout_wins() {
        let requirement = DurabilityRequirement::new(DurabilityLevel::PersistToMajority)
            .with_timeout(Duration::from_millis(250));
        let extra = durability_framing_extra(&requirement, Duration::from_secs(30));

        assert_eq!(extra[1], 0x03);
        assert_eq!(u16::from_be_bytes([extra[2], extra[3]]), 250);
    }

    #[test]
    fn test_deadline_clamped_to_u16() {
        let requirement = DurabilityRequirement::new(DurabilityLevel::Majority);
        let extra = durability_framing_extra(&requirement, Duration::from_secs(600));
        assert_eq!(u16::from_be_bytes([extra[2], extra[3]]), u16::MAX);
    }

    #[test]
    fn test_level_codes() {
        assert_eq!(DurabilityLevel::Majority.code(), 0x01);
        assert_eq!(DurabilityLevel::MajorityAndPersistToActive.code(), 0x02);
        assert_eq!(DurabilityLevel::PersistToMajority.code(), 0x03);
    }
}
