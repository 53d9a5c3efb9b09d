//! Retry reasons and the per-request retry strategy hook.
//!
//! The engine never schedules retries itself. It derives a [`RetryReason`]
//! and hands the request to the external retry policy; the strategy carried
//! on each request is consulted by that policy, not by the engine.

use std::fmt;
use std::time::Duration;

/// Why the engine handed a request back for a possible retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetryReason {
    /// The node answered "wrong partition"; the topology view is stale.
    WrongPartition,
    /// The server no longer knows the collection id the request used.
    CollectionOutdated,
    /// The negotiated error map flagged the status as retryable.
    ErrorMapIndicated,
    /// The document is locked.
    Locked,
    /// The server signalled a temporary failure.
    TemporaryFailure,
    /// A synchronous write is already in progress for the document.
    SyncWriteInProgress,
    /// A synchronous write re-commit is in progress for the document.
    SyncWriteReCommitInProgress,
    /// The connection went down with the request still in flight.
    ConnectionClosedWhileInFlight,
}

/// Per-request retry policy object, supplied by the caller and consulted by
/// the external retry orchestration.
pub trait RetryStrategy: fmt::Debug + Send + Sync {
    /// Returns the delay before the next attempt, or `None` to give up,
    /// given the number of completed attempts and the reason for the retry.
    fn retry_after(&self, attempts: u32, reason: RetryReason) -> Option<Duration>;
}

/// Retries every reason with a capped exponential backoff.
#[derive(Debug, Clone, Copy)]
pub struct BestEffortRetryStrategy {
    base: Duration,
    cap: Duration,
}

impl BestEffortRetryStrategy {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self { base, cap }
    }
}

impl Default for BestEffortRetryStrategy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(1),
            cap: Duration::from_millis(500),
        }
    }
}

impl RetryStrategy for BestEffortRetryStrategy {
    fn retry_after(&self, attempts: u32, _reason: RetryReason) -> Option<Duration> {
        let factor = 1u32.checked_shl(attempts.min(16)).unwrap_or(u32::MAX);
        Some(self.base.saturating_mul(factor).min(self.cap))
    }
}

/// Never retries anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailFastRetryStrategy;

impl RetryStrategy for FailFastRetryStrategy {
    fn retry_after(&self, _attempts: u32, _reason: RetryReason) -> Option<Duration> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_best_effort_backoff_grows_and_caps() {
        let strategy = BestEffortRetryStrategy::default();
        let first = strategy
            .retry_after(0, RetryReason::TemporaryFailure)
            .unwrap();
        let second = strategy
            .retry_after(3, RetryReason::TemporaryFailure)
            .unwrap();
        let late = strategy.retry_after(30, RetryReason::Locked).unwrap();

        assert!(first < second);
        assert_eq!(late, Duration::from_millis(500));
    }

    #[test]
    fn test_fail_fast_never_retries() {
        let strategy = FailFastRetryStrategy;
        assert!(strategy
            .retry_after(0, RetryReason::WrongPartition)
            .is_none());
    }
}
