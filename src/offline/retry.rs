//! Retry backoff policy
//!
//! Exponential backoff for failed push attempts, keyed by an operation's
//! attempt counter. The schedule is deterministic: base delay doubled per
//! attempt, capped. Operations that exhaust the attempt ceiling are parked in
//! the terminal failed sub-state by the queue instead of being rescheduled.

use crate::model::PendingOperation;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Default exponential backoff base
const DEFAULT_BASE: Duration = Duration::from_secs(2);
/// Default exponential backoff cap
const DEFAULT_CAP: Duration = Duration::from_secs(60);

/// Deterministic exponential backoff schedule.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    base: Duration,
    cap: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_BASE, DEFAULT_CAP)
    }
}

impl BackoffPolicy {
    /// Create a policy with the given base and cap.
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self { base, cap }
    }

    /// Delay to wait after the given number of failed attempts.
    ///
    /// Zero attempts means the operation has never been tried and is due
    /// immediately.
    pub fn delay(&self, attempts: u32) -> Duration {
        if attempts == 0 {
            return Duration::ZERO;
        }
        let factor = 2u64.saturating_pow(attempts.saturating_sub(1));
        let secs = self.base.as_secs().saturating_mul(factor);
        Duration::from_secs(secs.min(self.cap.as_secs()))
    }

    /// Earliest time the operation may be retried.
    pub fn next_attempt_at(&self, op: &PendingOperation) -> DateTime<Utc> {
        match op.last_attempt {
            Some(last) => last + chrono::Duration::seconds(self.delay(op.attempts).as_secs() as i64),
            None => op.created_at,
        }
    }

    /// Whether the operation's backoff delay has elapsed at `now`.
    pub fn is_due(&self, op: &PendingOperation, now: DateTime<Utc>) -> bool {
        self.next_attempt_at(op) <= now
    }
}
