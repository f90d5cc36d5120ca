use std::time::Duration;

/// High-level classification of a failed database operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Conflicting concurrent transaction (SQLSTATE 40001); the client must
    /// re-run the whole transaction.
    Serialization,
    /// A recognized transient code other than 40001, typically a node or
    /// connection lost mid-operation (40003, 08003, 08006).
    ConnectionTransient,
    /// Database error that retrying will not fix (constraint violation,
    /// syntax error, non-zero vendor code, missing state).
    NonTransient,
    /// No database-coded error anywhere in the cause chain.
    Unrecognized,
    /// There was no error to classify.
    Absent,
}

impl ErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Serialization | ErrorKind::ConnectionTransient)
    }
}

/// Bounded retry policy: a fixed attempt budget and a fixed backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Delay between attempts.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(2),
        }
    }
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// Single attempt, never retried.
    pub fn never() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::ZERO,
        }
    }

    /// Delay before the next attempt, or `None` once the budget is spent.
    ///
    /// `attempt` is 1-based (1 = the attempt that just failed was the first).
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        Some(self.backoff)
    }
}

/// Decision returned by the classifier for one error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Do not retry this error.
    NoRetry,
    /// Retry under the given policy.
    Retry(RetryPolicy),
}

impl RetryDecision {
    pub fn is_retry(&self) -> bool {
        matches!(self, RetryDecision::Retry(_))
    }
}
