//! Retry loop: run a closure until success or the classifier says stop.

use std::error::Error;
use std::future::Future;
use std::time::Duration;

use super::classify::Classifier;
use super::policy::RetryDecision;
use crate::control::CancelToken;

/// Runs one unit of work with bounded retries.
///
/// `classify` maps a failed attempt's error to a [`RetryDecision`]. Attempts
/// run strictly one after another; the error returned after the last attempt
/// is that attempt's error, unchanged.
pub struct RetryExecutor<C> {
    classify: C,
    cancel: Option<CancelToken>,
}

impl<C> RetryExecutor<C> {
    pub fn new(classify: C) -> Self {
        Self {
            classify,
            cancel: None,
        }
    }

    /// Stop retrying (returning the last error) once `token` is cancelled.
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Blocking variant: backoff is a thread sleep that wakes early on cancel.
    pub fn run<T, E, F>(&self, mut op: F) -> Result<T, E>
    where
        C: Fn(&E) -> RetryDecision,
        F: FnMut() -> Result<T, E>,
    {
        let mut attempt = 1u32;
        loop {
            let err = match op() {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };
            if !self.backoff(&err, attempt) {
                return Err(err);
            }
            attempt += 1;
        }
    }

    /// Async variant: backoff is `tokio::time::sleep`, raced against the
    /// `CancelToken` when one is set. Dropping the returned future also
    /// cancels the sequence.
    pub async fn run_async<T, E, F, Fut>(&self, mut op: F) -> Result<T, E>
    where
        C: Fn(&E) -> RetryDecision,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 1u32;
        loop {
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };
            if !self.backoff_async(&err, attempt).await {
                return Err(err);
            }
            attempt += 1;
        }
    }

    /// Evaluate failed attempt `attempt` and, if it is to be retried, block
    /// through the backoff. Returns `true` when the next attempt should run.
    pub fn backoff<E>(&self, err: &E, attempt: u32) -> bool
    where
        C: Fn(&E) -> RetryDecision,
    {
        let Some(delay) = self.evaluate(err, attempt) else {
            return false;
        };
        let completed = match &self.cancel {
            Some(token) => token.sleep(delay),
            None => {
                std::thread::sleep(delay);
                true
            }
        };
        if !completed {
            tracing::info!(attempt, "retry cancelled during backoff");
        }
        completed
    }

    /// Async counterpart of [`RetryExecutor::backoff`]. A token cancelled
    /// before or during the wait ends it at once.
    pub async fn backoff_async<E>(&self, err: &E, attempt: u32) -> bool
    where
        C: Fn(&E) -> RetryDecision,
    {
        let Some(delay) = self.evaluate(err, attempt) else {
            return false;
        };
        let completed = match &self.cancel {
            Some(token) => token.sleep_async(delay).await,
            None => {
                tokio::time::sleep(delay).await;
                true
            }
        };
        if !completed {
            tracing::info!(attempt, "retry cancelled during backoff");
        }
        completed
    }

    /// Decide what follows failed attempt number `attempt` (1-based):
    /// `Some(delay)` to wait and retry, `None` to give up.
    pub fn evaluate<E>(&self, err: &E, attempt: u32) -> Option<Duration>
    where
        C: Fn(&E) -> RetryDecision,
    {
        match (self.classify)(err) {
            RetryDecision::NoRetry => {
                tracing::debug!(attempt, "error is not retryable");
                None
            }
            RetryDecision::Retry(policy) => match policy.next_delay(attempt) {
                Some(delay) => {
                    tracing::debug!(
                        attempt,
                        max_attempts = policy.max_attempts,
                        backoff_ms = delay.as_millis() as u64,
                        "retryable error; backing off"
                    );
                    Some(delay)
                }
                None => {
                    tracing::warn!(attempts = attempt, "retries exhausted");
                    None
                }
            },
        }
    }
}

/// Runs a closure until it succeeds or `classifier` says to stop.
pub fn run_with_retry<T, E, F>(classifier: &Classifier, op: F) -> Result<T, E>
where
    E: Error + 'static,
    F: FnMut() -> Result<T, E>,
{
    RetryExecutor::new(|e: &E| classifier.decide(Some(e))).run(op)
}

/// Async counterpart of [`run_with_retry`].
pub async fn run_with_retry_async<T, E, F, Fut>(classifier: &Classifier, op: F) -> Result<T, E>
where
    E: Error + 'static,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    RetryExecutor::new(|e: &E| classifier.decide(Some(e)))
        .run_async(op)
        .await
}
