//! Cancellation for retry sequences.
//!
//! A caller that wants to abandon a long retry sequence hands a
//! `CancelToken` to the executor and flips it from another thread or task.
//! The executor checks the token before and during every backoff and stops
//! retrying.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Notify;

/// Granularity of cancel checks during a blocking backoff.
const SLEEP_SLICE: Duration = Duration::from_millis(10);

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Shared cancel flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<Inner>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag and wake every task parked in [`CancelToken::cancelled`].
    pub fn cancel(&self) {
        self.0.cancelled.store(true, Ordering::SeqCst);
        self.0.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once the token is cancelled (immediately if it already is).
    pub async fn cancelled(&self) {
        loop {
            let notified = self.0.notify.notified();
            tokio::pin!(notified);
            // Register before checking the flag so a concurrent cancel() is not missed.
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Block for `delay`, waking early if cancelled.
    /// Returns `false` if the token was cancelled before or during the wait.
    pub fn sleep(&self, delay: Duration) -> bool {
        let deadline = Instant::now() + delay;
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
    }

    /// Async counterpart of [`CancelToken::sleep`].
    pub async fn sleep_async(&self, delay: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.cancelled() => false,
            _ = tokio::time::sleep(delay) => !self.is_cancelled(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let a = CancelToken::new();
        let b = a.clone();
        assert!(!b.is_cancelled());
        a.cancel();
        assert!(b.is_cancelled());
    }

    #[test]
    fn sleep_completes_when_not_cancelled() {
        let t = CancelToken::new();
        assert!(t.sleep(Duration::from_millis(5)));
    }

    #[test]
    fn sleep_returns_early_when_cancelled() {
        let t = CancelToken::new();
        let remote = t.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            remote.cancel();
        });
        let start = Instant::now();
        assert!(!t.sleep(Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_secs(5));
        handle.join().unwrap();
    }

    #[tokio::test]
    async fn async_sleep_completes_when_not_cancelled() {
        let t = CancelToken::new();
        assert!(t.sleep_async(Duration::from_millis(5)).await);
    }

    #[tokio::test]
    async fn async_sleep_wakes_on_cancel() {
        let t = CancelToken::new();
        let remote = t.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            remote.cancel();
        });
        let start = Instant::now();
        assert!(!t.sleep_async(Duration::from_secs(10)).await);
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn async_sleep_on_cancelled_token_returns_at_once() {
        let t = CancelToken::new();
        t.cancel();
        let start = Instant::now();
        assert!(!t.sleep_async(Duration::from_secs(10)).await);
        assert!(start.elapsed() < Duration::from_millis(500));
        // Still resolves for later waiters.
        t.cancelled().await;
    }
}
