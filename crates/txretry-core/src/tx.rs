//! Transaction boundary composed with the retry executor.
//!
//! Every attempt runs in its own transaction: begin, run the operation,
//! commit on success, roll back on failure. A failed commit is an attempt
//! failure like any other, so a serialization failure reported at commit
//! time is retried too.

use std::future::Future;
use std::pin::Pin;

use sqlx::{Database, Pool, Transaction};

use crate::control::CancelToken;
use crate::retry::{Classifier, RetryExecutor, TxError};

/// Future returned by a transactional operation, borrowing the transaction.
pub type TxFuture<'t, T> = Pin<Box<dyn Future<Output = Result<T, TxError>> + Send + 't>>;

/// Run `op` once inside a fresh transaction from `pool`.
pub async fn in_transaction<DB, T, F>(pool: &Pool<DB>, op: F) -> Result<T, TxError>
where
    DB: Database,
    F: for<'t> FnOnce(&'t mut Transaction<'static, DB>) -> TxFuture<'t, T>,
{
    let mut tx = pool.begin().await?;
    match op(&mut tx).await {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback) = tx.rollback().await {
                tracing::warn!(error = %rollback, "rollback after failed attempt failed");
            }
            Err(err)
        }
    }
}

/// Runs transactional operations with classifier-driven retries.
#[derive(Debug, Clone, Default)]
pub struct TxRunner {
    classifier: Classifier,
    cancel: Option<CancelToken>,
}

impl TxRunner {
    pub fn new(classifier: Classifier) -> Self {
        Self {
            classifier,
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Run `op` in a transaction, re-running the whole transaction on
    /// retryable failures. `op` is called once per attempt and must not have
    /// effects outside the transaction.
    pub async fn run<DB, T, F>(&self, pool: &Pool<DB>, mut op: F) -> Result<T, TxError>
    where
        DB: Database,
        F: for<'t> FnMut(&'t mut Transaction<'static, DB>) -> TxFuture<'t, T>,
    {
        let mut executor =
            RetryExecutor::new(|e: &TxError| self.classifier.decide(Some(e)));
        if let Some(token) = &self.cancel {
            executor = executor.with_cancel(token.clone());
        }

        let mut attempt = 1u32;
        loop {
            let err = match in_transaction(pool, &mut op).await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };
            if !executor.backoff_async(&err, attempt).await {
                return Err(err);
            }
            attempt += 1;
        }
    }
}
