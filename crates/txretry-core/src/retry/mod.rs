//! Retry classification and execution.
//!
//! This module decides, from a database error and its cause chain, whether
//! a transaction should be re-run (serialization failures, and optionally
//! connection loss), and runs units of work under a bounded retry policy so
//! higher layers (the transaction runner, stores) share one behaviour.

pub mod classify;
mod error;
mod policy;
mod run;

pub use classify::{find_sql_state, Classifier, RecognizedStates};
pub use error::{SqlError, SqlState, TxError};
pub use policy::{ErrorKind, RetryDecision, RetryPolicy};
pub use run::{run_with_retry, run_with_retry_async, RetryExecutor};
