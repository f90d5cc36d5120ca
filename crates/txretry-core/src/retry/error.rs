//! Driver-level SQL error carrying a SQLSTATE and a vendor code.

use std::error::Error;
use std::fmt;

/// Error raised by the SQL driver layer.
///
/// Carries the five-character SQLSTATE (when the driver reported one) and a
/// numeric vendor code. PostgreSQL-wire drivers report status purely through
/// the SQLSTATE, so the vendor code is normally 0.
///
/// `next` is a sibling chain of further errors reported for the same
/// statement (e.g. per-row batch failures). It is exposed for diagnostics
/// only; it is not part of the `source()` chain and is never classified.
#[derive(Debug)]
pub struct SqlError {
    message: String,
    state: Option<String>,
    vendor_code: i32,
    cause: Option<Box<dyn Error + Send + Sync + 'static>>,
    next: Option<Box<SqlError>>,
}

impl SqlError {
    pub fn new(message: impl Into<String>, state: Option<&str>) -> Self {
        Self {
            message: message.into(),
            state: state.map(str::to_owned),
            vendor_code: 0,
            cause: None,
            next: None,
        }
    }

    pub fn with_vendor_code(mut self, code: i32) -> Self {
        self.vendor_code = code;
        self
    }

    /// Attach the error that caused this one; reachable through `source()`.
    pub fn with_cause(mut self, cause: impl Into<Box<dyn Error + Send + Sync + 'static>>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// Append a sibling error to the end of the `next` chain.
    pub fn with_next(mut self, next: SqlError) -> Self {
        let tail = match self.next.take() {
            Some(existing) => (*existing).with_next(next),
            None => next,
        };
        self.next = Some(Box::new(tail));
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn state(&self) -> Option<&str> {
        self.state.as_deref()
    }

    pub fn vendor_code(&self) -> i32 {
        self.vendor_code
    }

    pub fn next(&self) -> Option<&SqlError> {
        self.next.as_deref()
    }
}

impl fmt::Display for SqlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.state {
            Some(state) => write!(f, "{} (SQLSTATE {})", self.message, state),
            None => write!(f, "{}", self.message),
        }
    }
}

impl Error for SqlError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause.as_deref().map(|e| e as &(dyn Error + 'static))
    }
}

/// State code and vendor code read from the first database-coded error in a chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlState {
    pub state: Option<String>,
    pub vendor_code: i32,
    pub message: String,
}

/// Error of one transactional attempt: either the driver failed, or the
/// operation itself reported a SQL-level error.
#[derive(Debug, thiserror::Error)]
pub enum TxError {
    #[error("database error: {0}")]
    Sql(#[from] sqlx::Error),
    #[error("{0}")]
    State(#[from] SqlError),
}
