//! Classify database errors (SQLSTATE + vendor code) into retry decisions.

use std::collections::BTreeSet;
use std::error::Error;

use sqlx::error::DatabaseError;
use sqlx::postgres::PgDatabaseError;
use sqlx::sqlite::SqliteError;

use crate::retry::error::{SqlError, SqlState};
use crate::retry::policy::{ErrorKind, RetryDecision, RetryPolicy};

/// The database asks the client to retry the transaction.
pub const SERIALIZATION_FAILURE: &str = "40001";
/// Commit outcome unknown; seen when a node becomes unavailable.
pub const STATEMENT_COMPLETION_UNKNOWN: &str = "40003";
pub const CONNECTION_DOES_NOT_EXIST: &str = "08003";
pub const CONNECTION_FAILURE: &str = "08006";

/// Upper bound on `source()` hops, so a cyclic chain cannot spin forever.
const MAX_CHAIN_DEPTH: usize = 64;

/// Set of SQLSTATE codes treated as transient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognizedStates {
    codes: BTreeSet<String>,
}

impl RecognizedStates {
    /// Only serialization failures (40001).
    pub fn serialization_only() -> Self {
        Self::from_codes([SERIALIZATION_FAILURE])
    }

    /// Serialization failures plus connection-loss codes.
    pub fn connection_aware() -> Self {
        Self::from_codes([
            SERIALIZATION_FAILURE,
            STATEMENT_COMPLETION_UNKNOWN,
            CONNECTION_DOES_NOT_EXIST,
            CONNECTION_FAILURE,
        ])
    }

    /// Build a set from `codes`. `40001` is always a member.
    pub fn from_codes<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut codes: BTreeSet<String> = codes.into_iter().map(Into::into).collect();
        codes.insert(SERIALIZATION_FAILURE.to_owned());
        Self { codes }
    }

    pub fn insert(&mut self, code: impl Into<String>) {
        self.codes.insert(code.into());
    }

    pub fn contains(&self, state: &str) -> bool {
        self.codes.contains(state)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.codes.iter().map(String::as_str)
    }
}

impl Default for RecognizedStates {
    fn default() -> Self {
        Self::serialization_only()
    }
}

/// Stateless error classifier: a recognized SQLSTATE set plus the policy to
/// hand out for retryable errors.
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    states: RecognizedStates,
    policy: RetryPolicy,
}

impl Classifier {
    pub fn new(states: RecognizedStates, policy: RetryPolicy) -> Self {
        Self { states, policy }
    }

    pub fn serialization_only() -> Self {
        Self::new(RecognizedStates::serialization_only(), RetryPolicy::default())
    }

    pub fn connection_aware() -> Self {
        Self::new(RecognizedStates::connection_aware(), RetryPolicy::default())
    }

    pub fn states(&self) -> &RecognizedStates {
        &self.states
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Classify an error (or its absence) into an [`ErrorKind`].
    pub fn kind(&self, err: Option<&(dyn Error + 'static)>) -> ErrorKind {
        let Some(err) = err else {
            return ErrorKind::Absent;
        };
        let Some(found) = find_sql_state(err) else {
            tracing::warn!(error = %err, "error carries no SQL state; will not be retried");
            return ErrorKind::Unrecognized;
        };
        let kind = self.kind_of(&found);
        tracing::debug!(
            state = found.state.as_deref().unwrap_or(""),
            vendor_code = found.vendor_code,
            db_message = %found.message,
            retryable = kind.is_retryable(),
            "classified SQL error"
        );
        kind
    }

    pub fn is_retryable(&self, err: Option<&(dyn Error + 'static)>) -> bool {
        self.kind(err).is_retryable()
    }

    /// Map an error to the policy the executor should apply.
    pub fn decide(&self, err: Option<&(dyn Error + 'static)>) -> RetryDecision {
        if self.is_retryable(err) {
            RetryDecision::Retry(self.policy)
        } else {
            RetryDecision::NoRetry
        }
    }

    fn kind_of(&self, found: &SqlState) -> ErrorKind {
        if found.vendor_code != 0 {
            return ErrorKind::NonTransient;
        }
        match found.state.as_deref() {
            None | Some("") => ErrorKind::NonTransient,
            Some(state) if !self.states.contains(state) => ErrorKind::NonTransient,
            Some(SERIALIZATION_FAILURE) => ErrorKind::Serialization,
            Some(_) => ErrorKind::ConnectionTransient,
        }
    }
}

/// Walk the `source()` chain from `err` inward and return the state of the
/// first error that carries one. Sibling chains (`SqlError::next`) are not
/// followed.
pub fn find_sql_state(err: &(dyn Error + 'static)) -> Option<SqlState> {
    let mut current = Some(err);
    for _ in 0..MAX_CHAIN_DEPTH {
        let e = current?;
        if let Some(found) = sql_state_of(e) {
            return Some(found);
        }
        current = e.source();
    }
    if let Some(rest) = current {
        tracing::warn!(
            max_depth = MAX_CHAIN_DEPTH,
            error = %err,
            remaining = %rest,
            "error chain deeper than the walk bound (or cyclic); treating as no SQL state"
        );
    }
    None
}

/// State carried by this one error, without looking at its causes.
fn sql_state_of(e: &(dyn Error + 'static)) -> Option<SqlState> {
    if let Some(sql) = e.downcast_ref::<SqlError>() {
        return Some(SqlState {
            state: sql.state().map(str::to_owned),
            vendor_code: sql.vendor_code(),
            message: sql.message().to_owned(),
        });
    }
    if let Some(sqlx_err) = e.downcast_ref::<sqlx::Error>() {
        return sqlx_state(sqlx_err);
    }
    if let Some(pg) = e.downcast_ref::<PgDatabaseError>() {
        return Some(database_state(pg));
    }
    if let Some(lite) = e.downcast_ref::<SqliteError>() {
        return Some(database_state(lite));
    }
    None
}

fn sqlx_state(e: &sqlx::Error) -> Option<SqlState> {
    match e {
        sqlx::Error::Database(db) => Some(database_state(&**db)),
        // Socket-level failure: the driver lost its connection.
        sqlx::Error::Io(io) => Some(SqlState {
            state: Some(CONNECTION_FAILURE.to_owned()),
            vendor_code: 0,
            message: io.to_string(),
        }),
        _ => None,
    }
}

fn database_state(db: &(dyn DatabaseError + 'static)) -> SqlState {
    // SQLite has no SQLSTATE; its code() is the numeric extended result code.
    if db.try_downcast_ref::<SqliteError>().is_some() {
        let vendor_code = db
            .code()
            .and_then(|c| c.parse::<i32>().ok())
            .unwrap_or(-1);
        return SqlState {
            state: None,
            vendor_code,
            message: db.message().to_owned(),
        };
    }
    SqlState {
        state: db.code().map(|c| c.into_owned()),
        vendor_code: 0,
        message: db.message().to_owned(),
    }
}
