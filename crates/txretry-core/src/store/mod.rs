//! Demo user store (SQLite via sqlx).
//!
//! Stands in for the application's persistence layer: every write runs as
//! one transaction through [`TxRunner`](crate::tx::TxRunner), so conflicting
//! writers are retried as whole transactions. Reads use the pool directly.

pub mod db;
pub mod types;
mod users;

pub use db::UserStore;
pub use types::{NewUser, User, UserId};

#[cfg(test)]
mod tests;
