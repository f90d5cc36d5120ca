//! SQLite-backed user store: connection, migrations, timestamp helper.
//!
//! Row operations live in `users`.

use anyhow::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::TxRetryConfig;
use crate::tx::TxRunner;

/// Percent-encode a path for use in a sqlite:// URI so spaces and special chars don't break parsing.
fn path_to_sqlite_uri(path: &Path) -> String {
    let s = path.to_string_lossy();
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '%' => out.push_str("%25"),
            ' ' => out.push_str("%20"),
            '#' => out.push_str("%23"),
            '?' => out.push_str("%3F"),
            '&' => out.push_str("%26"),
            c => out.push(c),
        }
    }
    format!("sqlite://{}", out)
}

/// Handle to the user table plus the runner used for its writes.
#[derive(Clone)]
pub struct UserStore {
    pub(crate) pool: Pool<Sqlite>,
    pub(crate) runner: TxRunner,
    pub(crate) batch_size: usize,
}

impl UserStore {
    /// Connect using the configured URL, pool size and retry policy.
    pub async fn open(cfg: &TxRetryConfig) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(cfg.max_connections.max(1))
            .connect(&cfg.database_url)
            .await?;
        let store = UserStore {
            pool,
            runner: TxRunner::new(cfg.classifier()),
            batch_size: cfg.batch_size.max(1),
        };
        store.migrate().await?;
        Ok(store)
    }

    /// Open (or create) the database at a specific path. Creates parent dirs if needed.
    pub async fn open_at(path: impl AsRef<Path>, runner: TxRunner) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let uri = path_to_sqlite_uri(path) + "?mode=rwc";
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect(&uri)
            .await?;
        let store = UserStore {
            pool,
            runner,
            batch_size: TxRetryConfig::default().batch_size,
        };
        store.migrate().await?;
        tracing::info!("opened user store at {}", path.display());
        Ok(store)
    }

    pub fn runner(&self) -> &TxRunner {
        &self.runner
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE,
                created_at INTEGER NOT NULL,
                updated_at INTEGER
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Current time as Unix seconds (for row timestamps).
pub(crate) fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
/// Open an in-memory store for tests (no disk I/O).
pub(crate) async fn open_memory(runner: TxRunner, batch_size: usize) -> Result<UserStore> {
    // Single connection so the pool never hands back a different empty DB.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    let store = UserStore {
        pool,
        runner,
        batch_size,
    };
    store.migrate().await?;
    Ok(store)
}
