//! User write operations. Each call is one transaction, re-run as a whole on
//! retryable failures.

use anyhow::Result;
use sqlx::{QueryBuilder, Row, Sqlite};

use super::super::db::{unix_timestamp, UserStore};
use super::super::types::{NewUser, UserId};
use crate::retry::classify::SERIALIZATION_FAILURE;
use crate::retry::{SqlError, TxError};

impl UserStore {
    /// Insert all `users` in one transaction, `batch_size` rows per statement.
    /// Returns the number of rows inserted.
    pub async fn insert_users(&self, users: &[NewUser]) -> Result<u64> {
        if users.is_empty() {
            return Ok(0);
        }
        let users = users.to_vec();
        let batch_size = self.batch_size;

        let inserted = self
            .runner
            .run(&self.pool, |tx| {
                let users = users.clone();
                Box::pin(async move {
                    let now = unix_timestamp();
                    let mut inserted = 0u64;
                    for chunk in users.chunks(batch_size) {
                        let mut builder: QueryBuilder<Sqlite> =
                            QueryBuilder::new("INSERT INTO users (name, email, created_at) ");
                        builder.push_values(chunk, |mut row, user| {
                            row.push_bind(user.name.clone())
                                .push_bind(user.email.clone())
                                .push_bind(now);
                        });
                        let done = builder.build().execute(&mut **tx).await?;
                        tracing::debug!(rows = done.rows_affected(), "inserted user batch");
                        inserted += done.rows_affected();
                    }
                    Ok::<_, TxError>(inserted)
                })
            })
            .await?;

        Ok(inserted)
    }

    pub async fn insert_user(&self, user: &NewUser) -> Result<UserId> {
        let user = user.clone();
        let id = self
            .runner
            .run(&self.pool, |tx| {
                let user = user.clone();
                Box::pin(async move {
                    let id = sqlx::query(
                        r#"
                        INSERT INTO users (name, email, created_at)
                        VALUES (?1, ?2, ?3)
                        "#,
                    )
                    .bind(user.name)
                    .bind(user.email)
                    .bind(unix_timestamp())
                    .execute(&mut **tx)
                    .await?
                    .last_insert_rowid();
                    Ok::<_, TxError>(id)
                })
            })
            .await?;

        Ok(id)
    }

    /// Stamp `updated_at` on every user not yet updated. Returns rows changed.
    pub async fn update_users(&self) -> Result<u64> {
        let changed = self
            .runner
            .run(&self.pool, |tx| {
                Box::pin(async move {
                    let done = sqlx::query(
                        r#"
                        UPDATE users
                        SET updated_at = ?1
                        WHERE updated_at IS NULL
                        "#,
                    )
                    .bind(unix_timestamp())
                    .execute(&mut **tx)
                    .await?;
                    Ok::<_, TxError>(done.rows_affected())
                })
            })
            .await?;

        Ok(changed)
    }

    pub async fn update_user(&self, id: UserId) -> Result<u64> {
        let changed = self
            .runner
            .run(&self.pool, |tx| {
                Box::pin(async move {
                    let done = sqlx::query(
                        r#"
                        UPDATE users
                        SET updated_at = ?1
                        WHERE id = ?2
                        "#,
                    )
                    .bind(unix_timestamp())
                    .bind(id)
                    .execute(&mut **tx)
                    .await?;
                    Ok::<_, TxError>(done.rows_affected())
                })
            })
            .await?;

        Ok(changed)
    }

    /// Delete every user that has been updated. Returns rows removed.
    pub async fn delete_users(&self) -> Result<u64> {
        let removed = self
            .runner
            .run(&self.pool, |tx| {
                Box::pin(async move {
                    let done = sqlx::query("DELETE FROM users WHERE updated_at IS NOT NULL")
                        .execute(&mut **tx)
                        .await?;
                    Ok::<_, TxError>(done.rows_affected())
                })
            })
            .await?;

        Ok(removed)
    }

    /// Insert `user`, count all users, then stamp the new row's `updated_at`,
    /// all in one transaction. With `force_retry` the first attempt ends in a
    /// serialization failure after doing its writes, so the whole transaction
    /// is rolled back and re-run. Returns the new id and the count seen.
    pub async fn save_count_update(
        &self,
        user: &NewUser,
        force_retry: bool,
    ) -> Result<(UserId, i64)> {
        let user = user.clone();
        let mut attempt = 0u32;
        let out = self
            .runner
            .run(&self.pool, |tx| {
                attempt += 1;
                let first = attempt == 1;
                let user = user.clone();
                Box::pin(async move {
                    let id = sqlx::query(
                        "INSERT INTO users (name, email, created_at) VALUES (?1, ?2, ?3)",
                    )
                    .bind(user.name)
                    .bind(user.email)
                    .bind(unix_timestamp())
                    .execute(&mut **tx)
                    .await?
                    .last_insert_rowid();

                    let count: i64 = sqlx::query("SELECT COUNT(*) AS n FROM users")
                        .fetch_one(&mut **tx)
                        .await?
                        .get("n");
                    tracing::debug!(id, count, "saved user");

                    sqlx::query("UPDATE users SET updated_at = ?1 WHERE id = ?2")
                        .bind(unix_timestamp())
                        .bind(id)
                        .execute(&mut **tx)
                        .await?;

                    if force_retry && first {
                        tracing::debug!(id, "forcing transaction retry");
                        return Err(SqlError::new(
                            "forced transaction retry",
                            Some(SERIALIZATION_FAILURE),
                        )
                        .into());
                    }
                    Ok::<_, TxError>((id, count))
                })
            })
            .await?;

        Ok(out)
    }
}
