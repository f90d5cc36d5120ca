//! Tests for the user store (use in-memory DB helper from db).

use crate::retry::{Classifier, RecognizedStates, RetryPolicy, SqlError, TxError};
use crate::store::db::open_memory;
use crate::store::NewUser;
use crate::tx::TxRunner;

fn users(n: usize) -> Vec<NewUser> {
    (0..n)
        .map(|i| NewUser::new(format!("user {i}"), format!("user{i}@example.com")))
        .collect()
}

async fn store(batch_size: usize) -> crate::store::UserStore {
    open_memory(TxRunner::new(Classifier::connection_aware()), batch_size)
        .await
        .unwrap()
}

#[tokio::test]
async fn crud_flow() {
    let store = store(4).await;

    let inserted = store.insert_users(&users(10)).await.unwrap();
    assert_eq!(inserted, 10);
    assert_eq!(store.count_users().await.unwrap(), 10);
    assert_eq!(store.select_users().await.unwrap().len(), 10);

    let changed = store.update_users().await.unwrap();
    assert_eq!(changed, 10);
    assert!(store.select_users().await.unwrap().is_empty());

    let removed = store.delete_users().await.unwrap();
    assert_eq!(removed, 10);
    assert_eq!(store.count_users().await.unwrap(), 0);
}

#[tokio::test]
async fn single_user_roundtrip() {
    let store = store(16).await;
    let id = store
        .insert_user(&NewUser::new("Ada", "ada@example.com"))
        .await
        .unwrap();

    let user = store.select_user(id).await.unwrap().expect("user exists");
    assert_eq!(user.name, "Ada");
    assert_eq!(user.email, "ada@example.com");
    assert!(user.updated_at.is_none());

    assert_eq!(store.update_user(id).await.unwrap(), 1);
    let user = store.select_user(id).await.unwrap().unwrap();
    assert!(user.updated_at.is_some());

    assert!(store.select_user(id + 1).await.unwrap().is_none());
}

#[tokio::test]
async fn empty_insert_is_a_no_op() {
    let store = store(16).await;
    assert_eq!(store.insert_users(&[]).await.unwrap(), 0);
    assert_eq!(store.count_users().await.unwrap(), 0);
}

#[tokio::test]
async fn failed_batch_leaves_no_rows() {
    let store = store(2).await;
    let mut batch = users(5);
    // Duplicate email violates UNIQUE in the last chunk.
    batch.push(NewUser::new("dup", "user0@example.com"));

    let err = store.insert_users(&batch).await.unwrap_err();
    // Constraint violations are not transient.
    assert!(!store.runner().classifier().is_retryable(Some(&*err)));
    assert!(err.downcast_ref::<TxError>().is_some());
    assert_eq!(store.count_users().await.unwrap(), 0);
}

#[tokio::test]
async fn conflicting_writer_is_retried_as_whole_transaction() {
    let store = store(16).await;
    store.insert_users(&users(3)).await.unwrap();

    let mut calls = 0u32;
    let changed = store
        .runner()
        .run(store.pool(), |tx| {
            calls += 1;
            let attempt = calls;
            Box::pin(async move {
                let done = sqlx::query("UPDATE users SET updated_at = 1 WHERE updated_at IS NULL")
                    .execute(&mut **tx)
                    .await?;
                if attempt == 1 {
                    return Err(SqlError::new("restart transaction", Some("40001")).into());
                }
                Ok::<_, TxError>(done.rows_affected())
            })
        })
        .await
        .unwrap();

    assert_eq!(calls, 2);
    // First attempt was rolled back, so the second saw all three rows.
    assert_eq!(changed, 3);
}

#[tokio::test]
async fn save_count_update_runs_in_one_transaction() {
    let store = store(16).await;
    store.insert_users(&users(2)).await.unwrap();

    let (id, count) = store
        .save_count_update(&NewUser::new("Jane", "jane@example.com"), false)
        .await
        .unwrap();
    assert_eq!(count, 3);
    let user = store.select_user(id).await.unwrap().unwrap();
    assert!(user.updated_at.is_some());
}

#[tokio::test]
async fn forced_retry_reruns_whole_transaction() {
    let store = store(16).await;
    let (id, count) = store
        .save_count_update(&NewUser::new("Jane", "jane@example.com"), true)
        .await
        .unwrap();
    // The first attempt's insert was rolled back.
    assert_eq!(count, 1);
    assert_eq!(store.count_users().await.unwrap(), 1);
    assert!(store.select_user(id).await.unwrap().unwrap().updated_at.is_some());
}

#[tokio::test]
async fn forced_retry_without_budget_leaves_nothing() {
    let runner = TxRunner::new(Classifier::new(
        RecognizedStates::serialization_only(),
        RetryPolicy::never(),
    ));
    let store = open_memory(runner, 16).await.unwrap();
    let err = store
        .save_count_update(&NewUser::new("Jane", "jane@example.com"), true)
        .await
        .unwrap_err();
    assert!(matches!(err.downcast_ref::<TxError>(), Some(TxError::State(_))));
    assert_eq!(store.count_users().await.unwrap(), 0);
}
