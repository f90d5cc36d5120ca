//! Integration test: on-disk store driven by a config file, plus the
//! executor under concurrent, independent callers.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tempfile::tempdir;
use txretry_core::config::{self, StatePreset};
use txretry_core::control::CancelToken;
use txretry_core::retry::{
    run_with_retry, Classifier, RecognizedStates, RetryDecision, RetryExecutor, RetryPolicy,
    SqlError, TxError,
};
use txretry_core::store::{NewUser, UserStore};
use txretry_core::tx::TxRunner;

/// Application error wrapping driver errors, the way a service layer would.
#[derive(Debug, thiserror::Error)]
enum ServiceError {
    #[error("user service failed")]
    Db(#[source] SqlError),
    #[error("invalid input: {0}")]
    Invalid(String),
}

#[tokio::test]
async fn store_on_disk_uses_configured_classifier() {
    let dir = tempdir().unwrap();
    let cfg_path = dir.path().join("config.toml");
    std::fs::write(
        &cfg_path,
        r#"
        database_url = "sqlite::memory:"
        max_connections = 1
        batch_size = 8

        [retry]
        max_attempts = 4
        backoff_ms = 1
        states = "connection-aware"
        "#,
    )
    .unwrap();
    let cfg = config::load_from(&cfg_path).unwrap();
    assert_eq!(cfg.retry().states, StatePreset::ConnectionAware);

    let db_path = dir.path().join("nested dir").join("users.db");
    let store = UserStore::open_at(&db_path, TxRunner::new(cfg.classifier()))
        .await
        .unwrap();
    assert!(db_path.exists());

    let batch: Vec<NewUser> = (0..20)
        .map(|i| NewUser::new(format!("n{i}"), format!("n{i}@example.com")))
        .collect();
    assert_eq!(store.insert_users(&batch).await.unwrap(), 20);

    // Connection loss is retried up to the configured budget of 4.
    let mut calls = 0u32;
    let out: Result<(), TxError> = store
        .runner()
        .run(store.pool(), |_tx| {
            calls += 1;
            Box::pin(async {
                Err::<(), TxError>(SqlError::new("connection does not exist", Some("08003")).into())
            })
        })
        .await;
    assert!(out.is_err());
    assert_eq!(calls, 4);

    assert_eq!(store.update_users().await.unwrap(), 20);
    assert_eq!(store.delete_users().await.unwrap(), 20);
    assert_eq!(store.count_users().await.unwrap(), 0);
}

#[tokio::test]
async fn store_open_from_default_config() {
    let cfg = config::TxRetryConfig::default();
    let store = UserStore::open(&cfg).await.unwrap();
    let id = store
        .insert_user(&NewUser::new("Grace", "grace@example.com"))
        .await
        .unwrap();
    assert_eq!(store.select_user(id).await.unwrap().unwrap().name, "Grace");
}

#[test]
fn wrapped_service_errors_are_classified_by_cause() {
    let classifier = Classifier::serialization_only();
    let calls = AtomicU32::new(0);
    let out = run_with_retry(&classifier, || {
        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
        if n < 3 {
            Err(ServiceError::Db(SqlError::new("restart", Some("40001"))))
        } else {
            Ok(n)
        }
    });
    assert_eq!(out.unwrap(), 3);

    let calls = AtomicU32::new(0);
    let out: Result<(), ServiceError> = run_with_retry(&classifier, || {
        calls.fetch_add(1, Ordering::SeqCst);
        Err(ServiceError::Invalid("bad email".into()))
    });
    assert!(matches!(out, Err(ServiceError::Invalid(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn concurrent_callers_do_not_share_attempt_state() {
    let classifier = Arc::new(Classifier::new(
        RecognizedStates::serialization_only(),
        RetryPolicy::fixed(3, Duration::from_millis(1)),
    ));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let classifier = Arc::clone(&classifier);
            std::thread::spawn(move || {
                let mut calls = 0u32;
                let out: Result<u32, SqlError> = run_with_retry(&classifier, || {
                    calls += 1;
                    // Even callers conflict once; odd callers never succeed.
                    match (i % 2, calls) {
                        (0, 1) => Err(SqlError::new("conflict", Some("40001"))),
                        (0, _) => Ok(calls),
                        _ => Err(SqlError::new("conflict", Some("40001"))),
                    }
                });
                (i, out.is_ok(), calls)
            })
        })
        .collect();

    for handle in handles {
        let (i, ok, calls) = handle.join().unwrap();
        if i % 2 == 0 {
            assert!(ok);
            assert_eq!(calls, 2);
        } else {
            assert!(!ok);
            assert_eq!(calls, 3);
        }
    }
}

#[test]
fn caller_can_abandon_long_retry_sequence() {
    let token = CancelToken::new();
    let executor = RetryExecutor::new(|_: &SqlError| {
        RetryDecision::Retry(RetryPolicy::fixed(u32::MAX, Duration::from_millis(50)))
    })
    .with_cancel(token.clone());

    let calls = AtomicU32::new(0);
    let out: Result<(), SqlError> = executor.run(|| {
        if calls.fetch_add(1, Ordering::SeqCst) + 1 == 3 {
            token.cancel();
        }
        Err(SqlError::new("conflict", Some("40001")))
    });
    assert!(out.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}
