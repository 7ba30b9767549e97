//! Integration tests for the SQLite session store.

mod common;

use chrono::{Duration, Utc};
use common::snapshot;
use courier_core::store::{
    RecordFilter, SessionHealth, SessionStatus, SessionStore, SqliteStore,
};

#[tokio::test]
async fn test_upsert_and_find_round_trip() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.upsert("94741671668", &snapshot("a")).await.unwrap();

    let record = store.find("94741671668").await.unwrap().unwrap();
    assert_eq!(record.number, "94741671668");
    assert_eq!(record.snapshot, snapshot("a"));
    assert_eq!(record.status, SessionStatus::Active);
    assert_eq!(record.health, SessionHealth::Active);
    assert_eq!(record.failed_attempts, 0);
}

#[tokio::test]
async fn test_find_absent_returns_none() {
    let store = SqliteStore::open_in_memory().unwrap();
    assert!(store.find("404").await.unwrap().is_none());
}

#[tokio::test]
async fn test_upsert_is_idempotent() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.upsert("111", &snapshot("a")).await.unwrap();
    let first = store.find("111").await.unwrap().unwrap();

    store.upsert("111", &snapshot("a")).await.unwrap();
    let second = store.find("111").await.unwrap().unwrap();

    assert_eq!(second.snapshot, first.snapshot);
    assert_eq!(second.status, first.status);
    assert_eq!(second.health, first.health);
    assert_eq!(second.failed_attempts, first.failed_attempts);
    assert_eq!(second.created_at, first.created_at);
    // Still a single record.
    assert_eq!(store.counts().await.unwrap().total, 1);
}

#[tokio::test]
async fn test_upsert_resets_failure_state() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.upsert("111", &snapshot("a")).await.unwrap();
    store.bump_failed_attempts("111").await.unwrap();
    store.bump_failed_attempts("111").await.unwrap();

    let degraded = store.find("111").await.unwrap().unwrap();
    assert_eq!(degraded.failed_attempts, 2);
    assert_eq!(degraded.status, SessionStatus::Disconnected);
    assert_eq!(degraded.health, SessionHealth::Reconnecting);

    store.upsert("111", &snapshot("b")).await.unwrap();
    let restored = store.find("111").await.unwrap().unwrap();
    assert_eq!(restored.failed_attempts, 0);
    assert_eq!(restored.status, SessionStatus::Active);
    assert_eq!(restored.health, SessionHealth::Active);
    assert_eq!(restored.snapshot, snapshot("b"));
}

#[tokio::test]
async fn test_update_status_does_not_touch_credentials() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.upsert("111", &snapshot("a")).await.unwrap();

    store
        .update_status("111", SessionStatus::Failed, Some(SessionHealth::Disconnected))
        .await
        .unwrap();

    let record = store.find("111").await.unwrap().unwrap();
    assert_eq!(record.status, SessionStatus::Failed);
    assert_eq!(record.health, SessionHealth::Disconnected);
    assert_eq!(record.snapshot, snapshot("a"));
}

#[tokio::test]
async fn test_update_status_without_health_keeps_health() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.upsert("111", &snapshot("a")).await.unwrap();

    store.update_status("111", SessionStatus::Waiting, None).await.unwrap();

    let record = store.find("111").await.unwrap().unwrap();
    assert_eq!(record.status, SessionStatus::Waiting);
    assert_eq!(record.health, SessionHealth::Active);
}

#[tokio::test]
async fn test_update_status_on_missing_record_is_noop() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.update_status("404", SessionStatus::Failed, None).await.unwrap();
    assert!(store.find("404").await.unwrap().is_none());
}

#[tokio::test]
async fn test_delete_removes_record() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.upsert("111", &snapshot("a")).await.unwrap();
    store.delete("111").await.unwrap();
    assert!(store.find("111").await.unwrap().is_none());
    // Deleting again is a no-op.
    store.delete("111").await.unwrap();
}

#[tokio::test]
async fn test_find_many_filters_by_status_and_attempts() {
    let store = SqliteStore::open_in_memory().unwrap();

    store.upsert("active", &snapshot("a")).await.unwrap();

    store.upsert("fresh-disconnect", &snapshot("b")).await.unwrap();
    store
        .update_status("fresh-disconnect", SessionStatus::Disconnected, None)
        .await
        .unwrap();

    store.upsert("exhausted", &snapshot("c")).await.unwrap();
    store.bump_failed_attempts("exhausted").await.unwrap();
    store.bump_failed_attempts("exhausted").await.unwrap();

    let filter = RecordFilter::default()
        .with_statuses(&[SessionStatus::Disconnected])
        .attempts_below(2);
    let records = store.find_many(&filter).await.unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].number, "fresh-disconnect");
}

#[tokio::test]
async fn test_find_many_age_bounds() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.upsert("111", &snapshot("a")).await.unwrap();

    let past = Utc::now() - Duration::hours(1);
    let future = Utc::now() + Duration::hours(1);

    let recent = RecordFilter::default().active_after(past);
    assert_eq!(store.find_many(&recent).await.unwrap().len(), 1);

    let too_recent = RecordFilter::default().active_after(future);
    assert!(store.find_many(&too_recent).await.unwrap().is_empty());

    let updated_long_ago = RecordFilter::default().updated_before(past);
    assert!(store.find_many(&updated_long_ago).await.unwrap().is_empty());

    let updated_recently = RecordFilter::default().updated_before(future);
    assert_eq!(store.find_many(&updated_recently).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_find_many_empty_statuses_matches_all() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.upsert("111", &snapshot("a")).await.unwrap();
    store.upsert("222", &snapshot("b")).await.unwrap();
    store.update_status("222", SessionStatus::Invalid, None).await.unwrap();

    let all = store.find_many(&RecordFilter::default()).await.unwrap();
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn test_counts_by_status() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.upsert("1", &snapshot("a")).await.unwrap();
    store.upsert("2", &snapshot("b")).await.unwrap();
    store.upsert("3", &snapshot("c")).await.unwrap();
    store.update_status("2", SessionStatus::Disconnected, None).await.unwrap();
    store.update_status("3", SessionStatus::Invalid, None).await.unwrap();

    let counts = store.counts().await.unwrap();
    assert_eq!(counts.total, 3);
    assert_eq!(counts.active, 1);
    assert_eq!(counts.disconnected, 1);
    assert_eq!(counts.invalid, 1);
    assert_eq!(counts.failed, 0);
}

#[tokio::test]
async fn test_ping() {
    let store = SqliteStore::open_in_memory().unwrap();
    assert!(store.ping().await);
}
