//! Shared test harness: a manager wired to a manual loopback connector and
//! an in-memory store, with timers shortened for test speed.
#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tempfile::TempDir;

use courier_core::config::CourierConfig;
use courier_core::connect::{CredentialSnapshot, LoopbackConnector};
use courier_core::dispatch::NoopHandler;
use courier_core::session::SessionManager;
use courier_core::store::{
    RecordFilter, SessionHealth, SessionRecord, SessionStatus, SessionStore, SqliteStore,
    StoreCounts, StoreError, StoreResult,
};

pub struct TestHarness {
    pub manager: Arc<SessionManager>,
    pub connector: Arc<LoopbackConnector>,
    pub store: Arc<dyn SessionStore>,
    pub cfg: Arc<CourierConfig>,
    // Holds the temp credential root alive for the test's duration.
    pub creds_dir: TempDir,
}

/// Builds a harness over the given store, applying `tweak` to the config.
pub fn harness_with_store(
    store: Arc<dyn SessionStore>,
    tweak: impl FnOnce(&mut CourierConfig),
) -> TestHarness {
    let creds_dir = TempDir::new().expect("temp credential dir");
    let mut cfg = CourierConfig::default();
    cfg.credentials_dir = creds_dir.path().to_path_buf();
    cfg.limits.reconnect_delay_secs = 0;
    cfg.limits.restore_pacing_ms = 0;
    tweak(&mut cfg);
    let cfg = Arc::new(cfg);

    let connector = Arc::new(LoopbackConnector::manual());
    let connector_dyn: Arc<dyn courier_core::connect::Connector> = connector.clone();
    let manager =
        SessionManager::new(Arc::clone(&cfg), Arc::clone(&store), connector_dyn, Arc::new(NoopHandler))
            .expect("manager construction");

    TestHarness { manager, connector, store, cfg, creds_dir }
}

/// Harness over a fresh in-memory store.
pub fn harness(tweak: impl FnOnce(&mut CourierConfig)) -> TestHarness {
    let store: Arc<dyn SessionStore> =
        Arc::new(SqliteStore::open_in_memory().expect("in-memory store"));
    harness_with_store(store, tweak)
}

/// Lets in-flight event pumps and timers run.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

pub fn snapshot(tag: &str) -> CredentialSnapshot {
    CredentialSnapshot::new(serde_json::json!({ "creds": tag, "keys": {} }))
}

/// Store wrapper whose calls fail on demand, simulating an unreachable
/// backing store.
pub struct FlakyStore {
    inner: SqliteStore,
    fail: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: SqliteStore::open_in_memory().expect("in-memory store"),
            fail: AtomicBool::new(false),
        }
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    fn check(&self) -> StoreResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store offline (test)".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStore for FlakyStore {
    async fn upsert(&self, number: &str, snapshot: &CredentialSnapshot) -> StoreResult<()> {
        self.check()?;
        self.inner.upsert(number, snapshot).await
    }

    async fn find(&self, number: &str) -> StoreResult<Option<SessionRecord>> {
        self.check()?;
        self.inner.find(number).await
    }

    async fn find_many(&self, filter: &RecordFilter) -> StoreResult<Vec<SessionRecord>> {
        self.check()?;
        self.inner.find_many(filter).await
    }

    async fn update_status(
        &self,
        number: &str,
        status: SessionStatus,
        health: Option<SessionHealth>,
    ) -> StoreResult<()> {
        self.check()?;
        self.inner.update_status(number, status, health).await
    }

    async fn bump_failed_attempts(&self, number: &str) -> StoreResult<()> {
        self.check()?;
        self.inner.bump_failed_attempts(number).await
    }

    async fn delete(&self, number: &str) -> StoreResult<()> {
        self.check()?;
        self.inner.delete(number).await
    }

    async fn counts(&self) -> StoreResult<StoreCounts> {
        self.check()?;
        self.inner.counts().await
    }

    async fn ping(&self) -> bool {
        self.check().is_ok() && self.inner.ping().await
    }
}
