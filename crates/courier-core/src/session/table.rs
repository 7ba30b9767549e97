//! In-memory session table.
//!
//! Single source of truth for what is running right now. The table itself is
//! a plain map; the manager guards it with one mutex and keeps every
//! get-then-act sequence inside a single critical section, which is what
//! makes the at-most-one-handle-per-tenant invariant hold.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::connect::ConnectionLink;
use crate::store::{SessionHealth, SessionStatus};

/// Live, in-memory representation of one tenant's session.
///
/// Owns the connection link and the event-pump task. Never persisted; only
/// the derived credential snapshot reaches the durable store.
pub struct SessionHandle {
    /// Tenant number.
    pub number: String,
    /// Sendable half of the connection.
    pub link: Arc<dyn ConnectionLink>,
    /// Lifecycle status.
    pub status: SessionStatus,
    /// Health indicator.
    pub health: SessionHealth,
    /// When the connection attempt started.
    pub created_at: DateTime<Utc>,
    /// Last lifecycle activity.
    pub last_active: DateTime<Utc>,
    pump: Option<JoinHandle<()>>,
}

impl SessionHandle {
    /// Creates a handle in the connecting state.
    pub fn new(number: String, link: Arc<dyn ConnectionLink>) -> Self {
        let now = Utc::now();
        Self {
            number,
            link,
            status: SessionStatus::Connecting,
            health: SessionHealth::Reconnecting,
            created_at: now,
            last_active: now,
            pump: None,
        }
    }

    /// Updates the last-active timestamp.
    pub fn touch(&mut self) {
        self.last_active = Utc::now();
    }

    /// Total age of the handle.
    pub fn age(&self) -> chrono::Duration {
        Utc::now().signed_duration_since(self.created_at)
    }

    /// Time since the last lifecycle activity.
    pub fn idle(&self) -> chrono::Duration {
        Utc::now().signed_duration_since(self.last_active)
    }

    /// Attaches the event-pump task.
    pub(crate) fn set_pump(&mut self, pump: JoinHandle<()>) {
        self.pump = Some(pump);
    }

    /// Aborts the event-pump task, if any.
    ///
    /// Not called when the pump removes its own session; the pump ends
    /// itself by breaking out of its receive loop instead.
    pub(crate) fn abort_pump(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        // A handle that leaves the table takes its pump with it.
        self.abort_pump();
    }
}

/// Map from tenant number to live session handle.
#[derive(Default)]
pub struct SessionTable {
    inner: HashMap<String, SessionHandle>,
}

impl SessionTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the handle for a number.
    pub fn get(&self, number: &str) -> Option<&SessionHandle> {
        self.inner.get(number)
    }

    /// Returns the handle for a number, mutably.
    pub fn get_mut(&mut self, number: &str) -> Option<&mut SessionHandle> {
        self.inner.get_mut(number)
    }

    /// Inserts a handle, returning any handle it replaced.
    pub fn insert(&mut self, handle: SessionHandle) -> Option<SessionHandle> {
        self.inner.insert(handle.number.clone(), handle)
    }

    /// Removes and returns the handle for a number.
    pub fn remove(&mut self, number: &str) -> Option<SessionHandle> {
        self.inner.remove(number)
    }

    /// Whether a handle exists for the number.
    pub fn contains(&self, number: &str) -> bool {
        self.inner.contains_key(number)
    }

    /// All tenant numbers with a live handle.
    pub fn numbers(&self) -> Vec<String> {
        self.inner.keys().cloned().collect()
    }

    /// Iterates over all handles.
    pub fn iter(&self) -> impl Iterator<Item = &SessionHandle> {
        self.inner.values()
    }

    /// Number of live handles.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Removes and returns every handle; used during shutdown.
    pub fn drain(&mut self) -> Vec<SessionHandle> {
        self.inner.drain().map(|(_, handle)| handle).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connect::{ConnectionEvent, Connector, LoopbackConnector};

    async fn handle(number: &str) -> SessionHandle {
        let connector = LoopbackConnector::manual();
        let conn = connector.connect(number, None).await.unwrap();
        SessionHandle::new(number.to_string(), conn.link)
    }

    #[tokio::test]
    async fn test_insert_get_remove() {
        let mut table = SessionTable::new();
        assert!(table.is_empty());

        table.insert(handle("111").await);
        table.insert(handle("222").await);
        assert_eq!(table.len(), 2);
        assert!(table.contains("111"));
        assert_eq!(table.get("111").unwrap().status, SessionStatus::Connecting);

        let removed = table.remove("111").unwrap();
        assert_eq!(removed.number, "111");
        assert!(!table.contains("111"));
        assert_eq!(table.len(), 1);
    }

    #[tokio::test]
    async fn test_insert_replaces_existing_handle() {
        let mut table = SessionTable::new();
        table.insert(handle("111").await);

        let mut replacement = handle("111").await;
        replacement.status = SessionStatus::Active;
        let old = table.insert(replacement);

        assert!(old.is_some());
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("111").unwrap().status, SessionStatus::Active);
    }

    #[tokio::test]
    async fn test_touch_advances_last_active() {
        let mut table = SessionTable::new();
        table.insert(handle("111").await);

        let before = table.get("111").unwrap().last_active;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        table.get_mut("111").unwrap().touch();
        assert!(table.get("111").unwrap().last_active > before);
    }

    #[tokio::test]
    async fn test_emitting_into_manual_connector_reaches_latest_channel() {
        // Regression guard for reconnects: the connector tracks the most
        // recent connection per number.
        let connector = LoopbackConnector::manual();
        let _first = connector.connect("111", None).await.unwrap();
        let mut second = connector.connect("111", None).await.unwrap();

        assert!(connector.emit("111", ConnectionEvent::Opened).await);
        assert_eq!(second.events.recv().await.unwrap(), ConnectionEvent::Opened);
    }
}
