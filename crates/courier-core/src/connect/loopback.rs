//! In-memory loopback transport.
//!
//! Always connects, never touches the network. Used by tests to drive the
//! lifecycle state machine deterministically and by the server binary as the
//! default transport for local development.

use async_trait::async_trait;
use rand::Rng;
use rand::distributions::Alphanumeric;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, mpsc};
use tracing::debug;

use super::{
    ConnectError, Connection, ConnectionEvent, ConnectionLink, Connector, CredentialSnapshot,
};

/// Event channel capacity per connection.
const EVENT_BUFFER: usize = 32;

/// Length of generated pairing codes.
const PAIRING_CODE_LEN: usize = 8;

/// Loopback connector for development and tests.
///
/// Keeps the event sender of the most recent connection per number so tests
/// can inject lifecycle events with [`emit`](Self::emit).
pub struct LoopbackConnector {
    auto_open: bool,
    fail_connect: AtomicBool,
    channels: Mutex<HashMap<String, mpsc::Sender<ConnectionEvent>>>,
}

impl LoopbackConnector {
    /// Creates a connector that emits `Opened` as soon as a connection is made.
    pub fn new() -> Self {
        Self {
            auto_open: true,
            fail_connect: AtomicBool::new(false),
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a connector that emits nothing on its own; events are injected
    /// with [`emit`](Self::emit).
    pub fn manual() -> Self {
        Self { auto_open: false, ..Self::new() }
    }

    /// Makes subsequent `connect` calls fail with [`ConnectError::Init`].
    pub fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Injects an event into the most recent connection for `number`.
    ///
    /// Returns `false` when no connection exists or its pump is gone.
    pub async fn emit(&self, number: &str, event: ConnectionEvent) -> bool {
        let sender = self.channels.lock().await.get(number).cloned();
        match sender {
            Some(tx) => tx.send(event).await.is_ok(),
            None => false,
        }
    }
}

impl Default for LoopbackConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for LoopbackConnector {
    async fn connect(
        &self,
        number: &str,
        snapshot: Option<&CredentialSnapshot>,
    ) -> Result<Connection, ConnectError> {
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(ConnectError::Init {
                number: number.to_string(),
                reason: "loopback transport set to fail".to_string(),
            });
        }

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let snapshot = snapshot.cloned().unwrap_or_else(|| {
            CredentialSnapshot::new(serde_json::json!({
                "transport": "loopback",
                "number": number,
                "keys": {},
            }))
        });

        let link = Arc::new(LoopbackLink {
            number: number.to_string(),
            snapshot: std::sync::Mutex::new(snapshot),
            events: tx.clone(),
            closed: AtomicBool::new(false),
        });

        self.channels.lock().await.insert(number.to_string(), tx.clone());

        if self.auto_open {
            // Buffered; consumed once the event pump starts.
            let _ = tx.send(ConnectionEvent::Opened).await;
        }

        debug!(number = %number, "Loopback connection established");
        Ok(Connection { link, events: rx })
    }
}

/// Sendable half of a loopback connection.
struct LoopbackLink {
    number: String,
    snapshot: std::sync::Mutex<CredentialSnapshot>,
    events: mpsc::Sender<ConnectionEvent>,
    closed: AtomicBool,
}

impl LoopbackLink {
    fn ensure_open(&self) -> Result<(), ConnectError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ConnectError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl ConnectionLink for LoopbackLink {
    async fn send_text(&self, chat: &str, _body: &str) -> Result<(), ConnectError> {
        self.ensure_open()?;
        debug!(number = %self.number, chat = %chat, "Loopback send");
        Ok(())
    }

    async fn join(&self, _invite_code: &str) -> Result<(), ConnectError> {
        self.ensure_open()
    }

    async fn subscribe(&self, _channel: &str) -> Result<(), ConnectError> {
        self.ensure_open()
    }

    async fn request_pairing_code(&self) -> Result<String, ConnectError> {
        self.ensure_open()?;
        let code: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(PAIRING_CODE_LEN)
            .map(char::from)
            .collect::<String>()
            .to_uppercase();
        Ok(code)
    }

    fn credentials(&self) -> CredentialSnapshot {
        self.snapshot.lock().expect("snapshot lock poisoned").clone()
    }

    async fn logout(&self) -> Result<(), ConnectError> {
        self.closed.store(true, Ordering::SeqCst);
        // Mirror a remote logout so the state machine observes it if the
        // session is still pumping events.
        let _ = self.events.send(ConnectionEvent::ClosedLoggedOut).await;
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_emits_opened_when_auto() {
        let connector = LoopbackConnector::new();
        let mut conn = connector.connect("94741671668", None).await.unwrap();
        let event = conn.events.recv().await.unwrap();
        assert_eq!(event, ConnectionEvent::Opened);
    }

    #[tokio::test]
    async fn test_manual_connector_is_silent() {
        let connector = LoopbackConnector::manual();
        let mut conn = connector.connect("94741671668", None).await.unwrap();
        assert!(conn.events.try_recv().is_err());

        assert!(connector.emit("94741671668", ConnectionEvent::Opened).await);
        assert_eq!(conn.events.recv().await.unwrap(), ConnectionEvent::Opened);
    }

    #[tokio::test]
    async fn test_connect_failure_is_init_error() {
        let connector = LoopbackConnector::new();
        connector.set_fail_connect(true);
        let err = connector.connect("123", None).await.unwrap_err();
        match err {
            ConnectError::Init { number, .. } => assert_eq!(number, "123"),
            other => panic!("Expected Init error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_seed_snapshot_is_kept() {
        let connector = LoopbackConnector::manual();
        let seed = CredentialSnapshot::new(serde_json::json!({"creds": "seeded"}));
        let conn = connector.connect("123", Some(&seed)).await.unwrap();
        assert_eq!(conn.link.credentials(), seed);
    }

    #[tokio::test]
    async fn test_pairing_code_shape() {
        let connector = LoopbackConnector::manual();
        let conn = connector.connect("123", None).await.unwrap();
        let code = conn.link.request_pairing_code().await.unwrap();
        assert_eq!(code.len(), PAIRING_CODE_LEN);
        assert!(code.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[tokio::test]
    async fn test_closed_link_rejects_sends() {
        let connector = LoopbackConnector::manual();
        let conn = connector.connect("123", None).await.unwrap();
        conn.link.close().await;
        assert!(matches!(conn.link.send_text("chat", "hi").await, Err(ConnectError::Closed)));
    }
}
