//! Connection boundary for the underlying messaging protocol.
//!
//! The session manager is independent of the wire protocol it rides on. This
//! module defines the seam: a [`Connector`] produces a live [`Connection`]
//! (a sendable link plus an ordered event stream), and everything the core
//! needs to know about the transport flows through [`ConnectionEvent`].
//! The [`loopback`] transport implements the seam in memory for development
//! and tests.

pub mod loopback;

pub use loopback::LoopbackConnector;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Opaque serializable credential state.
///
/// Sufficient to resume an authenticated connection without re-pairing. The
/// core never inspects the contents; it only moves the blob between the
/// transport, the local credential workspace, and the durable store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialSnapshot(serde_json::Value);

impl CredentialSnapshot {
    /// Wraps a raw JSON value as a snapshot.
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// Returns the underlying JSON value.
    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    /// Serializes the snapshot to a JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.0)
    }

    /// Parses a snapshot from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        Ok(Self(serde_json::from_str(json)?))
    }
}

/// An inbound message delivered over a tenant's connection.
///
/// The core passes these to the dispatch collaborator verbatim; it makes no
/// assumptions about message semantics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Chat the message arrived in (reply target).
    pub chat: String,
    /// Sender identifier within the chat.
    pub sender: String,
    /// Raw message body.
    pub body: String,
}

/// Lifecycle and traffic events emitted by a live connection.
///
/// Events for a single tenant are delivered in the order the transport emits
/// them; no ordering holds across tenants.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// The connection is open and authenticated.
    Opened,
    /// The connection closed for a retryable cause.
    ClosedRetryable {
        /// Transport-level close reason, for logging.
        reason: String,
    },
    /// The connection closed because the device was logged out.
    ClosedLoggedOut,
    /// The transport rotated its key material.
    CredentialsRotated(CredentialSnapshot),
    /// The transport requires out-of-band pairing before it can open.
    PairingRequired {
        /// Short alphanumeric linking code.
        code: String,
    },
    /// An inbound message for the dispatch layer.
    Inbound(InboundMessage),
}

/// Errors raised at the connection boundary.
#[derive(Error, Debug)]
pub enum ConnectError {
    /// The underlying connection failed to initialize.
    #[error("Failed to initialize connection for {number}: {reason}")]
    Init {
        /// Tenant number the attempt was for.
        number: String,
        /// Transport-level failure description.
        reason: String,
    },

    /// The connection is closed.
    #[error("Connection is closed")]
    Closed,

    /// A send over the live connection failed.
    #[error("Send failed: {0}")]
    Send(String),

    /// The transport does not support pairing codes.
    #[error("Pairing codes are not supported by this transport")]
    PairingUnsupported,
}

/// Sendable half of a live connection.
///
/// Owned by the session table entry; other components hold it only for the
/// duration of a single operation.
#[async_trait]
pub trait ConnectionLink: Send + Sync {
    /// Sends a plain-text message to a chat.
    async fn send_text(&self, chat: &str, body: &str) -> Result<(), ConnectError>;

    /// Accepts a group invite code.
    async fn join(&self, invite_code: &str) -> Result<(), ConnectError>;

    /// Subscribes to a broadcast channel.
    async fn subscribe(&self, channel: &str) -> Result<(), ConnectError>;

    /// Requests a short pairing code for out-of-band device linking.
    async fn request_pairing_code(&self) -> Result<String, ConnectError>;

    /// Current credential snapshot, serializable for persistence.
    fn credentials(&self) -> CredentialSnapshot;

    /// Signals the remote end to invalidate this device's credentials.
    async fn logout(&self) -> Result<(), ConnectError>;

    /// Closes the connection without invalidating credentials.
    async fn close(&self);
}

/// A live connection: the sendable link plus its ordered event stream.
pub struct Connection {
    /// Sendable half, registered in the session table.
    pub link: Arc<dyn ConnectionLink>,
    /// Ordered lifecycle/traffic events; consumed by the session event pump.
    pub events: mpsc::Receiver<ConnectionEvent>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").field("events", &self.events).finish_non_exhaustive()
    }
}

/// Produces live connections for tenant numbers.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens a connection for `number`, resuming from `snapshot` when given.
    ///
    /// # Errors
    /// Returns [`ConnectError::Init`] when the transport cannot establish the
    /// connection; nothing is registered on failure.
    async fn connect(
        &self,
        number: &str,
        snapshot: Option<&CredentialSnapshot>,
    ) -> Result<Connection, ConnectError>;
}
