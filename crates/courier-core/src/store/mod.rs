//! Durable session store.
//!
//! One record per tenant number, holding the credential snapshot and status
//! metadata. All calls fail fast — a store that is unreachable returns an
//! error immediately rather than hanging the caller. Callers degrade: writes
//! go to the pending-write buffer, reads are treated as absent.

pub mod sqlite;

pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::connect::CredentialSnapshot;

/// Session lifecycle status.
///
/// `Connecting` exists only on in-memory handles; the durable store persists
/// the remaining variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Connection attempt in flight.
    Connecting,
    /// Connected and authenticated.
    Active,
    /// Closed for a retryable cause; eligible for reconnection.
    Disconnected,
    /// Logged out; credentials are invalid. Terminal.
    Invalid,
    /// Retry budget exhausted. Terminal until external intervention.
    Failed,
    /// Waiting for out-of-band pairing.
    Waiting,
}

impl SessionStatus {
    /// Converts status to its stored string representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Active => "active",
            Self::Disconnected => "disconnected",
            Self::Invalid => "invalid",
            Self::Failed => "failed",
            Self::Waiting => "waiting",
        }
    }

    /// Parses a status from its stored string representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "connecting" => Some(Self::Connecting),
            "active" => Some(Self::Active),
            "disconnected" => Some(Self::Disconnected),
            "invalid" => Some(Self::Invalid),
            "failed" => Some(Self::Failed),
            "waiting" => Some(Self::Waiting),
            _ => None,
        }
    }

    /// Whether the status is terminal for the handle (no automatic retry).
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Invalid | Self::Failed)
    }
}

/// Session health, coarser than status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionHealth {
    /// Connection is up.
    Active,
    /// Between close and the next reconnect attempt.
    Reconnecting,
    /// Not connected and not retrying.
    Disconnected,
}

impl SessionHealth {
    /// Converts health to its stored string representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Reconnecting => "reconnecting",
            Self::Disconnected => "disconnected",
        }
    }

    /// Parses health from its stored string representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "reconnecting" => Some(Self::Reconnecting),
            "disconnected" => Some(Self::Disconnected),
            _ => None,
        }
    }
}

/// Durable record for one tenant's session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Tenant number (unique key).
    pub number: String,
    /// Credential snapshot for resuming the connection.
    pub snapshot: CredentialSnapshot,
    /// Lifecycle status.
    pub status: SessionStatus,
    /// Health indicator.
    pub health: SessionHealth,
    /// Consecutive failed reconnection attempts.
    pub failed_attempts: u32,
    /// Last time the session was seen active.
    pub last_active: DateTime<Utc>,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// When the record was last written.
    pub updated_at: DateTime<Utc>,
}

/// Filter for [`SessionStore::find_many`] sweeps.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    /// Match any of these statuses (empty matches all).
    pub statuses: Vec<SessionStatus>,
    /// Only records last active at or after this instant.
    pub active_after: Option<DateTime<Utc>>,
    /// Only records last updated before this instant.
    pub updated_before: Option<DateTime<Utc>>,
    /// Only records with fewer failed attempts than this bound.
    pub attempts_below: Option<u32>,
}

impl RecordFilter {
    /// Restricts the filter to the given statuses.
    #[must_use]
    pub fn with_statuses(mut self, statuses: &[SessionStatus]) -> Self {
        self.statuses = statuses.to_vec();
        self
    }

    /// Restricts the filter to records last active at or after `cutoff`.
    #[must_use]
    pub fn active_after(mut self, cutoff: DateTime<Utc>) -> Self {
        self.active_after = Some(cutoff);
        self
    }

    /// Restricts the filter to records last updated before `cutoff`.
    #[must_use]
    pub fn updated_before(mut self, cutoff: DateTime<Utc>) -> Self {
        self.updated_before = Some(cutoff);
        self
    }

    /// Restricts the filter to records with fewer failed attempts than `max`.
    #[must_use]
    pub fn attempts_below(mut self, max: u32) -> Self {
        self.attempts_below = Some(max);
        self
    }

    /// Whether a record passes the non-status bounds of this filter.
    pub fn matches_bounds(&self, record: &SessionRecord) -> bool {
        if let Some(cutoff) = self.active_after {
            if record.last_active < cutoff {
                return false;
            }
        }
        if let Some(cutoff) = self.updated_before {
            if record.updated_at >= cutoff {
                return false;
            }
        }
        if let Some(max) = self.attempts_below {
            if record.failed_attempts >= max {
                return false;
            }
        }
        true
    }
}

/// Per-status record totals for the status endpoint.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreCounts {
    /// All records.
    pub total: u64,
    /// Records with status `active`.
    pub active: u64,
    /// Records with status `disconnected`.
    pub disconnected: u64,
    /// Records with status `invalid`.
    pub invalid: u64,
    /// Records with status `failed`.
    pub failed: u64,
    /// Records with status `waiting`.
    pub waiting: u64,
}

/// Errors raised by the durable store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store is unreachable.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Database-level error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Snapshot (de)serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored row contained data that no longer parses.
    #[error("Invalid record data: {0}")]
    InvalidData(String),
}

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Persistent record store keyed by tenant number.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Creates or overwrites the tenant's record with a fresh snapshot.
    ///
    /// Sets status=active, health=active, resets the failed-attempt counter,
    /// and stamps `last_active`/`updated_at`. Idempotent: applying the same
    /// snapshot twice leaves the record in the same state.
    async fn upsert(&self, number: &str, snapshot: &CredentialSnapshot) -> StoreResult<()>;

    /// Fetches the tenant's record, if any.
    async fn find(&self, number: &str) -> StoreResult<Option<SessionRecord>>;

    /// Fetches all records matching the filter; used by the sweeps.
    async fn find_many(&self, filter: &RecordFilter) -> StoreResult<Vec<SessionRecord>>;

    /// Partially updates status (and health when given) without touching
    /// credential data. A missing record is a no-op.
    async fn update_status(
        &self,
        number: &str,
        status: SessionStatus,
        health: Option<SessionHealth>,
    ) -> StoreResult<()>;

    /// Increments the durable failed-attempt counter and marks the record
    /// disconnected/reconnecting. A missing record is a no-op.
    async fn bump_failed_attempts(&self, number: &str) -> StoreResult<()>;

    /// Deletes the tenant's record.
    async fn delete(&self, number: &str) -> StoreResult<()>;

    /// Per-status record totals.
    async fn counts(&self) -> StoreResult<StoreCounts>;

    /// Whether the store currently answers queries.
    async fn ping(&self) -> bool;
}
