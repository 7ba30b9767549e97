//! SQLite implementation of the session store.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{
    RecordFilter, SessionHealth, SessionRecord, SessionStatus, SessionStore, StoreCounts,
    StoreResult,
};
use crate::connect::CredentialSnapshot;
use async_trait::async_trait;

/// SQLite-backed session store.
///
/// The connection is shared behind a mutex; every operation is a single
/// standalone statement scoped to one tenant record, so no cross-call
/// transaction semantics are needed.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (or creates) the store at the given path.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or the schema
    /// cannot be initialized.
    pub fn open(path: &str) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        init_schema(&conn)?;
        info!(path = %path, "Session store opened");
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Opens an in-memory store for testing.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }
}

fn init_schema(conn: &Connection) -> StoreResult<()> {
    conn.execute(
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            number TEXT PRIMARY KEY,
            snapshot TEXT NOT NULL,
            status TEXT NOT NULL,
            health TEXT NOT NULL,
            failed_attempts INTEGER NOT NULL DEFAULT 0,
            last_active TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
        [],
    )?;
    Ok(())
}

#[async_trait]
impl SessionStore for SqliteStore {
    async fn upsert(&self, number: &str, snapshot: &CredentialSnapshot) -> StoreResult<()> {
        let snapshot_json = snapshot.to_json()?;
        let now = Utc::now().to_rfc3339();
        let conn = self.conn.lock().await;
        conn.execute(
            r#"
            INSERT INTO sessions
                (number, snapshot, status, health, failed_attempts, last_active, created_at, updated_at)
            VALUES (?1, ?2, 'active', 'active', 0, ?3, ?3, ?3)
            ON CONFLICT(number) DO UPDATE SET
                snapshot = excluded.snapshot,
                status = 'active',
                health = 'active',
                failed_attempts = 0,
                last_active = excluded.last_active,
                updated_at = excluded.updated_at
            "#,
            params![number, snapshot_json, now],
        )?;
        debug!(number = %number, "Session record upserted");
        Ok(())
    }

    async fn find(&self, number: &str) -> StoreResult<Option<SessionRecord>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT number, snapshot, status, health, failed_attempts, last_active, created_at, updated_at
             FROM sessions WHERE number = ?1",
        )?;
        let mut rows = stmt.query_map(params![number], map_record)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    async fn find_many(&self, filter: &RecordFilter) -> StoreResult<Vec<SessionRecord>> {
        let conn = self.conn.lock().await;
        let base = "SELECT number, snapshot, status, health, failed_attempts, last_active, created_at, updated_at
             FROM sessions";

        // Status restriction happens in SQL; the remaining bounds are cheap
        // enough to apply on the mapped rows.
        let mut records = Vec::new();
        if filter.statuses.is_empty() {
            let mut stmt = conn.prepare(base)?;
            let rows = stmt.query_map([], map_record)?;
            for row in rows {
                records.push(row?);
            }
        } else {
            let placeholders = vec!["?"; filter.statuses.len()].join(", ");
            let sql = format!("{base} WHERE status IN ({placeholders})");
            let statuses: Vec<String> =
                filter.statuses.iter().map(|s| s.as_str().to_string()).collect();
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(statuses.iter()), map_record)?;
            for row in rows {
                records.push(row?);
            }
        }

        records.retain(|record| filter.matches_bounds(record));
        Ok(records)
    }

    async fn update_status(
        &self,
        number: &str,
        status: SessionStatus,
        health: Option<SessionHealth>,
    ) -> StoreResult<()> {
        let now = Utc::now().to_rfc3339();
        let health_str = health.map(|h| h.as_str().to_string());
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE sessions
             SET status = ?2, health = COALESCE(?3, health), updated_at = ?4
             WHERE number = ?1",
            params![number, status.as_str(), health_str, now],
        )?;
        Ok(())
    }

    async fn bump_failed_attempts(&self, number: &str) -> StoreResult<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE sessions
             SET failed_attempts = failed_attempts + 1,
                 status = 'disconnected',
                 health = 'reconnecting',
                 updated_at = ?2
             WHERE number = ?1",
            params![number, now],
        )?;
        Ok(())
    }

    async fn delete(&self, number: &str) -> StoreResult<()> {
        let conn = self.conn.lock().await;
        conn.execute("DELETE FROM sessions WHERE number = ?1", params![number])?;
        debug!(number = %number, "Session record deleted");
        Ok(())
    }

    async fn counts(&self) -> StoreResult<StoreCounts> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM sessions GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            let status: String = row.get(0)?;
            let count: u64 = row.get(1)?;
            Ok((status, count))
        })?;

        let mut counts = StoreCounts::default();
        for row in rows {
            let (status, count) = row?;
            counts.total += count;
            match status.as_str() {
                "active" => counts.active = count,
                "disconnected" => counts.disconnected = count,
                "invalid" => counts.invalid = count,
                "failed" => counts.failed = count,
                "waiting" => counts.waiting = count,
                _ => {}
            }
        }
        Ok(counts)
    }

    async fn ping(&self) -> bool {
        let conn = self.conn.lock().await;
        conn.query_row("SELECT 1", [], |_| Ok(())).is_ok()
    }
}

/// Maps a database row to a [`SessionRecord`].
fn map_record(row: &Row) -> rusqlite::Result<SessionRecord> {
    let snapshot_json: String = row.get(1)?;
    let snapshot = CredentialSnapshot::from_json(&snapshot_json).map_err(|_| {
        rusqlite::Error::InvalidColumnType(1, "snapshot".to_string(), rusqlite::types::Type::Text)
    })?;

    let status_str: String = row.get(2)?;
    let status = SessionStatus::parse(&status_str).ok_or_else(|| {
        rusqlite::Error::InvalidColumnType(2, "status".to_string(), rusqlite::types::Type::Text)
    })?;

    let health_str: String = row.get(3)?;
    let health = SessionHealth::parse(&health_str).ok_or_else(|| {
        rusqlite::Error::InvalidColumnType(3, "health".to_string(), rusqlite::types::Type::Text)
    })?;

    Ok(SessionRecord {
        number: row.get(0)?,
        snapshot,
        status,
        health,
        failed_attempts: row.get(4)?,
        last_active: parse_timestamp(row, 5, "last_active")?,
        created_at: parse_timestamp(row, 6, "created_at")?,
        updated_at: parse_timestamp(row, 7, "updated_at")?,
    })
}

/// Parses an RFC3339 timestamp column into a `DateTime<Utc>`.
fn parse_timestamp(row: &Row, idx: usize, column_name: &str) -> rusqlite::Result<DateTime<Utc>> {
    let timestamp_str: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&timestamp_str).map(|dt| dt.with_timezone(&Utc)).map_err(|_| {
        rusqlite::Error::InvalidColumnType(idx, column_name.to_string(), rusqlite::types::Type::Text)
    })
}
