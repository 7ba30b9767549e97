//! Session manager: creation, lifecycle, persistence, and sweeps.
//!
//! One `SessionManager` instance owns the session table, the pending-write
//! buffer, the reconnection counters, and the reconnect timers. The HTTP
//! layer and the background scheduler hold it by `Arc`; nothing lives in
//! module-level state.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::CourierConfig;
use crate::connect::{
    Connection, ConnectionEvent, ConnectionLink, Connector, CredentialSnapshot,
};
use crate::credentials::CredentialStore;
use crate::dispatch::MessageHandler;
use crate::error::{CourierError, Result};
use crate::session::pending::PendingWrites;
use crate::session::state::{SideEffect, TransitionContext, transition};
use crate::session::table::{SessionHandle, SessionTable};
use crate::store::{RecordFilter, SessionHealth, SessionStatus, SessionStore};

/// Strips a raw tenant number down to its digits.
///
/// # Errors
/// Returns [`CourierError::InvalidNumber`] when nothing remains.
pub fn sanitize_number(raw: &str) -> Result<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return Err(CourierError::InvalidNumber(raw.to_string()));
    }
    Ok(digits)
}

/// Serializable view of a live session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    /// Tenant number.
    pub number: String,
    /// Lifecycle status.
    pub status: SessionStatus,
    /// Health indicator.
    pub health: SessionHealth,
    /// When the connection attempt started.
    pub created_at: DateTime<Utc>,
    /// Last lifecycle activity.
    pub last_active: DateTime<Utc>,
    /// Seconds since the handle was created.
    pub uptime_secs: i64,
}

impl From<&SessionHandle> for SessionInfo {
    fn from(handle: &SessionHandle) -> Self {
        Self {
            number: handle.number.clone(),
            status: handle.status,
            health: handle.health,
            created_at: handle.created_at,
            last_active: handle.last_active,
            uptime_secs: handle.age().num_seconds(),
        }
    }
}

/// Outcome of a persistence sync run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    /// Sessions whose snapshot reached the store.
    pub saved: usize,
    /// Sessions whose snapshot was buffered instead.
    pub buffered: usize,
    /// Previously buffered tenants flushed this run.
    pub flushed: Vec<String>,
}

/// Outcome of a stale-session eviction run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EvictReport {
    /// Handles removed for exceeding the maximum session age.
    pub evicted: Vec<String>,
    /// Disconnected handles removed for idling past the grace period.
    pub idle_removed: Vec<String>,
    /// Invalid durable records purged.
    pub purged: usize,
}

/// Whether the event pump keeps running after an event.
enum EventFlow {
    Continue,
    Stop,
}

/// Multi-tenant session lifecycle manager.
pub struct SessionManager {
    cfg: Arc<CourierConfig>,
    store: Arc<dyn SessionStore>,
    connector: Arc<dyn Connector>,
    credentials: CredentialStore,
    handler: Arc<dyn MessageHandler>,
    sessions: Mutex<SessionTable>,
    /// Numbers with a create in flight; guards the connect window where no
    /// handle exists yet.
    in_flight: Mutex<HashSet<String>>,
    pending: Mutex<PendingWrites>,
    attempts: Mutex<HashMap<String, u32>>,
    /// Pending reconnect timers, aborted on delete or terminal transition.
    timers: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl SessionManager {
    /// Creates a manager over the given store, connector, and handler.
    ///
    /// # Errors
    /// Returns an error if the credential workspace root cannot be created.
    pub fn new(
        cfg: Arc<CourierConfig>,
        store: Arc<dyn SessionStore>,
        connector: Arc<dyn Connector>,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<Arc<Self>> {
        let credentials = CredentialStore::new(&cfg.credentials_dir)?;
        Ok(Arc::new(Self {
            cfg,
            store,
            connector,
            credentials,
            handler,
            sessions: Mutex::new(SessionTable::new()),
            in_flight: Mutex::new(HashSet::new()),
            pending: Mutex::new(PendingWrites::new()),
            attempts: Mutex::new(HashMap::new()),
            timers: Mutex::new(HashMap::new()),
        }))
    }

    /// Creates a session for `number`, or reports the existing one.
    ///
    /// A live non-terminal handle is returned as-is (at most one active
    /// connection per tenant). A handle left behind in a disconnected or
    /// terminal state is replaced. With `restore_from_store`, a missing
    /// local credential workspace is materialized from the durable record
    /// before connecting.
    ///
    /// # Errors
    /// * [`CourierError::CreateInProgress`] — another create for the same
    ///   number is mid-connect.
    /// * [`CourierError::Connect`] — the transport failed to initialize;
    ///   no handle was registered.
    pub async fn create_session(
        self: &Arc<Self>,
        number: &str,
        seed: Option<CredentialSnapshot>,
        restore_from_store: bool,
    ) -> Result<SessionInfo> {
        let number = sanitize_number(number)?;

        // Check-then-mark under both locks so a finished create is always
        // observed either as a live handle or as a free slot, never neither.
        let replaced = {
            let mut sessions = self.sessions.lock().await;
            let mut in_flight = self.in_flight.lock().await;
            let stale = match sessions.get(&number) {
                Some(handle)
                    if !handle.status.is_terminal()
                        && handle.status != SessionStatus::Disconnected =>
                {
                    return Ok(SessionInfo::from(handle));
                }
                Some(_) => true,
                None => false,
            };
            if !in_flight.insert(number.clone()) {
                return Err(CourierError::CreateInProgress(number));
            }
            if stale { sessions.remove(&number) } else { None }
        };
        if let Some(stale) = replaced {
            debug!(number = %number, status = ?stale.status, "Replacing stale handle");
            stale.link.close().await;
        }

        let result = self.open_session(&number, seed, restore_from_store).await;
        self.in_flight.lock().await.remove(&number);
        if let Err(e) = &result {
            warn!(number = %number, error = %e, "Session creation failed");
        }
        result
    }

    /// Opens the connection and registers the handle. Caller holds the
    /// in-flight mark for `number`.
    async fn open_session(
        self: &Arc<Self>,
        number: &str,
        seed: Option<CredentialSnapshot>,
        restore_from_store: bool,
    ) -> Result<SessionInfo> {
        if let Some(snapshot) = seed.as_ref() {
            self.credentials.save(number, snapshot)?;
        }

        let mut snapshot = match self.credentials.load(number) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                // Corrupt local state: drop the workspace and fall back to
                // the durable store or a fresh pairing.
                warn!(number = %number, error = %e, "Local credentials unreadable, discarding");
                self.credentials.delete(number)?;
                None
            }
        };

        if snapshot.is_none() && restore_from_store {
            match self.store.find(number).await {
                Ok(Some(record)) => {
                    self.credentials.save(number, &record.snapshot)?;
                    info!(number = %number, "Credentials restored from store");
                    snapshot = Some(record.snapshot);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(number = %number, error = %e, "Store unreachable, connecting without durable credentials");
                }
            }
        }

        let Connection { link, events } =
            self.connector.connect(number, snapshot.as_ref()).await?;

        let info = {
            let mut sessions = self.sessions.lock().await;
            let handle = SessionHandle::new(number.to_string(), link);
            let info = SessionInfo::from(&handle);
            sessions.insert(handle);
            info
        };

        // Events buffered during connect are consumed once the pump starts;
        // the handle is already registered, so none are lost.
        let pump = tokio::spawn(Self::pump(Arc::downgrade(self), number.to_string(), events));
        if let Some(handle) = self.sessions.lock().await.get_mut(number) {
            handle.set_pump(pump);
        } else {
            pump.abort();
        }

        info!(number = %number, "Session registered");
        Ok(info)
    }

    /// Per-session event pump: consumes the connection's ordered event
    /// stream until the stream ends or a terminal transition stops it.
    fn pump(
        manager: Weak<Self>,
        number: String,
        mut events: mpsc::Receiver<ConnectionEvent>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
        Box::pin(async move {
            while let Some(event) = events.recv().await {
                let Some(manager) = manager.upgrade() else { break };
                match manager.handle_event(&number, event).await {
                    EventFlow::Continue => {}
                    EventFlow::Stop => break,
                }
            }
            debug!(number = %number, "Event pump ended");
        })
    }

    /// Folds one connection event into the session's state and executes the
    /// resulting side effects.
    async fn handle_event(self: &Arc<Self>, number: &str, event: ConnectionEvent) -> EventFlow {
        let (status, health, link) = {
            let sessions = self.sessions.lock().await;
            match sessions.get(number) {
                Some(handle) => (handle.status, handle.health, Arc::clone(&handle.link)),
                // Removed by eviction or delete while the event was in
                // flight; nothing to transition.
                None => return EventFlow::Stop,
            }
        };

        let failures = if matches!(event, ConnectionEvent::ClosedRetryable { .. }) {
            self.attempts.lock().await.get(number).copied().unwrap_or(0) + 1
        } else {
            0
        };
        let ctx = TransitionContext {
            attempts: failures,
            max_attempts: self.cfg.limits.max_failed_attempts,
        };

        if let ConnectionEvent::ClosedRetryable { reason } = &event {
            info!(
                number = %number,
                reason = %reason,
                attempt = failures,
                max = ctx.max_attempts,
                "Connection closed (retryable)"
            );
        }

        let transition = transition(status, health, event, ctx);

        {
            let mut sessions = self.sessions.lock().await;
            if let Some(handle) = sessions.get_mut(number) {
                handle.status = transition.status;
                handle.health = transition.health;
                handle.touch();
            }
        }

        let mut flow = EventFlow::Continue;
        for effect in transition.effects {
            match effect {
                SideEffect::ResetAttempts | SideEffect::ClearAttempts => {
                    self.attempts.lock().await.remove(number);
                    self.cancel_timer(number).await;
                }
                SideEffect::PersistSnapshot => {
                    let snapshot = link.credentials();
                    self.persist_snapshot(number, snapshot).await;
                }
                SideEffect::PersistRotatedSnapshot(snapshot) => {
                    debug!(number = %number, "Credential rotation observed");
                    self.persist_snapshot(number, snapshot).await;
                }
                SideEffect::RunOpenHooks => {
                    info!(number = %number, "Session connected");
                    self.run_open_hooks(number, link.as_ref()).await;
                }
                SideEffect::IncrementAttempts => {
                    self.attempts.lock().await.insert(number.to_string(), failures);
                    if let Err(e) = self.store.bump_failed_attempts(number).await {
                        debug!(number = %number, error = %e, "Failed-attempt mirror not written");
                    }
                }
                SideEffect::PersistStatus => {
                    if let Err(e) = self
                        .store
                        .update_status(number, transition.status, Some(transition.health))
                        .await
                    {
                        warn!(number = %number, error = %e, "Status update not persisted");
                    }
                }
                SideEffect::ScheduleReconnect => {
                    self.schedule_reconnect(number).await;
                }
                SideEffect::DropHandle => {
                    self.sessions.lock().await.remove(number);
                    flow = EventFlow::Stop;
                }
                SideEffect::DeleteCredentials => {
                    if let Err(e) = self.credentials.delete(number) {
                        warn!(number = %number, error = %e, "Credential workspace not removed");
                    }
                }
                SideEffect::ScheduleRecordDeletion => {
                    self.schedule_record_deletion(number);
                }
                SideEffect::SurfacePairingCode(code) => {
                    info!(number = %number, code = %code, "Pairing code issued");
                }
                SideEffect::Dispatch(message) => {
                    self.dispatch(number, link.as_ref(), &message).await;
                }
            }
        }
        flow
    }

    /// Saves a snapshot locally and durably; buffers on store failure.
    async fn persist_snapshot(&self, number: &str, snapshot: CredentialSnapshot) -> bool {
        if let Err(e) = self.credentials.save(number, &snapshot) {
            warn!(number = %number, error = %e, "Local credential write failed");
        }
        match self.store.upsert(number, &snapshot).await {
            Ok(()) => {
                self.pending.lock().await.remove(number);
                debug!(number = %number, "Snapshot persisted");
                true
            }
            Err(e) => {
                warn!(number = %number, error = %e, "Store write failed, snapshot buffered");
                self.pending.lock().await.put(number, snapshot);
                false
            }
        }
    }

    /// Runs the on-open hooks; each failure is isolated.
    async fn run_open_hooks(&self, number: &str, link: &dyn ConnectionLink) {
        let hooks = &self.cfg.open_hooks;
        for target in &hooks.notify_numbers {
            let body = format!("Session {number} connected (prefix: {})", self.cfg.command_prefix);
            if let Err(e) = link.send_text(target, &body).await {
                warn!(number = %number, target = %target, error = %e, "Connect notification failed");
            }
        }
        if let Some(invite) = &hooks.auto_join_invite {
            if let Err(e) = link.join(invite).await {
                warn!(number = %number, error = %e, "Auto-join failed");
            }
        }
        for channel in &hooks.auto_subscribe {
            if let Err(e) = link.subscribe(channel).await {
                warn!(number = %number, channel = %channel, error = %e, "Auto-subscribe failed");
            }
        }
    }

    /// Hands an inbound message to the dispatch collaborator, catching any
    /// failure at the per-message boundary.
    async fn dispatch(&self, number: &str, link: &dyn ConnectionLink, message: &crate::connect::InboundMessage) {
        if let Err(e) = self.handler.handle(number, link, message).await {
            warn!(number = %number, chat = %message.chat, error = %e, "Message handler failed");
            if let Err(send_err) = link
                .send_text(&message.chat, "An error occurred while handling this message.")
                .await
            {
                debug!(number = %number, error = %send_err, "Failure notice not delivered");
            }
        }
    }

    /// Schedules a flat-delay reconnect attempt, replacing any earlier timer.
    async fn schedule_reconnect(self: &Arc<Self>, number: &str) {
        let weak = Arc::downgrade(self);
        let delay = self.cfg.reconnect_delay();
        let task_number = number.to_string();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(manager) = weak.upgrade() else { return };
            // The timer consumes itself before reconnecting so a replace
            // inside create_session never aborts the running attempt.
            manager.timers.lock().await.remove(&task_number);
            debug!(number = %task_number, "Reconnect timer fired");
            if let Err(e) = manager.create_session(&task_number, None, true).await {
                warn!(number = %task_number, error = %e, "Scheduled reconnect failed");
            }
        });
        let mut timers = self.timers.lock().await;
        if let Some(old) = timers.insert(number.to_string(), task) {
            old.abort();
        }
    }

    /// Deletes the durable record after the grace delay, unless the tenant
    /// was re-created (record no longer invalid) in the meantime.
    fn schedule_record_deletion(self: &Arc<Self>, number: &str) {
        let weak = Arc::downgrade(self);
        let delay = self.cfg.immediate_delete_delay();
        let number = number.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(manager) = weak.upgrade() else { return };
            match manager.store.find(&number).await {
                Ok(Some(record)) if record.status == SessionStatus::Invalid => {
                    if let Err(e) = manager.store.delete(&number).await {
                        warn!(number = %number, error = %e, "Invalid record not purged");
                    } else {
                        info!(number = %number, "Invalid record purged after grace period");
                    }
                }
                Ok(_) => {}
                Err(e) => warn!(number = %number, error = %e, "Grace-period lookup failed"),
            }
        });
    }

    /// Cancels a pending reconnect timer, if any.
    async fn cancel_timer(&self, number: &str) {
        if let Some(timer) = self.timers.lock().await.remove(number) {
            timer.abort();
        }
    }

    /// Administrative delete: logout, remove the handle, the durable record,
    /// and the credential workspace.
    ///
    /// # Errors
    /// Returns a store error if the durable record could not be removed;
    /// the handle is gone either way.
    pub async fn delete_session(&self, number: &str) -> Result<()> {
        let number = sanitize_number(number)?;
        self.cancel_timer(&number).await;

        let handle = self.sessions.lock().await.remove(&number);
        if let Some(handle) = &handle {
            if let Err(e) = handle.link.logout().await {
                warn!(number = %number, error = %e, "Logout failed during delete");
            }
        }
        drop(handle);

        self.attempts.lock().await.remove(&number);
        self.pending.lock().await.remove(&number);
        self.store.delete(&number).await?;
        self.credentials.delete(&number)?;

        info!(number = %number, "Session deleted");
        Ok(())
    }

    /// Requests a pairing code, creating a fresh (non-restored) session for
    /// the number when none is live.
    pub async fn request_pairing_code(self: &Arc<Self>, number: &str) -> Result<String> {
        let number = sanitize_number(number)?;
        let link = self.sessions.lock().await.get(&number).map(|h| Arc::clone(&h.link));
        let link = match link {
            Some(link) => link,
            None => {
                self.create_session(&number, None, false).await?;
                self.sessions
                    .lock()
                    .await
                    .get(&number)
                    .map(|h| Arc::clone(&h.link))
                    .ok_or_else(|| CourierError::NotFound(number.clone()))?
            }
        };
        let code = link.request_pairing_code().await?;
        if let Err(e) =
            self.store.update_status(&number, SessionStatus::Waiting, None).await
        {
            debug!(number = %number, error = %e, "Waiting status not persisted");
        }
        Ok(code)
    }

    /// Info for one live session.
    pub async fn session_info(&self, number: &str) -> Option<SessionInfo> {
        let number = sanitize_number(number).ok()?;
        self.sessions.lock().await.get(&number).map(SessionInfo::from)
    }

    /// Info for every live session.
    pub async fn list_sessions(&self) -> Vec<SessionInfo> {
        self.sessions.lock().await.iter().map(SessionInfo::from).collect()
    }

    /// Number of live sessions.
    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Number of buffered pending writes.
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Persistence sync: saves every active session's snapshot, then flushes
    /// the pending-write buffer.
    pub async fn sync_store(&self) -> SyncReport {
        let snapshots: Vec<(String, CredentialSnapshot)> = {
            let sessions = self.sessions.lock().await;
            sessions
                .iter()
                .filter(|h| h.status == SessionStatus::Active)
                .map(|h| (h.number.clone(), h.link.credentials()))
                .collect()
        };

        let mut report = SyncReport::default();
        for (number, snapshot) in snapshots {
            if self.persist_snapshot(&number, snapshot).await {
                report.saved += 1;
            } else {
                report.buffered += 1;
            }
        }
        report.flushed = self.flush_pending().await;
        debug!(
            saved = report.saved,
            buffered = report.buffered,
            flushed = report.flushed.len(),
            "Persistence sync complete"
        );
        report
    }

    /// Flushes the pending-write buffer while the store answers; entries
    /// that still fail are re-buffered.
    pub async fn flush_pending(&self) -> Vec<String> {
        if self.pending.lock().await.is_empty() {
            return Vec::new();
        }
        if !self.store.ping().await {
            return Vec::new();
        }

        let drained = self.pending.lock().await.drain();
        let mut flushed = Vec::new();
        for (number, snapshot) in drained {
            match self.store.upsert(&number, &snapshot).await {
                Ok(()) => flushed.push(number),
                Err(e) => {
                    warn!(number = %number, error = %e, "Pending flush failed, re-buffered");
                    self.pending.lock().await.put(&number, snapshot);
                }
            }
        }
        if !flushed.is_empty() {
            info!(count = flushed.len(), "Pending writes flushed");
        }
        flushed
    }

    /// Stale-session eviction sweep.
    ///
    /// Removes handles past the maximum session age (durable record and
    /// credentials go with them), drops disconnected handles idle past the
    /// grace period (durable record remains restorable), and purges invalid
    /// durable records older than the deletion grace.
    pub async fn evict_stale(&self) -> EvictReport {
        let max_age = self.cfg.max_session_age();
        let idle_grace = self.cfg.disconnected_cleanup();

        let mut report = EvictReport::default();
        let mut closing = Vec::new();
        {
            let mut sessions = self.sessions.lock().await;
            for number in sessions.numbers() {
                let Some(handle) = sessions.get(&number) else { continue };
                if handle.age() > max_age {
                    report.evicted.push(number);
                } else if handle.status == SessionStatus::Disconnected
                    && handle.idle() > idle_grace
                {
                    report.idle_removed.push(number);
                }
            }
            for number in report.evicted.iter().chain(&report.idle_removed) {
                if let Some(handle) = sessions.remove(number) {
                    closing.push(handle);
                }
            }
        }
        for handle in &closing {
            handle.link.close().await;
        }
        drop(closing);

        for number in &report.evicted {
            self.cancel_timer(number).await;
            self.attempts.lock().await.remove(number);
            if let Err(e) = self.store.delete(number).await {
                warn!(number = %number, error = %e, "Evicted record not removed");
            }
            if let Err(e) = self.credentials.delete(number) {
                warn!(number = %number, error = %e, "Evicted credentials not removed");
            }
            info!(number = %number, "Session evicted (max age exceeded)");
        }
        for number in &report.idle_removed {
            self.cancel_timer(number).await;
            info!(number = %number, "Disconnected session dropped from memory");
        }

        // Invalid records past the grace period.
        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.cfg.immediate_delete_delay())
                .unwrap_or_else(|_| chrono::Duration::seconds(0));
        let filter =
            RecordFilter::default().with_statuses(&[SessionStatus::Invalid]).updated_before(cutoff);
        match self.store.find_many(&filter).await {
            Ok(records) => {
                for record in records {
                    if let Err(e) = self.store.delete(&record.number).await {
                        warn!(number = %record.number, error = %e, "Invalid record not purged");
                    } else {
                        report.purged += 1;
                    }
                }
            }
            Err(e) => warn!(error = %e, "Invalid-record purge query failed"),
        }

        report
    }

    /// Reconnect sweep: revives durable disconnected records that still have
    /// retry budget and no live handle, pacing attempts to avoid a
    /// reconnection storm.
    pub async fn reconnect_sweep(self: &Arc<Self>) -> usize {
        let filter = RecordFilter::default()
            .with_statuses(&[SessionStatus::Disconnected])
            .attempts_below(self.cfg.limits.max_failed_attempts);
        self.sweep_records(filter, "reconnect").await
    }

    /// Cold restore sweep: recreates sessions for durable active or
    /// disconnected records with no live handle, covering process restarts.
    pub async fn restore_sweep(self: &Arc<Self>) -> usize {
        let cutoff = Utc::now() - self.cfg.max_session_age();
        let filter = RecordFilter::default()
            .with_statuses(&[SessionStatus::Active, SessionStatus::Disconnected])
            .active_after(cutoff);
        self.sweep_records(filter, "restore").await
    }

    async fn sweep_records(self: &Arc<Self>, filter: RecordFilter, kind: &str) -> usize {
        let records = match self.store.find_many(&filter).await {
            Ok(records) => records,
            Err(e) => {
                warn!(kind = kind, error = %e, "Sweep query failed, skipping");
                return 0;
            }
        };

        let mut revived = 0;
        for record in records {
            if self.sessions.lock().await.contains(&record.number) {
                continue;
            }
            info!(kind = kind, number = %record.number, "Sweep reviving session");
            match self.create_session(&record.number, Some(record.snapshot), true).await {
                Ok(_) => revived += 1,
                Err(e) => {
                    warn!(kind = kind, number = %record.number, error = %e, "Sweep revive failed");
                }
            }
            tokio::time::sleep(self.cfg.restore_pacing()).await;
        }
        revived
    }

    /// Cooperative shutdown: flush live credentials, close every link, stop
    /// pumps and timers. The binary bounds this with a hard deadline.
    pub async fn shutdown(&self) {
        info!("Session manager shutting down");

        let live: Vec<(String, Arc<dyn ConnectionLink>, SessionStatus)> = {
            let sessions = self.sessions.lock().await;
            sessions
                .iter()
                .map(|h| (h.number.clone(), Arc::clone(&h.link), h.status))
                .collect()
        };

        for (number, link, status) in &live {
            if *status == SessionStatus::Active {
                let snapshot = link.credentials();
                self.persist_snapshot(number, snapshot).await;
            }
        }
        for (_, link, _) in &live {
            link.close().await;
        }

        for handle in self.sessions.lock().await.drain() {
            drop(handle);
        }
        for (_, timer) in self.timers.lock().await.drain() {
            timer.abort();
        }
        self.attempts.lock().await.clear();

        info!("Session manager stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_number_strips_formatting() {
        assert_eq!(sanitize_number("+94 741-671-668").unwrap(), "94741671668");
        assert_eq!(sanitize_number("94741671668").unwrap(), "94741671668");
    }

    #[test]
    fn test_sanitize_number_rejects_empty() {
        assert!(matches!(sanitize_number("abc"), Err(CourierError::InvalidNumber(_))));
        assert!(matches!(sanitize_number(""), Err(CourierError::InvalidNumber(_))));
    }
}
