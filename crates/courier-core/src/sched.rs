//! Background scheduler.
//!
//! Five independent periodic tasks reconcile the session table against the
//! durable store and wall-clock thresholds. Each task awaits its own run
//! inline inside its interval loop, so a run can never overlap itself;
//! different tasks interleave freely, which is safe because every sweep is
//! idempotent.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info};

use crate::config::CourierConfig;
use crate::session::manager::SessionManager;

/// Running set of background tasks; abort on drop or [`shutdown`](Self::shutdown).
pub struct Scheduler {
    tasks: Vec<JoinHandle<()>>,
}

impl Scheduler {
    /// Starts every background task plus the one-shot startup restore.
    pub fn start(manager: Arc<SessionManager>, cfg: Arc<CourierConfig>) -> Self {
        let mut tasks = Vec::new();

        // Persistence sync.
        {
            let manager = Arc::clone(&manager);
            let period = cfg.save_interval();
            tasks.push(tokio::spawn(async move {
                let mut ticker = interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    let report = manager.sync_store().await;
                    debug!(saved = report.saved, flushed = report.flushed.len(), "Auto-save run");
                }
            }));
        }

        // Stale-session eviction.
        {
            let manager = Arc::clone(&manager);
            let period = cfg.cleanup_interval();
            tasks.push(tokio::spawn(async move {
                let mut ticker = interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    let report = manager.evict_stale().await;
                    debug!(
                        evicted = report.evicted.len(),
                        idle_removed = report.idle_removed.len(),
                        purged = report.purged,
                        "Auto-cleanup run"
                    );
                }
            }));
        }

        // Reconnect sweep.
        {
            let manager = Arc::clone(&manager);
            let period = cfg.reconnect_interval();
            tasks.push(tokio::spawn(async move {
                let mut ticker = interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    let revived = manager.reconnect_sweep().await;
                    debug!(revived = revived, "Reconnect sweep run");
                }
            }));
        }

        // Cold restore sweep.
        {
            let manager = Arc::clone(&manager);
            let period = cfg.restore_interval();
            tasks.push(tokio::spawn(async move {
                let mut ticker = interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    let restored = manager.restore_sweep().await;
                    debug!(restored = restored, "Restore sweep run");
                }
            }));
        }

        // Pending-write flush.
        {
            let manager = Arc::clone(&manager);
            let period = cfg.sync_interval();
            tasks.push(tokio::spawn(async move {
                let mut ticker = interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    let flushed = manager.flush_pending().await;
                    if !flushed.is_empty() {
                        debug!(flushed = flushed.len(), "Pending sync run");
                    }
                }
            }));
        }

        // One-shot restore shortly after startup, covering process restarts.
        {
            let manager = Arc::clone(&manager);
            let delay = cfg.initial_restore_delay();
            tasks.push(tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                info!("Running startup session restore");
                let restored = manager.restore_sweep().await;
                info!(restored = restored, "Startup restore complete");
            }));
        }

        info!("Background scheduler started");
        Self { tasks }
    }

    /// Aborts every background task.
    pub fn shutdown(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        info!("Background scheduler stopped");
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
