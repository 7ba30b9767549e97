//! Courier Core - multi-tenant session lifecycle manager for persistent
//! messaging connections.
//!
//! Each tenant ("number") owns one long-lived authenticated connection that
//! must survive process restarts, transient network failures, and partial
//! credential corruption. This crate provides:
//! - A durable session store keyed by tenant number
//! - The in-memory session table and lifecycle state machine
//! - The connection factory and reconnection policy
//! - Background sweeps for persistence, eviction, reconnection, and restore
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use courier_core::config::CourierConfig;
//! use courier_core::connect::LoopbackConnector;
//! use courier_core::dispatch::NoopHandler;
//! use courier_core::sched::Scheduler;
//! use courier_core::session::SessionManager;
//! use courier_core::store::{SessionStore, SqliteStore};
//!
//! #[tokio::main]
//! async fn main() -> courier_core::Result<()> {
//!     let cfg = Arc::new(CourierConfig::default());
//!     let store: Arc<dyn SessionStore> = Arc::new(SqliteStore::open(&cfg.store_path)?);
//!     let manager = SessionManager::new(
//!         Arc::clone(&cfg),
//!         store,
//!         Arc::new(LoopbackConnector::new()),
//!         Arc::new(NoopHandler),
//!     )?;
//!     let _scheduler = Scheduler::start(Arc::clone(&manager), cfg);
//!     manager.create_session("94741671668", None, true).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connect;
pub mod credentials;
pub mod dispatch;
pub mod error;
pub mod sched;
pub mod session;
pub mod store;

pub use config::CourierConfig;
pub use connect::{ConnectionEvent, Connector, CredentialSnapshot, InboundMessage};
pub use error::{CourierError, Result};
pub use session::manager::{SessionInfo, SessionManager, sanitize_number};
pub use store::{SessionHealth, SessionRecord, SessionStatus, SessionStore, SqliteStore};
