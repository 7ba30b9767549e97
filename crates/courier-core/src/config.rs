//! Configuration for the session manager and its background tasks.
//!
//! Loaded from a TOML file with `COURIER_*` environment overrides. Every
//! default mirrors the operational values the service has been run with:
//! a flat 5-second reconnect delay with a retry budget of 2, 30-day session
//! age, and the interval set documented per field.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourierConfig {
    /// Path of the durable session store database.
    #[serde(default = "default_store_path")]
    pub store_path: String,

    /// HTTP control-plane listen port.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Root directory of per-tenant credential workspaces.
    #[serde(default = "default_credentials_dir")]
    pub credentials_dir: PathBuf,

    /// Command prefix handed through to the message-dispatch collaborator.
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,

    /// Background task intervals.
    #[serde(default)]
    pub intervals: Intervals,

    /// Lifecycle limits and delays.
    #[serde(default)]
    pub limits: Limits,

    /// Side-effect targets run when a session opens.
    #[serde(default)]
    pub open_hooks: OpenHooks,
}

/// Background task intervals, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intervals {
    /// Persistence sync (default 120s).
    #[serde(default = "default_save_secs")]
    pub save_secs: u64,
    /// Stale-session eviction (default 300s).
    #[serde(default = "default_cleanup_secs")]
    pub cleanup_secs: u64,
    /// Reconnect sweep (default 300s).
    #[serde(default = "default_reconnect_secs")]
    pub reconnect_secs: u64,
    /// Cold restore sweep (default 3600s).
    #[serde(default = "default_restore_secs")]
    pub restore_secs: u64,
    /// Pending-write flush (default 600s).
    #[serde(default = "default_sync_secs")]
    pub sync_secs: u64,
    /// Delay before the startup restore sweep (default 10s).
    #[serde(default = "default_initial_restore_delay_secs")]
    pub initial_restore_delay_secs: u64,
}

/// Lifecycle limits and delays.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Limits {
    /// Retry budget for consecutive retryable closes (default 2).
    #[serde(default = "default_max_failed_attempts")]
    pub max_failed_attempts: u32,
    /// Maximum total session age before forced eviction (default 30 days).
    #[serde(default = "default_max_session_age_secs")]
    pub max_session_age_secs: u64,
    /// Idle grace for disconnected in-memory handles (default 180s).
    #[serde(default = "default_disconnected_cleanup_secs")]
    pub disconnected_cleanup_secs: u64,
    /// Grace before a logged-out record is purged (default 120s).
    #[serde(default = "default_immediate_delete_delay_secs")]
    pub immediate_delete_delay_secs: u64,
    /// Flat delay before a scheduled reconnect attempt (default 5s).
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
    /// Pacing between restore-sweep connection attempts (default 2000ms).
    #[serde(default = "default_restore_pacing_ms")]
    pub restore_pacing_ms: u64,
    /// Hard deadline for graceful shutdown (default 10s).
    #[serde(default = "default_shutdown_deadline_secs")]
    pub shutdown_deadline_secs: u64,
}

/// Targets for the on-open side-effect hooks.
///
/// Each hook runs independently; one failing never blocks the others.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenHooks {
    /// Numbers notified when a session connects.
    #[serde(default)]
    pub notify_numbers: Vec<String>,
    /// Group invite code accepted automatically on open.
    #[serde(default)]
    pub auto_join_invite: Option<String>,
    /// Broadcast channels subscribed automatically on open.
    #[serde(default)]
    pub auto_subscribe: Vec<String>,
}

fn default_store_path() -> String {
    "courier.db".to_string()
}
fn default_listen_port() -> u16 {
    8000
}
fn default_credentials_dir() -> PathBuf {
    PathBuf::from("auth_state")
}
fn default_command_prefix() -> String {
    ".".to_string()
}
fn default_save_secs() -> u64 {
    120
}
fn default_cleanup_secs() -> u64 {
    300
}
fn default_reconnect_secs() -> u64 {
    300
}
fn default_restore_secs() -> u64 {
    3600
}
fn default_sync_secs() -> u64 {
    600
}
fn default_initial_restore_delay_secs() -> u64 {
    10
}
fn default_max_failed_attempts() -> u32 {
    2
}
fn default_max_session_age_secs() -> u64 {
    2_592_000
}
fn default_disconnected_cleanup_secs() -> u64 {
    180
}
fn default_immediate_delete_delay_secs() -> u64 {
    120
}
fn default_reconnect_delay_secs() -> u64 {
    5
}
fn default_restore_pacing_ms() -> u64 {
    2000
}
fn default_shutdown_deadline_secs() -> u64 {
    10
}

impl Default for CourierConfig {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            listen_port: default_listen_port(),
            credentials_dir: default_credentials_dir(),
            command_prefix: default_command_prefix(),
            intervals: Intervals::default(),
            limits: Limits::default(),
            open_hooks: OpenHooks::default(),
        }
    }
}

impl Default for Intervals {
    fn default() -> Self {
        Self {
            save_secs: default_save_secs(),
            cleanup_secs: default_cleanup_secs(),
            reconnect_secs: default_reconnect_secs(),
            restore_secs: default_restore_secs(),
            sync_secs: default_sync_secs(),
            initial_restore_delay_secs: default_initial_restore_delay_secs(),
        }
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_failed_attempts: default_max_failed_attempts(),
            max_session_age_secs: default_max_session_age_secs(),
            disconnected_cleanup_secs: default_disconnected_cleanup_secs(),
            immediate_delete_delay_secs: default_immediate_delete_delay_secs(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
            restore_pacing_ms: default_restore_pacing_ms(),
            shutdown_deadline_secs: default_shutdown_deadline_secs(),
        }
    }
}

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file not found.
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    /// Failed to read configuration file.
    #[error("Failed to read configuration file: {0}")]
    Read(String),

    /// Failed to parse configuration file.
    #[error("Failed to parse configuration file: {0}")]
    Parse(String),

    /// Invalid configuration value.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

impl CourierConfig {
    /// Loads configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Read(e.to_string()))?;
        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the configuration: the given file when present, defaults
    /// otherwise, with environment overrides applied on top.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = match path {
            Some(p) => Self::load_from_file(p)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Applies `COURIER_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("COURIER_STORE_PATH") {
            self.store_path = path;
        }
        if let Ok(port) = std::env::var("COURIER_PORT") {
            if let Ok(port) = port.parse() {
                self.listen_port = port;
            }
        }
        if let Ok(dir) = std::env::var("COURIER_CREDENTIALS_DIR") {
            self.credentials_dir = PathBuf::from(dir);
        }
        if let Ok(prefix) = std::env::var("COURIER_COMMAND_PREFIX") {
            self.command_prefix = prefix;
        }
    }

    /// Validates interval and limit sanity.
    pub fn validate(&self) -> ConfigResult<()> {
        let intervals = [
            ("intervals.save_secs", self.intervals.save_secs),
            ("intervals.cleanup_secs", self.intervals.cleanup_secs),
            ("intervals.reconnect_secs", self.intervals.reconnect_secs),
            ("intervals.restore_secs", self.intervals.restore_secs),
            ("intervals.sync_secs", self.intervals.sync_secs),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(ConfigError::InvalidValue(format!("{name} must be at least 1")));
            }
        }
        if self.store_path.is_empty() {
            return Err(ConfigError::InvalidValue("store_path must not be empty".to_string()));
        }
        Ok(())
    }

    /// Persistence sync interval.
    pub fn save_interval(&self) -> Duration {
        Duration::from_secs(self.intervals.save_secs)
    }

    /// Eviction sweep interval.
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.intervals.cleanup_secs)
    }

    /// Reconnect sweep interval.
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_secs(self.intervals.reconnect_secs)
    }

    /// Cold restore sweep interval.
    pub fn restore_interval(&self) -> Duration {
        Duration::from_secs(self.intervals.restore_secs)
    }

    /// Pending-write flush interval.
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.intervals.sync_secs)
    }

    /// Delay before the startup restore sweep.
    pub fn initial_restore_delay(&self) -> Duration {
        Duration::from_secs(self.intervals.initial_restore_delay_secs)
    }

    /// Flat delay before a scheduled reconnect attempt.
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.limits.reconnect_delay_secs)
    }

    /// Pacing between restore-sweep connection attempts.
    pub fn restore_pacing(&self) -> Duration {
        Duration::from_millis(self.limits.restore_pacing_ms)
    }

    /// Grace before a logged-out record is purged.
    pub fn immediate_delete_delay(&self) -> Duration {
        Duration::from_secs(self.limits.immediate_delete_delay_secs)
    }

    /// Hard deadline for graceful shutdown.
    pub fn shutdown_deadline(&self) -> Duration {
        Duration::from_secs(self.limits.shutdown_deadline_secs)
    }

    /// Maximum total session age before forced eviction.
    pub fn max_session_age(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.limits.max_session_age_secs as i64)
    }

    /// Idle grace for disconnected in-memory handles.
    pub fn disconnected_cleanup(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.limits.disconnected_cleanup_secs as i64)
    }
}
