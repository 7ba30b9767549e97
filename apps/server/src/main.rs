//! courierd - multi-tenant session manager daemon.
//!
//! Hosts the session lifecycle manager behind an HTTP control plane and runs
//! the background reconciliation sweeps. The wire transport is pluggable;
//! the built-in loopback transport serves local development.

use clap::Parser;
use courier_server::routes;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use courier_core::config::CourierConfig;
use courier_core::connect::LoopbackConnector;
use courier_core::dispatch::NoopHandler;
use courier_core::sched::Scheduler;
use courier_core::session::SessionManager;
use courier_core::store::{SessionStore, SqliteStore};

/// Courier session manager daemon.
#[derive(Parser, Debug)]
#[command(
    name = "courierd",
    author,
    version,
    about = "Multi-tenant session manager for persistent messaging connections"
)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen port (overrides configuration)
    #[arg(short, long)]
    port: Option<u16>,

    /// Log filter (tracing env-filter syntax)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .init();

    let mut cfg = CourierConfig::load(args.config.as_deref())?;
    if let Some(port) = args.port {
        cfg.listen_port = port;
    }
    let cfg = Arc::new(cfg);

    let store: Arc<dyn SessionStore> = Arc::new(SqliteStore::open(&cfg.store_path)?);
    let manager = SessionManager::new(
        Arc::clone(&cfg),
        Arc::clone(&store),
        Arc::new(LoopbackConnector::new()),
        Arc::new(NoopHandler),
    )?;
    let mut scheduler = Scheduler::start(Arc::clone(&manager), Arc::clone(&cfg));

    let state = routes::AppState {
        manager: Arc::clone(&manager),
        store,
        started_at: Instant::now(),
    };
    let app = routes::router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.listen_port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Control plane listening");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    // Cooperative shutdown with a hard deadline: flush credentials, close
    // connections, then exit even if some flushes are still pending.
    scheduler.shutdown();
    if tokio::time::timeout(cfg.shutdown_deadline(), manager.shutdown()).await.is_err() {
        warn!("Shutdown deadline exceeded, exiting with pending flushes");
    }
    info!("Shutdown complete");
    Ok(())
}

/// Resolves when a termination signal arrives.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    info!("Termination signal received, shutting down");
}
