//! Points Leaderboard - points ledger and cached ranking service
//!
//! Binary entry point: loads configuration and reference data, wires the
//! services and serves the HTTP API.

use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use points_leaderboard::ledger::{LedgerSeed, MemoryLedgerStore};
use points_leaderboard::{create_router, spawn_cleanup_task, AppState, Config};

/// Main entry point for the points leaderboard server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Load the seed file into the ledger store, if configured
/// 4. Create the cache backend and services
/// 5. Start background cache purge task
/// 6. Start HTTP server on configured port
/// 7. Handle graceful shutdown on SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "points_leaderboard=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Points Leaderboard Server");

    let config = Config::from_env();
    info!(
        port = config.server_port,
        cache_backend = ?config.cache_backend,
        cleanup_interval = config.cleanup_interval,
        active_event_policy = ?config.active_event_policy,
        "Configuration loaded"
    );

    let seed = match &config.seed_file {
        Some(path) => load_seed(path)?,
        None => {
            warn!("No SEED_FILE configured, starting with an empty ledger");
            LedgerSeed::default()
        }
    };
    info!(
        users = seed.users.len(),
        tournaments = seed.tournaments.len(),
        events = seed.events.len(),
        "Reference data loaded"
    );
    let store = Arc::new(MemoryLedgerStore::from_seed(seed));

    let state = AppState::from_config(&config, store).with_context(|| {
        format!("failed to open cache directory {}", config.cache_dir.display())
    })?;

    let cleanup_handle = spawn_cleanup_task(state.cache.clone(), config.cleanup_interval);

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cleanup_handle))
        .await
        .context("server error")?;

    info!("Server shutdown complete");
    Ok(())
}

fn load_seed(path: &Path) -> anyhow::Result<LedgerSeed> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read seed file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse seed file {}", path.display()))
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM), then stops the purge task.
async fn shutdown_signal(cleanup_handle: tokio::task::JoinHandle<()>) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    cleanup_handle.abort();
    warn!("Cache purge task aborted");
}
