//! Tiered Cache - bootstrap binary
//!
//! Loads configuration from the environment, brings the cache up, runs the
//! maintenance task and closes everything on SIGINT/SIGTERM.

use std::time::Duration;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tiered_cache::{CacheConfig, CacheFacade};

/// Default interval in seconds between maintenance runs
const DEFAULT_CLEANUP_INTERVAL: u64 = 60;

/// Main entry point.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Initialize the cache (local tier, then Redis when enabled)
/// 4. Start background maintenance task
/// 5. Wait for SIGINT/SIGTERM, then close the cache
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tiered_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting tiered cache");

    let config = CacheConfig::from_env();
    info!(?config, "Configuration loaded");

    let cleanup_interval = std::env::var("CACHE_CLEANUP_INTERVAL")
        .ok()
        .and_then(|v| v.parse().ok())
        .filter(|secs: &u64| *secs > 0)
        .unwrap_or(DEFAULT_CLEANUP_INTERVAL);

    let cache = CacheFacade::new();
    cache
        .init(config)
        .await
        .context("failed to initialize cache")?;
    info!(remote = cache.has_remote(), "Cache initialized");

    let maintenance = cache
        .spawn_maintenance(Duration::from_secs(cleanup_interval))
        .context("failed to start maintenance task")?;
    info!("Background maintenance task started");

    shutdown_signal().await?;

    maintenance.abort();
    warn!("Maintenance task aborted");

    if let Ok(stats) = cache.stats() {
        info!(
            hits = stats.hits,
            misses = stats.misses,
            rejections = stats.rejections,
            entries = stats.total_entries,
            "Final local cache statistics"
        );
    }

    cache.close().await.context("failed to close cache")?;
    info!("Shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() -> anyhow::Result<()> {
    let ctrl_c = async { signal::ctrl_c().await.context("failed to install Ctrl+C handler") };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("failed to install SIGTERM handler")?
            .recv()
            .await;
        Ok::<_, anyhow::Error>(())
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<anyhow::Result<()>>();

    tokio::select! {
        result = ctrl_c => {
            result?;
            info!("Received Ctrl+C, initiating shutdown...");
        }
        result = terminate => {
            result?;
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
    Ok(())
}
