//! # UAC Gate - slide-captcha service
//!
//! Issues slide-captcha challenges and decides whether a submitted
//! pointer-drag trajectory was produced by a human.
//!
//! ## Architecture
//! ```text
//! Client → UAC API → Gate ─┬─ Verifier (pure scoring)
//!                          └─ Challenge store (Redis | memory)
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod captcha;
mod config;
mod routes;
mod state;

use crate::captcha::store_janitor;
use crate::config::{AppConfig, StoreBackend};
use crate::state::AppState;

/// UAC Gate - slide-captcha verification service
#[derive(Parser, Debug)]
#[command(name = "uac-gate")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/uac-gate.toml")]
    config: String,

    /// Redis URL (overrides config)
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    /// Listen address (overrides config)
    #[arg(short, long, env = "LISTEN_ADDR")]
    listen: Option<String>,

    /// Challenge store backend (overrides config)
    #[arg(long, value_enum, env = "CAPTCHA_STORE")]
    store: Option<StoreBackend>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, default_value = "false")]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Pick up a local .env before clap reads env fallbacks
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(&args.log_level, args.json_logs)?;

    info!("Starting UAC Gate v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::load(&args.config, &args)?;
    info!(
        store = ?config.store.backend,
        challenge_ttl_secs = config.captcha.challenge_ttl_secs,
        "Configuration loaded from {}",
        args.config
    );

    // Create shutdown broadcast channel
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    // Initialize application state
    let state = AppState::new(config.clone()).await?;
    info!(
        backend = state.store.backend_name(),
        pass_threshold = state.verifier.config().pass_threshold,
        "Challenge store ready"
    );

    // Redis expires keys itself; the memory store needs sweeping
    if config.store.backend == StoreBackend::Memory {
        let store = state.store.clone();
        let stats = state.stats.clone();
        let interval = Duration::from_secs(config.store.janitor_interval_secs);
        let janitor_shutdown = shutdown_tx.subscribe();
        tokio::spawn(async move {
            store_janitor(store, stats, interval, janitor_shutdown).await;
        });
    }

    // Build router
    let app = routes::create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    info!("UAC Gate listening on {}", config.listen_addr);

    // Handle graceful shutdown
    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        }
        info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("Server error")?;

    info!("UAC Gate shutdown complete");
    Ok(())
}

/// Initialize structured logging with tracing
fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
            .context("Failed to initialize logging")?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .try_init()
            .context("Failed to initialize logging")?;
    }

    Ok(())
}
