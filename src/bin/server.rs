//! # Webapp Server
//!
//! Runs the bootstrap and serves the application until Ctrl+C or SIGTERM.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default configuration from ./config
//! cargo run --bin webapp-server
//!
//! # Run with specific environment
//! APP_ENV=production cargo run --bin webapp-server
//! ```

use anyhow::Context;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

use webapp_core::bootstrap::bootstrap;
use webapp_core::config::ConfigManager;
use webapp_core::logging;
use webapp_core::web;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging first
    logging::init_structured_logging();

    info!("🚀 Starting Webapp Server...");
    info!("   Version: {}", env!("CARGO_PKG_VERSION"));
    info!(
        "   Build Mode: {}",
        if cfg!(debug_assertions) {
            "Debug"
        } else {
            "Release"
        }
    );

    let config = ConfigManager::load().context("Failed to load configuration")?;
    info!("   Environment: {}", config.environment());

    let context = Arc::new(
        bootstrap(config)
            .await
            .context("Failed to bootstrap application")?,
    );

    info!("🎉 Webapp Server started successfully!");
    info!("   Press Ctrl+C to shutdown gracefully");

    let served = web::serve(Arc::clone(&context), shutdown_signal()).await;

    info!("🛑 Shutdown signal received, closing resources...");
    context.shutdown().await;

    if let Err(e) = served {
        error!("Web server stopped with an error: {}", e);
        return Err(e).context("Web server failed");
    }

    info!("👋 Webapp Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C");
        },
        _ = terminate => {
            info!("Received SIGTERM");
        },
    }
}
