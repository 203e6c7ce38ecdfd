//! cs-server: media proxy and reporting API.
//!
//! This crate sits between browser clients and the upstream media server.
//! It provides:
//!
//! - Range-preserving byte proxy for unmodified files
//! - Manifest and segment proxy for re-encoded streams
//! - Timeline, watched-state, and re-encode stop relays
//! - Cacheable image proxy
//! - Stream negotiation for clients that do not embed the negotiator
//!
//! The upstream access token is injected server-side and never reaches the
//! client.

pub mod context;
pub mod error;
pub mod metadata;
pub mod middleware;
pub mod router;
pub mod routes;
pub mod upstream;

use std::net::SocketAddr;

use cs_core::config::Config;
use tokio_util::sync::CancellationToken;

use crate::context::AppContext;

/// Start the server and run until a shutdown signal arrives.
pub async fn start(config: Config) -> cs_core::Result<()> {
    start_with_cancel(config, CancellationToken::new()).await
}

/// Like [`start`], but also stops when `cancel` is triggered.
pub async fn start_with_cancel(config: Config, cancel: CancellationToken) -> cs_core::Result<()> {
    for warning in config.validate() {
        tracing::warn!("Config warning: {warning}");
    }

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| cs_core::Error::Internal(format!("Invalid server address: {e}")))?;

    let static_dir = config.server.static_dir.clone();
    tracing::info!(upstream = %config.upstream.url, "Proxying upstream media server");
    let ctx = AppContext::new(config);
    let app = router::build_router(ctx, static_dir);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| cs_core::Error::Internal(format!("Failed to bind to {addr}: {e}")))?;
    tracing::info!("Starting server on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel))
        .await
        .map_err(|e| cs_core::Error::Internal(format!("Server error: {e}")))?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM) or cancellation.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
        _ = cancel.cancelled() => {}
    }

    tracing::info!("Shutdown signal received");
}
