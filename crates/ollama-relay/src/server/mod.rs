//! HTTP front end for the relay
//!
//! Exposes `POST /api/chat`, which streams decoded model text back as
//! `text/plain`, and a `GET /health` probe.

pub mod handlers;

use axum::{
    Router,
    routing::{get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::error::{RelayAppError, Result};
use crate::relay::StreamRelay;

/// Shared application state for all handlers
#[derive(Debug, Clone)]
pub struct AppState {
    /// Relay used to open upstream generations
    pub relay: StreamRelay,
}

impl AppState {
    pub fn new(config: &Config) -> Result<Self> {
        let relay = StreamRelay::new(config)?;
        Ok(Self { relay })
    }
}

/// The relay HTTP server
pub struct RelayServer {
    config: Config,
}

impl RelayServer {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Bind the listen address and serve until Ctrl+C or SIGTERM
    pub async fn serve(&self) -> Result<()> {
        let state = Arc::new(AppState::new(&self.config)?);
        let app = create_router(state);

        let addr: SocketAddr = self
            .config
            .server
            .listen_addr
            .parse()
            .map_err(|e| RelayAppError::Config(format!("Invalid listen address: {e}")))?;

        tracing::info!("Starting relay server on {addr}");
        tracing::info!(
            "Upstream: {} (stream: {}, timeout: {}ms)",
            self.config.upstream.display_host(),
            self.config.upstream.stream,
            self.config.upstream.timeout_ms
        );
        tracing::info!(
            "Forwarding mode: {} (token delay: {}ms)",
            self.config.relay.forwarding.as_str(),
            self.config.relay.token_delay_ms
        );

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| RelayAppError::Server(format!("Failed to bind to {addr}: {e}")))?;

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| RelayAppError::Server(format!("Server error: {e}")))?;

        tracing::info!("Relay server shut down gracefully");
        Ok(())
    }
}

/// Create the router with all routes configured
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/api/chat", post(handlers::chat_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
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
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        },
    }
}
