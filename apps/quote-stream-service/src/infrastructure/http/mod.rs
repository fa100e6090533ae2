//! HTTP API
//!
//! Request routing for the quote service.
//!
//! # Endpoints
//!
//! - `GET /health` - JSON health status with stream details
//! - `GET /healthz` - Liveness check (simple OK)
//! - `GET /readyz` - Readiness check (stream connected)
//! - `GET /metrics` - Prometheus metrics in text format
//! - `POST /v1/stream/subscribe` - Add symbols to the stream
//! - `POST /v1/stream/unsubscribe` - Remove symbols from the stream
//! - `GET /v1/quote/{symbol}` - Latest quote, streamed or fallback
//! - `GET /v1/quotes?symbols=A,B` - Latest streamed quotes for several symbols
//! - `GET /v1/history/{symbol}?period=5d&interval=1m` - OHLCV bars
//! - `GET /v1/info/{symbol}` - Symbol metadata

mod health;
mod quotes;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::services::QuoteService;

pub use health::{HealthResponse, HealthStatus, StreamHealth};

// =============================================================================
// Server State
// =============================================================================

/// Shared state for request handlers.
pub struct AppState {
    version: String,
    started_at: Instant,
    quotes: Arc<QuoteService>,
}

impl AppState {
    /// Create handler state.
    #[must_use]
    pub fn new(version: impl Into<String>, quotes: Arc<QuoteService>) -> Self {
        Self {
            version: version.into(),
            started_at: Instant::now(),
            quotes,
        }
    }
}

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/healthz", get(health::liveness_handler))
        .route("/readyz", get(health::readiness_handler))
        .route("/metrics", get(health::metrics_handler))
        .route("/v1/stream/subscribe", post(quotes::subscribe_handler))
        .route("/v1/stream/unsubscribe", post(quotes::unsubscribe_handler))
        .route("/v1/quote/{symbol}", get(quotes::quote_handler))
        .route("/v1/quotes", get(quotes::quotes_handler))
        .route("/v1/history/{symbol}", get(quotes::history_handler))
        .route("/v1/info/{symbol}", get(quotes::info_handler))
        .with_state(state)
}

// =============================================================================
// HTTP Server
// =============================================================================

/// HTTP server for the quote API.
pub struct HttpServer {
    port: u16,
    state: Arc<AppState>,
    cancel: CancellationToken,
}

impl HttpServer {
    /// Create a new server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<AppState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HttpServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HttpServerError> {
        let app = router(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HttpServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "HTTP server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HttpServerError::ServerFailed(e.to_string()))?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// HTTP server errors.
#[derive(Debug, thiserror::Error)]
pub enum HttpServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}
