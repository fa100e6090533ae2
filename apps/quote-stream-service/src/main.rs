//! Quote Stream Service Binary
//!
//! Starts the streaming quote cache and its HTTP API.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin quote-stream-service
//! ```
//!
//! # Environment Variables
//!
//! - `QUOTE_STREAM_URL`: pricing stream endpoint (default: <wss://streamer.finance.yahoo.com/>)
//! - `QUOTE_STREAM_HTTP_PORT`: HTTP API port (default: 8000)
//! - `QUOTE_STREAM_SYMBOLS`: comma-separated symbols subscribed at startup
//! - `QUOTE_STREAM_PING_INTERVAL_SECS` / `QUOTE_STREAM_PING_TIMEOUT_SECS`: keepalive (default: 20 / 20)
//! - `QUOTE_STREAM_ACK_TIMEOUT_SECS`: subscribe acknowledgment wait (default: 5)
//! - `QUOTE_STREAM_STOP_TIMEOUT_SECS`: shutdown wait for the stream task (default: 5)
//! - `QUOTE_STREAM_RECONNECT_DELAY_INITIAL_MS`: first backoff delay (default: 1000)
//! - `QUOTE_STREAM_RECONNECT_DELAY_MAX_SECS`: backoff ceiling (default: 30)
//! - `QUOTE_STREAM_RECONNECT_DELAY_MULTIPLIER`: backoff growth (default: 2.0)
//! - `QUOTE_STREAM_RECONNECT_JITTER`: backoff jitter fraction (default: 0.0)
//! - `QUOTE_STREAM_FALLBACK_ENABLED`: use the chart endpoint fallback (default: true)
//! - `QUOTE_STREAM_FALLBACK_URL`: chart endpoint base URL (default: <https://query1.finance.yahoo.com>)
//! - `QUOTE_STREAM_FALLBACK_TIMEOUT_SECS`: fallback request timeout (default: 10)
//! - `OTEL_ENABLED`: export spans over OTLP (default: false)
//! - `RUST_LOG`: log filter (default: `quote_stream_service=info`)

use std::sync::Arc;

use anyhow::{Context, anyhow};
use quote_stream_service::application::ports::FallbackQuoteProvider;
use quote_stream_service::{
    AppState, DisabledFallback, HttpServer, QuoteService, ServiceConfig, StreamConfig,
    StreamManager, YahooChartFallback, YahooFrameDecoder, init_metrics, init_telemetry,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("rustls crypto provider already installed"))?;

    load_dotenv();

    let _telemetry_guard = init_telemetry().context("failed to initialize telemetry")?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting quote stream service");

    let _metrics_handle = init_metrics().context("failed to install metrics recorder")?;

    let config = ServiceConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let stream = Arc::new(StreamManager::new(
        StreamConfig::from_stream_settings(&config.stream),
        Arc::new(YahooFrameDecoder::new()),
    ));

    let fallback: Arc<dyn FallbackQuoteProvider> = if config.fallback.enabled {
        Arc::new(
            YahooChartFallback::new(&config.fallback)
                .context("failed to build fallback HTTP client")?,
        )
    } else {
        Arc::new(DisabledFallback)
    };

    if !config.startup_symbols.is_empty() {
        stream.subscribe(&config.startup_symbols).await;
    }
    stream.start();

    let quotes = Arc::new(QuoteService::new(stream.clone(), fallback));
    let state = Arc::new(AppState::new(env!("CARGO_PKG_VERSION"), quotes));
    let http_server = HttpServer::new(config.server.http_port, state, shutdown_token.clone());

    let http_handle = tokio::spawn(async move {
        if let Err(e) = http_server.run().await {
            tracing::error!(error = %e, "HTTP server error");
        }
    });

    tracing::info!("Quote stream service ready");

    await_shutdown(shutdown_token).await;

    if let Err(e) = http_handle.await {
        tracing::warn!(error = %e, "HTTP server task failed");
    }
    stream.stop().await;

    tracing::info!("Quote stream service stopped");
    Ok(())
}

/// Log the parsed configuration.
fn log_config(config: &ServiceConfig) {
    tracing::info!(
        url = %config.stream.url,
        http_port = config.server.http_port,
        startup_symbols = config.startup_symbols.len(),
        fallback_enabled = config.fallback.enabled,
        "Configuration loaded"
    );
    tracing::debug!(
        ping_interval_secs = config.stream.ping_interval.as_secs(),
        ack_timeout_secs = config.stream.ack_timeout.as_secs(),
        reconnect_delay_initial_ms = config.stream.reconnect_delay_initial.as_millis(),
        reconnect_delay_max_secs = config.stream.reconnect_delay_max.as_secs(),
        "Stream timings"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();
}
