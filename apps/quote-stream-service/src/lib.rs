#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Quote Stream Service - Streaming Quote Cache
//!
//! Keeps one WebSocket connection to Yahoo's pricing stream, maintains the
//! latest quote per symbol in memory and serves it over HTTP, falling back to
//! a pull-based provider for symbols that have not streamed yet.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core types and in-memory state
//!   - `quote`: Symbols, ticker events, snapshots
//!   - `subscription`: Subscription registry
//!   - `cache`: Latest quote cache
//!   - `connection`: Connection state and status
//!   - `history`: Price bars and symbol metadata
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Frame decoder, fallback provider, quote stream
//!   - `services`: Quote reads and subscription control
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `yahoo`: Pricing stream decoder and lifecycle manager
//!   - `fallback`: Chart endpoint quote, history and info provider
//!   - `http`: REST API, health and metrics endpoints
//!   - `config`: Environment configuration
//!
//! # Data Flow
//!
//! ```text
//! Yahoo WS ──► StreamManager ──► QuoteCache ──► QuoteService ──► HTTP
//!                   ▲                               │
//!                   └──── SubscriptionRegistry ◄────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core types with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::cache::QuoteCache;
pub use domain::connection::{ConnectionState, StreamStatus};
pub use domain::history::{PriceBar, PriceHistory, SymbolInfo};
pub use domain::quote::{
    FallbackQuote, MarketHours, QuoteSnapshot, QuoteSource, QuoteType, Symbol, TickerEvent,
};
pub use domain::subscription::SubscriptionRegistry;

// Ports and services
pub use application::ports::{
    DecodeError, FallbackError, FallbackQuoteProvider, FrameDecoder, QuoteStream,
};
pub use application::services::{QuoteError, QuoteService, QuoteView};

// Infrastructure config
pub use infrastructure::config::{
    ConfigError, FallbackSettings, ServerSettings, ServiceConfig, StreamSettings,
};

// Stream adapter
pub use infrastructure::yahoo::{
    PricingData, StreamConfig, StreamError, StreamManager, YahooFrameDecoder,
};

// Fallback providers
pub use infrastructure::fallback::{DisabledFallback, YahooChartFallback};

// HTTP server
pub use infrastructure::http::{AppState, HttpServer, HttpServerError, router};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
