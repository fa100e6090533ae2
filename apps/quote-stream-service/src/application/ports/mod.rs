//! Port Interfaces
//!
//! Defines the interfaces (ports) the core depends on and the one it exposes.
//! Infrastructure adapters implement these.
//!
//! ## Driven Ports (Outbound)
//!
//! - `FrameDecoder`: turns one raw upstream frame into a `TickerEvent`
//! - `FallbackQuoteProvider`: pulls a quote when nothing has been streamed,
//!   plus price history and symbol info on request
//!
//! ## Driver Ports (Inbound)
//!
//! - `QuoteStream`: subscription control and cache reads used by the HTTP layer

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::connection::StreamStatus;
use crate::domain::history::{PriceHistory, SymbolInfo};
use crate::domain::quote::{FallbackQuote, QuoteSnapshot, Symbol, TickerEvent};

// =============================================================================
// Frame Decoder
// =============================================================================

/// Errors from decoding a single frame.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The outer envelope could not be read.
    #[error("malformed envelope: {0}")]
    Envelope(String),

    /// The payload encoding (e.g. base64) is invalid.
    #[error("invalid encoding: {0}")]
    Encoding(String),

    /// The decoded payload is not a valid pricing message.
    #[error("invalid payload: {0}")]
    Payload(String),
}

/// Decodes one opaque upstream frame.
///
/// Any error is treated by the stream manager as a broken connection.
pub trait FrameDecoder: Send + Sync {
    /// Decode a raw frame.
    ///
    /// # Errors
    ///
    /// Returns `DecodeError` if the frame cannot be decoded.
    fn decode(&self, frame: &[u8]) -> Result<TickerEvent, DecodeError>;
}

// =============================================================================
// Fallback Quote Provider
// =============================================================================

/// Errors from the pull-based provider.
#[derive(Debug, thiserror::Error)]
pub enum FallbackError {
    /// Fallback lookups are turned off.
    #[error("fallback provider disabled")]
    Disabled,

    /// The provider has no price for the symbol.
    #[error("no price available for {0}")]
    NotFound(String),

    /// The request failed.
    #[error("fallback request failed: {0}")]
    Request(String),

    /// The response could not be interpreted.
    #[error("malformed fallback response: {0}")]
    Malformed(String),
}

/// Pull-based market data: the quote source used when the cache has nothing
/// for a symbol, and the source of history and symbol info.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FallbackQuoteProvider: Send + Sync {
    /// Fetch a delayed quote.
    ///
    /// # Errors
    ///
    /// Returns `FallbackError` if no quote can be produced.
    async fn fetch_quote(&self, symbol: &Symbol) -> Result<FallbackQuote, FallbackError>;

    /// Fetch OHLCV bars covering `range` at `interval` resolution.
    ///
    /// # Errors
    ///
    /// Returns `FallbackError` if the upstream has no history for the symbol.
    async fn history(
        &self,
        symbol: &Symbol,
        range: &str,
        interval: &str,
    ) -> Result<PriceHistory, FallbackError>;

    /// Fetch descriptive metadata for a symbol.
    ///
    /// # Errors
    ///
    /// Returns `FallbackError` if the upstream does not know the symbol.
    async fn info(&self, symbol: &Symbol) -> Result<SymbolInfo, FallbackError>;
}

// =============================================================================
// Quote Stream
// =============================================================================

/// Subscription control and cache reads exposed by the stream manager.
///
/// Raw symbols are normalized by the implementation; blank entries are ignored.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuoteStream: Send + Sync {
    /// Add symbols to the subscription set.
    async fn subscribe(&self, symbols: &[String]);

    /// Remove symbols from the subscription set.
    async fn unsubscribe(&self, symbols: &[String]);

    /// Latest streamed snapshot for a symbol.
    fn get_latest(&self, symbol: &str) -> Option<Arc<QuoteSnapshot>>;

    /// Latest streamed snapshots for several symbols, read at one instant.
    fn get_latest_many(&self, symbols: &[String]) -> BTreeMap<Symbol, Option<Arc<QuoteSnapshot>>>;

    /// Current connection status.
    fn status(&self) -> StreamStatus;
}
