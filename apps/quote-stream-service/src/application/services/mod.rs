//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `QuoteService`: answers quote reads from the stream cache, falling back
//!   to the pull-based provider, forwards subscription changes and passes
//!   history and info requests through to the provider

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::application::ports::{FallbackQuoteProvider, QuoteStream};
use crate::domain::connection::StreamStatus;
use crate::domain::history::{PriceHistory, SymbolInfo, is_valid_period};
use crate::domain::quote::{FallbackQuote, QuoteSnapshot, Symbol};

/// Errors returned to quote callers.
#[derive(Debug, thiserror::Error)]
pub enum QuoteError {
    /// The requested symbol is blank.
    #[error("invalid symbol: {0:?}")]
    InvalidSymbol(String),

    /// A history `range` or `interval` token is malformed.
    #[error("invalid period: {0:?}")]
    InvalidPeriod(String),

    /// Neither the stream nor the fallback has a price.
    #[error("no quote available for {0}")]
    NotAvailable(Symbol),

    /// The provider has no history for the symbol.
    #[error("no history available for {0}")]
    HistoryNotAvailable(Symbol),

    /// The provider has no metadata for the symbol.
    #[error("no info available for {0}")]
    InfoNotAvailable(Symbol),
}

/// A quote as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QuoteView {
    /// Taken from the stream cache.
    Streamed(Arc<QuoteSnapshot>),
    /// Pulled from the fallback provider.
    Fallback(FallbackQuote),
}

impl QuoteView {
    /// Check if the quote came from the stream.
    #[must_use]
    pub const fn is_streamed(&self) -> bool {
        matches!(self, Self::Streamed(_))
    }
}

/// Quote reads and subscription control for the request layer.
pub struct QuoteService {
    stream: Arc<dyn QuoteStream>,
    fallback: Arc<dyn FallbackQuoteProvider>,
}

impl QuoteService {
    /// Create a service over a stream and a fallback provider.
    #[must_use]
    pub fn new(stream: Arc<dyn QuoteStream>, fallback: Arc<dyn FallbackQuoteProvider>) -> Self {
        Self { stream, fallback }
    }

    /// Latest quote for a symbol.
    ///
    /// # Errors
    ///
    /// Returns `QuoteError::InvalidSymbol` for a blank symbol and
    /// `QuoteError::NotAvailable` when neither source has a price.
    pub async fn quote(&self, raw: &str) -> Result<QuoteView, QuoteError> {
        let symbol = Symbol::parse(raw).ok_or_else(|| QuoteError::InvalidSymbol(raw.to_string()))?;

        if let Some(snapshot) = self.stream.get_latest(symbol.as_str()) {
            return Ok(QuoteView::Streamed(snapshot));
        }

        match self.fallback.fetch_quote(&symbol).await {
            Ok(quote) => Ok(QuoteView::Fallback(quote)),
            Err(e) => {
                tracing::debug!(symbol = %symbol, error = %e, "Fallback quote unavailable");
                Err(QuoteError::NotAvailable(symbol))
            }
        }
    }

    /// Price history for a symbol, straight from the provider.
    ///
    /// # Errors
    ///
    /// Returns `QuoteError::InvalidSymbol` or `QuoteError::InvalidPeriod` for
    /// malformed input and `QuoteError::HistoryNotAvailable` when the provider
    /// fails.
    pub async fn history(
        &self,
        raw: &str,
        range: &str,
        interval: &str,
    ) -> Result<PriceHistory, QuoteError> {
        let symbol = Symbol::parse(raw).ok_or_else(|| QuoteError::InvalidSymbol(raw.to_string()))?;
        if let Some(bad) = [range, interval].into_iter().find(|t| !is_valid_period(t)) {
            return Err(QuoteError::InvalidPeriod(bad.to_string()));
        }

        self.fallback
            .history(&symbol, range, interval)
            .await
            .map_err(|e| {
                tracing::debug!(
                    symbol = %symbol, range, interval, error = %e,
                    "History unavailable"
                );
                QuoteError::HistoryNotAvailable(symbol)
            })
    }

    /// Descriptive metadata for a symbol, straight from the provider.
    ///
    /// # Errors
    ///
    /// Returns `QuoteError::InvalidSymbol` for a blank symbol and
    /// `QuoteError::InfoNotAvailable` when the provider fails.
    pub async fn info(&self, raw: &str) -> Result<SymbolInfo, QuoteError> {
        let symbol = Symbol::parse(raw).ok_or_else(|| QuoteError::InvalidSymbol(raw.to_string()))?;

        self.fallback.info(&symbol).await.map_err(|e| {
            tracing::debug!(symbol = %symbol, error = %e, "Info unavailable");
            QuoteError::InfoNotAvailable(symbol)
        })
    }

    /// Latest streamed quotes for several symbols. Never touches the network.
    #[must_use]
    pub fn quotes(&self, raw: &[String]) -> BTreeMap<Symbol, Option<Arc<QuoteSnapshot>>> {
        self.stream.get_latest_many(raw)
    }

    /// Subscribe to symbols, returning their normalized form.
    pub async fn subscribe(&self, raw: &[String]) -> Vec<Symbol> {
        self.stream.subscribe(raw).await;
        Symbol::parse_all(raw).into_iter().collect()
    }

    /// Unsubscribe from symbols, returning their normalized form.
    pub async fn unsubscribe(&self, raw: &[String]) -> Vec<Symbol> {
        self.stream.unsubscribe(raw).await;
        Symbol::parse_all(raw).into_iter().collect()
    }

    /// Stream status.
    #[must_use]
    pub fn status(&self) -> StreamStatus {
        self.stream.status()
    }
}
