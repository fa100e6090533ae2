//! Price History and Symbol Info
//!
//! Pulled on demand from the chart endpoint; never cached.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use super::quote::Symbol;

/// Default look-back window for history requests.
pub const DEFAULT_RANGE: &str = "5d";

/// Default bar size for history requests.
pub const DEFAULT_INTERVAL: &str = "1m";

/// One OHLCV bar. Fields the upstream left blank are `None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceBar {
    /// Bar open time.
    pub time: DateTime<Utc>,
    /// Open price.
    pub open: Option<f64>,
    /// High price.
    pub high: Option<f64>,
    /// Low price.
    pub low: Option<f64>,
    /// Close price.
    pub close: Option<f64>,
    /// Volume traded in the bar.
    pub volume: Option<i64>,
}

/// Bars for one symbol, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceHistory {
    /// Normalized symbol.
    pub symbol: Symbol,
    /// Bars in time order.
    pub rows: Vec<PriceBar>,
}

/// Descriptive fields reported by the upstream for a symbol, passed through
/// as-is.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolInfo {
    /// Normalized symbol.
    pub symbol: Symbol,
    /// Upstream metadata keyed by its own field names.
    pub info: Map<String, Value>,
}

/// Check a `range`/`interval` token such as `5d`, `1mo` or `15m`.
#[must_use]
pub fn is_valid_period(token: &str) -> bool {
    !token.is_empty() && token.len() <= 8 && token.bytes().all(|b| b.is_ascii_alphanumeric())
}
