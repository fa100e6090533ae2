//! Quote Domain Types
//!
//! Symbols, decoded ticker events and the snapshots materialized from them.
//! These types are codec-agnostic: the Yahoo decoder produces `TickerEvent`s
//! and everything downstream works with `QuoteSnapshot`s.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

// =============================================================================
// Symbol
// =============================================================================

/// A normalized ticker identifier (trimmed, uppercase, never empty).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    /// Normalize a raw identifier.
    ///
    /// Returns `None` when nothing is left after trimming.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_uppercase();
        if normalized.is_empty() {
            None
        } else {
            Some(Self(normalized))
        }
    }

    /// Normalize a batch of raw identifiers, dropping empty ones.
    #[must_use]
    pub fn parse_all<I, S>(raw: I) -> BTreeSet<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        raw.into_iter()
            .filter_map(|s| Self::parse(s.as_ref()))
            .collect()
    }

    /// The normalized identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// Enumerations
// =============================================================================

/// Instrument class reported on each pricing frame.
///
/// `Heartbeat` is reserved by the upstream for keep-alive frames that carry no
/// quote data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuoteType {
    /// No type set.
    None,
    /// Alternative symbol.
    AltSymbol,
    /// Keep-alive frame.
    Heartbeat,
    /// Common stock.
    Equity,
    /// Market index.
    Index,
    /// Mutual fund.
    MutualFund,
    /// Money market fund.
    MoneyMarket,
    /// Option contract.
    OptionContract,
    /// Currency pair.
    Currency,
    /// Warrant.
    Warrant,
    /// Bond.
    Bond,
    /// Futures contract.
    Future,
    /// Exchange traded fund.
    Etf,
    /// Commodity.
    Commodity,
    /// ECN quote.
    EcnQuote,
    /// Cryptocurrency.
    Cryptocurrency,
    /// Indicator.
    Indicator,
    /// Industry aggregate.
    Industry,
    /// A code this build does not know about.
    Unknown(i32),
}

impl QuoteType {
    /// Map a wire code to a quote type.
    #[must_use]
    pub const fn from_code(code: i32) -> Self {
        match code {
            0 => Self::None,
            5 => Self::AltSymbol,
            7 => Self::Heartbeat,
            8 => Self::Equity,
            9 => Self::Index,
            11 => Self::MutualFund,
            12 => Self::MoneyMarket,
            13 => Self::OptionContract,
            14 => Self::Currency,
            15 => Self::Warrant,
            17 => Self::Bond,
            18 => Self::Future,
            20 => Self::Etf,
            23 => Self::Commodity,
            28 => Self::EcnQuote,
            41 => Self::Cryptocurrency,
            42 => Self::Indicator,
            1000 => Self::Industry,
            other => Self::Unknown(other),
        }
    }

    /// The wire code for this quote type.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::None => 0,
            Self::AltSymbol => 5,
            Self::Heartbeat => 7,
            Self::Equity => 8,
            Self::Index => 9,
            Self::MutualFund => 11,
            Self::MoneyMarket => 12,
            Self::OptionContract => 13,
            Self::Currency => 14,
            Self::Warrant => 15,
            Self::Bond => 17,
            Self::Future => 18,
            Self::Etf => 20,
            Self::Commodity => 23,
            Self::EcnQuote => 28,
            Self::Cryptocurrency => 41,
            Self::Indicator => 42,
            Self::Industry => 1000,
            Self::Unknown(code) => code,
        }
    }

    /// Upstream name of the quote type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::AltSymbol => "ALTSYMBOL",
            Self::Heartbeat => "HEARTBEAT",
            Self::Equity => "EQUITY",
            Self::Index => "INDEX",
            Self::MutualFund => "MUTUALFUND",
            Self::MoneyMarket => "MONEYMARKET",
            Self::OptionContract => "OPTION",
            Self::Currency => "CURRENCY",
            Self::Warrant => "WARRANT",
            Self::Bond => "BOND",
            Self::Future => "FUTURE",
            Self::Etf => "ETF",
            Self::Commodity => "COMMODITY",
            Self::EcnQuote => "ECNQUOTE",
            Self::Cryptocurrency => "CRYPTOCURRENCY",
            Self::Indicator => "INDICATOR",
            Self::Industry => "INDUSTRY",
            Self::Unknown(_) => "UNKNOWN",
        }
    }

    /// Check if this is the heartbeat marker.
    #[must_use]
    pub const fn is_heartbeat(self) -> bool {
        matches!(self, Self::Heartbeat)
    }
}

impl Serialize for QuoteType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Trading session a pricing frame belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarketHours {
    /// Pre-market session.
    PreMarket,
    /// Regular session.
    RegularMarket,
    /// Post-market session.
    PostMarket,
    /// Extended hours.
    ExtendedHoursMarket,
    /// A code this build does not know about.
    Unknown(i32),
}

impl MarketHours {
    /// Map a wire code to a session.
    #[must_use]
    pub const fn from_code(code: i32) -> Self {
        match code {
            0 => Self::PreMarket,
            1 => Self::RegularMarket,
            2 => Self::PostMarket,
            3 => Self::ExtendedHoursMarket,
            other => Self::Unknown(other),
        }
    }

    /// Upstream name of the session.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PreMarket => "PRE_MARKET",
            Self::RegularMarket => "REGULAR_MARKET",
            Self::PostMarket => "POST_MARKET",
            Self::ExtendedHoursMarket => "EXTENDED_HOURS_MARKET",
            Self::Unknown(_) => "UNKNOWN",
        }
    }
}

impl Serialize for MarketHours {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Where a quote came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum QuoteSource {
    /// Pushed over the streaming connection.
    #[serde(rename = "yahoo_ws")]
    Stream,
    /// Pulled from the chart endpoint on demand.
    #[serde(rename = "yahoo_chart")]
    Chart,
}

// =============================================================================
// Ticker Event
// =============================================================================

/// One decoded pricing frame.
///
/// `id` is kept exactly as received; use [`TickerEvent::symbol`] for the
/// normalized form.
#[derive(Debug, Clone, PartialEq)]
pub struct TickerEvent {
    /// Raw identifier.
    pub id: String,
    /// Last price.
    pub price: f64,
    /// Event time in epoch milliseconds (0 when absent).
    pub time: i64,
    /// Quote currency.
    pub currency: String,
    /// Exchange code.
    pub exchange: String,
    /// Instrument class.
    pub quote_type: QuoteType,
    /// Trading session.
    pub market_hours: MarketHours,
    /// Absolute change since previous close.
    pub change: f64,
    /// Percent change since previous close.
    pub change_percent: f64,
    /// Volume traded today.
    pub day_volume: i64,
    /// Session high.
    pub day_high: f64,
    /// Session low.
    pub day_low: f64,
}

impl TickerEvent {
    /// Check if this event is a keep-alive.
    #[must_use]
    pub const fn is_heartbeat(&self) -> bool {
        self.quote_type.is_heartbeat()
    }

    /// Normalized symbol, if the event carries one.
    #[must_use]
    pub fn symbol(&self) -> Option<Symbol> {
        Symbol::parse(&self.id)
    }
}

// =============================================================================
// Quote Snapshot
// =============================================================================

/// The latest known quote for a symbol, replaced wholesale on every update.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteSnapshot {
    /// Normalized symbol.
    pub id: Symbol,
    /// Last price.
    pub price: f64,
    /// Event time in epoch milliseconds.
    pub time: i64,
    /// Quote currency.
    pub currency: String,
    /// Exchange code.
    pub exchange: String,
    /// Instrument class.
    pub quote_type: QuoteType,
    /// Trading session.
    pub market_hours: MarketHours,
    /// Absolute change since previous close.
    pub change: f64,
    /// Percent change since previous close.
    pub change_percent: f64,
    /// Volume traded today.
    pub day_volume: i64,
    /// Session high.
    pub day_high: f64,
    /// Session low.
    pub day_low: f64,
    /// Origin of the data.
    pub source: QuoteSource,
    /// Whether the quote may lag the market.
    pub delayed: bool,
}

impl QuoteSnapshot {
    /// Materialize a streamed event.
    ///
    /// A missing event time is replaced by `received_at`.
    #[must_use]
    pub fn from_event(id: Symbol, event: &TickerEvent, received_at: DateTime<Utc>) -> Self {
        let time = if event.time == 0 {
            received_at.timestamp_millis()
        } else {
            event.time
        };

        Self {
            id,
            price: event.price,
            time,
            currency: event.currency.clone(),
            exchange: event.exchange.clone(),
            quote_type: event.quote_type,
            market_hours: event.market_hours,
            change: event.change,
            change_percent: event.change_percent,
            day_volume: event.day_volume,
            day_high: event.day_high,
            day_low: event.day_low,
            source: QuoteSource::Stream,
            delayed: false,
        }
    }
}

// =============================================================================
// Fallback Quote
// =============================================================================

/// A quote pulled on demand when nothing has been streamed for a symbol.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FallbackQuote {
    /// Normalized symbol.
    pub id: Symbol,
    /// Last known price.
    pub price: f64,
    /// Quote currency, when reported.
    pub currency: Option<String>,
    /// Exchange name, when reported.
    pub exchange: Option<String>,
    /// Fetch time in epoch milliseconds.
    pub time: i64,
    /// Origin of the data.
    pub source: QuoteSource,
    /// Always true: pulled quotes lag the market.
    pub delayed: bool,
}

#[cfg(test)]
pub(crate) fn sample_event(id: &str, price: f64) -> TickerEvent {
    TickerEvent {
        id: id.to_string(),
        price,
        time: 1_700_000_000_000,
        currency: "USD".to_string(),
        exchange: "NMS".to_string(),
        quote_type: QuoteType::Equity,
        market_hours: MarketHours::RegularMarket,
        change: 1.5,
        change_percent: 1.01,
        day_volume: 1_000_000,
        day_high: price + 1.0,
        day_low: price - 1.0,
    }
}
