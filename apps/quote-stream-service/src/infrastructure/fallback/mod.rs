//! Fallback Quote Providers
//!
//! Pull-based sources used when nothing has been streamed for a symbol yet,
//! and for history and metadata reads.
//!
//! - `YahooChartFallback`: the chart endpoint
//!   (`/v8/finance/chart/{symbol}?range=..&interval=..`) for last price,
//!   OHLCV bars and the `meta` block
//! - `DisabledFallback`: always unavailable

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::application::ports::{FallbackError, FallbackQuoteProvider};
use crate::domain::history::{PriceBar, PriceHistory, SymbolInfo};
use crate::domain::quote::{FallbackQuote, QuoteSource, Symbol};
use crate::infrastructure::config::FallbackSettings;
use crate::infrastructure::metrics::{self, FallbackOutcome};

const USER_AGENT: &str = concat!("quote-stream-service/", env!("CARGO_PKG_VERSION"));

// =============================================================================
// Chart Response
// =============================================================================

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    meta: Map<String, Value>,
    #[serde(default)]
    timestamp: Vec<i64>,
    #[serde(default)]
    indicators: Option<Indicators>,
}

impl ChartResult {
    fn meta_str(&self, key: &str) -> Option<String> {
        self.meta.get(key).and_then(Value::as_str).map(str::to_string)
    }

    fn series(&self) -> Option<&IndicatorQuote> {
        self.indicators.as_ref().and_then(|i| i.quote.first())
    }
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<IndicatorQuote>,
}

#[derive(Debug, Default, Deserialize)]
struct IndicatorQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<i64>>,
}

/// Decode a chart body down to its first result.
fn parse_chart_result(symbol: &Symbol, body: &str) -> Result<ChartResult, FallbackError> {
    let response: ChartResponse =
        serde_json::from_str(body).map_err(|e| FallbackError::Malformed(e.to_string()))?;

    if let Some(error) = response.chart.error {
        let detail = error
            .description
            .or(error.code)
            .unwrap_or_else(|| "unknown error".to_string());
        tracing::debug!(symbol = %symbol, detail = %detail, "Chart endpoint returned an error");
        return Err(FallbackError::NotFound(symbol.to_string()));
    }

    response
        .chart
        .result
        .and_then(|results| results.into_iter().next())
        .ok_or_else(|| FallbackError::NotFound(symbol.to_string()))
}

/// Extract a quote from a chart response body.
fn parse_chart(
    symbol: &Symbol,
    body: &str,
    now_millis: i64,
) -> Result<FallbackQuote, FallbackError> {
    let result = parse_chart_result(symbol, body)?;

    let last_close = || {
        result
            .series()
            .and_then(|q| q.close.iter().rev().find_map(|c| *c))
    };
    let price = result
        .meta
        .get("regularMarketPrice")
        .and_then(Value::as_f64)
        .filter(|p| p.is_finite() && *p > 0.0)
        .or_else(last_close)
        .ok_or_else(|| FallbackError::NotFound(symbol.to_string()))?;

    Ok(FallbackQuote {
        id: symbol.clone(),
        price,
        currency: result.meta_str("currency"),
        exchange: result.meta_str("exchangeName"),
        time: now_millis,
        source: QuoteSource::Chart,
        delayed: true,
    })
}

/// Zip chart timestamps with their OHLCV series.
///
/// An empty series is a valid answer; an unparseable timestamp is skipped.
fn parse_history(symbol: &Symbol, body: &str) -> Result<PriceHistory, FallbackError> {
    let result = parse_chart_result(symbol, body)?;
    let empty = IndicatorQuote::default();
    let series = result.series().unwrap_or(&empty);
    let at = |values: &[Option<f64>], i: usize| values.get(i).copied().flatten();

    let rows = result
        .timestamp
        .iter()
        .enumerate()
        .filter_map(|(i, ts)| {
            Some(PriceBar {
                time: DateTime::from_timestamp(*ts, 0)?,
                open: at(&series.open, i),
                high: at(&series.high, i),
                low: at(&series.low, i),
                close: at(&series.close, i),
                volume: series.volume.get(i).copied().flatten(),
            })
        })
        .collect();

    Ok(PriceHistory {
        symbol: symbol.clone(),
        rows,
    })
}

/// Pass the chart `meta` block through as symbol info.
fn parse_info(symbol: &Symbol, body: &str) -> Result<SymbolInfo, FallbackError> {
    let result = parse_chart_result(symbol, body)?;
    if result.meta.is_empty() {
        return Err(FallbackError::NotFound(symbol.to_string()));
    }

    Ok(SymbolInfo {
        symbol: symbol.clone(),
        info: result.meta,
    })
}

// =============================================================================
// Yahoo Chart Fallback
// =============================================================================

/// Fallback provider backed by the Yahoo chart endpoint.
#[derive(Debug, Clone)]
pub struct YahooChartFallback {
    client: reqwest::Client,
    base_url: String,
}

impl YahooChartFallback {
    /// Create a provider from settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(settings: &FallbackSettings) -> Result<Self, FallbackError> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| FallbackError::Request(e.to_string()))?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Fetch the raw chart body for a symbol.
    async fn chart(
        &self,
        symbol: &Symbol,
        range: &str,
        interval: &str,
    ) -> Result<String, FallbackError> {
        let url = format!("{}/v8/finance/chart/{}", self.base_url, symbol);

        let response = self
            .client
            .get(&url)
            .query(&[("range", range), ("interval", interval)])
            .send()
            .await
            .map_err(|e| FallbackError::Request(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| FallbackError::Request(e.to_string()))?;

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(FallbackError::NotFound(symbol.to_string()));
        }
        if !status.is_success() {
            return Err(FallbackError::Request(format!("HTTP {status}")));
        }

        Ok(body)
    }
}

fn record<T>(symbol: &Symbol, what: &'static str, result: &Result<T, FallbackError>) {
    let outcome = match result {
        Ok(_) => FallbackOutcome::Hit,
        Err(FallbackError::NotFound(_)) => FallbackOutcome::Miss,
        Err(_) => FallbackOutcome::Error,
    };
    metrics::record_fallback_request(outcome);
    if let Err(e) = result {
        tracing::debug!(symbol = %symbol, lookup = what, error = %e, "Fallback lookup failed");
    }
}

#[async_trait]
impl FallbackQuoteProvider for YahooChartFallback {
    async fn fetch_quote(&self, symbol: &Symbol) -> Result<FallbackQuote, FallbackError> {
        let result = self
            .chart(symbol, "1d", "1m")
            .await
            .and_then(|body| parse_chart(symbol, &body, Utc::now().timestamp_millis()));
        record(symbol, "quote", &result);
        result
    }

    async fn history(
        &self,
        symbol: &Symbol,
        range: &str,
        interval: &str,
    ) -> Result<PriceHistory, FallbackError> {
        let result = self
            .chart(symbol, range, interval)
            .await
            .and_then(|body| parse_history(symbol, &body));
        record(symbol, "history", &result);
        result
    }

    async fn info(&self, symbol: &Symbol) -> Result<SymbolInfo, FallbackError> {
        let result = self
            .chart(symbol, "1d", "1d")
            .await
            .and_then(|body| parse_info(symbol, &body));
        record(symbol, "info", &result);
        result
    }
}

// =============================================================================
// Disabled Fallback
// =============================================================================

/// Provider used when fallback lookups are turned off.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledFallback;

#[async_trait]
impl FallbackQuoteProvider for DisabledFallback {
    async fn fetch_quote(&self, _symbol: &Symbol) -> Result<FallbackQuote, FallbackError> {
        Err(FallbackError::Disabled)
    }

    async fn history(
        &self,
        _symbol: &Symbol,
        _range: &str,
        _interval: &str,
    ) -> Result<PriceHistory, FallbackError> {
        Err(FallbackError::Disabled)
    }

    async fn info(&self, _symbol: &Symbol) -> Result<SymbolInfo, FallbackError> {
        Err(FallbackError::Disabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aapl() -> Symbol {
        Symbol::parse("AAPL").unwrap()
    }

    #[test]
    fn uses_regular_market_price() {
        let body = r#"{"chart":{"result":[{"meta":{"currency":"USD","symbol":"AAPL",
            "exchangeName":"NMS","regularMarketPrice":189.84},
            "indicators":{"quote":[{"close":[189.5,189.7]}]}}],"error":null}}"#;

        let quote = parse_chart(&aapl(), body, 42).unwrap();

        assert!((quote.price - 189.84).abs() < f64::EPSILON);
        assert_eq!(quote.currency.as_deref(), Some("USD"));
        assert_eq!(quote.exchange.as_deref(), Some("NMS"));
        assert_eq!(quote.time, 42);
        assert_eq!(quote.source, QuoteSource::Chart);
        assert!(quote.delayed);
    }

    #[test]
    fn falls_back_to_last_close() {
        let body = r#"{"chart":{"result":[{"meta":{"currency":"USD"},
            "indicators":{"quote":[{"close":[101.0,102.5,null]}]}}],"error":null}}"#;

        let quote = parse_chart(&aapl(), body, 0).unwrap();

        assert!((quote.price - 102.5).abs() < f64::EPSILON);
        assert!(quote.exchange.is_none());
    }

    #[test]
    fn chart_error_is_not_found() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Not Found",
            "description":"No data found, symbol may be delisted"}}}"#;

        let err = parse_chart(&aapl(), body, 0).unwrap_err();

        assert!(matches!(err, FallbackError::NotFound(_)));
    }

    #[test]
    fn no_price_is_not_found() {
        let body = r#"{"chart":{"result":[{"meta":{},"indicators":{"quote":[{"close":[null]}]}}],"error":null}}"#;
        assert!(matches!(
            parse_chart(&aapl(), body, 0),
            Err(FallbackError::NotFound(_))
        ));
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(
            parse_chart(&aapl(), "<html>", 0),
            Err(FallbackError::Malformed(_))
        ));
    }

    #[test]
    fn history_zips_timestamps_with_series() {
        let body = r#"{"chart":{"result":[{"meta":{"symbol":"AAPL"},
            "timestamp":[1700000000,1700000060,1700000120],
            "indicators":{"quote":[{"open":[1.0,2.0,null],"high":[1.5,2.5,null],
            "low":[0.5,1.5,null],"close":[1.2,2.2,null],"volume":[100,200,null]}]}}],
            "error":null}}"#;

        let history = parse_history(&aapl(), body).unwrap();

        assert_eq!(history.symbol, aapl());
        assert_eq!(history.rows.len(), 3);
        assert_eq!(history.rows[0].time.timestamp(), 1_700_000_000);
        assert_eq!(history.rows[1].close, Some(2.2));
        assert_eq!(history.rows[1].volume, Some(200));
        assert_eq!(history.rows[2].open, None);
        assert_eq!(history.rows[2].volume, None);
    }

    #[test]
    fn history_without_bars_is_empty() {
        let body = r#"{"chart":{"result":[{"meta":{"symbol":"AAPL"},"indicators":{"quote":[{}]}}],"error":null}}"#;

        let history = parse_history(&aapl(), body).unwrap();

        assert!(history.rows.is_empty());
    }

    #[test]
    fn short_series_leaves_trailing_fields_empty() {
        let body = r#"{"chart":{"result":[{"meta":{},"timestamp":[1700000000,1700000060],
            "indicators":{"quote":[{"close":[3.0]}]}}],"error":null}}"#;

        let history = parse_history(&aapl(), body).unwrap();

        assert_eq!(history.rows[0].close, Some(3.0));
        assert_eq!(history.rows[1].close, None);
    }

    #[test]
    fn history_chart_error_is_not_found() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"Invalid range"}}}"#;
        assert!(matches!(
            parse_history(&aapl(), body),
            Err(FallbackError::NotFound(_))
        ));
    }

    #[test]
    fn info_passes_meta_through() {
        let body = r#"{"chart":{"result":[{"meta":{"currency":"USD","symbol":"AAPL",
            "exchangeName":"NMS","instrumentType":"EQUITY","regularMarketPrice":189.84}}],
            "error":null}}"#;

        let info = parse_info(&aapl(), body).unwrap();

        assert_eq!(info.symbol, aapl());
        assert_eq!(info.info["instrumentType"], "EQUITY");
        assert_eq!(info.info["regularMarketPrice"], 189.84);
    }

    #[test]
    fn empty_meta_is_not_found() {
        let body = r#"{"chart":{"result":[{"meta":{}}],"error":null}}"#;
        assert!(matches!(
            parse_info(&aapl(), body),
            Err(FallbackError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn disabled_fallback_never_answers() {
        let err = DisabledFallback.fetch_quote(&aapl()).await.unwrap_err();
        assert!(matches!(err, FallbackError::Disabled));
        let err = DisabledFallback.history(&aapl(), "5d", "1m").await.unwrap_err();
        assert!(matches!(err, FallbackError::Disabled));
        let err = DisabledFallback.info(&aapl()).await.unwrap_err();
        assert!(matches!(err, FallbackError::Disabled));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let provider = YahooChartFallback::new(&FallbackSettings {
            base_url: "http://localhost:1/".to_string(),
            ..FallbackSettings::default()
        })
        .unwrap();
        assert_eq!(provider.base_url, "http://localhost:1");
    }
}
