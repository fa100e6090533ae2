//! Quote, history and subscription handlers.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::application::services::QuoteError;
use crate::domain::history::{DEFAULT_INTERVAL, DEFAULT_RANGE, PriceHistory, SymbolInfo};
use crate::domain::quote::{QuoteSnapshot, Symbol};

/// Body of the subscribe and unsubscribe calls.
#[derive(Debug, Deserialize)]
pub(super) struct SymbolsBody {
    symbols: Vec<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct SubscribedResponse {
    subscribed: Vec<Symbol>,
}

#[derive(Debug, Serialize)]
pub(super) struct UnsubscribedResponse {
    unsubscribed: Vec<Symbol>,
}

/// Query string of the batch quote call.
#[derive(Debug, Deserialize)]
pub(super) struct QuotesQuery {
    symbols: String,
}

/// Query string of the history call.
#[derive(Debug, Deserialize)]
pub(super) struct HistoryQuery {
    #[serde(default = "default_period")]
    period: String,
    #[serde(default = "default_interval")]
    interval: String,
}

fn default_period() -> String {
    DEFAULT_RANGE.to_string()
}

fn default_interval() -> String {
    DEFAULT_INTERVAL.to_string()
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    detail: String,
}

impl IntoResponse for QuoteError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self {
            Self::InvalidSymbol(_) | Self::InvalidPeriod(_) => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            Self::NotAvailable(_) => (
                StatusCode::NOT_FOUND,
                "No realtime stream for this symbol and fallback failed.".to_string(),
            ),
            Self::HistoryNotAvailable(_) => (
                StatusCode::NOT_FOUND,
                "No history available for this symbol.".to_string(),
            ),
            Self::InfoNotAvailable(_) => (
                StatusCode::NOT_FOUND,
                "No info available for this symbol.".to_string(),
            ),
        };
        (status, Json(ErrorBody { detail })).into_response()
    }
}

pub(super) async fn subscribe_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SymbolsBody>,
) -> Json<SubscribedResponse> {
    let subscribed = state.quotes.subscribe(&body.symbols).await;
    Json(SubscribedResponse { subscribed })
}

pub(super) async fn unsubscribe_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SymbolsBody>,
) -> Json<UnsubscribedResponse> {
    let unsubscribed = state.quotes.unsubscribe(&body.symbols).await;
    Json(UnsubscribedResponse { unsubscribed })
}

pub(super) async fn quote_handler(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
) -> Response {
    match state.quotes.quote(&symbol).await {
        Ok(view) => Json(view).into_response(),
        Err(e) => e.into_response(),
    }
}

pub(super) async fn quotes_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<QuotesQuery>,
) -> Json<BTreeMap<Symbol, Option<Arc<QuoteSnapshot>>>> {
    let symbols: Vec<String> = query.symbols.split(',').map(str::to_string).collect();
    Json(state.quotes.quotes(&symbols))
}

pub(super) async fn history_handler(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<PriceHistory>, QuoteError> {
    state
        .quotes
        .history(&symbol, &query.period, &query.interval)
        .await
        .map(Json)
}

pub(super) async fn info_handler(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
) -> Result<Json<SymbolInfo>, QuoteError> {
    state.quotes.info(&symbol).await.map(Json)
}
