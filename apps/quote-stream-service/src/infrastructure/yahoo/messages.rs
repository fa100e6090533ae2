//! Yahoo Stream Message Types
//!
//! Wire shapes exchanged with the pricing stream: the JSON control frame sent
//! upstream, the optional JSON envelope around inbound frames and the protobuf
//! `PricingData` payload.

use serde::{Deserialize, Serialize};

use crate::domain::quote::Symbol;

// =============================================================================
// Outbound
// =============================================================================

/// Subscribe control frame: `{"subscribe": ["AAPL", ...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscribeRequest {
    /// Symbols to add to the server-side subscription.
    pub subscribe: Vec<String>,
}

impl SubscribeRequest {
    /// Build a request for the given symbols.
    #[must_use]
    pub fn new<'a>(symbols: impl IntoIterator<Item = &'a Symbol>) -> Self {
        Self {
            subscribe: symbols.into_iter().map(|s| s.as_str().to_owned()).collect(),
        }
    }

    /// Serialize to the JSON text sent on the socket.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Frames queued for the socket writer by callers outside the read loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlFrame {
    /// Incremental subscribe for newly added symbols.
    Subscribe(Vec<Symbol>),
}

// =============================================================================
// Inbound
// =============================================================================

/// JSON envelope some stream versions wrap the payload in.
#[derive(Debug, Clone, Deserialize)]
pub struct PricingEnvelope {
    /// Envelope kind, `"pricing"` for quote frames.
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    /// Base64 protobuf payload.
    pub message: String,
}

/// Protobuf pricing payload.
///
/// Enum fields are kept as raw codes and mapped by the domain layer, so
/// unknown codes never fail decoding.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PricingData {
    /// Symbol as sent by the upstream.
    #[prost(string, tag = "1")]
    pub id: String,
    /// Last price.
    #[prost(float, tag = "2")]
    pub price: f32,
    /// Event time in epoch milliseconds.
    #[prost(sint64, tag = "3")]
    pub time: i64,
    /// Quote currency.
    #[prost(string, tag = "4")]
    pub currency: String,
    /// Exchange code.
    #[prost(string, tag = "5")]
    pub exchange: String,
    /// Quote type code.
    #[prost(int32, tag = "6")]
    pub quote_type: i32,
    /// Market hours code.
    #[prost(int32, tag = "7")]
    pub market_hours: i32,
    /// Percent change since previous close.
    #[prost(float, tag = "8")]
    pub change_percent: f32,
    /// Volume traded today.
    #[prost(sint64, tag = "9")]
    pub day_volume: i64,
    /// Session high.
    #[prost(float, tag = "10")]
    pub day_high: f32,
    /// Session low.
    #[prost(float, tag = "11")]
    pub day_low: f32,
    /// Absolute change since previous close.
    #[prost(float, tag = "12")]
    pub change: f32,
}
