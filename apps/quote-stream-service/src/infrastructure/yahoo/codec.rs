//! Pricing Frame Codec
//!
//! Decodes inbound pricing frames. A frame is base64 text of a protobuf
//! `PricingData` message, optionally wrapped in a JSON envelope:
//!
//! ```json
//! {"type":"pricing","message":"CgRBQVBMFTMzFkM..."}
//! ```

use base64::Engine;
use base64::engine::DecodePaddingMode;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use prost::Message;

use super::messages::{PricingData, PricingEnvelope};
use crate::application::ports::{DecodeError, FrameDecoder};
use crate::domain::quote::{MarketHours, QuoteType, TickerEvent};

/// Standard alphabet, padding optional.
const BASE64: GeneralPurpose = GeneralPurpose::new(
    &base64::alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decoder for Yahoo pricing frames.
#[derive(Debug, Default, Clone)]
pub struct YahooFrameDecoder;

impl YahooFrameDecoder {
    /// Create a new decoder.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn payload(frame: &[u8]) -> Result<Vec<u8>, DecodeError> {
        let text = std::str::from_utf8(frame)
            .map_err(|e| DecodeError::Encoding(format!("frame is not UTF-8: {e}")))?
            .trim();

        if text.starts_with('{') {
            let envelope: PricingEnvelope = serde_json::from_str(text)
                .map_err(|e| DecodeError::Envelope(e.to_string()))?;
            if let Some(kind) = envelope.kind.as_deref()
                && kind != "pricing"
            {
                return Err(DecodeError::Envelope(format!("unexpected type {kind:?}")));
            }
            return Self::base64(envelope.message.trim());
        }

        Self::base64(text)
    }

    fn base64(text: &str) -> Result<Vec<u8>, DecodeError> {
        BASE64
            .decode(text)
            .map_err(|e| DecodeError::Encoding(e.to_string()))
    }
}

impl FrameDecoder for YahooFrameDecoder {
    fn decode(&self, frame: &[u8]) -> Result<TickerEvent, DecodeError> {
        let bytes = Self::payload(frame)?;
        let data =
            PricingData::decode(bytes.as_slice()).map_err(|e| DecodeError::Payload(e.to_string()))?;

        Ok(TickerEvent {
            id: data.id,
            price: widen(data.price),
            time: data.time,
            currency: data.currency,
            exchange: data.exchange,
            quote_type: QuoteType::from_code(data.quote_type),
            market_hours: MarketHours::from_code(data.market_hours),
            change: widen(data.change),
            change_percent: widen(data.change_percent),
            day_volume: data.day_volume,
            day_high: widen(data.day_high),
            day_low: widen(data.day_low),
        })
    }
}

/// Widen an `f32` to the `f64` with the same shortest decimal form,
/// so `150.2f32` reads back as `150.2` rather than `150.1999969482422`.
fn widen(value: f32) -> f64 {
    if !value.is_finite() {
        return f64::from(value);
    }
    value
        .to_string()
        .parse()
        .unwrap_or_else(|_| f64::from(value))
}
