//! Prometheus Metrics Module
//!
//! Exposes application metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Frames**: pricing frames received, applied and discarded
//! - **Connection**: upstream connection state, errors and reconnects
//! - **Cache**: subscribed and cached symbol counts
//! - **Fallback**: pull-based quote lookups by outcome
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the HTTP server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder. Later calls return the same handle.
///
/// # Errors
///
/// Returns `BuildError` if another recorder is already installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "quote_stream_frames_received_total",
        "Total frames received from the pricing stream"
    );
    describe_counter!(
        "quote_stream_frames_applied_total",
        "Total frames written to the quote cache"
    );
    describe_counter!(
        "quote_stream_frames_discarded_total",
        "Total frames discarded without touching the cache, by reason"
    );

    describe_gauge!(
        "quote_stream_connected",
        "1 while the upstream connection is established"
    );
    describe_counter!(
        "quote_stream_connection_errors_total",
        "Total upstream connection errors by type"
    );
    describe_counter!(
        "quote_stream_reconnects_total",
        "Total reconnection attempts"
    );

    describe_gauge!(
        "quote_stream_subscribed_symbols",
        "Number of symbols in the subscription set"
    );
    describe_gauge!(
        "quote_stream_cached_symbols",
        "Number of symbols with a cached quote"
    );

    describe_histogram!(
        "quote_stream_frame_processing_seconds",
        "Time to decode a frame and apply it to the cache"
    );

    describe_counter!(
        "quote_stream_fallback_requests_total",
        "Fallback quote lookups by outcome"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Why a frame did not update the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// Heartbeat frame.
    Heartbeat,
    /// Frame without a usable symbol.
    EmptySymbol,
    /// Frame received while waiting for the subscribe acknowledgment.
    Ack,
}

impl DiscardReason {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Heartbeat => "heartbeat",
            Self::EmptySymbol => "empty_symbol",
            Self::Ack => "ack",
        }
    }
}

/// Outcome of a fallback lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackOutcome {
    /// A price was returned.
    Hit,
    /// The provider had no price.
    Miss,
    /// The request or response failed.
    Error,
}

impl FallbackOutcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "hit",
            Self::Miss => "miss",
            Self::Error => "error",
        }
    }
}

/// Record a frame received from the stream.
pub fn record_frame_received() {
    counter!("quote_stream_frames_received_total").increment(1);
}

/// Record a frame applied to the cache.
pub fn record_frame_applied() {
    counter!("quote_stream_frames_applied_total").increment(1);
}

/// Record a discarded frame.
pub fn record_frame_discarded(reason: DiscardReason) {
    counter!(
        "quote_stream_frames_discarded_total",
        "reason" => reason.as_str()
    )
    .increment(1);
}

/// Update the connection gauge.
pub fn set_connected(connected: bool) {
    gauge!("quote_stream_connected").set(if connected { 1.0 } else { 0.0 });
}

/// Record a connection error.
pub fn record_connection_error(error_type: &'static str) {
    counter!(
        "quote_stream_connection_errors_total",
        "error_type" => error_type
    )
    .increment(1);
}

/// Record a reconnection attempt.
pub fn record_reconnect() {
    counter!("quote_stream_reconnects_total").increment(1);
}

/// Update the subscribed symbol count.
#[allow(clippy::cast_precision_loss)]
pub fn set_subscribed_symbols(count: usize) {
    gauge!("quote_stream_subscribed_symbols").set(count as f64);
}

/// Update the cached symbol count.
#[allow(clippy::cast_precision_loss)]
pub fn set_cached_symbols(count: usize) {
    gauge!("quote_stream_cached_symbols").set(count as f64);
}

/// Record frame processing duration.
pub fn record_processing_duration(duration: Duration) {
    histogram!("quote_stream_frame_processing_seconds").record(duration.as_secs_f64());
}

/// Record a fallback lookup.
pub fn record_fallback_request(outcome: FallbackOutcome) {
    counter!(
        "quote_stream_fallback_requests_total",
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discard_reason_as_str() {
        assert_eq!(DiscardReason::Heartbeat.as_str(), "heartbeat");
        assert_eq!(DiscardReason::EmptySymbol.as_str(), "empty_symbol");
        assert_eq!(DiscardReason::Ack.as_str(), "ack");
    }

    #[test]
    fn fallback_outcome_as_str() {
        assert_eq!(FallbackOutcome::Hit.as_str(), "hit");
        assert_eq!(FallbackOutcome::Miss.as_str(), "miss");
        assert_eq!(FallbackOutcome::Error.as_str(), "error");
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        record_frame_received();
        record_frame_discarded(DiscardReason::Heartbeat);
        set_connected(true);
        set_cached_symbols(3);
        record_processing_duration(Duration::from_micros(50));
    }
}
