//! Service Configuration Settings
//!
//! Configuration types for the quote stream service, loaded from environment
//! variables.

use std::time::Duration;

/// Default pricing stream endpoint.
pub const DEFAULT_STREAM_URL: &str = "wss://streamer.finance.yahoo.com/";

/// Default base URL of the chart endpoint used for fallback quotes.
pub const DEFAULT_FALLBACK_URL: &str = "https://query1.finance.yahoo.com";

/// Upstream stream connection settings.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSettings {
    /// WebSocket endpoint (`ws://` or `wss://`).
    pub url: String,
    /// Keepalive ping interval.
    pub ping_interval: Duration,
    /// How long a ping may go unanswered.
    pub ping_timeout: Duration,
    /// How long to wait for a subscribe acknowledgment.
    pub ack_timeout: Duration,
    /// How long `stop()` waits for the stream task.
    pub stop_timeout: Duration,
    /// Initial reconnection delay.
    pub reconnect_delay_initial: Duration,
    /// Maximum reconnection delay.
    pub reconnect_delay_max: Duration,
    /// Reconnection delay multiplier for exponential backoff.
    pub reconnect_delay_multiplier: f64,
    /// Jitter fraction applied to each delay (0.0 = none).
    pub reconnect_jitter: f64,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_STREAM_URL.to_string(),
            ping_interval: Duration::from_secs(20),
            ping_timeout: Duration::from_secs(20),
            ack_timeout: Duration::from_secs(5),
            stop_timeout: Duration::from_secs(5),
            reconnect_delay_initial: Duration::from_secs(1),
            reconnect_delay_max: Duration::from_secs(30),
            reconnect_delay_multiplier: 2.0,
            reconnect_jitter: 0.0,
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// HTTP API port.
    pub http_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { http_port: 8000 }
    }
}

/// Fallback quote provider settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackSettings {
    /// Whether fallback lookups are made at all.
    pub enabled: bool,
    /// Base URL of the chart endpoint.
    pub base_url: String,
    /// Request timeout.
    pub timeout: Duration,
}

impl Default for FallbackSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: DEFAULT_FALLBACK_URL.to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Complete service configuration.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ServiceConfig {
    /// Stream connection settings.
    pub stream: StreamSettings,
    /// HTTP server settings.
    pub server: ServerSettings,
    /// Fallback provider settings.
    pub fallback: FallbackSettings,
    /// Symbols subscribed at startup.
    pub startup_symbols: Vec<String>,
}

impl ServiceConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is structurally invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// Unparseable numbers fall back to their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream URL is not a WebSocket URL, the
    /// reconnect delays are inverted, or a timing value is zero.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);
        let stream_defaults = StreamSettings::default();
        let fallback_defaults = FallbackSettings::default();

        let url = env
            .string("QUOTE_STREAM_URL")
            .unwrap_or(stream_defaults.url);
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(ConfigError::InvalidValue {
                key: "QUOTE_STREAM_URL",
                reason: format!("expected a ws:// or wss:// URL, got {url:?}"),
            });
        }

        let stream = StreamSettings {
            url,
            ping_interval: env.secs(
                "QUOTE_STREAM_PING_INTERVAL_SECS",
                stream_defaults.ping_interval,
            ),
            ping_timeout: env.secs("QUOTE_STREAM_PING_TIMEOUT_SECS", stream_defaults.ping_timeout),
            ack_timeout: env.secs("QUOTE_STREAM_ACK_TIMEOUT_SECS", stream_defaults.ack_timeout),
            stop_timeout: env.secs("QUOTE_STREAM_STOP_TIMEOUT_SECS", stream_defaults.stop_timeout),
            reconnect_delay_initial: env.millis(
                "QUOTE_STREAM_RECONNECT_DELAY_INITIAL_MS",
                stream_defaults.reconnect_delay_initial,
            ),
            reconnect_delay_max: env.secs(
                "QUOTE_STREAM_RECONNECT_DELAY_MAX_SECS",
                stream_defaults.reconnect_delay_max,
            ),
            reconnect_delay_multiplier: env.parse(
                "QUOTE_STREAM_RECONNECT_DELAY_MULTIPLIER",
                stream_defaults.reconnect_delay_multiplier,
            ),
            reconnect_jitter: env
                .parse("QUOTE_STREAM_RECONNECT_JITTER", stream_defaults.reconnect_jitter)
                .clamp(0.0, 1.0),
        };

        if stream.ping_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "QUOTE_STREAM_PING_INTERVAL_SECS",
                reason: "must be greater than zero".to_string(),
            });
        }
        if stream.reconnect_delay_initial > stream.reconnect_delay_max {
            return Err(ConfigError::InvalidValue {
                key: "QUOTE_STREAM_RECONNECT_DELAY_MAX_SECS",
                reason: format!(
                    "maximum delay {:?} is below the initial delay {:?}",
                    stream.reconnect_delay_max, stream.reconnect_delay_initial
                ),
            });
        }
        if stream.reconnect_delay_multiplier < 1.0 {
            return Err(ConfigError::InvalidValue {
                key: "QUOTE_STREAM_RECONNECT_DELAY_MULTIPLIER",
                reason: "must be at least 1.0".to_string(),
            });
        }

        let server = ServerSettings {
            http_port: env.parse("QUOTE_STREAM_HTTP_PORT", ServerSettings::default().http_port),
        };

        let fallback = FallbackSettings {
            enabled: env
                .string("QUOTE_STREAM_FALLBACK_ENABLED")
                .map_or(fallback_defaults.enabled, |v| !v.eq_ignore_ascii_case("false")),
            base_url: env
                .string("QUOTE_STREAM_FALLBACK_URL")
                .map_or(fallback_defaults.base_url, |v| v.trim_end_matches('/').to_string()),
            timeout: env.secs("QUOTE_STREAM_FALLBACK_TIMEOUT_SECS", fallback_defaults.timeout),
        };

        let startup_symbols = env
            .string("QUOTE_STREAM_SYMBOLS")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            stream,
            server,
            fallback,
            startup_symbols,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A variable holds a value that cannot be used.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue {
        /// Variable name.
        key: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        self.string(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn secs(&self, key: &str, default: Duration) -> Duration {
        self.string(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_secs)
    }

    fn millis(&self, key: &str, default: Duration) -> Duration {
        self.string(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_millis)
    }
}
