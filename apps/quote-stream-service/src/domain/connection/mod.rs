//! Connection State
//!
//! Lifecycle states of the streaming connection and the status report built
//! from them.

use std::time::Duration;

use serde::{Serialize, Serializer};

/// Lifecycle state of the single upstream connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No connection, either not started yet or waiting out a backoff delay.
    #[default]
    Disconnected,
    /// Opening the connection.
    Connecting,
    /// Connection established and the subscription set resent.
    Connected,
    /// Stop requested; no further reconnect is attempted.
    Closing,
}

impl ConnectionState {
    /// State name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Closing => "closing",
        }
    }

    /// Check if the connection is established.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl Serialize for ConnectionState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Point-in-time view of the stream manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamStatus {
    /// Connection state.
    pub state: ConnectionState,
    /// Delay the next failed attempt will wait.
    #[serde(rename = "backoffMs", serialize_with = "serialize_millis")]
    pub backoff: Duration,
    /// Events written to the cache since start.
    pub frames_applied: u64,
    /// Consecutive failed connection attempts (0 while connected).
    pub reconnect_attempts: u32,
    /// Size of the subscription set.
    pub subscribed_symbols: usize,
    /// Number of cached snapshots.
    pub cached_symbols: usize,
    /// Most recent connection error, cleared on connect.
    pub last_error: Option<String>,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn serialize_millis<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_disconnected() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
        assert!(!ConnectionState::Closing.is_connected());
        assert!(ConnectionState::Connected.is_connected());
    }

    #[test]
    fn status_serialization() {
        let status = StreamStatus {
            state: ConnectionState::Connected,
            backoff: Duration::from_secs(2),
            frames_applied: 3,
            reconnect_attempts: 0,
            subscribed_symbols: 1,
            cached_symbols: 1,
            last_error: None,
        };

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "connected");
        assert_eq!(json["backoffMs"], 2000);
        assert_eq!(json["framesApplied"], 3);
        assert!(json["lastError"].is_null());
    }
}
