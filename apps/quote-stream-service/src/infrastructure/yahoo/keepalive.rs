//! Keepalive Monitor
//!
//! Tracks WebSocket liveness for one connection. The read loop calls
//! [`Keepalive::on_tick`] every `ping_interval` and sleeps until
//! [`Keepalive::ping_deadline`] while a ping is outstanding. A ping that is
//! still unanswered `ping_timeout` after it was sent means the connection is
//! dead.

use std::time::{Duration, Instant};

/// Configuration for keepalive pings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeepaliveConfig {
    /// Interval between pings.
    pub ping_interval: Duration,
    /// How long a ping may go unanswered.
    pub ping_timeout: Duration,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(20),
            ping_timeout: Duration::from_secs(20),
        }
    }
}

impl KeepaliveConfig {
    /// Create configuration from `StreamSettings`.
    #[must_use]
    pub const fn from_stream_settings(settings: &crate::StreamSettings) -> Self {
        Self {
            ping_interval: settings.ping_interval,
            ping_timeout: settings.ping_timeout,
        }
    }
}

/// What the read loop should do on a keepalive tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepaliveAction {
    /// Send a ping frame.
    SendPing,
    /// A ping is already outstanding and has not expired yet.
    AwaitingPong,
    /// The outstanding ping expired; drop the connection.
    TimedOut(Duration),
}

/// Per-connection liveness state. Created fresh for every connection.
#[derive(Debug)]
pub struct Keepalive {
    config: KeepaliveConfig,
    last_activity: Instant,
    ping_sent_at: Option<Instant>,
}

impl Keepalive {
    /// Start tracking a freshly opened connection.
    #[must_use]
    pub fn new(config: KeepaliveConfig) -> Self {
        Self::starting_at(config, Instant::now())
    }

    const fn starting_at(config: KeepaliveConfig, now: Instant) -> Self {
        Self {
            config,
            last_activity: now,
            ping_sent_at: None,
        }
    }

    /// Interval between ticks.
    #[must_use]
    pub const fn ping_interval(&self) -> Duration {
        self.config.ping_interval
    }

    /// Record any inbound frame (data or pong).
    pub fn record_activity(&mut self) {
        self.record_activity_at(Instant::now());
    }

    fn record_activity_at(&mut self, now: Instant) {
        self.last_activity = now;
        self.ping_sent_at = None;
    }

    /// Decide what to do on an interval tick.
    #[must_use]
    pub fn on_tick(&mut self) -> KeepaliveAction {
        self.on_tick_at(Instant::now())
    }

    fn on_tick_at(&mut self, now: Instant) -> KeepaliveAction {
        if let Some(waited) = self.expired_at(now) {
            return KeepaliveAction::TimedOut(waited);
        }
        if self.ping_sent_at.is_some() {
            return KeepaliveAction::AwaitingPong;
        }
        self.ping_sent_at = Some(now);
        KeepaliveAction::SendPing
    }

    /// When the outstanding ping expires, if one is outstanding.
    #[must_use]
    pub fn ping_deadline(&self) -> Option<Instant> {
        self.ping_sent_at.map(|sent_at| sent_at + self.config.ping_timeout)
    }

    /// How long the outstanding ping has waited, once it has expired.
    #[must_use]
    pub fn expired(&self) -> Option<Duration> {
        self.expired_at(Instant::now())
    }

    fn expired_at(&self, now: Instant) -> Option<Duration> {
        let waited = now.saturating_duration_since(self.ping_sent_at?);
        (waited >= self.config.ping_timeout).then_some(waited)
    }

    /// Time since the last inbound frame.
    #[must_use]
    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }
}
