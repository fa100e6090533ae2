//! Stream Manager
//!
//! Owns the single WebSocket connection to the pricing stream.
//!
//! # Lifecycle
//!
//! ```text
//! Disconnected ──start──► Connecting ──open──► Connected
//!      ▲                      │                    │
//!      └────── backoff ◄──────┴────── error ◄──────┘
//!
//! any state ──stop──► Closing
//! ```
//!
//! On every (re)connect the full subscription set is resent as one bulk
//! subscribe frame. While connected, `subscribe()` forwards only the newly
//! added symbols through the link's control channel. `unsubscribe()` never
//! sends anything upstream; removed symbols simply drop out of the next
//! bulk resubscribe.
//!
//! Lock order is link, then registry. The connect path installs the control
//! sender and snapshots the registry under the link lock, and `subscribe()`
//! updates the registry under the same lock, so every new symbol reaches the
//! wire exactly once per connection.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;

use super::keepalive::{Keepalive, KeepaliveAction, KeepaliveConfig};
use super::messages::{ControlFrame, SubscribeRequest};
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::application::ports::{DecodeError, FrameDecoder, QuoteStream};
use crate::domain::cache::QuoteCache;
use crate::domain::connection::{ConnectionState, StreamStatus};
use crate::domain::quote::{QuoteSnapshot, Symbol};
use crate::domain::subscription::SubscriptionRegistry;
use crate::infrastructure::metrics::{self, DiscardReason};

// =============================================================================
// Error Type
// =============================================================================

/// Errors that end one connection. Never surfaced to callers.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// Opening the WebSocket failed.
    #[error("connect failed: {0}")]
    Connect(#[source] tungstenite::Error),

    /// WebSocket transport error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// A frame could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// A control frame could not be serialized.
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),

    /// The server closed the connection.
    #[error("connection closed by server")]
    Closed,

    /// No traffic answered the last ping in time.
    #[error("keepalive timeout after {0:?}")]
    KeepaliveTimeout(Duration),
}

impl StreamError {
    /// Metric label for the error.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Connect(_) => "connect",
            Self::WebSocket(_) => "websocket",
            Self::Decode(_) => "decode",
            Self::Encode(_) => "encode",
            Self::Closed => "closed",
            Self::KeepaliveTimeout(_) => "keepalive_timeout",
        }
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the stream manager.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamConfig {
    /// WebSocket URL.
    pub url: String,
    /// Reconnection configuration.
    pub reconnect: ReconnectConfig,
    /// Keepalive configuration.
    pub keepalive: KeepaliveConfig,
    /// How long to wait for a subscribe acknowledgment after connecting.
    pub ack_timeout: Duration,
    /// How long `stop()` waits for the background task.
    pub stop_timeout: Duration,
}

impl StreamConfig {
    /// Create a configuration with default timings.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect: ReconnectConfig::default(),
            keepalive: KeepaliveConfig::default(),
            ack_timeout: Duration::from_secs(5),
            stop_timeout: Duration::from_secs(5),
        }
    }

    /// Create configuration from `StreamSettings`.
    #[must_use]
    pub fn from_stream_settings(settings: &crate::StreamSettings) -> Self {
        Self {
            url: settings.url.clone(),
            reconnect: ReconnectConfig::from_stream_settings(settings),
            keepalive: KeepaliveConfig::from_stream_settings(settings),
            ack_timeout: settings.ack_timeout,
            stop_timeout: settings.stop_timeout,
        }
    }
}

// =============================================================================
// Shared State
// =============================================================================

/// The live connection handle, reachable only through this variant.
#[derive(Debug, Default)]
enum Link {
    #[default]
    Disconnected,
    Connecting,
    Connected(mpsc::UnboundedSender<ControlFrame>),
    Closing,
}

impl Link {
    const fn state(&self) -> ConnectionState {
        match self {
            Self::Disconnected => ConnectionState::Disconnected,
            Self::Connecting => ConnectionState::Connecting,
            Self::Connected(_) => ConnectionState::Connected,
            Self::Closing => ConnectionState::Closing,
        }
    }
}

#[derive(Debug)]
struct Health {
    backoff: Duration,
    reconnect_attempts: u32,
    last_error: Option<String>,
}

struct Shared {
    config: StreamConfig,
    decoder: Arc<dyn FrameDecoder>,
    registry: SubscriptionRegistry,
    cache: QuoteCache,
    link: Mutex<Link>,
    health: Mutex<Health>,
    frames_applied: AtomicU64,
}

impl Shared {
    /// Replace the link unless this run has been stopped.
    fn set_link(&self, cancel: &CancellationToken, next: Link) -> bool {
        let mut link = self.link.lock();
        if cancel.is_cancelled() {
            return false;
        }
        *link = next;
        true
    }

    /// Mark the link connected and snapshot the subscription set atomically.
    fn establish(
        &self,
        cancel: &CancellationToken,
        tx: mpsc::UnboundedSender<ControlFrame>,
    ) -> Option<Vec<Symbol>> {
        let mut link = self.link.lock();
        if cancel.is_cancelled() {
            return None;
        }
        *link = Link::Connected(tx);
        Some(self.registry.snapshot())
    }

    fn record_error(&self, error: &StreamError) {
        metrics::record_connection_error(error.kind());
        self.health.lock().last_error = Some(error.to_string());
    }
}

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

// =============================================================================
// Stream Manager
// =============================================================================

/// Maintains the pricing stream connection and the latest-quote cache.
///
/// Manages the connection lifecycle including:
/// - Bulk resubscribe on every connect
/// - Keepalive pings
/// - Automatic reconnection with exponential backoff
/// - Incremental subscribe while connected
pub struct StreamManager {
    shared: Arc<Shared>,
    task: Mutex<Option<Running>>,
}

impl StreamManager {
    /// Create a stopped manager.
    #[must_use]
    pub fn new(config: StreamConfig, decoder: Arc<dyn FrameDecoder>) -> Self {
        let backoff = config.reconnect.initial_delay;
        Self {
            shared: Arc::new(Shared {
                config,
                decoder,
                registry: SubscriptionRegistry::new(),
                cache: QuoteCache::new(),
                link: Mutex::new(Link::Disconnected),
                health: Mutex::new(Health {
                    backoff,
                    reconnect_attempts: 0,
                    last_error: None,
                }),
                frames_applied: AtomicU64::new(0),
            }),
            task: Mutex::new(None),
        }
    }

    /// Spawn the lifecycle task. No-op while it is already running.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            tracing::debug!("Stream manager already running");
            return;
        }

        let cancel = CancellationToken::new();
        *self.shared.link.lock() = Link::Disconnected;

        let shared = Arc::clone(&self.shared);
        let handle = tokio::spawn(run(shared, cancel.clone()));
        tracing::info!(url = %self.shared.config.url, "Stream manager started");

        *task = Some(Running { cancel, handle });
    }

    /// Stop the lifecycle task and wait up to the stop timeout for it to exit.
    pub async fn stop(&self) {
        let Some(Running { cancel, mut handle }) = self.task.lock().take() else {
            return;
        };

        {
            let mut link = self.shared.link.lock();
            *link = Link::Closing;
            cancel.cancel();
        }
        metrics::set_connected(false);

        match tokio::time::timeout(self.shared.config.stop_timeout, &mut handle).await {
            Ok(Ok(())) => tracing::info!("Stream manager stopped"),
            Ok(Err(e)) => tracing::warn!(error = %e, "Stream task ended abnormally"),
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.shared.config.stop_timeout.as_millis(),
                    "Stream task did not stop in time, aborting"
                );
                handle.abort();
            }
        }
    }

    /// Add symbols to the subscription set.
    ///
    /// If the connection is up, only the symbols not already subscribed are
    /// sent upstream.
    #[allow(clippy::unused_async)]
    pub async fn subscribe(&self, symbols: &[String]) {
        let symbols = Symbol::parse_all(symbols);
        if symbols.is_empty() {
            return;
        }

        let link = self.shared.link.lock();
        let added = self.shared.registry.add(symbols);
        metrics::set_subscribed_symbols(self.shared.registry.len());
        if added.is_empty() {
            return;
        }

        tracing::info!(symbols = ?added, "Subscribed");
        if let Link::Connected(tx) = &*link
            && tx.send(ControlFrame::Subscribe(added)).is_err()
        {
            tracing::debug!("Connection closing, symbols will be sent on reconnect");
        }
    }

    /// Remove symbols from the subscription set.
    ///
    /// Nothing is sent upstream; the server keeps streaming the symbols until
    /// the next reconnect.
    #[allow(clippy::unused_async)]
    pub async fn unsubscribe(&self, symbols: &[String]) {
        let symbols = Symbol::parse_all(symbols);
        let removed = self.shared.registry.remove(&symbols);
        metrics::set_subscribed_symbols(self.shared.registry.len());
        if removed > 0 {
            tracing::info!(symbols = ?symbols, removed, "Unsubscribed");
        }
    }

    /// Latest streamed snapshot for a symbol.
    #[must_use]
    pub fn get_latest(&self, symbol: &str) -> Option<Arc<QuoteSnapshot>> {
        Symbol::parse(symbol).and_then(|s| self.shared.cache.get(&s))
    }

    /// Latest streamed snapshots for several symbols, read at one instant.
    #[must_use]
    pub fn get_latest_many(
        &self,
        symbols: &[String],
    ) -> BTreeMap<Symbol, Option<Arc<QuoteSnapshot>>> {
        self.shared.cache.get_many(&Symbol::parse_all(symbols))
    }

    /// Sorted copy of the subscription set.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<Symbol> {
        self.shared.registry.snapshot()
    }

    /// Current connection status.
    #[must_use]
    pub fn status(&self) -> StreamStatus {
        let state = self.shared.link.lock().state();
        let health = self.shared.health.lock();
        StreamStatus {
            state,
            backoff: health.backoff,
            frames_applied: self.shared.frames_applied.load(Ordering::Relaxed),
            reconnect_attempts: health.reconnect_attempts,
            subscribed_symbols: self.shared.registry.len(),
            cached_symbols: self.shared.cache.len(),
            last_error: health.last_error.clone(),
        }
    }
}

impl Drop for StreamManager {
    fn drop(&mut self) {
        if let Some(running) = self.task.get_mut().take() {
            running.cancel.cancel();
        }
    }
}

#[async_trait]
impl QuoteStream for StreamManager {
    async fn subscribe(&self, symbols: &[String]) {
        Self::subscribe(self, symbols).await;
    }

    async fn unsubscribe(&self, symbols: &[String]) {
        Self::unsubscribe(self, symbols).await;
    }

    fn get_latest(&self, symbol: &str) -> Option<Arc<QuoteSnapshot>> {
        Self::get_latest(self, symbol)
    }

    fn get_latest_many(&self, symbols: &[String]) -> BTreeMap<Symbol, Option<Arc<QuoteSnapshot>>> {
        Self::get_latest_many(self, symbols)
    }

    fn status(&self) -> StreamStatus {
        Self::status(self)
    }
}

// =============================================================================
// Lifecycle Task
// =============================================================================

/// Outer reconnect loop.
async fn run(shared: Arc<Shared>, cancel: CancellationToken) {
    let mut policy = ReconnectPolicy::new(shared.config.reconnect.clone());

    while !cancel.is_cancelled() {
        let result = connect_and_run(&shared, &cancel, &mut policy).await;

        if shared.set_link(&cancel, Link::Disconnected) {
            metrics::set_connected(false);
        }

        let error = match result {
            Ok(()) => break,
            Err(e) => e,
        };
        if cancel.is_cancelled() {
            break;
        }

        tracing::warn!(error = %error, "Stream connection error");
        shared.record_error(&error);

        let Some(delay) = policy.next_delay() else {
            tracing::error!("Reconnect attempts exhausted");
            break;
        };
        {
            let mut health = shared.health.lock();
            health.reconnect_attempts = policy.attempt_count();
            health.backoff = policy.current_delay();
        }
        metrics::record_reconnect();
        tracing::info!(
            attempt = policy.attempt_count(),
            delay_ms = delay.as_millis(),
            "Reconnecting to pricing stream"
        );

        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }
    }

    tracing::debug!("Stream task exiting");
}

/// Connect, resubscribe, then read until error or cancellation.
///
/// Returns `Ok(())` only when cancelled.
async fn connect_and_run(
    shared: &Shared,
    cancel: &CancellationToken,
    policy: &mut ReconnectPolicy,
) -> Result<(), StreamError> {
    if !shared.set_link(cancel, Link::Connecting) {
        return Ok(());
    }
    tracing::info!(url = %shared.config.url, "Connecting to pricing stream");

    let (ws_stream, _response) = tokio::select! {
        () = cancel.cancelled() => return Ok(()),
        result = tokio_tungstenite::connect_async(shared.config.url.as_str()) => {
            result.map_err(StreamError::Connect)?
        }
    };
    let (mut write, mut read) = ws_stream.split();

    let (control_tx, mut control_rx) = mpsc::unbounded_channel();
    let Some(symbols) = shared.establish(cancel, control_tx) else {
        return Ok(());
    };

    policy.reset();
    {
        let mut health = shared.health.lock();
        health.backoff = policy.current_delay();
        health.reconnect_attempts = 0;
        health.last_error = None;
    }
    metrics::set_connected(true);
    tracing::info!(symbols = symbols.len(), "Connected to pricing stream");

    if !symbols.is_empty() {
        let request = SubscribeRequest::new(&symbols).to_json()?;
        write.send(Message::Text(request.into())).await?;
        tracing::debug!(symbols = ?symbols, "Sent bulk subscribe");

        // control frames during the wait are handled, not taken as the ack
        let ack_deadline = tokio::time::Instant::now() + shared.config.ack_timeout;
        loop {
            tokio::select! {
                () = cancel.cancelled() => return Ok(()),
                () = tokio::time::sleep_until(ack_deadline) => {
                    tracing::debug!("No subscribe acknowledgment");
                    break;
                }
                msg = read.next() => match msg {
                    Some(Ok(Message::Ping(data))) => write.send(Message::Pong(data)).await?,
                    Some(Ok(Message::Pong(_) | Message::Frame(_))) => {}
                    Some(Ok(Message::Close(_))) | None => return Err(StreamError::Closed),
                    Some(Err(e)) => return Err(e.into()),
                    Some(Ok(Message::Text(_) | Message::Binary(_))) => {
                        metrics::record_frame_discarded(DiscardReason::Ack);
                        break;
                    }
                },
            }
        }
    }

    let mut keepalive = Keepalive::new(shared.config.keepalive.clone());
    let period = keepalive.ping_interval();
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        let ping_deadline = keepalive.ping_deadline();
        tokio::select! {
            () = cancel.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                return Ok(());
            }
            _ = ticker.tick() => {
                match keepalive.on_tick() {
                    KeepaliveAction::SendPing => {
                        write.send(Message::Ping(Vec::new().into())).await?;
                    }
                    KeepaliveAction::AwaitingPong => {}
                    KeepaliveAction::TimedOut(waited) => {
                        return Err(keepalive_timeout(&keepalive, waited));
                    }
                }
            }
            () = sleep_until_deadline(ping_deadline) => {
                if let Some(waited) = keepalive.expired() {
                    return Err(keepalive_timeout(&keepalive, waited));
                }
            }
            control = control_rx.recv() => match control {
                Some(ControlFrame::Subscribe(added)) => {
                    let request = SubscribeRequest::new(&added).to_json()?;
                    write.send(Message::Text(request.into())).await?;
                    tracing::debug!(symbols = ?added, "Sent incremental subscribe");
                }
                // sender dropped by stop()
                None => return Ok(()),
            },
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        keepalive.record_activity();
                        apply_frame(shared, text.as_bytes())?;
                    }
                    Some(Ok(Message::Binary(data))) => {
                        keepalive.record_activity();
                        apply_frame(shared, &data)?;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        keepalive.record_activity();
                        write.send(Message::Pong(data)).await?;
                    }
                    Some(Ok(Message::Pong(_))) => keepalive.record_activity(),
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(frame = ?frame, "Server sent close frame");
                        return Err(StreamError::Closed);
                    }
                    Some(Ok(Message::Frame(_))) => {}
                    Some(Err(e)) => return Err(e.into()),
                    None => return Err(StreamError::Closed),
                }
            }
        }
    }
}

/// Sleep until the outstanding ping expires; pend forever when none is.
async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
        None => std::future::pending().await,
    }
}

fn keepalive_timeout(keepalive: &Keepalive, waited: Duration) -> StreamError {
    tracing::warn!(
        waited_ms = waited.as_millis(),
        idle_ms = keepalive.idle_for().as_millis(),
        "Keepalive timeout"
    );
    StreamError::KeepaliveTimeout(waited)
}

/// Decode one frame and write it to the cache.
fn apply_frame(shared: &Shared, frame: &[u8]) -> Result<(), StreamError> {
    let started = Instant::now();
    metrics::record_frame_received();

    let event = shared.decoder.decode(frame)?;
    if event.is_heartbeat() {
        metrics::record_frame_discarded(DiscardReason::Heartbeat);
        return Ok(());
    }

    match shared.cache.apply(&event, Utc::now()) {
        Some(symbol) => {
            shared.frames_applied.fetch_add(1, Ordering::Relaxed);
            metrics::record_frame_applied();
            metrics::set_cached_symbols(shared.cache.len());
            tracing::trace!(symbol = %symbol, price = event.price, "Quote updated");
        }
        None => metrics::record_frame_discarded(DiscardReason::EmptySymbol),
    }

    metrics::record_processing_duration(started.elapsed());
    Ok(())
}
