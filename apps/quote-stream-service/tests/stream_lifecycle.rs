//! Stream Lifecycle Integration Tests
//!
//! Runs the stream manager against an in-process WebSocket server and checks
//! resubscribe, incremental subscribe, frame handling and reconnect behavior.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use futures_util::{SinkExt, StreamExt};
use prost::Message as _;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep, timeout};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

use quote_stream_service::infrastructure::yahoo::{KeepaliveConfig, ReconnectConfig};
use quote_stream_service::{
    ConnectionState, PricingData, QuoteSource, StreamConfig, StreamManager, YahooFrameDecoder,
};

type Upstream = WebSocketStream<TcpStream>;

/// Start a WebSocket server on a random port; each accepted connection is
/// handed to the test through the returned channel.
async fn upstream() -> (String, mpsc::UnboundedReceiver<Upstream>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            if let Ok(ws) = tokio_tungstenite::accept_async(socket).await
                && tx.send(ws).is_err()
            {
                break;
            }
        }
    });

    (format!("ws://{addr}/"), rx)
}

fn test_config(url: &str) -> StreamConfig {
    StreamConfig {
        url: url.to_string(),
        reconnect: ReconnectConfig {
            initial_delay: Duration::from_millis(20),
            max_delay: Duration::from_millis(100),
            multiplier: 2.0,
            jitter_factor: 0.0,
            max_attempts: 0,
        },
        keepalive: KeepaliveConfig::default(),
        ack_timeout: Duration::from_millis(200),
        stop_timeout: Duration::from_secs(2),
    }
}

fn manager(url: &str) -> StreamManager {
    manager_with(test_config(url))
}

fn manager_with(config: StreamConfig) -> StreamManager {
    StreamManager::new(config, Arc::new(YahooFrameDecoder::new()))
}

fn symbols(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|s| (*s).to_string()).collect()
}

fn pricing_frame(id: &str, price: f32, quote_type: i32) -> Message {
    let data = PricingData {
        id: id.to_string(),
        price,
        time: 1_700_000_000_000,
        currency: "USD".to_string(),
        exchange: "NMS".to_string(),
        quote_type,
        market_hours: 1,
        ..PricingData::default()
    };
    Message::Text(STANDARD.encode(data.encode_to_vec()).into())
}

async fn next_connection(rx: &mut mpsc::UnboundedReceiver<Upstream>) -> Upstream {
    timeout(Duration::from_secs(3), rx.recv())
        .await
        .expect("manager should connect")
        .expect("accept loop alive")
}

async fn recv_text_within(ws: &mut Upstream, wait: Duration) -> Option<String> {
    let deadline = Instant::now() + wait;
    loop {
        match timeout(deadline.saturating_duration_since(Instant::now()), ws.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => return Some(text.to_string()),
            Ok(Some(Ok(_))) => {}
            _ => return None,
        }
    }
}

async fn recv_text(ws: &mut Upstream) -> String {
    recv_text_within(ws, Duration::from_secs(3))
        .await
        .expect("expected a text frame")
}

/// Send something for the manager to discard as the subscribe acknowledgment.
async fn ack(ws: &mut Upstream) {
    ws.send(Message::Text(r#"{"ack":true}"#.into())).await.unwrap();
}

async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(3);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    condition()
}

#[tokio::test]
async fn bulk_subscribe_on_connect_then_quotes_are_cached() {
    let (url, mut conns) = upstream().await;
    let manager = manager(&url);
    manager.subscribe(&symbols(&["msft", "aapl"])).await;
    assert!(manager.get_latest("aapl").is_none());

    manager.start();
    let mut ws = next_connection(&mut conns).await;

    assert_eq!(recv_text(&mut ws).await, r#"{"subscribe":["AAPL","MSFT"]}"#);
    ack(&mut ws).await;
    ws.send(pricing_frame("AAPL", 150.2, 8)).await.unwrap();

    assert!(wait_until(|| manager.get_latest("aapl").is_some()).await);
    let snapshot = manager.get_latest("AAPL").unwrap();
    assert!((snapshot.price - 150.2).abs() < f64::EPSILON);
    assert_eq!(snapshot.source, QuoteSource::Stream);
    assert!(!snapshot.delayed);

    let status = manager.status();
    assert_eq!(status.state, ConnectionState::Connected);
    assert_eq!(status.frames_applied, 1);
    assert_eq!(status.reconnect_attempts, 0);

    manager.stop().await;
}

#[tokio::test]
async fn incremental_subscribe_sends_only_new_symbols() {
    let (url, mut conns) = upstream().await;
    let manager = manager(&url);
    manager.subscribe(&symbols(&["AAPL"])).await;
    manager.start();

    let mut ws = next_connection(&mut conns).await;
    assert_eq!(recv_text(&mut ws).await, r#"{"subscribe":["AAPL"]}"#);
    ack(&mut ws).await;

    manager.subscribe(&symbols(&["aapl", "tsla"])).await;
    assert_eq!(recv_text(&mut ws).await, r#"{"subscribe":["TSLA"]}"#);

    manager.subscribe(&symbols(&["TSLA", " aapl "])).await;
    manager.unsubscribe(&symbols(&["aapl"])).await;
    assert_eq!(
        recv_text_within(&mut ws, Duration::from_millis(200)).await,
        None,
        "repeat subscribe and unsubscribe must not reach the wire"
    );

    manager.stop().await;
}

#[tokio::test]
async fn ping_during_ack_wait_is_answered_not_taken_as_ack() {
    let (url, mut conns) = upstream().await;
    let mut config = test_config(&url);
    config.ack_timeout = Duration::from_secs(2);
    let manager = manager_with(config);
    manager.subscribe(&symbols(&["AAPL"])).await;
    manager.start();

    let mut ws = next_connection(&mut conns).await;
    recv_text(&mut ws).await;

    ws.send(Message::Ping(b"still there".to_vec().into()))
        .await
        .unwrap();
    let pong = timeout(Duration::from_secs(3), async {
        loop {
            if let Some(Ok(Message::Pong(data))) = ws.next().await {
                return data;
            }
        }
    })
    .await
    .expect("ping should be answered while waiting for the ack");
    assert_eq!(pong.as_ref(), b"still there");

    ack(&mut ws).await;
    ws.send(pricing_frame("AAPL", 187.5, 8)).await.unwrap();

    assert!(wait_until(|| manager.get_latest("AAPL").is_some()).await);
    assert!(
        timeout(Duration::from_millis(200), conns.recv()).await.is_err(),
        "connection must survive the ack wait"
    );

    manager.stop().await;
}

#[tokio::test]
async fn silent_upstream_is_dropped_after_ping_timeout() {
    let (url, mut conns) = upstream().await;
    let mut config = test_config(&url);
    config.keepalive = KeepaliveConfig {
        ping_interval: Duration::from_millis(300),
        ping_timeout: Duration::from_millis(50),
    };
    let manager = manager_with(config);
    manager.start();

    // never polled, so the ping is never answered
    let _silent = next_connection(&mut conns).await;
    let connected_at = Instant::now();

    let _next = next_connection(&mut conns).await;
    let elapsed = connected_at.elapsed();
    assert!(
        elapsed >= Duration::from_millis(300),
        "dropped before the first ping: {elapsed:?}"
    );
    assert!(
        elapsed < Duration::from_millis(550),
        "ping timeout not enforced on its own deadline: {elapsed:?}"
    );

    manager.stop().await;
}

#[tokio::test]
async fn reconnect_resends_current_subscription_set() {
    let (url, mut conns) = upstream().await;
    let manager = manager(&url);
    manager.subscribe(&symbols(&["AAPL", "MSFT"])).await;
    manager.start();

    let mut first = next_connection(&mut conns).await;
    assert_eq!(recv_text(&mut first).await, r#"{"subscribe":["AAPL","MSFT"]}"#);
    ack(&mut first).await;

    manager.unsubscribe(&symbols(&["msft"])).await;
    manager.subscribe(&symbols(&["tsla"])).await;
    assert_eq!(recv_text(&mut first).await, r#"{"subscribe":["TSLA"]}"#);

    first.close(None).await.unwrap();
    drop(first);

    let mut second = next_connection(&mut conns).await;
    assert_eq!(recv_text(&mut second).await, r#"{"subscribe":["AAPL","TSLA"]}"#);
    assert!(wait_until(|| manager.status().state == ConnectionState::Connected).await);
    assert!(manager.status().last_error.is_none());

    manager.stop().await;
}

#[tokio::test]
async fn decode_failure_drops_the_connection() {
    let (url, mut conns) = upstream().await;
    let manager = manager(&url);
    manager.subscribe(&symbols(&["AAPL"])).await;
    manager.start();

    let mut first = next_connection(&mut conns).await;
    recv_text(&mut first).await;
    ack(&mut first).await;
    first.send(pricing_frame("AAPL", 100.0, 8)).await.unwrap();
    assert!(wait_until(|| manager.get_latest("AAPL").is_some()).await);

    first
        .send(Message::Text("definitely not base64!".into()))
        .await
        .unwrap();

    let mut second = next_connection(&mut conns).await;
    assert_eq!(recv_text(&mut second).await, r#"{"subscribe":["AAPL"]}"#);
    let cached = manager.get_latest("AAPL").unwrap();
    assert!((cached.price - 100.0).abs() < f64::EPSILON);

    manager.stop().await;
}

#[tokio::test]
async fn heartbeats_and_blank_symbols_never_reach_the_cache() {
    let (url, mut conns) = upstream().await;
    let manager = manager(&url);
    manager.subscribe(&symbols(&["AAPL", "MSFT"])).await;
    manager.start();

    let mut ws = next_connection(&mut conns).await;
    recv_text(&mut ws).await;
    ack(&mut ws).await;

    ws.send(pricing_frame("AAPL", 999.0, 7)).await.unwrap();
    ws.send(pricing_frame("  ", 1.0, 8)).await.unwrap();
    ws.send(pricing_frame("msft", 410.5, 8)).await.unwrap();

    assert!(wait_until(|| manager.get_latest("MSFT").is_some()).await);
    assert!(manager.get_latest("AAPL").is_none());
    assert_eq!(manager.status().cached_symbols, 1);
    assert_eq!(manager.status().frames_applied, 1);

    let many = manager.get_latest_many(&symbols(&["aapl", "msft"]));
    assert_eq!(many.len(), 2);
    assert!(many.values().filter(|v| v.is_some()).count() == 1);

    manager.stop().await;
}

#[tokio::test]
async fn stop_quiesces_and_start_restarts() {
    let (url, mut conns) = upstream().await;
    let manager = manager(&url);

    manager.start();
    manager.start();
    let _first = next_connection(&mut conns).await;
    assert!(
        timeout(Duration::from_millis(200), conns.recv()).await.is_err(),
        "second start must not open another connection"
    );

    timeout(Duration::from_secs(3), manager.stop())
        .await
        .expect("stop should return within its timeout");
    assert_eq!(manager.status().state, ConnectionState::Closing);
    assert!(
        timeout(Duration::from_millis(200), conns.recv()).await.is_err(),
        "no reconnect after stop"
    );

    manager.start();
    let _second = next_connection(&mut conns).await;
    assert!(wait_until(|| manager.status().state == ConnectionState::Connected).await);

    manager.stop().await;
}

#[tokio::test]
async fn unreachable_upstream_backs_off() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let manager = manager(&format!("ws://{addr}/"));
    manager.start();

    assert!(wait_until(|| manager.status().reconnect_attempts >= 2).await);
    let status = manager.status();
    assert_ne!(status.state, ConnectionState::Connected);
    assert!(status.last_error.is_some());
    assert!(status.backoff <= Duration::from_millis(100));

    timeout(Duration::from_secs(3), manager.stop())
        .await
        .expect("stop should interrupt the backoff sleep");
}
