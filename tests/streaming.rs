// End-to-end checks of the streaming side against a local WebSocket server.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use marketlink::{ChannelState, ClientConfig, MarketLink, PriceLevel};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;

const WAIT: Duration = Duration::from_secs(5);

async fn wait_for(what: &str, cond: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !cond() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn test_config(addr: SocketAddr) -> ClientConfig {
    ClientConfig {
        reconnect_base_delay_ms: 20,
        heartbeat_interval_ms: 50,
        ..ClientConfig::default()
    }
    .with_api_base(addr.to_string())
}

fn trade_frame(id: u32) -> String {
    serde_json::json!({
        "type": "trade",
        "data": {
            "timestamp": "2024-01-01T00:00:00",
            "symbol": "BTC-USDT",
            "trade_id": id.to_string(),
            "price": "30000",
            "quantity": "0.1",
            "aggressor_side": "buy",
            "maker_order_id": id.to_string(),
            "taker_order_id": (id + 1).to_string(),
        }
    })
    .to_string()
}

/// Serves both stream paths. Each accepted connection receives the frames
/// returned by `frames(path, connection_index)`; afterwards inbound text is
/// reported on the returned receiver. With `close_after_send` the server
/// hangs up right after sending.
async fn spawn_server(
    frames: fn(&str, usize) -> Vec<String>,
    close_after_send: bool,
) -> (SocketAddr, mpsc::UnboundedReceiver<(String, String)>, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (seen_tx, seen_rx) = mpsc::unbounded_channel();
    let connections = Arc::new(AtomicUsize::new(0));
    let counter = connections.clone();

    tokio::spawn(async move {
        while let Ok((tcp, _)) = listener.accept().await {
            let index = counter.fetch_add(1, Ordering::SeqCst);
            let seen_tx = seen_tx.clone();
            tokio::spawn(async move {
                let mut path = String::new();
                let ws = tokio_tungstenite::accept_hdr_async(tcp, |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                    path = req.uri().path().to_string();
                    Ok(resp)
                })
                .await
                .unwrap();
                let (mut write, mut read) = ws.split();
                for frame in frames(&path, index) {
                    write.send(Message::Text(frame)).await.unwrap();
                }
                if close_after_send {
                    let _ = write.send(Message::Close(None)).await;
                    return;
                }
                while let Some(Ok(msg)) = read.next().await {
                    if let Message::Text(text) = msg {
                        let _ = seen_tx.send((path.clone(), text));
                    }
                }
            });
        }
    });

    (addr, seen_rx, connections)
}

fn book_and_trades(path: &str, _index: usize) -> Vec<String> {
    match path {
        "/ws/market-data" => vec![
            r#"{"type":"market_data","data":{"timestamp":"t1","symbol":"BTC-USDT","bids":[[100,1]],"asks":[["30050","1"]]}}"#.into(),
            "garbage {".into(),
            r#"{"data":{"symbol":"BTC-USDT"}}"#.into(),
            r#"{"type":"market_data","data":{"timestamp":"t2","symbol":"BTC-USDT","bids":[[101,2]],"asks":[]}}"#.into(),
        ],
        "/ws/trades" => vec![trade_frame(1), r#"{"type":"pong"}"#.into(), trade_frame(2), trade_frame(3)],
        _ => vec![],
    }
}

#[tokio::test]
async fn test_streams_feed_store_and_heartbeat() {
    let (addr, mut seen, _) = spawn_server(book_and_trades, false).await;
    let link = MarketLink::start(&test_config(addr));
    let store = link.store();

    wait_for("both channels open", || link.is_connected()).await;
    wait_for("trades", || store.trade_count() == 3).await;
    wait_for("second snapshot", || {
        store.snapshot("BTC-USDT").map(|s| s.timestamp.as_deref() == Some("t2")).unwrap_or(false)
    })
    .await;

    // last write wins, no merge with the first snapshot
    let snap = store.snapshot("BTC-USDT").unwrap();
    assert_eq!(snap.bids, vec![PriceLevel::new(101.0, 2.0)]);
    assert!(snap.asks.is_empty());

    let ids: Vec<String> = store.trades(None, None).into_iter().map(|t| t.trade_id).collect();
    assert_eq!(ids, vec!["3", "2", "1"]);

    // malformed frames did not cost us the connection
    let status = link.status();
    assert!(status.connected);
    assert_eq!(status.market_data.reconnect_attempts, 0);

    // keep-alive reaches both endpoints
    let mut pinged = std::collections::HashSet::new();
    while pinged.len() < 2 {
        let (path, text) = tokio::time::timeout(WAIT, seen.recv()).await.unwrap().unwrap();
        assert_eq!(serde_json::from_str::<serde_json::Value>(&text).unwrap(), serde_json::json!({"type":"ping"}));
        pinged.insert(path);
    }

    link.shutdown().await;
    let status = link.status();
    assert!(!status.connected);
    assert_eq!(status.market_data.state, ChannelState::Closed);
    assert_eq!(status.trades.state, ChannelState::Closed);

    // idempotent
    link.shutdown().await;
    assert!(link.reset().await.is_err());
}

fn one_snapshot_then_hang_up(path: &str, index: usize) -> Vec<String> {
    if path == "/ws/market-data" {
        vec![format!(
            r#"{{"type":"market_data","data":{{"symbol":"ETH-USDT","bids":[["{}","1"]],"asks":[]}}}}"#,
            2000 + index
        )]
    } else {
        vec![]
    }
}

#[tokio::test]
async fn test_reconnects_after_server_hang_up() {
    let (addr, _seen, connections) = spawn_server(one_snapshot_then_hang_up, true).await;
    let link = MarketLink::start(&ClientConfig { reconnect_max_attempts: 100, ..test_config(addr) });
    let store = link.store();

    // every reconnect succeeds, so the counter keeps resetting and the
    // client never exhausts its attempts
    wait_for("several reconnects", || connections.load(Ordering::SeqCst) >= 6).await;
    assert!(!link.status().any_exhausted());
    assert!(store.snapshot("ETH-USDT").is_some());

    link.shutdown().await;
}

#[tokio::test]
async fn test_reconnect_exhaustion_and_reset() {
    // Accept TCP and hang up immediately: every handshake fails.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    tokio::spawn(async move {
        while let Ok((tcp, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            drop(tcp);
        }
    });

    let config = ClientConfig { reconnect_base_delay_ms: 10, ..test_config(addr) };
    let link = MarketLink::start(&config);

    wait_for("both channels exhausted", || {
        let s = link.status();
        s.market_data.exhausted && s.trades.exhausted
    })
    .await;

    let status = link.status();
    assert!(!status.connected);
    assert_eq!(status.market_data.reconnect_attempts, 5);
    assert_eq!(status.trades.reconnect_attempts, 5);
    assert_eq!(status.market_data.state, ChannelState::Closed);

    // initial connect + 5 reconnects per channel, then nothing more
    wait_for("all attempts counted", || attempts.load(Ordering::SeqCst) == 12).await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(attempts.load(Ordering::SeqCst), 12);

    // explicit reset resumes reconnecting
    link.reset().await.unwrap();
    wait_for("attempts after reset", || attempts.load(Ordering::SeqCst) > 12).await;

    link.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_during_backoff_stops_reconnecting() {
    let (addr, _seen, connections) = spawn_server(one_snapshot_then_hang_up, true).await;
    let link = MarketLink::start(&ClientConfig { reconnect_base_delay_ms: 300, ..test_config(addr) });

    wait_for("both initial connections", || connections.load(Ordering::SeqCst) >= 2).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    link.shutdown().await;
    let before = connections.load(Ordering::SeqCst);

    // longer than the first backoff delay
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(connections.load(Ordering::SeqCst), before);
    assert_eq!(before, 2);
}
