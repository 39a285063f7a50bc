//! End-to-end tests for the WebSocket relay: viewer sessions against a
//! live server, broadcast fan-out, and the subscriber's reconnect loop.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use claude_relay::client::{ConnectionState, StreamSubscriber, SubscriberOptions};
use claude_relay::config::RelayConfig;
use claude_relay::relay::ViewerRegistry;
use claude_relay::server::RelayServer;

const WAIT: Duration = Duration::from_secs(5);

/// Serve the relay router on an ephemeral port.
async fn spawn_relay() -> (SocketAddr, ViewerRegistry) {
    let server = RelayServer::new(RelayConfig::default()).unwrap();
    let registry = server.registry().clone();
    let app = server.router();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, registry)
}

async fn next_event(
    ws: &mut (impl StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin),
) -> Value {
    loop {
        let message = timeout(WAIT, ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("websocket error");
        if let Message::Text(text) = message {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

#[tokio::test]
async fn viewer_is_welcomed_on_connect() {
    let (addr, _registry) = spawn_relay().await;
    let (mut ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();

    let welcome = next_event(&mut ws).await;
    assert_eq!(welcome["event"], "connected");
    assert_eq!(
        welcome["data"]["message"],
        "Connected to Claude streaming server"
    );
    assert!(welcome["timestamp"].as_i64().unwrap() > 0);
}

#[tokio::test]
async fn ping_gets_a_pong() {
    let (addr, _registry) = spawn_relay().await;
    let (mut ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();

    // Skip the welcome first.
    let _ = next_event(&mut ws).await;

    ws.send(Message::Text(r#"{"type":"ping"}"#.into()))
        .await
        .unwrap();

    // The inbound message is also mirrored as an info entry; scan until
    // the pong shows up.
    loop {
        let event = next_event(&mut ws).await;
        if event["event"] == "pong" {
            assert!(event["data"]["timestamp"].as_i64().unwrap() > 0);
            break;
        }
    }
}

#[tokio::test]
async fn published_events_reach_connected_viewers() {
    let (addr, registry) = spawn_relay().await;
    let (mut ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    let _ = next_event(&mut ws).await;

    registry
        .publish("claude:info", json!({"message": "from the runner"}))
        .await;

    let event = next_event(&mut ws).await;
    assert_eq!(event["event"], "claude:info");
    assert_eq!(event["data"]["message"], "from the runner");
}

#[tokio::test]
async fn subscriber_connects_and_receives_broadcasts() {
    let (addr, registry) = spawn_relay().await;

    let options = SubscriberOptions {
        url: format!("ws://{addr}/ws"),
        enabled: true,
        reconnect_attempts: 3,
        reconnect_delay: Duration::from_millis(50),
        max_log_entries: 100,
    };
    let mut subscriber = StreamSubscriber::new(options);
    let mut entries = subscriber.entries().await;
    subscriber.connect().unwrap();

    // First two entries: the local "connected" system entry and the
    // server's welcome event.
    let first = timeout(WAIT, entries.recv()).await.unwrap().unwrap();
    assert_eq!(first.event, "system");
    let second = timeout(WAIT, entries.recv()).await.unwrap().unwrap();
    assert_eq!(second.message, "Connected to Claude streaming server");
    assert_eq!(subscriber.state().await, ConnectionState::Connected);

    registry
        .publish("claude:success", json!({"message": "saved"}))
        .await;
    let third = timeout(WAIT, entries.recv()).await.unwrap().unwrap();
    assert_eq!(third.event, "success");
    assert_eq!(third.message, "saved");

    subscriber.disconnect().await;
    assert_eq!(subscriber.state().await, ConnectionState::Disconnected);
}

#[tokio::test]
async fn subscriber_fails_terminally_when_nobody_listens() {
    // Grab a port with no listener behind it.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let options = SubscriberOptions {
        url: format!("ws://{addr}/ws"),
        enabled: true,
        reconnect_attempts: 2,
        reconnect_delay: Duration::from_millis(20),
        max_log_entries: 100,
    };
    let mut subscriber = StreamSubscriber::new(options);
    subscriber.connect().unwrap();

    timeout(WAIT, async {
        loop {
            if subscriber.state().await == ConnectionState::Failed {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("subscriber never reached Failed");

    let core = subscriber.handle();
    let core = core.lock().await;
    assert_eq!(
        core.error(),
        Some("Failed to connect after multiple attempts")
    );
}

#[tokio::test]
async fn explicit_disconnect_cancels_pending_reconnect() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let options = SubscriberOptions {
        url: format!("ws://{addr}/ws"),
        enabled: true,
        reconnect_attempts: 50,
        reconnect_delay: Duration::from_secs(30),
        max_log_entries: 100,
    };
    let mut subscriber = StreamSubscriber::new(options);
    subscriber.connect().unwrap();

    // Let the first attempt fail and the retry timer arm.
    tokio::time::sleep(Duration::from_millis(100)).await;
    timeout(WAIT, subscriber.disconnect())
        .await
        .expect("disconnect should not wait out the retry delay");
    assert_eq!(subscriber.state().await, ConnectionState::Disconnected);
}
