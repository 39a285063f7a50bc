//! WebSocket relay server
//!
//! Accepts viewer connections, registers them with the broadcaster, greets
//! each with a welcome event, and answers liveness pings. Inbound payloads
//! carry no command protocol beyond ping/pong; everything else is logged
//! and ignored.

use std::net::SocketAddr;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::{Json, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::config::RelayConfig;
use crate::error::{Error, Result};
use crate::relay::{BroadcastEvent, StreamLogger, ViewerRegistry, ViewerSession};

#[derive(Clone)]
struct ServerState {
    registry: ViewerRegistry,
    logger: StreamLogger,
    port: u16,
}

pub struct RelayServer {
    config: RelayConfig,
    registry: ViewerRegistry,
    logger: StreamLogger,
}

impl RelayServer {
    /// Fails with an explicit unavailable error outside development mode;
    /// no port is bound and no subprocess machinery is armed.
    pub fn new(config: RelayConfig) -> Result<Self> {
        if !config.mode.is_development() {
            return Err(Error::Unavailable(
                "WebSocket relay is disabled outside development mode".to_string(),
            ));
        }

        let registry = ViewerRegistry::new();
        let logger = StreamLogger::new(registry.clone());
        Ok(Self {
            config,
            registry,
            logger,
        })
    }

    pub fn registry(&self) -> &ViewerRegistry {
        &self.registry
    }

    pub fn logger(&self) -> &StreamLogger {
        &self.logger
    }

    pub fn router(&self) -> Router {
        let state = ServerState {
            registry: self.registry.clone(),
            logger: self.logger.clone(),
            port: self.config.port,
        };

        Router::new()
            .route("/", get(ws_handler))
            .route("/ws", get(ws_handler))
            .route("/api/status", get(status))
            .route("/api/health", post(health))
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    pub async fn serve(self) -> Result<()> {
        let addr = SocketAddr::from(([127, 0, 0, 1], self.config.port));
        let app = self.router();

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        info!("WebSocket relay listening on ws://{addr}/ws");

        axum::serve(listener, app).await?;
        Ok(())
    }
}

async fn status(State(state): State<ServerState>) -> Json<Value> {
    Json(json!({
        "success": true,
        "port": state.port,
        "url": format!("ws://localhost:{}/ws", state.port),
    }))
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "mode": "development",
        "websocket": true,
    }))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<ServerState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: ServerState) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let session = ViewerSession::new(tx.clone());
    let session_id = session.id;
    state.registry.register(&session).await;
    info!("viewer {session_id} connected");

    let welcome = BroadcastEvent::new(
        "connected",
        json!({"message": "Connected to Claude streaming server"}),
    );
    let _ = tx.send(welcome.to_frame());

    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sender.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    let recv_state = state.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            if let Message::Text(text) = message {
                handle_client_frame(text.as_str(), &tx, &recv_state).await;
            }
        }
    });

    // Either side ending the connection tears down the other.
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.registry.unregister(session_id).await;
    info!("viewer {session_id} disconnected");
}

async fn handle_client_frame(
    text: &str,
    reply: &mpsc::UnboundedSender<String>,
    state: &ServerState,
) {
    let payload: Value = match serde_json::from_str(text) {
        Ok(payload) => payload,
        Err(e) => {
            state
                .logger
                .error(
                    "Failed to parse client message",
                    Some(Value::String(e.to_string())),
                )
                .await;
            return;
        }
    };

    let kind = payload
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();
    state
        .logger
        .info(
            &format!("Client message received: {kind}"),
            Some(json!({"clientMessage": payload})),
        )
        .await;

    if kind == "ping" {
        let pong = BroadcastEvent::new("pong", json!({"timestamp": Utc::now().timestamp_millis()}));
        let _ = reply.send(pong.to_frame());
        state.logger.debug("Ping-pong exchange completed", None).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeMode;

    #[test]
    fn production_mode_is_unavailable() {
        let config = RelayConfig {
            mode: RuntimeMode::Production,
            ..RelayConfig::default()
        };
        assert!(matches!(
            RelayServer::new(config),
            Err(Error::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn status_reports_endpoint() {
        let server = RelayServer::new(RelayConfig::default()).unwrap();
        let state = ServerState {
            registry: server.registry().clone(),
            logger: server.logger().clone(),
            port: 3001,
        };

        let Json(body) = status(State(state)).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["port"], 3001);
        assert_eq!(body["url"], "ws://localhost:3001/ws");
    }

    #[tokio::test]
    async fn health_reports_development() {
        let Json(body) = health().await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["mode"], "development");
        assert_eq!(body["websocket"], true);
    }

    #[tokio::test]
    async fn ping_frame_queues_a_pong() {
        let server = RelayServer::new(RelayConfig::default()).unwrap();
        let state = ServerState {
            registry: server.registry().clone(),
            logger: server.logger().clone(),
            port: 3001,
        };
        let (tx, mut rx) = mpsc::unbounded_channel();

        handle_client_frame(r#"{"type":"ping"}"#, &tx, &state).await;

        let frame: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(frame["event"], "pong");
        assert!(frame["data"]["timestamp"].as_i64().unwrap() > 0);
    }

    #[tokio::test]
    async fn unparseable_frame_is_dropped() {
        let server = RelayServer::new(RelayConfig::default()).unwrap();
        let state = ServerState {
            registry: server.registry().clone(),
            logger: server.logger().clone(),
            port: 3001,
        };
        let (tx, mut rx) = mpsc::unbounded_channel();

        handle_client_frame("not json", &tx, &state).await;
        assert!(rx.try_recv().is_err());
    }
}
