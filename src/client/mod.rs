//! Reconnecting viewer-side subscriber
//!
//! `SubscriberCore` is the connection state machine and log buffer, driven
//! either by the real socket loop in [`StreamSubscriber`] or directly by
//! tests. The subscriber keeps one logical connection to the relay,
//! retrying a bounded number of times with a fixed delay before giving up.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

use crate::config::RelayConfig;
use crate::error::{Error, Result};

pub const DEFAULT_MAX_LOG_ENTRIES: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Failed,
}

/// One entry in the viewer's append-only log.
#[derive(Debug, Clone)]
pub struct ClientLogEntry {
    pub id: Uuid,
    pub event: String,
    pub message: String,
    pub data: Option<Value>,
    pub timestamp: i64,
}

/// What the driver should do after the socket closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    Retry,
    GiveUp,
}

#[derive(Debug, Clone)]
pub struct SubscriberOptions {
    pub url: String,
    /// The subscriber is inert unless explicitly enabled; outside
    /// development it must never attempt a connection.
    pub enabled: bool,
    pub reconnect_attempts: u32,
    pub reconnect_delay: Duration,
    pub max_log_entries: usize,
}

impl SubscriberOptions {
    pub fn from_config(config: &RelayConfig) -> Self {
        Self {
            url: config.ws_url(),
            enabled: config.mode.is_development(),
            reconnect_attempts: config.reconnect_attempts,
            reconnect_delay: config.reconnect_delay,
            max_log_entries: DEFAULT_MAX_LOG_ENTRIES,
        }
    }
}

pub struct SubscriberCore {
    state: ConnectionState,
    logs: VecDeque<ClientLogEntry>,
    max_log_entries: usize,
    generating: bool,
    error: Option<String>,
    reconnect_count: u32,
    max_reconnects: u32,
    entry_sink: Option<mpsc::UnboundedSender<ClientLogEntry>>,
}

impl SubscriberCore {
    pub fn new(max_reconnects: u32, max_log_entries: usize) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            logs: VecDeque::new(),
            max_log_entries,
            generating: false,
            error: None,
            reconnect_count: 0,
            max_reconnects,
            entry_sink: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn is_generating(&self) -> bool {
        self.generating
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn logs(&self) -> impl Iterator<Item = &ClientLogEntry> {
        self.logs.iter()
    }

    pub fn clear_logs(&mut self) {
        self.logs.clear();
    }

    /// Mirror every appended entry into a channel, for live consumers.
    pub fn set_entry_sink(&mut self, sink: mpsc::UnboundedSender<ClientLogEntry>) {
        self.entry_sink = Some(sink);
    }

    pub fn connect_requested(&mut self) {
        self.state = ConnectionState::Connecting;
    }

    pub fn on_open(&mut self) {
        self.state = ConnectionState::Connected;
        self.error = None;
        self.reconnect_count = 0;
        self.add_log("system", "Connected to streaming server", None);
    }

    pub fn on_socket_error(&mut self) {
        self.error = Some("WebSocket connection error".to_string());
        self.add_log("error", "Connection error occurred", None);
    }

    /// Below the retry limit the connection is retried after a fixed
    /// delay; at the limit the subscriber fails terminally and never
    /// attempts again.
    pub fn on_close(&mut self) -> ReconnectDecision {
        if self.reconnect_count < self.max_reconnects {
            self.reconnect_count += 1;
            self.state = ConnectionState::Reconnecting;
            let message = format!(
                "Reconnecting... (attempt {}/{})",
                self.reconnect_count, self.max_reconnects
            );
            self.add_log("system", &message, None);
            ReconnectDecision::Retry
        } else {
            self.state = ConnectionState::Failed;
            self.error = Some("Failed to connect after multiple attempts".to_string());
            self.add_log("error", "Connection failed. Giving up.", None);
            ReconnectDecision::GiveUp
        }
    }

    /// Owner-requested disconnect: no retry counting, no surfaced error.
    pub fn disconnect_requested(&mut self) {
        self.state = ConnectionState::Disconnected;
    }

    pub fn on_frame(&mut self, text: &str) {
        let frame: Value = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!("dropping unparseable frame: {e}");
                return;
            }
        };
        let Some(event) = frame.get("event").and_then(Value::as_str) else {
            tracing::debug!("dropping frame without event name");
            return;
        };
        let data = frame.get("data").cloned().unwrap_or(Value::Null);
        self.dispatch(event, &data);
    }

    fn dispatch(&mut self, event: &str, data: &Value) {
        match event {
            "connected" => {
                self.add_log("system", message_of(data), None);
            }
            "claude:stream" => {
                self.generating = true;
                let operation = data
                    .get("operation")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown");
                let payload = data
                    .get("data")
                    .cloned()
                    .unwrap_or_else(|| Value::Object(Default::default()));
                let body = nonempty_str(&payload, "text")
                    .or_else(|| nonempty_str(&payload, "content"))
                    .map(str::to_owned)
                    .unwrap_or_else(|| truncate(&payload.to_string(), 100));
                let message = format!("[{operation}] {body}");
                self.add_log(event, &message, Some(data.clone()));
            }
            "claude:info" => {
                self.add_log("info", message_of(data), data.get("meta").cloned());
            }
            "claude:success" => {
                self.add_log("success", message_of(data), data.get("meta").cloned());
            }
            "claude:warning" => {
                self.add_log("warning", message_of(data), data.get("meta").cloned());
            }
            "claude:error" => {
                let message = message_of(data).to_string();
                self.error = Some(message.clone());
                self.add_log("error", &message, data.get("error").cloned());
                self.generating = false;
            }
            "claude:progress" => {
                let message = match data.get("message").and_then(Value::as_str) {
                    Some(message) => message.to_string(),
                    None => {
                        let pct = data.get("progress").and_then(Value::as_u64).unwrap_or(0);
                        format!("Progress: {pct}%")
                    }
                };
                self.add_log("progress", &message, Some(data.clone()));
            }
            "claude:complete" => {
                let operation = data
                    .get("operation")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown");
                let message = format!("Completed: {operation}");
                self.add_log("success", &message, data.get("result").cloned());
                self.generating = false;
            }
            "claude:debug" => {
                self.add_log("debug", message_of(data), data.get("meta").cloned());
            }
            other => {
                tracing::debug!("unhandled event {other}");
            }
        }
    }

    fn add_log(&mut self, event: &str, message: &str, data: Option<Value>) {
        let entry = ClientLogEntry {
            id: Uuid::new_v4(),
            event: event.to_string(),
            message: message.to_string(),
            data,
            timestamp: Utc::now().timestamp_millis(),
        };
        if let Some(sink) = &self.entry_sink {
            let _ = sink.send(entry.clone());
        }
        self.logs.push_back(entry);
        while self.logs.len() > self.max_log_entries {
            self.logs.pop_front();
        }
    }
}

fn message_of(data: &Value) -> &str {
    data.get("message").and_then(Value::as_str).unwrap_or("")
}

fn nonempty_str<'a>(value: &'a Value, field: &str) -> Option<&'a str> {
    value
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

/// Drives a [`SubscriberCore`] over a real WebSocket connection.
pub struct StreamSubscriber {
    options: SubscriberOptions,
    core: Arc<Mutex<SubscriberCore>>,
    cancel: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

impl StreamSubscriber {
    pub fn new(options: SubscriberOptions) -> Self {
        let core = SubscriberCore::new(options.reconnect_attempts, options.max_log_entries);
        Self {
            options,
            core: Arc::new(Mutex::new(core)),
            cancel: None,
            task: None,
        }
    }

    pub fn handle(&self) -> Arc<Mutex<SubscriberCore>> {
        Arc::clone(&self.core)
    }

    pub async fn state(&self) -> ConnectionState {
        self.core.lock().await.state()
    }

    /// Receive every log entry as it is appended. Call before `connect`.
    pub async fn entries(&self) -> mpsc::UnboundedReceiver<ClientLogEntry> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.core.lock().await.set_entry_sink(tx);
        rx
    }

    /// Start the connection loop. Refuses when the subscriber is not
    /// enabled for this runtime; a second call while running is a no-op.
    pub fn connect(&mut self) -> Result<()> {
        if !self.options.enabled {
            return Err(Error::Unavailable(
                "stream subscriber is disabled outside development mode".to_string(),
            ));
        }
        if self.task.is_some() {
            return Ok(());
        }

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let core = Arc::clone(&self.core);
        let options = self.options.clone();
        self.cancel = Some(cancel_tx);
        self.task = Some(tokio::spawn(run_loop(core, options, cancel_rx)));
        Ok(())
    }

    /// Cancel any pending reconnect and close the connection. Does not
    /// count as a retry and surfaces no error.
    pub async fn disconnect(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(true);
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

async fn run_loop(
    core: Arc<Mutex<SubscriberCore>>,
    options: SubscriberOptions,
    mut cancel: watch::Receiver<bool>,
) {
    loop {
        core.lock().await.connect_requested();

        let attempt = tokio::select! {
            _ = cancel.changed() => {
                core.lock().await.disconnect_requested();
                return;
            }
            attempt = connect_async(options.url.as_str()) => attempt,
        };

        match attempt {
            Ok((stream, _)) => {
                core.lock().await.on_open();
                let (mut sink, mut source) = stream.split();

                loop {
                    tokio::select! {
                        _ = cancel.changed() => {
                            let _ = sink.send(Message::Close(None)).await;
                            core.lock().await.disconnect_requested();
                            return;
                        }
                        frame = source.next() => match frame {
                            Some(Ok(Message::Text(text))) => {
                                core.lock().await.on_frame(text.as_str());
                            }
                            Some(Ok(Message::Ping(payload))) => {
                                let _ = sink.send(Message::Pong(payload)).await;
                            }
                            Some(Ok(Message::Close(_))) | None => break,
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                tracing::warn!("WebSocket receive error: {e}");
                                core.lock().await.on_socket_error();
                                break;
                            }
                        }
                    }
                }
            }
            Err(e) => {
                tracing::warn!("WebSocket connect failed: {e}");
                core.lock().await.on_socket_error();
            }
        }

        if core.lock().await.on_close() == ReconnectDecision::GiveUp {
            return;
        }

        tokio::select! {
            _ = cancel.changed() => {
                core.lock().await.disconnect_requested();
                return;
            }
            _ = tokio::time::sleep(options.reconnect_delay) => {}
        }
    }
}
