//! Logging facade that mirrors every entry to connected viewers
//!
//! Each method logs through `tracing` at the matching level and broadcasts
//! the same payload under its `claude:*` event name, so the editor's log
//! panel sees exactly what the server console sees.

use serde_json::{json, Value};

use super::ViewerRegistry;
use crate::stream::StreamRecord;

#[derive(Clone)]
pub struct StreamLogger {
    registry: ViewerRegistry,
}

impl StreamLogger {
    pub fn new(registry: ViewerRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ViewerRegistry {
        &self.registry
    }

    /// Relay one parsed stream record, tagged with its operation label.
    pub async fn stream_json(&self, operation: &str, record: &StreamRecord) {
        let parsed = record.parsed.clone().unwrap_or(Value::Null);
        let record_type = record.parsed_type().unwrap_or("unknown").to_string();

        match record_type.as_str() {
            "error" => tracing::error!(%operation, %record_type, "stream record"),
            "warning" => tracing::warn!(%operation, %record_type, "stream record"),
            _ => tracing::info!(%operation, %record_type, "stream record"),
        }

        self.registry
            .publish(
                "claude:stream",
                json!({
                    "operation": operation,
                    "type": record_type,
                    "data": parsed,
                }),
            )
            .await;
    }

    pub async fn info(&self, message: &str, meta: Option<Value>) {
        tracing::info!("{message}");
        self.registry
            .publish("claude:info", json!({"message": message, "meta": meta}))
            .await;
    }

    pub async fn success(&self, message: &str, meta: Option<Value>) {
        tracing::info!("{message}");
        self.registry
            .publish("claude:success", json!({"message": message, "meta": meta}))
            .await;
    }

    pub async fn warning(&self, message: &str, meta: Option<Value>) {
        tracing::warn!("{message}");
        self.registry
            .publish("claude:warning", json!({"message": message, "meta": meta}))
            .await;
    }

    pub async fn error(&self, message: &str, error: Option<Value>) {
        tracing::error!("{message}");
        self.registry
            .publish("claude:error", json!({"message": message, "error": error}))
            .await;
    }

    pub async fn debug(&self, message: &str, meta: Option<Value>) {
        tracing::debug!("{message}");
        self.registry
            .publish("claude:debug", json!({"message": message, "meta": meta}))
            .await;
    }

    pub async fn progress(&self, operation: &str, progress: u8, message: Option<&str>) {
        tracing::info!(%operation, progress, "progress");
        self.registry
            .publish(
                "claude:progress",
                json!({
                    "operation": operation,
                    "progress": progress,
                    "message": message,
                }),
            )
            .await;
    }

    pub async fn complete(&self, operation: &str, result: Value) {
        tracing::info!(%operation, "complete");
        self.registry
            .publish(
                "claude:complete",
                json!({"operation": operation, "result": result}),
            )
            .await;
    }
}
