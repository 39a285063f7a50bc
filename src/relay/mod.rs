//! Viewer registry and event fan-out
//!
//! The registry is the only shared mutable state in the relay: the session
//! manager adds and removes viewers, the logger iterates and sends. It is
//! an explicitly owned instance handed to both sides, guarded for
//! multi-threaded hosts, and constructible per test.

pub mod logger;

pub use logger::StreamLogger;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// One named, timestamped payload fanned out to every open viewer.
#[derive(Debug, Clone, Serialize)]
pub struct BroadcastEvent {
    pub event: String,
    pub data: Value,
    pub timestamp: i64,
}

impl BroadcastEvent {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    /// Wire form. Events exist only in transit; serialization happens once
    /// per publish, not per viewer.
    pub fn to_frame(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// A registered viewer connection handle.
#[derive(Debug, Clone)]
pub struct ViewerSession {
    pub id: Uuid,
    sender: mpsc::UnboundedSender<String>,
}

impl ViewerSession {
    pub fn new(sender: mpsc::UnboundedSender<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender,
        }
    }
}

/// Process-wide set of connected viewers.
///
/// `publish` delivers to every registered session and silently skips the
/// ones whose channel has gone away; a half-closed viewer never fails a
/// publish or blocks delivery to the rest. Nothing is queued or replayed,
/// so a viewer that connects after an event was published never sees it.
#[derive(Clone, Default)]
pub struct ViewerRegistry {
    sessions: Arc<RwLock<HashMap<Uuid, mpsc::UnboundedSender<String>>>>,
}

impl ViewerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent: re-registering a session replaces its previous entry.
    pub async fn register(&self, session: &ViewerSession) {
        self.sessions
            .write()
            .await
            .insert(session.id, session.sender.clone());
    }

    pub async fn unregister(&self, id: Uuid) {
        self.sessions.write().await.remove(&id);
    }

    pub async fn viewer_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn publish(&self, event: &str, data: Value) {
        let frame = BroadcastEvent::new(event, data).to_frame();
        let sessions = self.sessions.read().await;

        for (id, sender) in sessions.iter() {
            if sender.send(frame.clone()).is_err() {
                tracing::debug!("skipping closed viewer {id}");
            }
        }
    }
}
