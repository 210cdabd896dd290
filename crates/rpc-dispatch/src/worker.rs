//! Decodes inbound frames from a single reactor client and routes each
//! element to either the response tracker or the event publisher.
//!
//! One worker owns one client's message channel, so response delivery
//! stays totally ordered for that client, matching the "single
//! dedicated consumer" requirement.

use crate::tracker::ResponseTracker;
use rpc_pubsub::EventPublisher;
use rpc_wire::jsonrpc::{JsonRpcRequest, JsonRpcResponse};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub struct ResponseWorker {
    tracker: Arc<ResponseTracker>,
    publisher: Arc<EventPublisher>,
    host: String,
}

impl ResponseWorker {
    pub fn new(tracker: Arc<ResponseTracker>, publisher: Arc<EventPublisher>, host: String) -> Self {
        ResponseWorker { tracker, publisher, host }
    }

    /// Consumes `messages` until the sending half (the reactor client)
    /// is dropped. Intended to be spawned once per client.
    pub async fn run(self, mut messages: mpsc::Receiver<Vec<u8>>) {
        while let Some(bytes) = messages.recv().await {
            self.handle_message(&bytes).await;
        }
        debug!(host = self.host, "response worker exiting: client message channel closed");
    }

    async fn handle_message(&self, bytes: &[u8]) {
        let value: serde_json::Value = match serde_json::from_slice(bytes) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "malformed json on the wire, dropping message");
                return;
            }
        };
        let items: Vec<serde_json::Value> = match value {
            serde_json::Value::Array(items) => items,
            other => vec![other],
        };
        for item in items {
            self.handle_one(item).await;
        }
    }

    async fn handle_one(&self, item: serde_json::Value) {
        if let Some(host) = host_scoped_error_code(&item) {
            let message = item
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .unwrap_or("")
                .to_owned();
            let topic = format!("{host}|*|*|*");
            self.publisher
                .publish(JsonRpcRequest::notification(topic, serde_json::json!({"error": {"message": message}})))
                .await;
        }

        let has_id = item.get("id").map(|v| !v.is_null()).unwrap_or(false);
        if !has_id {
            let Some(method) = item.get("method").and_then(|m| m.as_str()) else {
                return;
            };
            let params = item.get("params").cloned().unwrap_or(serde_json::Value::Null);
            let topic = format!("{}|{}", self.host, method);
            self.publisher.publish(JsonRpcRequest::notification(topic, params)).await;
            return;
        }

        match serde_json::from_value::<JsonRpcResponse>(item) {
            Ok(response) => self.tracker.process_response(response).await,
            Err(e) => debug!(error = %e, "element has an id but doesn't decode as a response, dropping"),
        }
    }
}

/// Detects the legacy-format error whose `code` is a `"host:..."`
/// string rather than a JSON-RPC integer error code, returning the
/// host it names.
fn host_scoped_error_code(item: &serde_json::Value) -> Option<&str> {
    item.get("error")
        .and_then(|e| e.get("code"))
        .and_then(|c| c.as_str())
        .and_then(|c| c.strip_prefix("host:"))
}
