//! Backpressure-aware event fan-out.
//!
//! Adapts reactive-streams pull semantics (permits + a bounded pending
//! queue) to pushed JSON-RPC events: a subscriber only receives events
//! while it holds permits, and is never invoked concurrently with
//! itself even though different subscribers may run at once.

use crate::error::PubSubError;
use crate::matcher::{SubscriptionId, SubscriptionMatcher};
use rpc_wire::jsonrpc::JsonRpcRequest;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Default cap on a holder's pending-event queue before new events are
/// dropped with a warning rather than grown without bound.
const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Callback surface a subscriber implements. Invoked from a spawned
/// task, never from inside `publish`, so a slow or panicking sink
/// can't stall the publisher.
pub trait EventSink: Send + Sync {
    fn on_next(&self, params: serde_json::Value);
    fn on_error(&self, message: String);
    fn on_complete(&self);
}

struct HolderState {
    queue: VecDeque<JsonRpcRequest>,
    permits: u64,
    processing: bool,
}

/// A registered subscriber: its topic filter, its callback, and the
/// queue/permit bookkeeping the publisher drains against.
pub struct SubscriptionHolder {
    id: SubscriptionId,
    sink: Arc<dyn EventSink>,
    capacity: usize,
    state: Mutex<HolderState>,
}

impl SubscriptionHolder {
    fn new(id: SubscriptionId, sink: Arc<dyn EventSink>, capacity: usize) -> Arc<Self> {
        Arc::new(SubscriptionHolder {
            id,
            sink,
            capacity,
            state: Mutex::new(HolderState {
                queue: VecDeque::new(),
                permits: 0,
                processing: false,
            }),
        })
    }

    pub fn topic(&self) -> &str {
        self.id.as_str()
    }
}

/// Publishes inbound JSON-RPC events to every matching subscriber.
pub struct EventPublisher {
    matcher: Mutex<SubscriptionMatcher<Arc<SubscriptionHolder>>>,
}

impl Default for EventPublisher {
    fn default() -> Self {
        EventPublisher::new()
    }
}

impl EventPublisher {
    pub fn new() -> Self {
        EventPublisher {
            matcher: Mutex::new(SubscriptionMatcher::new()),
        }
    }

    /// Registers a new subscriber under `topic` (`receiver|component|operation|unique`).
    pub async fn subscribe(
        &self,
        topic: &str,
        sink: Arc<dyn EventSink>,
    ) -> Result<Arc<SubscriptionHolder>, PubSubError> {
        self.subscribe_with_capacity(topic, sink, DEFAULT_QUEUE_CAPACITY).await
    }

    pub async fn subscribe_with_capacity(
        &self,
        topic: &str,
        sink: Arc<dyn EventSink>,
        capacity: usize,
    ) -> Result<Arc<SubscriptionHolder>, PubSubError> {
        let id = SubscriptionId::parse(topic)?;
        let holder = SubscriptionHolder::new(id.clone(), sink, capacity);
        self.matcher.lock().await.add(id, holder.clone())?;
        Ok(holder)
    }

    /// Removes `holder` from routing and fires its terminal callback.
    /// Idempotent: cancelling twice just re-invokes `on_complete`.
    pub async fn cancel(&self, holder: &Arc<SubscriptionHolder>) {
        self.matcher.lock().await.remove(&holder.id);
        holder.sink.on_complete();
    }

    /// Adds `count` permits to `holder` and, if it isn't already being
    /// drained, spawns a task to resume delivery.
    pub async fn request(self: &Arc<Self>, holder: &Arc<SubscriptionHolder>, count: u64) {
        let should_spawn = {
            let mut state = holder.state.lock().await;
            state.permits = state.permits.saturating_add(count);
            if !state.processing && !state.queue.is_empty() {
                state.processing = true;
                true
            } else {
                false
            }
        };
        if should_spawn {
            spawn_drain(holder.clone());
        }
    }

    /// Routes `event` to every matching subscriber, enqueueing it on
    /// each holder and waking delivery for holders that currently hold
    /// permits.
    pub async fn publish(&self, event: JsonRpcRequest) {
        let matched = self.matcher.lock().await.matching(&event.method);
        for holder in matched {
            let should_spawn = {
                let mut state = holder.state.lock().await;
                if state.queue.len() >= holder.capacity {
                    warn!(topic = holder.topic(), "dropping event: subscriber queue at capacity");
                    continue;
                }
                state.queue.push_back(event.clone());
                if !state.processing && state.permits > 0 {
                    state.processing = true;
                    true
                } else {
                    false
                }
            };
            if should_spawn {
                spawn_drain(holder);
            }
        }
    }
}

fn spawn_drain(holder: Arc<SubscriptionHolder>) {
    tokio::spawn(async move {
        loop {
            let next = {
                let mut state = holder.state.lock().await;
                if state.permits == 0 || state.queue.is_empty() {
                    state.processing = false;
                    None
                } else {
                    state.permits -= 1;
                    state.queue.pop_front()
                }
            };
            let Some(event) = next else { break };
            debug!(topic = holder.topic(), method = %event.method, "delivering event");
            match event.params.get("error") {
                Some(err) => {
                    let message = err
                        .get("message")
                        .and_then(|m| m.as_str())
                        .unwrap_or("unspecified event error")
                        .to_owned();
                    holder.sink.on_error(message);
                }
                None => holder.sink.on_next(event.params),
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    struct RecordingSink {
        received: StdMutex<Vec<serde_json::Value>>,
        errors: StdMutex<Vec<String>>,
        completed: AtomicUsize,
    }

    impl RecordingSink {
        fn new() -> Arc<Self> {
            Arc::new(RecordingSink {
                received: StdMutex::new(Vec::new()),
                errors: StdMutex::new(Vec::new()),
                completed: AtomicUsize::new(0),
            })
        }
    }

    impl EventSink for RecordingSink {
        fn on_next(&self, params: serde_json::Value) {
            self.received.lock().unwrap().push(params);
        }
        fn on_error(&self, message: String) {
            self.errors.lock().unwrap().push(message);
        }
        fn on_complete(&self) {
            self.completed.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn settle() {
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
    }

    #[tokio::test]
    async fn subscriber_receives_nothing_until_permits_requested() {
        let publisher = Arc::new(EventPublisher::new());
        let sink = RecordingSink::new();
        let holder = publisher
            .subscribe("host1|storage|Image.create|*", sink.clone())
            .await
            .unwrap();

        publisher
            .publish(JsonRpcRequest::notification(
                "host1|storage|Image.create|x",
                serde_json::json!({"size": 1}),
            ))
            .await;
        settle().await;
        assert!(sink.received.lock().unwrap().is_empty());

        publisher.request(&holder, 1).await;
        settle().await;
        assert_eq!(sink.received.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn error_params_route_to_on_error_not_on_next() {
        let publisher = Arc::new(EventPublisher::new());
        let sink = RecordingSink::new();
        let holder = publisher.subscribe("host1|*|*|*", sink.clone()).await.unwrap();
        publisher.request(&holder, 5).await;

        publisher
            .publish(JsonRpcRequest::notification(
                "host1|storage|Image.create|x",
                serde_json::json!({"error": {"message": "disk full"}}),
            ))
            .await;
        settle().await;

        assert_eq!(sink.errors.lock().unwrap().as_slice(), ["disk full".to_owned()]);
        assert!(sink.received.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancel_fires_on_complete_and_stops_routing() {
        let publisher = Arc::new(EventPublisher::new());
        let sink = RecordingSink::new();
        let holder = publisher
            .subscribe("host1|storage|Image.create|*", sink.clone())
            .await
            .unwrap();
        publisher.request(&holder, 10).await;

        publisher.cancel(&holder).await;
        assert_eq!(sink.completed.load(Ordering::SeqCst), 1);

        publisher
            .publish(JsonRpcRequest::notification(
                "host1|storage|Image.create|x",
                serde_json::json!({}),
            ))
            .await;
        settle().await;
        assert!(sink.received.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn multiple_events_deliver_in_publish_order_once_permits_available() {
        let publisher = Arc::new(EventPublisher::new());
        let sink = RecordingSink::new();
        let holder = publisher.subscribe("host1|*|*|*", sink.clone()).await.unwrap();

        for i in 0..3 {
            publisher
                .publish(JsonRpcRequest::notification(
                    "host1|storage|Image.create|x",
                    serde_json::json!({"seq": i}),
                ))
                .await;
        }
        publisher.request(&holder, 10).await;
        settle().await;

        let received = sink.received.lock().unwrap();
        let seqs: Vec<i64> = received.iter().map(|v| v["seq"].as_i64().unwrap()).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
    }
}
