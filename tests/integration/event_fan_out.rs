//! Literal scenario 4: an event fan-out to overlapping topic filters.
//! Two connections (distinct hosts) share one publisher, the way a
//! caller managing several hypervisor hosts would subscribe once and
//! receive events regardless of which connection they arrive on.
//!
//! `host1|storage|Image.create|x` matches both `*|storage|*|*` and
//! `host1|*|*|*`; `host2|virt|VM.start|y` matches neither.

use jsonrpc_transport::{ClientPolicy, EventPublisher, EventSink, ReactorClient, ResponseWorker, Transport};
use rpc_test_utils::MockEchoServer;
use std::sync::{Arc, Mutex};

struct RecordingSink(Mutex<Vec<serde_json::Value>>);

impl RecordingSink {
    fn new() -> Arc<Self> {
        Arc::new(RecordingSink(Mutex::new(Vec::new())))
    }
}

impl EventSink for RecordingSink {
    fn on_next(&self, params: serde_json::Value) {
        self.0.lock().unwrap().push(params);
    }
    fn on_error(&self, _message: String) {}
    fn on_complete(&self) {}
}

async fn settle() {
    tokio::task::yield_now().await;
    tokio::task::yield_now().await;
}

#[tokio::test]
async fn overlapping_subscriptions_receive_only_matching_events() {
    let server1 = MockEchoServer::start(|_| None).await.unwrap();
    let server2 = MockEchoServer::start(|_| None).await.unwrap();

    let (client1, messages1) = ReactorClient::connect_tcp(
        "host1".into(),
        server1.local_addr(),
        Transport::LengthPrefixed { max_frame_bytes: rpc_wire::DEFAULT_MAX_FRAME_BYTES },
        ClientPolicy::default(),
    )
    .await
    .unwrap();
    let (client2, messages2) = ReactorClient::connect_tcp(
        "host2".into(),
        server2.local_addr(),
        Transport::LengthPrefixed { max_frame_bytes: rpc_wire::DEFAULT_MAX_FRAME_BYTES },
        ClientPolicy::default(),
    )
    .await
    .unwrap();

    let publisher = Arc::new(EventPublisher::new());
    let worker1 = ResponseWorker::new(
        jsonrpc_transport::ResponseTracker::new(Box::new(jsonrpc_transport::FixedIntervalRetryPolicy)),
        publisher.clone(),
        "host1".into(),
    );
    let worker2 = ResponseWorker::new(
        jsonrpc_transport::ResponseTracker::new(Box::new(jsonrpc_transport::FixedIntervalRetryPolicy)),
        publisher.clone(),
        "host2".into(),
    );
    tokio::spawn(worker1.run(messages1));
    tokio::spawn(worker2.run(messages2));

    let by_component = RecordingSink::new();
    let component_holder = publisher.subscribe("*|storage|*|*", by_component.clone()).await.unwrap();
    publisher.request(&component_holder, 10).await;

    let by_receiver = RecordingSink::new();
    let receiver_holder = publisher.subscribe("host1|*|*|*", by_receiver.clone()).await.unwrap();
    publisher.request(&receiver_holder, 10).await;

    // Give each accept loop a turn to register its connection before injecting.
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;

    // A matching event arrives over host1's connection as a notification
    // without an id; the worker prefixes it with "host1|".
    server1.inject(encode_notification("storage|Image.create|x", serde_json::json!({"size": 1})));
    // A non-matching event arrives over host2's connection.
    server2.inject(encode_notification("virt|VM.start|y", serde_json::json!({"vcpus": 2})));

    settle().await;
    settle().await;
    settle().await;

    assert_eq!(by_component.0.lock().unwrap().len(), 1);
    assert_eq!(by_receiver.0.lock().unwrap().len(), 1);
    assert_eq!(by_component.0.lock().unwrap()[0], serde_json::json!({"size": 1}));

    let _ = client1.connection_id();
    let _ = client2.connection_id();
}

fn encode_notification(method: &str, params: serde_json::Value) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params,
    }))
    .unwrap()
}
