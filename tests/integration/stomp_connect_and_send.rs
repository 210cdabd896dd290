//! Literal scenario 5: a STOMP connection negotiates CONNECT/CONNECTED,
//! subscribes to the response queue as part of connection setup, then
//! carries a JSON-RPC call as a `SEND`/`MESSAGE` round trip.

use jsonrpc_transport::{FixedIntervalRetryPolicy, Session, StompClientPolicy};
use rpc_test_utils::MockStompServer;
use std::time::Duration;

#[tokio::test]
async fn stomp_session_connects_and_round_trips_a_call() {
    let server = MockStompServer::start("/queue/responses", |body| {
        let request: jsonrpc_transport::JsonRpcRequest = serde_json::from_slice(&body).unwrap();
        assert_eq!(request.method, "Host.ping");
        let response = serde_json::json!({
            "jsonrpc": "2.0",
            "id": request.id,
            "result": true,
        });
        Some(serde_json::to_vec(&response).unwrap())
    })
    .await
    .unwrap();

    let policy = StompClientPolicy {
        base: Default::default(),
        request_queue: "/queue/requests".into(),
        response_queue: "/queue/responses".into(),
        event_queue: None,
        stable_identifier: Some("host1".into()),
    };

    let session = Session::connect_stomp(server.local_addr(), policy, Box::new(FixedIntervalRetryPolicy))
        .await
        .unwrap();

    let response = session
        .client
        .call("Host.ping", serde_json::json!({}), Duration::from_secs(2))
        .await
        .unwrap();

    assert_eq!(response.result, Some(serde_json::json!(true)));
}
