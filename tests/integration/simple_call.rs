//! Literal scenario 1: a single call round-trips through a real
//! loopback socket and the caller's `call()` future resolves with the
//! wire's response.

use jsonrpc_transport::{ClientPolicy, FixedIntervalRetryPolicy, JsonRpcRequest, Session};
use rpc_test_utils::MockEchoServer;
use std::time::Duration;

#[tokio::test]
async fn simple_call_resolves_with_the_wire_response() {
    let server = MockEchoServer::start(|payload| {
        let request: JsonRpcRequest = serde_json::from_slice(&payload).unwrap();
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

    let session = Session::connect_length_prefixed(
        "host1",
        server.local_addr(),
        rpc_wire::DEFAULT_MAX_FRAME_BYTES,
        ClientPolicy::default(),
        Box::new(FixedIntervalRetryPolicy),
    )
    .await
    .unwrap();

    let response = session
        .client
        .call("Host.ping", serde_json::json!({}), Duration::from_secs(2))
        .await
        .unwrap();

    assert_eq!(response.result, Some(serde_json::json!(true)));
}
