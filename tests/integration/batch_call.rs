//! Literal scenario 2: a batch of two requests (`b1`, `b2`) gets back
//! a wire array answered in reverse order; the caller's `batch()`
//! future still resolves with both responses.

use jsonrpc_transport::{ClientPolicy, FixedIntervalRetryPolicy, JsonRpcFrame, JsonRpcRequest, Session};
use rpc_test_utils::MockEchoServer;
use std::time::Duration;

#[tokio::test]
async fn batch_call_collects_both_responses() {
    let server = MockEchoServer::start(|payload| {
        let frame: JsonRpcFrame<JsonRpcRequest> = serde_json::from_slice(&payload).unwrap();
        let requests = frame.into_vec();
        assert_eq!(requests.len(), 2);
        let responses: Vec<serde_json::Value> = requests
            .iter()
            .rev()
            .map(|r| {
                serde_json::json!({
                    "jsonrpc": "2.0",
                    "id": r.id,
                    "result": r.method,
                })
            })
            .collect();
        Some(serde_json::to_vec(&responses).unwrap())
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

    let responses = session
        .client
        .batch(
            vec![
                ("A.one".to_owned(), serde_json::json!({})),
                ("A.two".to_owned(), serde_json::json!({})),
            ],
            Duration::from_secs(2),
        )
        .await
        .unwrap();

    assert_eq!(responses.len(), 2);
    let results: std::collections::HashSet<String> =
        responses.iter().map(|r| r.result.clone().unwrap().as_str().unwrap().to_owned()).collect();
    assert!(results.contains("A.one"));
    assert!(results.contains("A.two"));
}
