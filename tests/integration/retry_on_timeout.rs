//! Literal scenario 3: a tracked request with `retry_timeout=100 ms`,
//! `retry_count=3` against a peer that never replies resends three
//! times and then synthesizes a transport-timeout failure.

use jsonrpc_transport::{error_codes, ClientPolicy, FixedIntervalRetryPolicy, Session};
use rpc_test_utils::MockEchoServer;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn timed_out_tracked_call_resends_then_fails_with_5022() {
    let received = Arc::new(AtomicUsize::new(0));
    let received_in_handler = received.clone();
    let server = MockEchoServer::start(move |_payload| {
        received_in_handler.fetch_add(1, Ordering::SeqCst);
        None
    })
    .await
    .unwrap();

    let policy = ClientPolicy {
        retry_timeout_ms: 100,
        retry_count: 3,
        ..ClientPolicy::default()
    };
    let session = Session::connect_length_prefixed_with_tick(
        "host1",
        server.local_addr(),
        rpc_wire::DEFAULT_MAX_FRAME_BYTES,
        policy,
        Box::new(FixedIntervalRetryPolicy),
        Duration::from_millis(25),
    )
    .await
    .unwrap();

    let call_future =
        session
            .client
            .call_with_retry("Host.ping", serde_json::json!({}), Duration::from_secs(5));
    tokio::pin!(call_future);

    // Advance in small steps past the 100/200/300 ms resends and the
    // 400 ms failure point, giving the tracker's spawned task and the
    // mock server's accept loop a turn after each jump.
    for _ in 0..24 {
        tokio::time::advance(Duration::from_millis(25)).await;
        tokio::task::yield_now().await;
    }

    let response = call_future.await.unwrap();
    let error = response.error.expect("synthetic timeout error");
    assert_eq!(error.code, error_codes::TRANSPORT_TIMEOUT);
    assert_eq!(error.message, error_codes::TRANSPORT_TIMEOUT_MESSAGE);

    // The original request was sent once, then resent on each of the
    // three retry attempts.
    assert_eq!(received.load(Ordering::SeqCst), 4);
}
