//! Literal scenario 6: a peer that never sends anything causes the
//! client's incoming-heartbeat deadline to lapse, disconnecting the
//! connection and broadcasting a synthetic failure.

use jsonrpc_transport::{ClientPolicy, FixedIntervalRetryPolicy, Session};
use rpc_test_utils::MockEchoServer;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn silent_peer_trips_the_incoming_heartbeat() {
    let server = MockEchoServer::start(|_| None).await.unwrap();

    let policy = ClientPolicy {
        incoming_heartbeat_ms: 200,
        outgoing_heartbeat_ms: 200,
        ..ClientPolicy::default()
    };
    let session = Session::connect_length_prefixed(
        "host1",
        server.local_addr(),
        rpc_wire::DEFAULT_MAX_FRAME_BYTES,
        policy,
        Box::new(FixedIntervalRetryPolicy),
    )
    .await
    .unwrap();

    let mut failures = session.reactor_client.subscribe_failures();

    tokio::time::advance(Duration::from_millis(500)).await;

    let response = tokio::time::timeout(Duration::from_secs(1), failures.recv())
        .await
        .expect("failure broadcast within timeout")
        .unwrap();
    assert_eq!(response.error.unwrap().message, "Heartbeat exceeded");
    assert_eq!(session.reactor_client.state(), jsonrpc_transport::ClientState::Disconnected);
}
