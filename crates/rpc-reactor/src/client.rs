//! Per-connection state machine.
//!
//! Owns one socket and drives it on its own spawned task rather than on
//! a shared reactor thread — `tokio`'s own multi-threaded scheduler is
//! the multiplexer here, so each client just needs its own
//! `tokio::select!` loop implementing the fairness order the spec
//! describes: incoming bytes, then heartbeat bookkeeping, then
//! outgoing writes.

use crate::connection_id;
use crate::error::TransportError;
use crate::io_layer::Socket;
use crate::policy::ClientPolicy;
use crate::transport::{Assembled, Framer, Transport};
use rpc_wire::jsonrpc::{JsonRpcError, JsonRpcResponse};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Lifecycle of a single connection, as described for the `Connection`
/// data model: `Disconnected -> Connecting -> Initializing -> Open ->
/// Closing -> Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    Connecting,
    Initializing,
    Open,
    Closing,
}

/// The narrow surface callers outside this crate (the response tracker,
/// the JSON-RPC facade) need from a client: enqueue bytes, force a
/// disconnect, and identify the connection in logs.
pub trait OutboundTransport: Send + Sync {
    fn send_message(&self, payload: Vec<u8>);
    fn disconnect(&self, reason: String);
    fn connection_id(&self) -> &str;
    fn state(&self) -> ClientState;
}

enum OutboxEntry {
    /// Enqueued at the outbox head — regular JSON-RPC traffic.
    Send(Vec<u8>),
    /// Enqueued at the tail so the very next turn transmits it; used
    /// for post-connect setup frames (STOMP CONNECT/SUBSCRIBE).
    SendNow(Vec<u8>),
}

const MIN_TICK_MS: u64 = 50;
const MAX_TICK_MS: u64 = 250;

pub struct ReactorClient {
    connection_id: String,
    outbox_tx: mpsc::UnboundedSender<OutboxEntry>,
    shutdown_tx: watch::Sender<Option<String>>,
    state: Arc<StdMutex<ClientState>>,
    failure_tx: broadcast::Sender<JsonRpcResponse>,
    closed: AtomicBool,
}

impl ReactorClient {
    /// Opens a plain TCP connection to `addr`, negotiates whatever
    /// `transport` requires, and spawns the task that owns the socket
    /// for the rest of the connection's life.
    ///
    /// Returns the client handle plus the receiving half of the
    /// channel every decoded JSON-RPC payload (not raw heartbeat
    /// frames) is forwarded to — the response worker is meant to be
    /// this channel's sole consumer.
    pub async fn connect_tcp(
        host: String,
        addr: SocketAddr,
        transport: Transport,
        policy: ClientPolicy,
    ) -> Result<(Arc<ReactorClient>, mpsc::Receiver<Vec<u8>>), TransportError> {
        policy.validate()?;
        let stream = TcpStream::connect(addr).await?;
        let local_addr = stream.local_addr()?;
        let connection_id = connection_id::derive(&host, local_addr);
        Self::spawn(connection_id, Socket::Plain(stream), transport, policy)
    }

    /// Same as [`connect_tcp`](Self::connect_tcp) but over an
    /// already-established socket (used in tests and by
    /// `connect_tls`-style callers that perform their own TCP dial).
    pub fn from_socket(
        host: String,
        socket: Socket,
        transport: Transport,
        policy: ClientPolicy,
    ) -> Result<(Arc<ReactorClient>, mpsc::Receiver<Vec<u8>>), TransportError> {
        policy.validate()?;
        let local_addr = socket.local_addr()?;
        let connection_id = connection_id::derive(&host, local_addr);
        Self::spawn(connection_id, socket, transport, policy)
    }

    fn spawn(
        connection_id: String,
        socket: Socket,
        transport: Transport,
        policy: ClientPolicy,
    ) -> Result<(Arc<ReactorClient>, mpsc::Receiver<Vec<u8>>), TransportError> {
        let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(None);
        let (message_tx, message_rx) = mpsc::channel(256);
        let (failure_tx, _) = broadcast::channel(16);
        let state = Arc::new(StdMutex::new(ClientState::Connecting));

        let client = Arc::new(ReactorClient {
            connection_id: connection_id.clone(),
            outbox_tx,
            shutdown_tx,
            state: state.clone(),
            failure_tx: failure_tx.clone(),
            closed: AtomicBool::new(false),
        });

        let mut framer = transport.build_framer();
        // Post-connect frames (STOMP CONNECT/SUBSCRIBE) go through the
        // same `send_now` tail-priority path as any other caller would
        // use for them, ahead of whatever the application enqueues.
        for frame in framer.post_connect_frames() {
            client.send_now(frame);
        }

        tokio::spawn(run_client(
            connection_id,
            socket,
            framer,
            policy,
            state,
            failure_tx,
            message_tx,
            outbox_rx,
            shutdown_rx,
        ));

        Ok((client, message_rx))
    }

    pub fn state(&self) -> ClientState {
        *self.state.lock().unwrap()
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// Subscribes to synthesized failure responses (heartbeat expiry,
    /// transport errors, explicit disconnects). Every subscriber gets
    /// its own copy; late subscribers miss earlier failures, matching
    /// "registered listeners" rather than a replay log.
    pub fn subscribe_failures(&self) -> broadcast::Receiver<JsonRpcResponse> {
        self.failure_tx.subscribe()
    }

    /// Enqueues `payload` at the outbox head for ordinary send traffic.
    pub fn send_message(&self, payload: Vec<u8>) {
        let _ = self.outbox_tx.send(OutboxEntry::Send(payload));
    }

    /// Enqueues `payload` at the outbox tail so it transmits on the
    /// very next turn. Used internally for STOMP post-connect frames;
    /// exposed for callers (e.g. test harnesses) that need the same
    /// priority.
    pub fn send_now(&self, payload: Vec<u8>) {
        let _ = self.outbox_tx.send(OutboxEntry::SendNow(payload));
    }

    /// Requests the client disconnect with `reason`. Idempotent: a
    /// second call after the first is a no-op.
    pub fn disconnect(&self, reason: String) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown_tx.send(Some(reason));
    }
}

impl OutboundTransport for ReactorClient {
    fn send_message(&self, payload: Vec<u8>) {
        ReactorClient::send_message(self, payload)
    }

    fn disconnect(&self, reason: String) {
        ReactorClient::disconnect(self, reason)
    }

    fn connection_id(&self) -> &str {
        ReactorClient::connection_id(self)
    }

    fn state(&self) -> ClientState {
        ReactorClient::state(self)
    }
}

fn set_state(state: &Arc<StdMutex<ClientState>>, next: ClientState, connection_id: &str) {
    *state.lock().unwrap() = next;
    debug!(connection_id, ?next, "reactor client state transition");
}

fn broadcast_failure(failure_tx: &broadcast::Sender<JsonRpcResponse>, connection_id: &str, reason: &str) {
    let response = JsonRpcResponse::failure(
        None,
        JsonRpcError {
            code: rpc_wire::jsonrpc::error_codes::TRANSPORT_TIMEOUT,
            message: reason.to_owned(),
            data: Some(serde_json::json!({ "connection_id": connection_id })),
        },
    );
    // No receivers is a normal, silent case — nobody happened to be
    // listening for failures on this client.
    let _ = failure_tx.send(response);
}

#[allow(clippy::too_many_arguments)]
async fn run_client(
    connection_id: String,
    mut socket: Socket,
    mut framer: Box<dyn Framer>,
    policy: ClientPolicy,
    state: Arc<StdMutex<ClientState>>,
    failure_tx: broadcast::Sender<JsonRpcResponse>,
    message_tx: mpsc::Sender<Vec<u8>>,
    mut outbox_rx: mpsc::UnboundedReceiver<OutboxEntry>,
    mut shutdown_rx: watch::Receiver<Option<String>>,
) {
    while socket.is_handshaking() {
        if let Err(e) = socket.drive_handshake().await {
            warn!(connection_id, error = %e, "tls handshake failed");
            set_state(&state, ClientState::Closing, &connection_id);
            broadcast_failure(&failure_tx, &connection_id, &e.to_string());
            set_state(&state, ClientState::Disconnected, &connection_id);
            return;
        }
    }

    set_state(&state, ClientState::Initializing, &connection_id);
    // Post-connect frames (STOMP CONNECT/SUBSCRIBE) were already queued
    // via `send_now` before this task was spawned; they drain through
    // the ordinary outbox below, ahead of anything an application sends.
    let mut outbox: std::collections::VecDeque<Vec<u8>> = std::collections::VecDeque::new();

    set_state(&state, ClientState::Open, &connection_id);
    info!(connection_id, "reactor client open");

    let mut last_incoming = Instant::now();
    let mut last_outgoing = Instant::now();

    let tick_ms = policy
        .incoming_heartbeat_ms
        .min(policy.outgoing_heartbeat_ms)
        .clamp(MIN_TICK_MS, MAX_TICK_MS);
    let mut ticker = tokio::time::interval(Duration::from_millis(tick_ms));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    // Handle dropped: every client handle went away.
                    finish(&state, &failure_tx, &connection_id, "client handle dropped").await;
                    return;
                }
                if let Some(reason) = shutdown_rx.borrow_and_update().clone() {
                    finish(&state, &failure_tx, &connection_id, &reason).await;
                    return;
                }
            }

            read_result = socket.read_plaintext() => {
                match read_result {
                    Ok(bytes) if !bytes.is_empty() => {
                        last_incoming = Instant::now();
                        match framer.feed(&bytes) {
                            Ok(assembled) => {
                                for item in assembled {
                                    if let Assembled::Payload(payload) = item {
                                        if message_tx.send(payload).await.is_err() {
                                            debug!(connection_id, "message receiver dropped, ignoring payload");
                                        }
                                    }
                                }
                            }
                            Err(e) => {
                                warn!(connection_id, error = %e, "protocol error, disconnecting");
                                finish(&state, &failure_tx, &connection_id, &e.to_string()).await;
                                return;
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(connection_id, error = %e, "socket read error, disconnecting");
                        finish(&state, &failure_tx, &connection_id, &e.to_string()).await;
                        return;
                    }
                }
            }

            entry = outbox_rx.recv() => {
                match entry {
                    Some(OutboxEntry::Send(bytes)) => outbox.push_front(bytes),
                    Some(OutboxEntry::SendNow(bytes)) => outbox.push_back(bytes),
                    None => {
                        finish(&state, &failure_tx, &connection_id, "client handle dropped").await;
                        return;
                    }
                }
            }

            _ = ticker.tick() => {}
        }

        if last_incoming.elapsed() > policy.incoming_heartbeat() {
            warn!(connection_id, "incoming heartbeat exceeded");
            finish(&state, &failure_tx, &connection_id, "Heartbeat exceeded").await;
            return;
        }

        if let Some(buf) = outbox.pop_back() {
            match socket.write_plaintext(&buf).await {
                Ok(n) if n < buf.len() => {
                    // Short write: keep the buffer queued (at the same
                    // transmit-next position) until it's fully flushed.
                    outbox.push_back(buf[n..].to_vec());
                    last_outgoing = Instant::now();
                }
                Ok(_) => last_outgoing = Instant::now(),
                Err(e) => {
                    warn!(connection_id, error = %e, "socket write error, disconnecting");
                    finish(&state, &failure_tx, &connection_id, &e.to_string()).await;
                    return;
                }
            }
        } else if last_outgoing.elapsed() > policy.outgoing_heartbeat() {
            let hb = framer.heartbeat_frame();
            if !hb.is_empty() {
                let _ = socket.write_plaintext(&hb).await;
            }
            last_outgoing = Instant::now();
        }
    }
}

async fn finish(
    state: &Arc<StdMutex<ClientState>>,
    failure_tx: &broadcast::Sender<JsonRpcResponse>,
    connection_id: &str,
    reason: &str,
) {
    set_state(state, ClientState::Closing, connection_id);
    broadcast_failure(failure_tx, connection_id, reason);
    set_state(state, ClientState::Disconnected, connection_id);
    info!(connection_id, reason, "reactor client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Transport;
    use rpc_wire::DEFAULT_MAX_FRAME_BYTES;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn loopback_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connect = TcpStream::connect(addr);
        let accept = listener.accept();
        let (client, (server, _)) = tokio::join!(connect, accept);
        (client.unwrap(), server)
    }

    fn fast_policy() -> ClientPolicy {
        ClientPolicy {
            incoming_heartbeat_ms: 2_000,
            outgoing_heartbeat_ms: 2_000,
            ..ClientPolicy::default()
        }
    }

    #[tokio::test]
    async fn simple_call_round_trip_over_length_prefixed_socket() {
        let (client_sock, mut server_sock) = loopback_pair().await;
        let (client, mut messages) = ReactorClient::from_socket(
            "host1".into(),
            Socket::Plain(client_sock),
            Transport::LengthPrefixed { max_frame_bytes: DEFAULT_MAX_FRAME_BYTES },
            fast_policy(),
        )
        .unwrap();

        let request = br#"{"jsonrpc":"2.0","method":"Host.ping","params":{},"id":"r1"}"#;
        client.send_message(request.to_vec());

        let mut buf = vec![0u8; 8 + request.len()];
        server_sock.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf[8..], request);

        let response = br#"{"jsonrpc":"2.0","id":"r1","result":true}"#;
        let mut wire = (response.len() as u64).to_be_bytes().to_vec();
        wire.extend_from_slice(response);
        server_sock.write_all(&wire).await.unwrap();

        let payload = messages.recv().await.unwrap();
        assert_eq!(payload, response);
    }

    #[tokio::test]
    async fn explicit_disconnect_broadcasts_failure_once() {
        let (client_sock, _server_sock) = loopback_pair().await;
        let (client, _messages) = ReactorClient::from_socket(
            "host1".into(),
            Socket::Plain(client_sock),
            Transport::LengthPrefixed { max_frame_bytes: DEFAULT_MAX_FRAME_BYTES },
            fast_policy(),
        )
        .unwrap();

        let mut failures = client.subscribe_failures();
        client.disconnect("shutting down".into());
        client.disconnect("second call is a no-op".into());

        let response = failures.recv().await.unwrap();
        assert_eq!(response.error.unwrap().message, "shutting down");
        assert!(matches!(
            tokio::time::timeout(Duration::from_millis(200), failures.recv()).await,
            Err(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_expiry_disconnects_and_broadcasts_synthetic_failure() {
        let (client_sock, _server_sock) = loopback_pair().await;
        let policy = ClientPolicy {
            incoming_heartbeat_ms: 200,
            outgoing_heartbeat_ms: 200,
            ..ClientPolicy::default()
        };
        let (client, _messages) = ReactorClient::from_socket(
            "host1".into(),
            Socket::Plain(client_sock),
            Transport::LengthPrefixed { max_frame_bytes: DEFAULT_MAX_FRAME_BYTES },
            policy,
        )
        .unwrap();
        let mut failures = client.subscribe_failures();

        tokio::time::advance(Duration::from_millis(500)).await;

        let response = tokio::time::timeout(Duration::from_secs(1), failures.recv())
            .await
            .expect("failure broadcast within timeout")
            .unwrap();
        assert_eq!(response.error.unwrap().message, "Heartbeat exceeded");
        assert_eq!(client.state(), ClientState::Disconnected);
    }
}
