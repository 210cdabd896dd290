//! A mock STOMP broker bound to a real loopback socket, wrapping
//! `rpc-stomp`'s pure [`Broker`] state machine with the socket I/O a
//! real broker would own. Each accepted connection gets its own
//! `peer addr` as its [`ConnId`]; a shared broker and connection
//! registry let [`MockStompServer::publish_event`] route a frame to
//! whichever connection subscribed to it, exactly as [`Broker::handle_send`]
//! already knows how to do.

use rpc_stomp::{Broker, Command, ConnId, Decoded, OutboundFrame, StompFrame};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::debug;

type Handler = dyn Fn(Vec<u8>) -> Option<Vec<u8>> + Send + Sync;
type Connections = Arc<Mutex<HashMap<ConnId, mpsc::UnboundedSender<Vec<u8>>>>>;

/// Wraps every `SEND` whose destination isn't `response_destination`
/// with `handler`, then re-delivers the handler's reply as a `SEND` to
/// `response_destination` through the broker's own subscriber
/// bookkeeping — this is how a JSON-RPC request on the request queue
/// turns into a `MESSAGE` on the response queue.
pub struct MockStompServer {
    addr: SocketAddr,
    broker: Arc<Mutex<Broker>>,
    connections: Connections,
    _task: JoinHandle<()>,
}

impl MockStompServer {
    pub async fn start<F>(response_destination: impl Into<String>, handler: F) -> std::io::Result<Self>
    where
        F: Fn(Vec<u8>) -> Option<Vec<u8>> + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let broker = Arc::new(Mutex::new(Broker::new()));
        let connections: Connections = Arc::new(Mutex::new(HashMap::new()));
        let handler: Arc<Handler> = Arc::new(handler);
        let response_destination = response_destination.into();

        let broker_accept = broker.clone();
        let connections_accept = connections.clone();
        let task = tokio::spawn(async move {
            loop {
                let (stream, peer) = match listener.accept().await {
                    Ok(pair) => pair,
                    Err(e) => {
                        debug!(error = %e, "mock stomp server accept loop exiting");
                        break;
                    }
                };
                let conn_id: ConnId = peer.to_string();
                tokio::spawn(Self::handle_connection(
                    stream,
                    conn_id,
                    broker_accept.clone(),
                    connections_accept.clone(),
                    handler.clone(),
                    response_destination.clone(),
                ));
            }
        });

        Ok(MockStompServer {
            addr,
            broker,
            connections,
            _task: task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Publishes `body` to every connection currently subscribed to
    /// `destination`, bypassing the request/response handler — for
    /// simulating an out-of-band event notification.
    pub async fn publish_event(&self, destination: &str, body: Vec<u8>) {
        let send = StompFrame::new(Command::Send).with_header("destination", destination).with_body(body);
        let outbound = self.broker.lock().await.handle_send(&send).unwrap_or_default();
        dispatch_outbound(&self.connections, outbound).await;
    }

    async fn handle_connection(
        stream: TcpStream,
        conn_id: ConnId,
        broker: Arc<Mutex<Broker>>,
        connections: Connections,
        handler: Arc<Handler>,
        response_destination: String,
    ) {
        let (mut rd, mut wr) = stream.into_split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
        connections.lock().await.insert(conn_id.clone(), tx);

        let writer_task = tokio::spawn(async move {
            while let Some(bytes) = rx.recv().await {
                if wr.write_all(&bytes).await.is_err() {
                    break;
                }
            }
        });

        let mut buf = Vec::new();
        let mut scratch = [0u8; 4096];
        'read_loop: loop {
            let n = match rd.read(&mut scratch).await {
                Ok(0) | Err(_) => break,
                Ok(n) => n,
            };
            buf.extend_from_slice(&scratch[..n]);
            loop {
                match rpc_stomp::decode_one(&mut buf) {
                    Ok(Decoded::Incomplete) => break,
                    Ok(Decoded::Heartbeat) => {}
                    Ok(Decoded::Frame(frame)) => {
                        let is_disconnect = frame.command == Command::Disconnect;
                        let outbound = dispatch_frame(&broker, &conn_id, &frame, &handler, &response_destination).await;
                        dispatch_outbound(&connections, outbound).await;
                        if is_disconnect {
                            break 'read_loop;
                        }
                    }
                    Err(e) => {
                        debug!(error = %e, "mock stomp connection closing on decode error");
                        break 'read_loop;
                    }
                }
            }
        }

        connections.lock().await.remove(&conn_id);
        broker.lock().await.handle_disconnect(&conn_id, &StompFrame::new(Command::Disconnect));
        writer_task.abort();
    }
}

async fn dispatch_frame(
    broker: &Arc<Mutex<Broker>>,
    conn_id: &ConnId,
    frame: &StompFrame,
    handler: &Arc<Handler>,
    response_destination: &str,
) -> Vec<OutboundFrame> {
    match frame.command {
        Command::Connect => vec![broker.lock().await.handle_connect(conn_id, frame)],
        Command::Subscribe => broker.lock().await.handle_subscribe(conn_id, frame).unwrap_or_default(),
        Command::Unsubscribe => {
            let _ = broker.lock().await.handle_unsubscribe(conn_id, frame);
            Vec::new()
        }
        Command::Send => match handler(frame.body.clone()) {
            Some(response_bytes) => {
                let response_frame = StompFrame::new(Command::Send)
                    .with_header("destination", response_destination)
                    .with_body(response_bytes);
                broker.lock().await.handle_send(&response_frame).unwrap_or_default()
            }
            None => Vec::new(),
        },
        Command::Disconnect => broker.lock().await.handle_disconnect(conn_id, frame).into_iter().collect(),
        _ => Vec::new(),
    }
}

async fn dispatch_outbound(connections: &Connections, frames: Vec<OutboundFrame>) {
    let conns = connections.lock().await;
    for out in frames {
        if let Some(tx) = conns.get(&out.to) {
            let _ = tx.send(out.frame.encode());
        }
    }
}
