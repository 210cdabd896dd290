//! A length-prefixed mock peer bound to a real loopback socket.
//!
//! Mirrors the timing-service test harness's own mock server: bind
//! `127.0.0.1:0`, hand back the ephemeral port, and spawn one handler
//! task per accepted connection. `rpc-reactor`'s [`Socket::Plain`] is
//! hardwired to `tokio::net::TcpStream`, so an in-process duplex pipe
//! can't stand in here — the client under test needs a real accepted
//! socket to connect to.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::debug;

type Handler = dyn Fn(Vec<u8>) -> Option<Vec<u8>> + Send + Sync;

/// Responds to each inbound length-prefixed frame with whatever
/// `handler` returns (`None` means stay silent, useful for exercising
/// timeout/retry). [`MockEchoServer::inject`] additionally lets a test
/// push an unsolicited frame to every connected client, for event
/// fan-out scenarios.
pub struct MockEchoServer {
    addr: SocketAddr,
    inject_tx: broadcast::Sender<Vec<u8>>,
    _task: JoinHandle<()>,
}

impl MockEchoServer {
    pub async fn start<F>(handler: F) -> std::io::Result<Self>
    where
        F: Fn(Vec<u8>) -> Option<Vec<u8>> + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let handler: Arc<Handler> = Arc::new(handler);
        let (inject_tx, _) = broadcast::channel::<Vec<u8>>(64);
        let inject_tx_accept = inject_tx.clone();

        let task = tokio::spawn(async move {
            loop {
                let (stream, _peer) = match listener.accept().await {
                    Ok(pair) => pair,
                    Err(e) => {
                        debug!(error = %e, "mock echo server accept loop exiting");
                        break;
                    }
                };
                let handler = handler.clone();
                let inject_rx = inject_tx_accept.subscribe();
                tokio::spawn(Self::handle_connection(stream, handler, inject_rx));
            }
        });

        Ok(MockEchoServer {
            addr,
            inject_tx,
            _task: task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Pushes an unsolicited length-prefixed frame to every currently
    /// connected client.
    pub fn inject(&self, payload: Vec<u8>) {
        let _ = self.inject_tx.send(payload);
    }

    async fn handle_connection(stream: TcpStream, handler: Arc<Handler>, mut inject_rx: broadcast::Receiver<Vec<u8>>) {
        let (mut rd, mut wr) = stream.into_split();
        loop {
            tokio::select! {
                frame = rpc_wire::read_frame(&mut rd, rpc_wire::DEFAULT_MAX_FRAME_BYTES) => {
                    match frame {
                        Ok(payload) => {
                            if let Some(response) = handler(payload) {
                                if rpc_wire::write_frame(&mut wr, &response).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Err(e) => {
                            debug!(error = %e, "mock echo connection closing");
                            break;
                        }
                    }
                }
                injected = inject_rx.recv() => {
                    match injected {
                        Ok(payload) => {
                            if rpc_wire::write_frame(&mut wr, &payload).await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }
    }
}
