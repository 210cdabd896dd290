#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("tls error: {0}")]
    Tls(#[from] rpc_tls::TlsError),

    #[error("stomp protocol error: {0}")]
    Stomp(#[from] rpc_stomp::StompError),

    #[error("wire protocol error: {0}")]
    Wire(#[from] rpc_wire::error::WireError),

    #[error("heartbeat exceeded: no inbound data for {elapsed_ms}ms (limit {limit_ms}ms)")]
    HeartbeatTimeout { elapsed_ms: u64, limit_ms: u64 },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("illegal argument: {0}")]
    IllegalArgument(String),

    #[error("client is closing or closed")]
    Closing,

    #[error("reactor has shut down")]
    ReactorShutdown,
}
