#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("request id '{0}' is already registered")]
    DuplicateRequest(String),

    #[error("call timed out waiting for a response")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(#[from] rpc_reactor::TransportError),

    #[error("malformed response: {0}")]
    Malformed(String),
}
