/// Errors surfaced by the framing codecs and JSON-RPC envelope validation.
///
/// These map 1:1 onto the `ProtocolError` / `IllegalArgument` kinds of the
/// core error taxonomy; the reactor client treats any `WireError` as fatal
/// for the connection it was read from.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("frame exceeds max size of {max} bytes (got {got})")]
    FrameTooLarge { max: u64, got: u64 },

    #[error("zero-length frame is illegal")]
    ZeroLengthFrame,

    #[error("connection closed mid-frame")]
    TruncatedFrame,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("illegal argument: {0}")]
    IllegalArgument(String),
}
