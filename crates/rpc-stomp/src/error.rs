#[derive(Debug, thiserror::Error)]
pub enum StompError {
    #[error("unrecognized STOMP command: {0}")]
    UnknownCommand(String),

    #[error("malformed STOMP frame: {0}")]
    Malformed(String),

    #[error("header line is not valid utf-8")]
    InvalidUtf8,
}
