#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("tls handshake error: {0}")]
    Handshake(#[from] rustls::Error),

    #[error("invalid server name: {0}")]
    InvalidServerName(#[from] rustls_pki_types::InvalidDnsNameError),
}
