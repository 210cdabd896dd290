// rpc-tls: non-blocking TLS handshake driving over rustls, for reactors
// that cannot afford to block a thread on a handshake.

pub mod error;
pub mod helper;
pub mod socket;

pub use error::TlsError;
pub use helper::{InterestHint, TlsHelper};
pub use socket::NonBlockingIo;
