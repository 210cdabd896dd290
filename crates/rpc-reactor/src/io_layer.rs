//! The plaintext/ciphertext seam between a socket and a [`Framer`].
//!
//! A connection may or may not be wrapped in TLS; either way the client
//! state machine only ever wants "give me plaintext bytes that arrived"
//! and "send this plaintext". `Socket` hides which case applies so
//! `client.rs` doesn't branch on it.

use crate::error::TransportError;
use rpc_tls::{NonBlockingIo, TlsHelper};
use std::io::ErrorKind;
use tokio::net::TcpStream;

pub enum Socket {
    Plain(TcpStream),
    Tls(TcpStream, Box<TlsHelper>),
}

impl Socket {
    /// Waits for the socket to become readable, then pulls in whatever
    /// plaintext is available (decrypting first, if wrapped in TLS).
    /// Returns an empty vec on a spurious wake with nothing to read.
    pub async fn read_plaintext(&mut self) -> Result<Vec<u8>, TransportError> {
        match self {
            Socket::Plain(stream) => {
                stream.readable().await?;
                let mut buf = [0u8; 16 * 1024];
                match stream.try_read(&mut buf) {
                    Ok(0) => Err(TransportError::Io(std::io::Error::new(
                        ErrorKind::ConnectionReset,
                        "peer closed",
                    ))),
                    Ok(n) => Ok(buf[..n].to_vec()),
                    Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(Vec::new()),
                    Err(e) => Err(e.into()),
                }
            }
            Socket::Tls(stream, helper) => {
                stream.readable().await?;
                helper.on_readable(stream)?;
                Ok(helper.take_plaintext())
            }
        }
    }

    /// Queues `data` to be sent and flushes as much as the socket accepts
    /// without blocking. Returns the number of *plaintext* bytes actually
    /// handed off; a return less than `data.len()` means the socket buffer
    /// filled up mid-write, and the caller is responsible for re-queuing
    /// the unwritten tail rather than treating the buffer as flushed (the
    /// `Connection`'s outbox removes an entry only once it is fully sent).
    pub async fn write_plaintext(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        match self {
            Socket::Plain(stream) => {
                stream.writable().await?;
                let mut written = 0;
                while written < data.len() {
                    match stream.try_write(&data[written..]) {
                        Ok(0) => break,
                        Ok(n) => written += n,
                        Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                        Err(e) if written > 0 => {
                            // Bytes already handed off; report the
                            // short write and surface the error next turn.
                            let _ = e;
                            break;
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                Ok(written)
            }
            Socket::Tls(stream, helper) => {
                helper.queue_plaintext(data)?;
                stream.writable().await?;
                helper.on_writable(stream)?;
                Ok(data.len())
            }
        }
    }

    pub fn is_handshaking(&self) -> bool {
        match self {
            Socket::Plain(_) => false,
            Socket::Tls(_, helper) => helper.is_handshaking(),
        }
    }

    /// Drives the TLS handshake forward without moving any application
    /// data; a no-op for plaintext sockets.
    pub async fn drive_handshake(&mut self) -> Result<(), TransportError> {
        if let Socket::Tls(stream, helper) = self {
            tokio::select! {
                r = stream.readable() => { r?; helper.on_readable(stream)?; }
                w = stream.writable() => { w?; helper.on_writable(stream)?; }
            }
        }
        Ok(())
    }

    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        match self {
            Socket::Plain(s) => s.local_addr(),
            Socket::Tls(s, _) => s.local_addr(),
        }
    }
}
