//! Non-blocking TLS handshake and record framing over a socket.
//!
//! Mirrors the historical `SSLEngine`-style unwrap/wrap loop the spec
//! describes in terms of: each reactor wake-up reads ciphertext into an
//! internal buffer, unwraps as much plaintext as is available, and — on
//! the outgoing side — wraps queued plaintext into ciphertext and flushes
//! it to the socket. `rustls::ConnectionCommon` already owns the
//! equivalent of `app_out`/`packet_out`/`app_in`/`packet_in`; this helper
//! adds the "drain until would-block, fire a one-time post-connect
//! callback when the handshake completes" orchestration the reactor
//! needs and that raw rustls does not provide out of the box.

use crate::error::TlsError;
use crate::socket::NonBlockingIo;
use rustls_pki_types::ServerName;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

const READ_SCRATCH_BYTES: usize = 16 * 1024;

enum Side {
    Client(rustls::ClientConnection),
    Server(rustls::ServerConnection),
}

impl Side {
    fn is_handshaking(&self) -> bool {
        match self {
            Side::Client(c) => c.is_handshaking(),
            Side::Server(c) => c.is_handshaking(),
        }
    }

    fn wants_read(&self) -> bool {
        match self {
            Side::Client(c) => c.wants_read(),
            Side::Server(c) => c.wants_read(),
        }
    }

    fn wants_write(&self) -> bool {
        match self {
            Side::Client(c) => c.wants_write(),
            Side::Server(c) => c.wants_write(),
        }
    }

    fn read_tls(&mut self, bytes: &mut &[u8]) -> std::io::Result<usize> {
        match self {
            Side::Client(c) => c.read_tls(bytes),
            Side::Server(c) => c.read_tls(bytes),
        }
    }

    fn write_tls(&mut self, out: &mut Vec<u8>) -> std::io::Result<usize> {
        match self {
            Side::Client(c) => c.write_tls(out),
            Side::Server(c) => c.write_tls(out),
        }
    }

    fn process_new_packets(&mut self) -> Result<rustls::IoState, rustls::Error> {
        match self {
            Side::Client(c) => c.process_new_packets(),
            Side::Server(c) => c.process_new_packets(),
        }
    }

    fn reader(&mut self) -> rustls::Reader<'_> {
        match self {
            Side::Client(c) => c.reader(),
            Side::Server(c) => c.reader(),
        }
    }

    fn writer(&mut self) -> rustls::Writer<'_> {
        match self {
            Side::Client(c) => c.writer(),
            Side::Server(c) => c.writer(),
        }
    }
}

/// What the reactor should watch for on the next wake-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterestHint {
    NeedRead,
    NeedWrite,
    /// Handshake finished (or never started): read interest stays
    /// permanent, write interest only while ciphertext is queued.
    ReadyForApplicationData,
}

/// Drives one TLS connection (client or server side) over a non-blocking
/// socket the reactor already multiplexes.
pub struct TlsHelper {
    side: Side,
    app_in: Vec<u8>,
    post_connect_fired: AtomicBool,
    post_connect: Option<Box<dyn FnOnce() + Send>>,
}

impl TlsHelper {
    pub fn client(config: Arc<rustls::ClientConfig>, server_name: ServerName<'static>) -> Result<Self, TlsError> {
        let conn = rustls::ClientConnection::new(config, server_name)?;
        Ok(TlsHelper {
            side: Side::Client(conn),
            app_in: Vec::new(),
            post_connect_fired: AtomicBool::new(false),
            post_connect: None,
        })
    }

    pub fn server(config: Arc<rustls::ServerConfig>) -> Result<Self, TlsError> {
        let conn = rustls::ServerConnection::new(config)?;
        Ok(TlsHelper {
            side: Side::Server(conn),
            app_in: Vec::new(),
            post_connect_fired: AtomicBool::new(false),
            post_connect: None,
        })
    }

    /// Registers the callback fired exactly once, when the handshake
    /// transitions from in-progress to `FINISHED`/`NOT_HANDSHAKING`.
    /// Guarded by a compare-and-set flag so redundant wake-ups never fire
    /// it twice.
    pub fn on_handshake_complete(&mut self, callback: impl FnOnce() + Send + 'static) {
        self.post_connect = Some(Box::new(callback));
    }

    pub fn is_handshaking(&self) -> bool {
        self.side.is_handshaking()
    }

    pub fn interest_hint(&self) -> InterestHint {
        if self.side.is_handshaking() {
            if self.side.wants_write() {
                InterestHint::NeedWrite
            } else {
                InterestHint::NeedRead
            }
        } else {
            InterestHint::ReadyForApplicationData
        }
    }

    /// Reads ciphertext from `socket` and unwraps whatever plaintext is
    /// available, looping until the internal record buffer is drained.
    /// Returns the number of ciphertext bytes consumed from the socket
    /// (0 means the peer closed or there was nothing to read).
    pub fn on_readable(&mut self, socket: &impl NonBlockingIo) -> Result<usize, TlsError> {
        let mut scratch = [0u8; READ_SCRATCH_BYTES];
        let n = match socket.try_read(&mut scratch) {
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => 0,
            Err(e) => return Err(TlsError::Io(e)),
        };
        if n > 0 {
            let mut slice = &scratch[..n];
            while !slice.is_empty() {
                let consumed = self.side.read_tls(&mut slice)?;
                if consumed == 0 {
                    break;
                }
            }
            self.side.process_new_packets()?;
            self.drain_plaintext()?;
        }
        self.maybe_fire_post_connect();
        Ok(n)
    }

    /// Drains decrypted plaintext out of the rustls connection into
    /// `app_in`, looping while more is buffered (the "BUFFER_OVERFLOW ->
    /// compact and retry" step of the spec: our buffer simply grows, and
    /// callers drain it with [`TlsHelper::take_plaintext`]).
    fn drain_plaintext(&mut self) -> Result<(), TlsError> {
        let mut chunk = [0u8; 8 * 1024];
        loop {
            match self.side.reader().read(&mut chunk) {
                Ok(0) => break,
                Ok(k) => self.app_in.extend_from_slice(&chunk[..k]),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(TlsError::Io(e)),
            }
        }
        Ok(())
    }

    /// Removes and returns all plaintext decrypted so far.
    pub fn take_plaintext(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.app_in)
    }

    /// Queues plaintext to be encrypted and sent on the next
    /// [`TlsHelper::on_writable`] call.
    pub fn queue_plaintext(&mut self, data: &[u8]) -> Result<(), TlsError> {
        self.side.writer().write_all(data)?;
        Ok(())
    }

    /// Wraps any queued plaintext into ciphertext and flushes it to
    /// `socket`, looping until fully drained or the socket would block.
    pub fn on_writable(&mut self, socket: &impl NonBlockingIo) -> Result<usize, TlsError> {
        let mut total = 0;
        while self.side.wants_write() {
            let mut ciphertext = Vec::new();
            let wrote = self.side.write_tls(&mut ciphertext)?;
            if wrote == 0 || ciphertext.is_empty() {
                break;
            }
            let mut offset = 0;
            while offset < ciphertext.len() {
                match socket.try_write(&ciphertext[offset..]) {
                    Ok(0) => break,
                    Ok(n) => {
                        offset += n;
                        total += n;
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                    Err(e) => return Err(TlsError::Io(e)),
                }
            }
            if offset < ciphertext.len() {
                break;
            }
        }
        self.maybe_fire_post_connect();
        Ok(total)
    }

    fn maybe_fire_post_connect(&mut self) {
        if self.side.is_handshaking() {
            return;
        }
        if self
            .post_connect_fired
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            debug!("tls handshake complete, firing post-connect callback");
            if let Some(cb) = self.post_connect.take() {
                cb();
            }
        } else {
            trace!("post-connect callback already fired");
        }
    }
}
