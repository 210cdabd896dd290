//! A minimal non-blocking socket abstraction the TLS helper drives.
//!
//! The reactor already demultiplexes readability/writability per connection
//! (see `rpc-reactor`); the helper only needs a `try_read`/`try_write` pair
//! in the style `tokio::net::TcpStream` already exposes, so the blanket
//! impl below is the only one most callers will ever need.

use std::io;

pub trait NonBlockingIo {
    fn try_read(&self, buf: &mut [u8]) -> io::Result<usize>;
    fn try_write(&self, buf: &[u8]) -> io::Result<usize>;
}

impl NonBlockingIo for tokio::net::TcpStream {
    fn try_read(&self, buf: &mut [u8]) -> io::Result<usize> {
        tokio::net::TcpStream::try_read(self, buf)
    }

    fn try_write(&self, buf: &[u8]) -> io::Result<usize> {
        tokio::net::TcpStream::try_write(self, buf)
    }
}
