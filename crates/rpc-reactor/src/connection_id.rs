//! Stable connection identifiers.
//!
//! A connection id must survive reconnects so callers (and log lines)
//! can correlate a client across a transport fault and its retry. We
//! derive it from the remote host plus a hash of the local socket
//! address at the moment of connect, rather than anything the peer
//! could influence.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::net::SocketAddr;

/// Builds the `host:socket-hash` identifier described for the
/// `Connection` data model.
pub fn derive(host: &str, local_addr: SocketAddr) -> String {
    let mut hasher = DefaultHasher::new();
    local_addr.hash(&mut hasher);
    let hash = hasher.finish();
    format!("{host}:{hash:016x}")
}
