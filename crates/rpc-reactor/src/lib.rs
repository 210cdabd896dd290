//! The non-blocking connection core: framing-agnostic client state
//! machine, heartbeat liveness, retry policy, and the thin task-queue
//! wrapper around tokio's own multiplexer.

pub mod client;
pub mod connection_id;
pub mod error;
pub mod io_layer;
pub mod policy;
pub mod reactor;
pub mod transport;

pub use client::{ClientState, OutboundTransport, ReactorClient};
pub use error::TransportError;
pub use policy::{ClientPolicy, FixedIntervalRetryPolicy, RetryPolicy, RetryState, StompClientPolicy};
pub use reactor::Reactor;
pub use transport::Transport;
