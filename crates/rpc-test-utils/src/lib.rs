//! Mock peers for exercising the transport core end-to-end over real
//! loopback sockets, the way the timing service's own integration
//! tests spin up a mock server rather than faking the transport layer.

pub mod echo_server;
pub mod stomp_server;

pub use echo_server::MockEchoServer;
pub use stomp_server::MockStompServer;
