// rpc-stomp: STOMP 1.2 framing, heartbeat negotiation, and a minimal
// in-process broker sufficient to carry JSON-RPC payloads as frame bodies.

pub mod broker;
pub mod error;
pub mod frame;
pub mod heartbeat;

pub use broker::{Broker, ConnId, OutboundFrame};
pub use error::StompError;
pub use frame::{decode_one, Command, Decoded, StompFrame};
pub use heartbeat::{negotiate, HeartbeatHeader, NegotiatedHeartbeat};
