// rpc-wire: JSON-RPC 2.0 envelope types and the length-prefixed framing
// codec. STOMP framing lives in `rpc-stomp`; this crate only covers the
// binary wire format and the envelope shapes shared by both transports.

pub mod error;
pub mod jsonrpc;
pub mod length_prefixed;

pub use error::WireError;
pub use jsonrpc::{
    error_codes, JsonRpcError, JsonRpcFrame, JsonRpcRequest, JsonRpcResponse, JSONRPC_VERSION,
};
pub use length_prefixed::{encode_frame, read_frame, write_frame, DEFAULT_MAX_FRAME_BYTES};
