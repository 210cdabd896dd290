//! Response correlation, retry-on-timeout, and the JSON-RPC client
//! facade built on top of a reactor client and an event publisher.

pub mod error;
pub mod facade;
pub mod pending;
pub mod tracker;
pub mod worker;

pub use error::DispatchError;
pub use facade::JsonRpcClient;
pub use pending::PendingCall;
pub use tracker::ResponseTracker;
pub use worker::ResponseWorker;
