//! STOMP-style topic matching and backpressure-aware event fan-out.

pub mod error;
pub mod matcher;
pub mod publisher;

pub use error::PubSubError;
pub use matcher::{Segment, SubscriptionId, SubscriptionMatcher};
pub use publisher::{EventPublisher, EventSink, SubscriptionHolder};
