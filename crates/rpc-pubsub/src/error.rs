#[derive(Debug, thiserror::Error)]
pub enum PubSubError {
    #[error("invalid subscription id '{0}': {1}")]
    InvalidSubscription(String, &'static str),

    #[error("subscription '{0}' is already registered")]
    DuplicateSubscription(String),
}
