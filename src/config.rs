//! Policy configuration: typed structs a caller constructs directly in
//! code, plus an opt-in TOML loader for applications that prefer to
//! keep connection policy out of source.
//!
//! The core itself never reads files (no CLI, no persisted state) —
//! [`ClientPolicy`]/[`StompClientPolicy`] are what a caller builds and
//! validates by hand. [`load_client_policy_from_str`] exists purely as
//! a convenience for applications that want the knobs in a config
//! file; it follows the same raw/typed split as the timing service's
//! own `services/forwarder/src/config.rs`.

use rpc_reactor::{ClientPolicy, StompClientPolicy};
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("parsing policy toml: {0}")]
    Parse(String),
    #[error("missing required field: {0}")]
    MissingField(String),
    #[error("invalid policy: {0}")]
    Invalid(#[from] rpc_reactor::TransportError),
}

#[derive(Debug, Deserialize)]
struct RawClientPolicy {
    retry_timeout_ms: Option<u64>,
    retry_count: Option<u32>,
    incoming_heartbeat_ms: Option<u64>,
    outgoing_heartbeat_ms: Option<u64>,
    retryable_errors: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct RawStompClientPolicy {
    #[serde(flatten)]
    base: RawClientPolicy,
    request_queue: Option<String>,
    response_queue: Option<String>,
    event_queue: Option<String>,
    stable_identifier: Option<String>,
}

fn client_policy_from_raw(raw: RawClientPolicy) -> Result<ClientPolicy, ConfigError> {
    let defaults = ClientPolicy::default();
    let policy = ClientPolicy {
        retry_timeout_ms: raw.retry_timeout_ms.unwrap_or(defaults.retry_timeout_ms),
        retry_count: raw.retry_count.unwrap_or(defaults.retry_count),
        incoming_heartbeat_ms: raw.incoming_heartbeat_ms.unwrap_or(defaults.incoming_heartbeat_ms),
        outgoing_heartbeat_ms: raw.outgoing_heartbeat_ms.unwrap_or(defaults.outgoing_heartbeat_ms),
        retryable_errors: raw.retryable_errors.unwrap_or_default(),
    };
    policy.validate()?;
    Ok(policy)
}

/// Loads a plain (length-prefixed/TLS) client policy from a TOML
/// document. Every field is optional; absent fields fall back to
/// [`ClientPolicy::default`].
pub fn load_client_policy_from_str(toml_str: &str) -> Result<ClientPolicy, ConfigError> {
    let raw: RawClientPolicy = toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;
    client_policy_from_raw(raw)
}

/// Loads a STOMP client policy from a TOML document. `request_queue`
/// and `response_queue` are required; everything else is optional.
pub fn load_stomp_client_policy_from_str(toml_str: &str) -> Result<StompClientPolicy, ConfigError> {
    let raw: RawStompClientPolicy = toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;
    let request_queue = raw
        .request_queue
        .ok_or_else(|| ConfigError::MissingField("request_queue".to_owned()))?;
    let response_queue = raw
        .response_queue
        .ok_or_else(|| ConfigError::MissingField("response_queue".to_owned()))?;
    let base = client_policy_from_raw(raw.base)?;
    let policy = StompClientPolicy {
        base,
        request_queue,
        response_queue,
        event_queue: raw.event_queue,
        stable_identifier: raw.stable_identifier,
    };
    policy.validate()?;
    Ok(policy)
}
