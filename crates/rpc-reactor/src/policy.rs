//! Client policy knobs and the pluggable retry strategy.
//!
//! `ClientPolicy` mirrors the configuration surface described for the
//! core: retry timing, heartbeat intervals, and which errors are worth
//! retrying at all. The retry *decision itself* — how many attempts,
//! how the deadline is computed — is factored out behind
//! [`RetryPolicy`] so callers can swap in exponential backoff or a
//! circuit breaker without touching the reactor client.

use crate::error::TransportError;
use std::time::Duration;
use tokio::time::Instant;

/// Validated, cloneable connection policy shared by every client the
/// application creates against a given host.
#[derive(Debug, Clone)]
pub struct ClientPolicy {
    pub retry_timeout_ms: u64,
    pub retry_count: u32,
    pub incoming_heartbeat_ms: u64,
    pub outgoing_heartbeat_ms: u64,
    pub retryable_errors: Vec<String>,
}

impl ClientPolicy {
    pub fn validate(&self) -> Result<(), TransportError> {
        if self.retry_timeout_ms == 0 {
            return Err(TransportError::IllegalArgument(
                "retry_timeout_ms must be non-zero".into(),
            ));
        }
        Ok(())
    }

    pub fn incoming_heartbeat(&self) -> Duration {
        Duration::from_millis(self.incoming_heartbeat_ms)
    }

    pub fn outgoing_heartbeat(&self) -> Duration {
        Duration::from_millis(self.outgoing_heartbeat_ms)
    }

    pub fn retry_timeout(&self) -> Duration {
        Duration::from_millis(self.retry_timeout_ms)
    }

    /// Whether a given error string should trigger a reconnect rather
    /// than a terminal failure. An empty `retryable_errors` list means
    /// "retry everything", matching the spec's permissive default.
    pub fn is_retryable(&self, error_description: &str) -> bool {
        self.retryable_errors.is_empty()
            || self
                .retryable_errors
                .iter()
                .any(|pattern| error_description.contains(pattern.as_str()))
    }
}

impl Default for ClientPolicy {
    fn default() -> Self {
        ClientPolicy {
            retry_timeout_ms: 5_000,
            retry_count: 3,
            incoming_heartbeat_ms: 10_000,
            outgoing_heartbeat_ms: 10_000,
            retryable_errors: Vec::new(),
        }
    }
}

/// STOMP-specific extension of [`ClientPolicy`]: adds the queue names
/// a STOMP client sends/receives JSON-RPC payloads on.
#[derive(Debug, Clone)]
pub struct StompClientPolicy {
    pub base: ClientPolicy,
    pub request_queue: String,
    pub response_queue: String,
    pub event_queue: Option<String>,
    pub stable_identifier: Option<String>,
}

impl StompClientPolicy {
    pub fn validate(&self) -> Result<(), TransportError> {
        self.base.validate()?;
        if self.request_queue.is_empty() || self.response_queue.is_empty() {
            return Err(TransportError::IllegalArgument(
                "stomp policy requires non-empty request/response queue names".into(),
            ));
        }
        Ok(())
    }
}

/// Retry context carried alongside a tracked request or a connecting
/// client: attempts remaining and the absolute deadline for the next
/// decision point.
#[derive(Debug, Clone, Copy)]
pub struct RetryState {
    pub attempts_remaining: u32,
    pub deadline: Instant,
}

/// Pluggable strategy for deciding retry timing. The spec's own policy
/// is a flat "N attempts, fixed timeout" counter; implementations are
/// free to swap in exponential backoff, jitter, or a circuit breaker
/// without changing the reactor client or response tracker, which only
/// depend on this trait.
pub trait RetryPolicy: Send + Sync {
    /// Called once when a tracked request or connect attempt starts.
    fn initial(&self, policy: &ClientPolicy) -> RetryState;

    /// Called when a deadline is reached without a response. Returns
    /// `Some(next_state)` to retry, `None` when attempts are exhausted.
    fn advance(&self, policy: &ClientPolicy, state: RetryState) -> Option<RetryState>;
}

/// The default policy: a fixed timeout between attempts, `retry_count`
/// attempts total, no backoff growth.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixedIntervalRetryPolicy;

impl RetryPolicy for FixedIntervalRetryPolicy {
    fn initial(&self, policy: &ClientPolicy) -> RetryState {
        RetryState {
            attempts_remaining: policy.retry_count,
            deadline: Instant::now() + policy.retry_timeout(),
        }
    }

    fn advance(&self, policy: &ClientPolicy, state: RetryState) -> Option<RetryState> {
        if state.attempts_remaining == 0 {
            return None;
        }
        Some(RetryState {
            attempts_remaining: state.attempts_remaining - 1,
            deadline: Instant::now() + policy.retry_timeout(),
        })
    }
}
