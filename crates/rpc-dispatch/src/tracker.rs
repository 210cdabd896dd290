//! Response correlation and timeout-driven retries.
//!
//! `running_calls` maps a request id to whichever [`PendingCall`] is
//! waiting on it (a batch's ids all point at the same call); `tracking`
//! holds only the subset of calls the caller opted into retrying, each
//! with its own retry deadline. A dedicated task wakes on a fixed tick
//! and resends or fails whatever has reached its deadline — nothing
//! else touches `tracking` concurrently with that task but the
//! registration/removal paths, both of which take the same lock.

use crate::error::DispatchError;
use crate::pending::PendingCall;
use rpc_reactor::{ClientPolicy, OutboundTransport, RetryPolicy};
use rpc_wire::jsonrpc::{error_codes, JsonRpcResponse};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};
use tracing::{debug, warn};

struct TrackedEntry {
    call: Arc<Mutex<PendingCall>>,
    original_bytes: Vec<u8>,
    client: Arc<dyn OutboundTransport>,
    policy: ClientPolicy,
    retry_state: rpc_reactor::RetryState,
}

pub struct ResponseTracker {
    running_calls: Mutex<HashMap<String, Arc<Mutex<PendingCall>>>>,
    tracking: Mutex<HashMap<String, TrackedEntry>>,
    retry_policy: Box<dyn RetryPolicy>,
    tick: Duration,
}

impl ResponseTracker {
    pub fn new(retry_policy: Box<dyn RetryPolicy>) -> Arc<ResponseTracker> {
        ResponseTracker::with_tick(retry_policy, Duration::from_millis(500))
    }

    pub fn with_tick(retry_policy: Box<dyn RetryPolicy>, tick: Duration) -> Arc<ResponseTracker> {
        Arc::new(ResponseTracker {
            running_calls: Mutex::new(HashMap::new()),
            tracking: Mutex::new(HashMap::new()),
            retry_policy,
            tick,
        })
    }

    /// Registers every id the call is waiting on. Fails atomically —
    /// if any one id is already present, nothing is inserted.
    pub async fn register_call(&self, call: PendingCall) -> Result<Arc<Mutex<PendingCall>>, DispatchError> {
        let ids: Vec<String> = call.ids().cloned().collect();
        let mut running = self.running_calls.lock().await;
        for id in &ids {
            if running.contains_key(id) {
                return Err(DispatchError::DuplicateRequest(id.clone()));
            }
        }
        let call = Arc::new(Mutex::new(call));
        for id in ids {
            running.insert(id, call.clone());
        }
        Ok(call)
    }

    /// Opts a registered call into retry-on-timeout, resending
    /// `original_bytes` through `client` until `policy.retry_count` is
    /// exhausted.
    pub async fn track(
        &self,
        call: Arc<Mutex<PendingCall>>,
        original_bytes: Vec<u8>,
        client: Arc<dyn OutboundTransport>,
        policy: ClientPolicy,
        key: String,
    ) {
        let retry_state = self.retry_policy.initial(&policy);
        self.tracking.lock().await.insert(
            key,
            TrackedEntry {
                call,
                original_bytes,
                client,
                policy,
                retry_state,
            },
        );
    }

    /// Attaches a decoded response to whichever pending call owns its
    /// id, dropping the call from `running_calls` (and any tracking
    /// entry) once every expected id has arrived.
    pub async fn process_response(&self, response: JsonRpcResponse) {
        let Some(id) = response.id.clone() else {
            return;
        };
        let call = self.running_calls.lock().await.get(&id).cloned();
        let Some(call) = call else {
            debug!(id, "response for an id with no registered pending call, dropping");
            return;
        };
        let complete = call.lock().await.complete_one(response);
        if complete {
            self.drop_call(&call).await;
        }
    }

    async fn drop_call(&self, call: &Arc<Mutex<PendingCall>>) {
        self.running_calls.lock().await.retain(|_, v| !Arc::ptr_eq(v, call));
        self.tracking.lock().await.retain(|_, entry| !Arc::ptr_eq(&entry.call, call));
    }

    /// Disconnects `client` and synthesizes a transport-timeout failure
    /// for every call still tracked against it (used when the reactor
    /// client itself reports a failure rather than a retry deadline).
    pub async fn fail_calls_for_client(&self, connection_id: &str) {
        let mut tracking = self.tracking.lock().await;
        let mut done = Vec::new();
        for (key, entry) in tracking.iter() {
            if entry.client.connection_id() == connection_id {
                entry
                    .call
                    .lock()
                    .await
                    .fail_remaining(error_codes::TRANSPORT_TIMEOUT_MESSAGE);
                done.push(key.clone());
            }
        }
        for key in &done {
            if let Some(entry) = tracking.remove(key) {
                self.running_calls.lock().await.retain(|_, v| !Arc::ptr_eq(v, &entry.call));
            }
        }
    }

    /// Runs forever on the current task, waking every `self.tick` to
    /// resend or fail whatever tracked call reached its deadline.
    /// Intended to be spawned once per [`ResponseTracker`] instance.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.tick_once().await;
        }
    }

    async fn tick_once(&self) {
        let now = Instant::now();
        let mut expired = Vec::new();
        let mut resend = Vec::new();

        let mut tracking = self.tracking.lock().await;
        let keys: Vec<String> = tracking.keys().cloned().collect();
        for key in keys {
            let done = {
                let entry = tracking.get(&key).unwrap();
                entry.call.lock().await.is_complete()
            };
            if done {
                tracking.remove(&key);
                continue;
            }
            let entry = tracking.get(&key).unwrap();
            if now < entry.retry_state.deadline {
                continue;
            }
            match self.retry_policy.advance(&entry.policy, entry.retry_state) {
                Some(next_state) => {
                    resend.push((key.clone(), entry.original_bytes.clone(), entry.client.clone()));
                    tracking.get_mut(&key).unwrap().retry_state = next_state;
                }
                None => expired.push(key.clone()),
            }
        }
        let expired_entries: Vec<TrackedEntry> = expired.iter().filter_map(|k| tracking.remove(k)).collect();
        drop(tracking);

        for (_, bytes, client) in resend {
            debug!(connection_id = client.connection_id(), "resending tracked request after timeout");
            client.send_message(bytes);
        }

        for entry in expired_entries {
            warn!(
                connection_id = entry.client.connection_id(),
                "retry attempts exhausted, failing tracked call and disconnecting"
            );
            entry.call.lock().await.fail_remaining(error_codes::TRANSPORT_TIMEOUT_MESSAGE);
            self.drop_call(&entry.call).await;
            entry.client.disconnect(error_codes::TRANSPORT_TIMEOUT_MESSAGE.to_owned());
        }
    }
}
