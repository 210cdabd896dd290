//! `call`/`batch`/`notify`: the surface a collaborator actually issues
//! JSON-RPC traffic through. Everything else in this crate exists to
//! make this facade's promises hold — exactly one response per
//! registered id, batches collected atomically, timeouts that don't
//! disturb the tracker's own retry bookkeeping.

use crate::error::DispatchError;
use crate::pending::PendingCall;
use crate::tracker::ResponseTracker;
use rpc_reactor::{ClientPolicy, OutboundTransport};
use rpc_wire::jsonrpc::{JsonRpcFrame, JsonRpcRequest, JsonRpcResponse};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub struct JsonRpcClient {
    transport: Arc<dyn OutboundTransport>,
    tracker: Arc<ResponseTracker>,
    policy: ClientPolicy,
}

impl JsonRpcClient {
    pub fn new(transport: Arc<dyn OutboundTransport>, tracker: Arc<ResponseTracker>, policy: ClientPolicy) -> Self {
        JsonRpcClient { transport, tracker, policy }
    }

    fn gen_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Issues a single call and waits up to `timeout` for its
    /// response. A caller-side timeout surfaces `DispatchError::Timeout`
    /// without cancelling any tracker-owned retry — see
    /// [`JsonRpcClient::call_with_retry`] to opt into retries at all.
    pub async fn call(
        &self,
        method: impl Into<String>,
        params: serde_json::Value,
        timeout: Duration,
    ) -> Result<JsonRpcResponse, DispatchError> {
        self.dispatch_call(method, params, timeout, false).await
    }

    /// Same as [`JsonRpcClient::call`] but also registers the request
    /// with the response tracker so it is resent on `policy`'s retry
    /// schedule until a response arrives or attempts are exhausted.
    pub async fn call_with_retry(
        &self,
        method: impl Into<String>,
        params: serde_json::Value,
        timeout: Duration,
    ) -> Result<JsonRpcResponse, DispatchError> {
        self.dispatch_call(method, params, timeout, true).await
    }

    async fn dispatch_call(
        &self,
        method: impl Into<String>,
        params: serde_json::Value,
        timeout: Duration,
        retry: bool,
    ) -> Result<JsonRpcResponse, DispatchError> {
        let id = Self::gen_id();
        let request = JsonRpcRequest::call(method, params, id.clone());
        let bytes = serde_json::to_vec(&request).map_err(|e| DispatchError::Malformed(e.to_string()))?;

        let (call, rx) = PendingCall::single(id.clone());
        let call = self.tracker.register_call(call).await?;
        if retry {
            self.tracker
                .track(call, bytes.clone(), self.transport.clone(), self.policy.clone(), id)
                .await;
        }
        self.transport.send_message(bytes);

        tokio::time::timeout(timeout, rx).await.map_err(|_| DispatchError::Timeout)?.map_err(|_| DispatchError::Timeout)
    }

    /// Issues `requests` as a single wire batch and waits for all of
    /// them to resolve, in whatever order the wire produced them.
    pub async fn batch(
        &self,
        requests: Vec<(String, serde_json::Value)>,
        timeout: Duration,
    ) -> Result<Vec<JsonRpcResponse>, DispatchError> {
        let ids: Vec<String> = requests.iter().map(|_| Self::gen_id()).collect();
        let envelopes: Vec<JsonRpcRequest> = requests
            .into_iter()
            .zip(ids.iter())
            .map(|((method, params), id)| JsonRpcRequest::call(method, params, id.clone()))
            .collect();
        let bytes = serde_json::to_vec(&JsonRpcFrame::Batch(envelopes))
            .map_err(|e| DispatchError::Malformed(e.to_string()))?;

        let (call, rx) = PendingCall::batch(ids);
        self.tracker.register_call(call).await?;
        self.transport.send_message(bytes);

        tokio::time::timeout(timeout, rx).await.map_err(|_| DispatchError::Timeout)?.map_err(|_| DispatchError::Timeout)
    }

    /// Fire-and-forget: no id is generated, no pending call is
    /// registered, no response is ever expected.
    pub fn notify(&self, method: impl Into<String>, params: serde_json::Value) -> Result<(), DispatchError> {
        let request = JsonRpcRequest::notification(method, params);
        let bytes = serde_json::to_vec(&request).map_err(|e| DispatchError::Malformed(e.to_string()))?;
        self.transport.send_message(bytes);
        Ok(())
    }
}
