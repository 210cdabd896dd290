//! JSON-RPC 2.0 envelope types.
//!
//! This module does not dispatch methods or know about any business objects
//! — it only models the three envelope shapes (request, response, event) and
//! the handful of validation rules the core is responsible for enforcing
//! (version string, non-empty method, exactly one of `result`/`error`).

use crate::error::WireError;
use serde::{Deserialize, Serialize};

pub const JSONRPC_VERSION: &str = "2.0";

/// Well-known synthetic error codes produced by the core itself (as opposed
/// to codes the remote peer chose).
pub mod error_codes {
    /// "Message timeout which can be caused by communication issues" —
    /// delivered by the response tracker when a tracked request's attempts
    /// are exhausted, and by the reactor client on heartbeat expiry.
    pub const TRANSPORT_TIMEOUT: i64 = 5022;
    pub const TRANSPORT_TIMEOUT_MESSAGE: &str =
        "Message timeout which can be caused by communication issues";
}

/// A JSON-RPC request. `id` is `Some` for calls, `None` for notifications
/// (including events received from a peer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(rename = "jsonrpc")]
    pub version: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub params: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl JsonRpcRequest {
    pub fn call(method: impl Into<String>, params: serde_json::Value, id: impl Into<String>) -> Self {
        JsonRpcRequest {
            version: JSONRPC_VERSION.to_owned(),
            method: method.into(),
            params,
            id: Some(id.into()),
        }
    }

    pub fn notification(method: impl Into<String>, params: serde_json::Value) -> Self {
        JsonRpcRequest {
            version: JSONRPC_VERSION.to_owned(),
            method: method.into(),
            params,
            id: None,
        }
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// Validates the strict-2.0 / non-empty-method rules from the core spec.
    pub fn validate(&self) -> Result<(), WireError> {
        if self.version != JSONRPC_VERSION {
            return Err(WireError::IllegalArgument(format!(
                "unsupported jsonrpc version '{}'",
                self.version
            )));
        }
        if self.method.trim().is_empty() {
            return Err(WireError::IllegalArgument(
                "method must be a non-empty string".to_owned(),
            ));
        }
        Ok(())
    }
}

/// A JSON-RPC response. Exactly one of `result`/`error` is present; this is
/// enforced by [`JsonRpcResponse::validate`], not by the type itself, since
/// the wire format is peer-controlled and must be validated, not trusted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(rename = "jsonrpc")]
    pub version: String,
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: impl Into<String>, result: serde_json::Value) -> Self {
        JsonRpcResponse {
            version: JSONRPC_VERSION.to_owned(),
            id: Some(id.into()),
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Option<String>, error: JsonRpcError) -> Self {
        JsonRpcResponse {
            version: JSONRPC_VERSION.to_owned(),
            id,
            result: None,
            error: Some(error),
        }
    }

    /// Synthesizes a transport-timeout response (error 5022), used by the
    /// response tracker and by the reactor client on heartbeat expiry.
    pub fn synthetic_timeout(id: Option<String>) -> Self {
        JsonRpcResponse::failure(
            id,
            JsonRpcError {
                code: error_codes::TRANSPORT_TIMEOUT,
                message: error_codes::TRANSPORT_TIMEOUT_MESSAGE.to_owned(),
                data: None,
            },
        )
    }

    pub fn validate(&self) -> Result<(), WireError> {
        match (&self.result, &self.error) {
            (Some(_), Some(_)) => Err(WireError::IllegalArgument(
                "response must not contain both result and error".to_owned(),
            )),
            (None, None) => Err(WireError::IllegalArgument(
                "response must contain exactly one of result or error".to_owned(),
            )),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Either a single request/response or a batch of them, matching the
/// length-prefixed wire format's "a JSON document or array of documents".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcFrame<T> {
    Single(T),
    Batch(Vec<T>),
}

impl<T> JsonRpcFrame<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            JsonRpcFrame::Single(v) => vec![v],
            JsonRpcFrame::Batch(v) => v,
        }
    }
}
