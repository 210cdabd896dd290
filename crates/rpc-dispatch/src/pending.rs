//! A registered call's completion state: one slot for a single call,
//! a counter plus accumulated responses for a batch.

use rpc_wire::jsonrpc::JsonRpcResponse;
use std::collections::HashSet;
use tokio::sync::oneshot;

enum Completion {
    Single(oneshot::Sender<JsonRpcResponse>),
    Batch(oneshot::Sender<Vec<JsonRpcResponse>>),
}

/// Tracks the ids a call is still waiting on and delivers the
/// accumulated response(s) through a completion channel the instant
/// the last one arrives.
pub struct PendingCall {
    remaining: HashSet<String>,
    responses: Vec<JsonRpcResponse>,
    completion: Option<Completion>,
}

impl PendingCall {
    pub fn single(id: String) -> (PendingCall, oneshot::Receiver<JsonRpcResponse>) {
        let (tx, rx) = oneshot::channel();
        let mut remaining = HashSet::with_capacity(1);
        remaining.insert(id);
        (
            PendingCall {
                remaining,
                responses: Vec::with_capacity(1),
                completion: Some(Completion::Single(tx)),
            },
            rx,
        )
    }

    pub fn batch(ids: Vec<String>) -> (PendingCall, oneshot::Receiver<Vec<JsonRpcResponse>>) {
        let (tx, rx) = oneshot::channel();
        let count = ids.len();
        (
            PendingCall {
                remaining: ids.into_iter().collect(),
                responses: Vec::with_capacity(count),
                completion: Some(Completion::Batch(tx)),
            },
            rx,
        )
    }

    pub fn ids(&self) -> impl Iterator<Item = &String> {
        self.remaining.iter()
    }

    pub fn is_complete(&self) -> bool {
        self.remaining.is_empty()
    }

    /// Attaches `response` and, once every expected id has arrived,
    /// fires the completion channel. Returns whether the call is now
    /// fully satisfied (callers use this to decide whether to drop the
    /// call from the tracker's maps).
    pub fn complete_one(&mut self, response: JsonRpcResponse) -> bool {
        if let Some(id) = &response.id {
            self.remaining.remove(id);
        }
        self.responses.push(response);
        if self.remaining.is_empty() {
            if let Some(completion) = self.completion.take() {
                match completion {
                    Completion::Single(tx) => {
                        let response = self.responses.pop().unwrap_or_else(|| {
                            JsonRpcResponse::synthetic_timeout(None)
                        });
                        let _ = tx.send(response);
                    }
                    Completion::Batch(tx) => {
                        let _ = tx.send(std::mem::take(&mut self.responses));
                    }
                }
            }
            true
        } else {
            false
        }
    }

    /// Forces completion with a synthetic failure for every
    /// still-outstanding id (used when the tracker exhausts retries or
    /// the originating client disconnects).
    pub fn fail_remaining(&mut self, error_message: &str) {
        let ids: Vec<String> = self.remaining.drain().collect();
        for id in ids {
            self.responses.push(JsonRpcResponse::failure(
                Some(id),
                rpc_wire::jsonrpc::JsonRpcError {
                    code: rpc_wire::jsonrpc::error_codes::TRANSPORT_TIMEOUT,
                    message: error_message.to_owned(),
                    data: None,
                },
            ));
        }
        if let Some(completion) = self.completion.take() {
            match completion {
                Completion::Single(tx) => {
                    let response = self.responses.pop().unwrap_or_else(|| {
                        JsonRpcResponse::synthetic_timeout(None)
                    });
                    let _ = tx.send(response);
                }
                Completion::Batch(tx) => {
                    let _ = tx.send(std::mem::take(&mut self.responses));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_call_completes_on_first_response() {
        let (mut call, mut rx) = PendingCall::single("r1".to_owned());
        assert!(call.complete_one(JsonRpcResponse::success("r1", serde_json::json!(true))));
        assert_eq!(rx.try_recv().unwrap().id, Some("r1".to_owned()));
    }

    #[test]
    fn batch_call_completes_only_after_every_id_arrives() {
        let (mut call, mut rx) = PendingCall::batch(vec!["b1".to_owned(), "b2".to_owned()]);
        assert!(!call.complete_one(JsonRpcResponse::success("b2", serde_json::json!(1))));
        assert!(rx.try_recv().is_err());
        assert!(call.complete_one(JsonRpcResponse::success("b1", serde_json::json!(2))));
        let responses = rx.try_recv().unwrap();
        assert_eq!(responses.len(), 2);
    }

    #[test]
    fn fail_remaining_synthesizes_timeout_for_every_outstanding_id() {
        let (mut call, mut rx) = PendingCall::batch(vec!["b1".to_owned(), "b2".to_owned()]);
        call.complete_one(JsonRpcResponse::success("b1", serde_json::json!(1)));
        call.fail_remaining("Message timeout which can be caused by communication issues");
        let responses = rx.try_recv().unwrap();
        assert_eq!(responses.len(), 2);
        assert!(responses.iter().any(|r| r.id.as_deref() == Some("b2") && r.error.is_some()));
    }
}
