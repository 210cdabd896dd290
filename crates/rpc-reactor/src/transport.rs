//! Framing strategy objects.
//!
//! A reactor client doesn't know or care whether it's speaking raw
//! length-prefixed JSON-RPC or STOMP — it delegates byte assembly and
//! payload encoding to whichever [`Framer`] its [`Transport`] variant
//! constructs. This is the seam the spec's "pluggable framing" lives
//! behind; adding a third wire format only means a new `Framer` impl.

use crate::error::TransportError;
use crate::policy::StompClientPolicy;
use rpc_stomp::{decode_one, Command, Decoded, HeartbeatHeader, NegotiatedHeartbeat, StompFrame};
use rpc_wire::{encode_frame, DEFAULT_MAX_FRAME_BYTES};

/// Bytes assembled from the wire, or a liveness-only heartbeat that
/// carries no JSON-RPC payload but still counts as inbound activity.
pub enum Assembled {
    Payload(Vec<u8>),
    HeartbeatOnly,
}

/// Strategy object owning the inbound assembly buffer and outbound
/// encoding rules for one connection.
pub trait Framer: Send {
    /// Feeds newly-read socket bytes in; returns every frame that
    /// became complete as a result, in arrival order.
    fn feed(&mut self, bytes: &[u8]) -> Result<Vec<Assembled>, TransportError>;

    /// Wraps a JSON-RPC payload (already-serialized request, response,
    /// or batch) into wire bytes ready to enqueue on the outbox.
    fn encode(&mut self, payload: &[u8]) -> Result<Vec<u8>, TransportError>;

    /// Bytes for an empty heartbeat frame, sent when the outgoing
    /// heartbeat interval elapses with nothing else queued.
    fn heartbeat_frame(&self) -> Vec<u8>;

    /// Frames to send immediately after the transport-specific
    /// handshake completes (STOMP CONNECT, subscribe to the response
    /// queue, ...). Empty for transports with no post-connect step.
    fn post_connect_frames(&mut self) -> Vec<Vec<u8>>;
}

/// Which wire format a client was constructed with.
pub enum Transport {
    LengthPrefixed { max_frame_bytes: u64 },
    Stomp(StompClientPolicy),
}

impl Transport {
    pub fn build_framer(&self) -> Box<dyn Framer> {
        match self {
            Transport::LengthPrefixed { max_frame_bytes } => {
                Box::new(LengthPrefixedFramer::new(*max_frame_bytes))
            }
            Transport::Stomp(policy) => Box::new(StompFramer::new(policy.clone())),
        }
    }
}

// ---------------------------------------------------------------------------
// Length-prefixed framer
// ---------------------------------------------------------------------------

pub struct LengthPrefixedFramer {
    max_frame_bytes: u64,
    buf: Vec<u8>,
}

impl LengthPrefixedFramer {
    pub fn new(max_frame_bytes: u64) -> Self {
        LengthPrefixedFramer {
            max_frame_bytes,
            buf: Vec::new(),
        }
    }
}

impl Framer for LengthPrefixedFramer {
    fn feed(&mut self, bytes: &[u8]) -> Result<Vec<Assembled>, TransportError> {
        self.buf.extend_from_slice(bytes);
        let mut out = Vec::new();
        loop {
            if self.buf.len() < 8 {
                break;
            }
            let len = u64::from_be_bytes(self.buf[0..8].try_into().unwrap());
            if len == 0 {
                return Err(TransportError::Protocol("zero-length frame".into()));
            }
            if len > self.max_frame_bytes {
                return Err(TransportError::Protocol(format!(
                    "frame of {len} bytes exceeds cap of {}",
                    self.max_frame_bytes
                )));
            }
            let total = 8 + len as usize;
            if self.buf.len() < total {
                break;
            }
            let payload = self.buf[8..total].to_vec();
            self.buf.drain(0..total);
            out.push(Assembled::Payload(payload));
        }
        Ok(out)
    }

    fn encode(&mut self, payload: &[u8]) -> Result<Vec<u8>, TransportError> {
        Ok(encode_frame(payload)?)
    }

    fn heartbeat_frame(&self) -> Vec<u8> {
        // There is no zero-length frame in this wire format; length-prefixed
        // clients rely on inbound/outbound socket activity from real
        // traffic only, so there's nothing to send on an otherwise-idle
        // connection. Callers skip calling this for `Transport::LengthPrefixed`.
        Vec::new()
    }

    fn post_connect_frames(&mut self) -> Vec<Vec<u8>> {
        Vec::new()
    }
}

// ---------------------------------------------------------------------------
// STOMP framer
// ---------------------------------------------------------------------------

pub struct StompFramer {
    policy: StompClientPolicy,
    buf: Vec<u8>,
    negotiated: Option<NegotiatedHeartbeat>,
}

impl StompFramer {
    pub fn new(policy: StompClientPolicy) -> Self {
        StompFramer {
            policy,
            buf: Vec::new(),
            negotiated: None,
        }
    }

    fn local_heartbeat(&self) -> HeartbeatHeader {
        HeartbeatHeader {
            outgoing_ms: self.policy.base.outgoing_heartbeat_ms,
            incoming_ms: self.policy.base.incoming_heartbeat_ms,
        }
    }
}

impl Framer for StompFramer {
    fn feed(&mut self, bytes: &[u8]) -> Result<Vec<Assembled>, TransportError> {
        self.buf.extend_from_slice(bytes);
        let mut out = Vec::new();
        loop {
            match decode_one(&mut self.buf)? {
                Decoded::Incomplete => break,
                Decoded::Heartbeat => out.push(Assembled::HeartbeatOnly),
                Decoded::Frame(frame) => match frame.command {
                    Command::Connected => {
                        if let Some(raw) = frame.header("heart-beat") {
                            if let Some(peer) = HeartbeatHeader::parse(raw) {
                                self.negotiated = Some(rpc_stomp::negotiate(
                                    self.local_heartbeat(),
                                    peer,
                                ));
                            }
                        }
                        // CONNECTED carries no JSON-RPC payload, but it is
                        // inbound activity and must refresh the heartbeat
                        // clock, hence HeartbeatOnly rather than being
                        // dropped silently.
                        out.push(Assembled::HeartbeatOnly);
                    }
                    Command::Message => out.push(Assembled::Payload(frame.body)),
                    Command::Receipt | Command::Ack => out.push(Assembled::HeartbeatOnly),
                    Command::Error => {
                        let reason = frame
                            .header("message")
                            .unwrap_or("unspecified STOMP ERROR frame")
                            .to_string();
                        return Err(TransportError::Protocol(reason));
                    }
                    other => {
                        return Err(TransportError::Protocol(format!(
                            "unexpected STOMP command from broker: {other}"
                        )));
                    }
                },
            }
        }
        Ok(out)
    }

    fn encode(&mut self, payload: &[u8]) -> Result<Vec<u8>, TransportError> {
        let frame = StompFrame::new(Command::Send)
            .with_header("destination", self.policy.request_queue.as_str())
            .with_body(payload.to_vec());
        Ok(frame.encode())
    }

    fn heartbeat_frame(&self) -> Vec<u8> {
        b"\n".to_vec()
    }

    fn post_connect_frames(&mut self) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        let connect = StompFrame::new(Command::Connect)
            .with_header("accept-version", "1.2")
            .with_header("heart-beat", self.local_heartbeat().render());
        frames.push(connect.encode());

        let mut subscribe = StompFrame::new(Command::Subscribe)
            .with_header("destination", &self.policy.response_queue)
            .with_header("id", "response-queue")
            .with_header("ack", "auto");
        if let Some(event_queue) = &self.policy.event_queue {
            subscribe = subscribe.with_header("x-also", event_queue.as_str());
        }
        frames.push(subscribe.encode());

        if let Some(event_queue) = &self.policy.event_queue {
            let events = StompFrame::new(Command::Subscribe)
                .with_header("destination", event_queue.as_str())
                .with_header("id", "event-queue")
                .with_header("ack", "auto");
            frames.push(events.encode());
        }
        frames
    }
}
