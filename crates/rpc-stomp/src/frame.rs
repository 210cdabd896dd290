//! STOMP 1.2 frame model and the incremental decoder.
//!
//! A frame is a command line, `key:value` header lines, a blank line, an
//! opaque body, and a trailing NUL. Request/response correlation for the
//! payload this transport carries is by JSON-RPC `id`, never by STOMP
//! `receipt` — STOMP here is only a transport.

use crate::error::StompError;
use std::fmt;

/// The STOMP 1.2 commands this core recognizes. An unrecognized command in
/// an inbound frame is a [`StompError::UnknownCommand`], fatal for the
/// connection per the core's error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Connect,
    Connected,
    Subscribe,
    Unsubscribe,
    Send,
    Message,
    Ack,
    Begin,
    Commit,
    Abort,
    Disconnect,
    Receipt,
    Error,
}

impl Command {
    fn as_str(self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Connected => "CONNECTED",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Send => "SEND",
            Command::Message => "MESSAGE",
            Command::Ack => "ACK",
            Command::Begin => "BEGIN",
            Command::Commit => "COMMIT",
            Command::Abort => "ABORT",
            Command::Disconnect => "DISCONNECT",
            Command::Receipt => "RECEIPT",
            Command::Error => "ERROR",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Command {
    type Err = StompError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "CONNECT" | "STOMP" => Command::Connect,
            "CONNECTED" => Command::Connected,
            "SUBSCRIBE" => Command::Subscribe,
            "UNSUBSCRIBE" => Command::Unsubscribe,
            "SEND" => Command::Send,
            "MESSAGE" => Command::Message,
            "ACK" => Command::Ack,
            "BEGIN" => Command::Begin,
            "COMMIT" => Command::Commit,
            "ABORT" => Command::Abort,
            "DISCONNECT" => Command::Disconnect,
            "RECEIPT" => Command::Receipt,
            "ERROR" => Command::Error,
            other => return Err(StompError::UnknownCommand(other.to_owned())),
        })
    }
}

/// A decoded or to-be-encoded STOMP frame.
///
/// Headers preserve insertion order (STOMP allows repeats; the first
/// occurrence of a given key wins per the spec, but encoding emits exactly
/// what was inserted so `parse(build(frame)) == frame` holds).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StompFrame {
    pub command: Command,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl StompFrame {
    pub fn new(command: Command) -> Self {
        StompFrame {
            command,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// First value for `key`, STOMP's "first header wins" rule.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Encodes this frame to its wire bytes, including the trailing NUL.
    ///
    /// `content-length` is appended automatically when the body is
    /// non-empty and not already present.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.body.len() + 64);
        out.extend_from_slice(self.command.as_str().as_bytes());
        out.push(b'\n');
        for (k, v) in &self.headers {
            out.extend_from_slice(k.as_bytes());
            out.push(b':');
            out.extend_from_slice(v.as_bytes());
            out.push(b'\n');
        }
        if !self.body.is_empty() && self.header("content-length").is_none() {
            out.extend_from_slice(b"content-length:");
            out.extend_from_slice(self.body.len().to_string().as_bytes());
            out.push(b'\n');
        }
        out.push(b'\n');
        out.extend_from_slice(&self.body);
        out.push(0);
        out
    }
}

/// Outcome of one decode attempt against a buffer of inbound bytes.
pub enum Decoded {
    /// A lone `\n` (or a trailing `\n` after a previous frame's NUL,
    /// tolerated per the core's legacy-codec compatibility note) was
    /// consumed as a heartbeat; no frame was produced.
    Heartbeat,
    /// A complete frame was decoded and removed from the buffer.
    Frame(StompFrame),
    /// Not enough bytes buffered yet for a complete frame or heartbeat.
    Incomplete,
}

/// Attempts to decode one frame (or heartbeat) from the front of `buf`,
/// draining the consumed bytes on success.
///
/// Multiple control frames may arrive coalesced in one read; callers should
/// loop calling this until it returns [`Decoded::Incomplete`].
pub fn decode_one(buf: &mut Vec<u8>) -> Result<Decoded, StompError> {
    if buf.is_empty() {
        return Ok(Decoded::Incomplete);
    }
    if buf[0] == b'\n' {
        buf.remove(0);
        return Ok(Decoded::Heartbeat);
    }

    let header_end = match find_subslice(buf, b"\n\n") {
        Some(idx) => idx,
        None => return Ok(Decoded::Incomplete),
    };

    let header_block = std::str::from_utf8(&buf[..header_end]).map_err(|_| StompError::InvalidUtf8)?;
    let mut lines = header_block.split('\n');
    let command_line = lines.next().unwrap_or("");
    let command: Command = command_line.parse()?;

    let mut headers = Vec::new();
    let mut content_length: Option<usize> = None;
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let (k, v) = line
            .split_once(':')
            .ok_or_else(|| StompError::Malformed(format!("header line missing ':': {line}")))?;
        if k == "content-length" && content_length.is_none() {
            content_length = v.parse::<usize>().ok();
        }
        headers.push((k.to_owned(), v.to_owned()));
    }

    let body_start = header_end + 2;

    let (body_end, frame_end) = if let Some(len) = content_length {
        let body_end = body_start + len;
        if buf.len() < body_end + 1 {
            return Ok(Decoded::Incomplete);
        }
        if buf[body_end] != 0 {
            return Err(StompError::Malformed(
                "declared content-length not followed by NUL".to_owned(),
            ));
        }
        (body_end, body_end + 1)
    } else {
        match buf[body_start..].iter().position(|&b| b == 0) {
            Some(rel) => (body_start + rel, body_start + rel + 1),
            None => return Ok(Decoded::Incomplete),
        }
    };

    let body = buf[body_start..body_end].to_vec();
    let mut consumed = frame_end;
    // Tolerate a trailing '\n' after NUL (legacy codec compatibility note):
    // interpret it as a heartbeat rather than part of the next frame.
    if buf.len() > consumed && buf[consumed] == b'\n' {
        consumed += 1;
    }
    buf.drain(..consumed);

    Ok(Decoded::Frame(StompFrame {
        command,
        headers,
        body,
    }))
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_then_decode_round_trips_a_send_frame_with_body() {
        let frame = StompFrame::new(Command::Send)
            .with_header("destination", "/queue/requests")
            .with_body(br#"{"jsonrpc":"2.0","method":"Host.ping","id":"r1"}"#.to_vec());
        let mut buf = frame.encode();
        match decode_one(&mut buf).unwrap() {
            Decoded::Frame(decoded) => assert_eq!(decoded, frame),
            _ => panic!("expected a complete frame"),
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_one_treats_control_frame_without_content_length_as_nul_terminated() {
        let mut buf = b"DISCONNECT\nreceipt:77\n\n".to_vec();
        buf.push(0);
        match decode_one(&mut buf).unwrap() {
            Decoded::Frame(f) => {
                assert_eq!(f.command, Command::Disconnect);
                assert_eq!(f.header("receipt"), Some("77"));
                assert!(f.body.is_empty());
            }
            _ => panic!("expected a complete frame"),
        }
    }

    #[test]
    fn decode_one_consumes_a_lone_heartbeat_newline() {
        let mut buf = vec![b'\n'];
        match decode_one(&mut buf).unwrap() {
            Decoded::Heartbeat => {}
            _ => panic!("expected heartbeat"),
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_one_reports_incomplete_for_a_partial_frame() {
        let mut buf = b"SEND\ndestination:/queue/requests\n".to_vec();
        assert!(matches!(decode_one(&mut buf).unwrap(), Decoded::Incomplete));
    }

    #[test]
    fn decode_one_splits_coalesced_frames() {
        let a = StompFrame::new(Command::Ack).with_header("id", "s1");
        let b = StompFrame::new(Command::Receipt).with_header("receipt-id", "77");
        let mut buf = a.encode();
        buf.extend(b.encode());

        let first = decode_one(&mut buf).unwrap();
        assert!(matches!(first, Decoded::Frame(ref f) if f.command == Command::Ack));
        let second = decode_one(&mut buf).unwrap();
        assert!(matches!(second, Decoded::Frame(ref f) if f.command == Command::Receipt));
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_one_tolerates_trailing_newline_after_nul() {
        let frame = StompFrame::new(Command::Connected).with_header("heart-beat", "0,0");
        let mut buf = frame.encode();
        buf.push(b'\n'); // legacy codec compatibility note
        match decode_one(&mut buf).unwrap() {
            Decoded::Frame(f) => assert_eq!(f.command, Command::Connected),
            _ => panic!("expected a complete frame"),
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_one_rejects_unknown_command() {
        let mut buf = b"BOGUS\n\n\0".to_vec();
        assert!(matches!(
            decode_one(&mut buf),
            Err(StompError::UnknownCommand(_))
        ));
    }

    #[test]
    fn header_returns_first_occurrence() {
        let frame = StompFrame::new(Command::Connect)
            .with_header("host", "a")
            .with_header("host", "b");
        assert_eq!(frame.header("host"), Some("a"));
    }
}
