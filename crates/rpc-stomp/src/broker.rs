//! A minimal in-process STOMP broker.
//!
//! This is not a general-purpose message queue — it implements exactly the
//! commands this transport core needs to exercise the STOMP scenarios in the
//! spec end-to-end without an external broker dependency: `CONNECT`,
//! `SUBSCRIBE`/`UNSUBSCRIBE`, `SEND`, and `DISCONNECT`. It is a pure state
//! machine: given an inbound frame from a connection, it returns the
//! outbound frames to deliver (and to which connections), so it can be
//! driven by the reactor without owning any sockets itself.

use crate::error::StompError;
use crate::frame::{Command, StompFrame};
use crate::heartbeat::HeartbeatHeader;
use std::collections::HashMap;

pub type ConnId = String;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFrame {
    pub to: ConnId,
    pub frame: StompFrame,
}

struct Subscription {
    conn: ConnId,
    destination: String,
    ack_client: bool,
}

/// Tracks destinations and their subscribers; stateless about transport.
#[derive(Default)]
pub struct Broker {
    destinations: HashMap<String, Vec<String>>,
    subscriptions: HashMap<String, Subscription>,
}

impl Broker {
    pub fn new() -> Self {
        Broker::default()
    }

    /// `CONNECT` -> `CONNECTED` with a negotiated `heart-beat` header.
    pub fn handle_connect(&self, conn: &ConnId, frame: &StompFrame) -> OutboundFrame {
        let requested = frame
            .header("heart-beat")
            .and_then(HeartbeatHeader::parse)
            .unwrap_or(HeartbeatHeader {
                outgoing_ms: 0,
                incoming_ms: 0,
            });
        let reflected = requested.reflect();
        OutboundFrame {
            to: conn.clone(),
            frame: StompFrame::new(Command::Connected)
                .with_header("version", "1.2")
                .with_header("heart-beat", reflected.render()),
        }
    }

    /// `SUBSCRIBE` registers a listener for `destination`; replies `ACK`
    /// when the subscription requested `ack:client`.
    pub fn handle_subscribe(
        &mut self,
        conn: &ConnId,
        frame: &StompFrame,
    ) -> Result<Vec<OutboundFrame>, StompError> {
        let destination = frame
            .header("destination")
            .ok_or_else(|| StompError::Malformed("SUBSCRIBE missing destination".to_owned()))?
            .to_owned();
        let sub_id = frame
            .header("id")
            .ok_or_else(|| StompError::Malformed("SUBSCRIBE missing id".to_owned()))?
            .to_owned();
        let ack_client = frame.header("ack") == Some("client");

        let key = subscription_key(conn, &sub_id);
        self.destinations
            .entry(destination.clone())
            .or_default()
            .push(key.clone());
        self.subscriptions.insert(
            key,
            Subscription {
                conn: conn.clone(),
                destination,
                ack_client,
            },
        );

        let mut out = Vec::new();
        if ack_client {
            out.push(OutboundFrame {
                to: conn.clone(),
                frame: StompFrame::new(Command::Ack).with_header("id", sub_id),
            });
        }
        Ok(out)
    }

    pub fn handle_unsubscribe(&mut self, conn: &ConnId, frame: &StompFrame) -> Result<(), StompError> {
        let sub_id = frame
            .header("id")
            .ok_or_else(|| StompError::Malformed("UNSUBSCRIBE missing id".to_owned()))?;
        let key = subscription_key(conn, sub_id);
        if let Some(sub) = self.subscriptions.remove(&key) {
            if let Some(subs) = self.destinations.get_mut(&sub.destination) {
                subs.retain(|k| k != &key);
            }
        }
        Ok(())
    }

    /// `SEND` delivers the body to every local subscriber of `destination`.
    pub fn handle_send(&self, frame: &StompFrame) -> Result<Vec<OutboundFrame>, StompError> {
        let destination = frame
            .header("destination")
            .ok_or_else(|| StompError::Malformed("SEND missing destination".to_owned()))?;
        let Some(keys) = self.destinations.get(destination) else {
            return Ok(Vec::new());
        };
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(sub) = self.subscriptions.get(key) else {
                continue;
            };
            let message = StompFrame::new(Command::Message)
                .with_header("destination", destination)
                .with_header("subscription", local_sub_id(key))
                .with_body(frame.body.clone());
            out.push(OutboundFrame {
                to: sub.conn.clone(),
                frame: message,
            });
        }
        Ok(out)
    }

    /// `DISCONNECT` with a `receipt` header replies `RECEIPT`; without one,
    /// there is nothing to send back (the connection is simply torn down).
    pub fn handle_disconnect(&mut self, conn: &ConnId, frame: &StompFrame) -> Option<OutboundFrame> {
        self.subscriptions.retain(|_, sub| &sub.conn != conn);
        for subs in self.destinations.values_mut() {
            subs.retain(|key| !key.starts_with(&format!("{conn}\u{1}")));
        }
        frame.header("receipt").map(|receipt| OutboundFrame {
            to: conn.clone(),
            frame: StompFrame::new(Command::Receipt).with_header("receipt-id", receipt),
        })
    }
}

fn subscription_key(conn: &ConnId, sub_id: &str) -> String {
    format!("{conn}\u{1}{sub_id}")
}

fn local_sub_id(key: &str) -> &str {
    key.split('\u{1}').nth(1).unwrap_or(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_reflects_heartbeat_header() {
        let broker = Broker::new();
        let connect = StompFrame::new(Command::Connect)
            .with_header("accept-version", "1.2")
            .with_header("heart-beat", "5000,10000");
        let out = broker.handle_connect(&"c1".to_owned(), &connect);
        assert_eq!(out.to, "c1");
        assert_eq!(out.frame.header("heart-beat"), Some("10000,5000"));
    }

    #[test]
    fn subscribe_with_client_ack_replies_ack() {
        let mut broker = Broker::new();
        let subscribe = StompFrame::new(Command::Subscribe)
            .with_header("destination", "/queue/responses")
            .with_header("id", "s1")
            .with_header("ack", "client");
        let out = broker.handle_subscribe(&"c1".to_owned(), &subscribe).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].frame.command, Command::Ack);
        assert_eq!(out[0].frame.header("id"), Some("s1"));
    }

    #[test]
    fn send_delivers_to_all_local_subscribers_of_destination() {
        let mut broker = Broker::new();
        broker
            .handle_subscribe(
                &"c1".to_owned(),
                &StompFrame::new(Command::Subscribe)
                    .with_header("destination", "/queue/requests")
                    .with_header("id", "s1"),
            )
            .unwrap();
        broker
            .handle_subscribe(
                &"c2".to_owned(),
                &StompFrame::new(Command::Subscribe)
                    .with_header("destination", "/queue/requests")
                    .with_header("id", "s2"),
            )
            .unwrap();

        let send = StompFrame::new(Command::Send)
            .with_header("destination", "/queue/requests")
            .with_body(b"payload".to_vec());
        let out = broker.handle_send(&send).unwrap();
        assert_eq!(out.len(), 2);
        assert!(out.iter().any(|o| o.to == "c1"));
        assert!(out.iter().any(|o| o.to == "c2"));
        assert!(out.iter().all(|o| o.frame.body == b"payload"));
    }

    #[test]
    fn send_to_unknown_destination_delivers_nothing() {
        let broker = Broker::new();
        let send = StompFrame::new(Command::Send).with_header("destination", "/queue/nobody");
        assert!(broker.handle_send(&send).unwrap().is_empty());
    }

    #[test]
    fn disconnect_with_receipt_replies_receipt_and_drops_subscriptions() {
        let mut broker = Broker::new();
        broker
            .handle_subscribe(
                &"c1".to_owned(),
                &StompFrame::new(Command::Subscribe)
                    .with_header("destination", "/queue/requests")
                    .with_header("id", "s1"),
            )
            .unwrap();

        let disconnect = StompFrame::new(Command::Disconnect).with_header("receipt", "77");
        let out = broker
            .handle_disconnect(&"c1".to_owned(), &disconnect)
            .unwrap();
        assert_eq!(out.frame.command, Command::Receipt);
        assert_eq!(out.frame.header("receipt-id"), Some("77"));

        let send = StompFrame::new(Command::Send).with_header("destination", "/queue/requests");
        assert!(broker.handle_send(&send).unwrap().is_empty());
    }

    #[test]
    fn unsubscribe_stops_further_delivery() {
        let mut broker = Broker::new();
        broker
            .handle_subscribe(
                &"c1".to_owned(),
                &StompFrame::new(Command::Subscribe)
                    .with_header("destination", "/queue/requests")
                    .with_header("id", "s1"),
            )
            .unwrap();
        broker
            .handle_unsubscribe(
                &"c1".to_owned(),
                &StompFrame::new(Command::Unsubscribe).with_header("id", "s1"),
            )
            .unwrap();

        let send = StompFrame::new(Command::Send).with_header("destination", "/queue/requests");
        assert!(broker.handle_send(&send).unwrap().is_empty());
    }
}
