//! STOMP `heart-beat` header negotiation.
//!
//! Both sides send `cx,cy` where `cx` is the sender's outgoing interval in
//! ms and `cy` its incoming requirement. The server swaps the pair when
//! reflecting; both sides then apply jitter absorption (`outgoing = cx *
//! 0.8`, `incoming = cy * 1.2`) before arming their timers.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatHeader {
    pub outgoing_ms: u64,
    pub incoming_ms: u64,
}

impl HeartbeatHeader {
    pub fn parse(value: &str) -> Option<Self> {
        let (cx, cy) = value.split_once(',')?;
        Some(HeartbeatHeader {
            outgoing_ms: cx.trim().parse().ok()?,
            incoming_ms: cy.trim().parse().ok()?,
        })
    }

    pub fn render(self) -> String {
        format!("{},{}", self.outgoing_ms, self.incoming_ms)
    }

    /// The server's reflection of a client's proposal: swap the pair.
    pub fn reflect(self) -> Self {
        HeartbeatHeader {
            outgoing_ms: self.incoming_ms,
            incoming_ms: self.outgoing_ms,
        }
    }
}

/// Negotiated intervals this side should actually arm its timers with,
/// after jitter absorption. A value of 0 on either side means "disabled".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiatedHeartbeat {
    pub outgoing_ms: u64,
    pub incoming_ms: u64,
}

/// Negotiates the effective intervals from `local`'s proposal and the
/// peer's reply `peer`.
pub fn negotiate(local: HeartbeatHeader, peer: HeartbeatHeader) -> NegotiatedHeartbeat {
    let outgoing_ms = if local.outgoing_ms == 0 || peer.incoming_ms == 0 {
        0
    } else {
        ((local.outgoing_ms.max(peer.incoming_ms)) as f64 * 0.8) as u64
    };
    let incoming_ms = if local.incoming_ms == 0 || peer.outgoing_ms == 0 {
        0
    } else {
        ((local.incoming_ms.max(peer.outgoing_ms)) as f64 * 1.2) as u64
    };
    NegotiatedHeartbeat {
        outgoing_ms,
        incoming_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_render_round_trip() {
        let h = HeartbeatHeader::parse("5000,10000").unwrap();
        assert_eq!(h.outgoing_ms, 5000);
        assert_eq!(h.incoming_ms, 10000);
        assert_eq!(h.render(), "5000,10000");
    }

    #[test]
    fn parse_rejects_malformed_header() {
        assert!(HeartbeatHeader::parse("not-a-pair").is_none());
        assert!(HeartbeatHeader::parse("5000").is_none());
    }

    #[test]
    fn reflect_swaps_the_pair() {
        let h = HeartbeatHeader {
            outgoing_ms: 1000,
            incoming_ms: 2000,
        };
        let reflected = h.reflect();
        assert_eq!(reflected.outgoing_ms, 2000);
        assert_eq!(reflected.incoming_ms, 1000);
    }

    #[test]
    fn negotiate_applies_jitter_absorption() {
        let local = HeartbeatHeader {
            outgoing_ms: 1000,
            incoming_ms: 1000,
        };
        let peer = HeartbeatHeader {
            outgoing_ms: 1000,
            incoming_ms: 1000,
        };
        let negotiated = negotiate(local, peer);
        assert_eq!(negotiated.outgoing_ms, 800);
        assert_eq!(negotiated.incoming_ms, 1200);
    }

    #[test]
    fn negotiate_disables_when_either_side_proposes_zero() {
        let local = HeartbeatHeader {
            outgoing_ms: 0,
            incoming_ms: 1000,
        };
        let peer = HeartbeatHeader {
            outgoing_ms: 1000,
            incoming_ms: 1000,
        };
        let negotiated = negotiate(local, peer);
        assert_eq!(negotiated.outgoing_ms, 0);
    }
}
