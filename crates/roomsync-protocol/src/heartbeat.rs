//! `heart-beat` header handling.
//!
//! Each side advertises `cx,cy`: the smallest interval at which it can send
//! heartbeats, and the interval at which it wants to receive them. Zero
//! means "cannot" or "does not want".

use std::time::Duration;

use crate::ProtocolError;

/// One side's advertised heartbeat capabilities, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeartBeat {
    /// Smallest interval at which this side sends heartbeats.
    pub outgoing_ms: u64,
    /// Interval at which this side wants to receive heartbeats.
    pub incoming_ms: u64,
}

impl HeartBeat {
    pub fn new(outgoing_ms: u64, incoming_ms: u64) -> Self {
        Self {
            outgoing_ms,
            incoming_ms,
        }
    }

    /// Parses a `heart-beat` header value such as `"4000,4000"`.
    pub fn parse(value: &str) -> Result<Self, ProtocolError> {
        let (out, inc) = value.split_once(',').ok_or_else(|| {
            ProtocolError::InvalidMessage(format!("bad heart-beat {value:?}"))
        })?;
        let parse = |s: &str| {
            s.trim().parse::<u64>().map_err(|_| {
                ProtocolError::InvalidMessage(format!("bad heart-beat {value:?}"))
            })
        };
        Ok(Self::new(parse(out)?, parse(inc)?))
    }

    /// Formats the header value.
    pub fn to_header(self) -> String {
        format!("{},{}", self.outgoing_ms, self.incoming_ms)
    }

    /// Computes the effective intervals for the side that advertised `self`
    /// after the peer advertised `peer`.
    pub fn negotiate(self, peer: HeartBeat) -> Negotiated {
        Negotiated {
            send_every: effective(self.outgoing_ms, peer.incoming_ms),
            expect_every: effective(self.incoming_ms, peer.outgoing_ms),
        }
    }
}

/// Heartbeat intervals agreed for one side of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Negotiated {
    /// How often this side must send a heartbeat, if at all.
    pub send_every: Option<Duration>,
    /// How often this side should hear from the peer, if at all.
    pub expect_every: Option<Duration>,
}

fn effective(ours: u64, theirs: u64) -> Option<Duration> {
    if ours == 0 || theirs == 0 {
        None
    } else {
        Some(Duration::from_millis(ours.max(theirs)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_format() {
        let hb = HeartBeat::parse("4000, 10000").unwrap();
        assert_eq!(hb, HeartBeat::new(4000, 10000));
        assert_eq!(hb.to_header(), "4000,10000");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(HeartBeat::parse("4000").is_err());
        assert!(HeartBeat::parse("a,b").is_err());
    }

    #[test]
    fn test_negotiate_takes_larger_interval() {
        let client = HeartBeat::new(4000, 4000);
        let server = HeartBeat::new(10000, 2000);
        let n = client.negotiate(server);
        assert_eq!(n.send_every, Some(Duration::from_millis(4000)));
        assert_eq!(n.expect_every, Some(Duration::from_millis(10000)));
    }

    #[test]
    fn test_negotiate_zero_disables_direction() {
        let client = HeartBeat::new(4000, 4000);
        let server = HeartBeat::new(0, 4000);
        let n = client.negotiate(server);
        assert_eq!(n.send_every, Some(Duration::from_millis(4000)));
        assert_eq!(n.expect_every, None);
    }
}
