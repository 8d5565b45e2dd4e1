//! Heart-beat negotiation.
//!
//! Both peers advertise `heart-beat:<cx>,<cy>` in milliseconds: `cx` is the
//! smallest interval at which the sender can emit beats, `cy` the interval at
//! which it wants to receive them. Zero disables that direction.

use std::time::Duration;

use crate::errors::{ProtocolError, Result};

/// Heart-beat intervals. A zero duration disables the direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeartBeat {
    /// Interval at which we send beats.
    pub outgoing: Duration,
    /// Interval at which we expect beats from the peer.
    pub incoming: Duration,
}

impl HeartBeat {
    /// Create a heart-beat pair.
    pub fn new(outgoing: Duration, incoming: Duration) -> Self {
        Self { outgoing, incoming }
    }

    /// Heart-beating disabled in both directions.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Header value, e.g. `4000,4000`.
    pub fn to_header(self) -> String {
        format!("{},{}", self.outgoing.as_millis(), self.incoming.as_millis())
    }

    /// Parse a `heart-beat` header value.
    ///
    /// # Errors
    ///
    /// `ProtocolError::InvalidHeartBeat` unless the value is two decimal
    /// integers separated by a comma.
    pub fn parse(value: &str) -> Result<Self> {
        let invalid = || ProtocolError::InvalidHeartBeat(value.to_string());
        let (out, inc) = value.split_once(',').ok_or_else(invalid)?;
        let out: u64 = out.trim().parse().map_err(|_| invalid())?;
        let inc: u64 = inc.trim().parse().map_err(|_| invalid())?;
        Ok(Self::new(Duration::from_millis(out), Duration::from_millis(inc)))
    }

    /// Effective intervals from our offer and the server's `CONNECTED` reply.
    ///
    /// We send every `max(client.outgoing, server.incoming)` and expect beats
    /// every `max(server.outgoing, client.incoming)`. Either side advertising
    /// zero disables the direction.
    pub fn negotiate(client: Self, server: Self) -> Self {
        let pick = |ours: Duration, theirs: Duration| {
            if ours.is_zero() || theirs.is_zero() { Duration::ZERO } else { ours.max(theirs) }
        };
        Self {
            outgoing: pick(client.outgoing, server.incoming),
            incoming: pick(client.incoming, server.outgoing),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn parse_header() {
        assert_eq!(HeartBeat::parse("4000,10000").unwrap(), HeartBeat::new(ms(4000), ms(10000)));
        assert_eq!(HeartBeat::parse("0,0").unwrap(), HeartBeat::disabled());
        assert!(HeartBeat::parse("4000").is_err());
        assert!(HeartBeat::parse("a,b").is_err());
    }

    #[test]
    fn negotiation_takes_the_slower_side() {
        let client = HeartBeat::new(ms(4000), ms(4000));
        let server = HeartBeat::new(ms(10000), ms(2000));
        assert_eq!(HeartBeat::negotiate(client, server), HeartBeat::new(ms(4000), ms(10000)));
    }

    #[test]
    fn zero_disables_direction() {
        let client = HeartBeat::new(ms(4000), ms(4000));
        let server = HeartBeat::new(ms(0), ms(5000));
        assert_eq!(HeartBeat::negotiate(client, server), HeartBeat::new(ms(5000), ms(0)));
    }
}
