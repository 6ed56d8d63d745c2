//! Connection and session timing policy.

use std::time::Duration;

use roomsync_protocol::HeartBeat;

/// Heartbeat policy for one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// How often we offer to send heartbeats.
    pub outgoing: Duration,
    /// How often we want to hear from the broker.
    pub incoming: Duration,
    /// The connection is considered dead after this many incoming
    /// intervals without any traffic.
    pub silence_factor: u32,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            outgoing: Duration::from_millis(4000),
            incoming: Duration::from_millis(4000),
            silence_factor: 3,
        }
    }
}

impl HeartbeatConfig {
    /// Disables heartbeats in both directions.
    pub fn disabled() -> Self {
        Self {
            outgoing: Duration::ZERO,
            incoming: Duration::ZERO,
            ..Self::default()
        }
    }

    /// The `heart-beat` header value we advertise on `CONNECT`.
    pub fn advertised(&self) -> HeartBeat {
        HeartBeat::new(
            self.outgoing.as_millis() as u64,
            self.incoming.as_millis() as u64,
        )
    }
}

/// Client-side policy knobs.
///
/// The defaults are the contract values: 10 s to connect, 4 s heartbeats,
/// a flat 5 s between reconnect attempts, 10 s for the room to answer a
/// JOIN.
///
/// ```rust
/// use std::time::Duration;
/// use roomsync_client::ClientConfig;
///
/// let config = ClientConfig::default().with_reconnect_delay(Duration::from_millis(500));
/// assert_eq!(config.connect_timeout, Duration::from_secs(10));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub connect_timeout: Duration,
    pub heartbeat: HeartbeatConfig,
    pub reconnect_delay: Duration,
    pub join_timeout: Duration,
    /// Capacity of the connection event broadcast.
    pub event_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            heartbeat: HeartbeatConfig::default(),
            reconnect_delay: Duration::from_millis(5000),
            join_timeout: Duration::from_secs(10),
            event_capacity: 64,
        }
    }
}

impl ClientConfig {
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_heartbeat(mut self, heartbeat: HeartbeatConfig) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_carries_contract_values() {
        let config = ClientConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.heartbeat.outgoing, Duration::from_millis(4000));
        assert_eq!(config.heartbeat.incoming, Duration::from_millis(4000));
        assert_eq!(config.reconnect_delay, Duration::from_millis(5000));
        assert_eq!(config.join_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_advertised_heartbeat_header() {
        assert_eq!(HeartbeatConfig::default().advertised().to_header(), "4000,4000");
        assert_eq!(HeartbeatConfig::disabled().advertised().to_header(), "0,0");
    }

    #[test]
    fn test_with_setters_override_single_field() {
        let config = ClientConfig::default()
            .with_join_timeout(Duration::from_millis(200))
            .with_heartbeat(HeartbeatConfig::disabled());
        assert_eq!(config.join_timeout, Duration::from_millis(200));
        assert_eq!(config.heartbeat.outgoing, Duration::ZERO);
        assert_eq!(config.reconnect_delay, Duration::from_millis(5000));
    }
}
