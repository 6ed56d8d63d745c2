//! Broker configuration.

use std::time::Duration;

use roomsync_protocol::HeartBeat;

/// Settings for a [`Broker`](crate::Broker).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    /// Address to listen on. Port 0 picks a free port.
    pub bind_addr: String,
    /// How often the broker can send heartbeats.
    pub heartbeat_outgoing: Duration,
    /// How often the broker wants to hear from each client.
    pub heartbeat_incoming: Duration,
    /// A client is dropped after this many incoming intervals of silence.
    pub silence_factor: u32,
    /// How long a new socket has to finish the WebSocket upgrade and send
    /// `CONNECT`.
    pub handshake_timeout: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            heartbeat_outgoing: Duration::from_millis(4000),
            heartbeat_incoming: Duration::from_millis(4000),
            silence_factor: 3,
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

impl BrokerConfig {
    pub fn with_bind_addr(mut self, addr: impl Into<String>) -> Self {
        self.bind_addr = addr.into();
        self
    }

    pub fn with_heartbeat(mut self, outgoing: Duration, incoming: Duration) -> Self {
        self.heartbeat_outgoing = outgoing;
        self.heartbeat_incoming = incoming;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// The `heart-beat` header value sent in `CONNECTED`.
    pub fn advertised(&self) -> HeartBeat {
        HeartBeat::new(
            self.heartbeat_outgoing.as_millis() as u64,
            self.heartbeat_incoming.as_millis() as u64,
        )
    }
}
