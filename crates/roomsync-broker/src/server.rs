//! `Broker` builder and accept loop.
//!
//! The broker is the server end of a room: it accepts STOMP-over-WebSocket
//! connections, keeps the per-room participant lists, and relays room
//! events to every subscriber of the room topic.

use std::sync::Arc;
use std::time::Duration;

use roomsync_protocol::{JsonCodec, Participant, RoomId};
use roomsync_transport::{Transport, WebSocketTransport};
use tokio::sync::{watch, Mutex};

use crate::handler::handle_connection;
use crate::hub::Hub;
use crate::{BrokerConfig, BrokerError};

/// Shared broker state passed to each connection handler task.
pub(crate) struct BrokerState {
    pub(crate) hub: Mutex<Hub>,
    pub(crate) config: BrokerConfig,
    pub(crate) codec: JsonCodec,
    pub(crate) shutdown: watch::Receiver<bool>,
}

/// Builder for configuring and starting a broker.
///
/// # Example
///
/// ```rust,no_run
/// use roomsync_broker::Broker;
///
/// # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
/// let broker = Broker::builder().bind("127.0.0.1:0").build().await?;
/// println!("listening on {}", broker.local_addr()?);
/// broker.run().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct BrokerBuilder {
    config: BrokerConfig,
}

impl BrokerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the address to listen on.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Sets the heartbeat intervals advertised in `CONNECTED`.
    /// `Duration::ZERO` turns a direction off.
    pub fn heartbeat(mut self, outgoing: Duration, incoming: Duration) -> Self {
        self.config = self.config.with_heartbeat(outgoing, incoming);
        self
    }

    /// Sets how long a new socket has to upgrade and send `CONNECT`.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.with_handshake_timeout(timeout);
        self
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: BrokerConfig) -> Self {
        self.config = config;
        self
    }

    /// Binds the listener.
    pub async fn build(self) -> Result<Broker, BrokerError> {
        let transport = WebSocketTransport::bind(&self.config.bind_addr).await?;
        let (shutdown, shutdown_rx) = watch::channel(false);

        let state = Arc::new(BrokerState {
            hub: Mutex::new(Hub::default()),
            config: self.config,
            codec: JsonCodec,
            shutdown: shutdown_rx,
        });

        Ok(Broker {
            transport,
            state,
            shutdown: Arc::new(shutdown),
        })
    }
}

/// A bound broker. Call [`run()`](Self::run) to start accepting connections.
pub struct Broker {
    transport: WebSocketTransport,
    state: Arc<BrokerState>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl Broker {
    pub fn builder() -> BrokerBuilder {
        BrokerBuilder::new()
    }

    /// Returns the local address the broker is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// Returns a handle that can inspect or stop the broker once
    /// [`run()`](Self::run) owns it.
    pub fn handle(&self) -> BrokerHandle {
        BrokerHandle {
            state: Arc::clone(&self.state),
            shutdown: Arc::clone(&self.shutdown),
        }
    }

    /// Runs the accept loop until [`BrokerHandle::shutdown`] is called.
    ///
    /// Each accepted socket gets its own handler task, which also runs the
    /// WebSocket upgrade. On shutdown the listener is closed and every
    /// handler closes its connection.
    pub async fn run(mut self) -> Result<(), BrokerError> {
        tracing::info!(addr = ?self.local_addr().ok(), "broker running");
        let mut shutdown = self.state.shutdown.clone();

        loop {
            tokio::select! {
                accepted = self.transport.accept() => match accepted {
                    Ok(pending) => {
                        let state = Arc::clone(&self.state);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(pending, state).await {
                                tracing::debug!(error = %e, "connection ended with error");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                    }
                },
                _ = shutdown.changed() => break,
            }
        }

        self.transport.shutdown().await?;
        tracing::info!("broker stopped");
        Ok(())
    }
}

/// Cloneable handle to a running broker.
#[derive(Clone)]
pub struct BrokerHandle {
    state: Arc<BrokerState>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl BrokerHandle {
    /// Stops accepting and closes every connection.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Number of rooms with at least one participant.
    pub async fn room_count(&self) -> usize {
        self.state.hub.lock().await.room_count()
    }

    /// Participants of `room_id`, in join order.
    pub async fn roster(&self, room_id: &RoomId) -> Vec<Participant> {
        self.state.hub.lock().await.roster(room_id)
    }
}

impl std::fmt::Debug for BrokerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerHandle")
            .field("bind_addr", &self.state.config.bind_addr)
            .field("stopped", &*self.shutdown.borrow())
            .finish()
    }
}
