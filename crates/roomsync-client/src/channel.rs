//! Transport channel: one STOMP session over one WebSocket, kept alive.
//!
//! [`Channel::open`] dials the broker and completes the `CONNECT` /
//! `CONNECTED` exchange within the connect timeout, then hands the live
//! connection to a channel task. The task owns the socket and does
//! everything else:
//!
//! - writes queued publishes and subscription changes
//! - reads `MESSAGE` frames and dispatches them through the
//!   [`SubscriptionRegistry`]
//! - sends heartbeats and watches for broker silence
//! - on unexpected loss, waits the reconnect delay, dials again, and
//!   replays every registered subscription, forever, until torn down
//!
//! ```text
//! Channel (handle) ──commands──→ ChannelActor ──frames──→ broker
//!        ↑                           │
//!        └──── watch / broadcast ────┘
//! ```

use std::fmt;
use std::sync::Arc;

use roomsync_protocol::{
    decode_packets, Codec, Command, EventKind, Frame, HeartBeat, JsonCodec, Negotiated, Packet,
    RoomEvent, RoomId, SocketId, STOMP_VERSION,
};
use roomsync_transport::{Connection, Connector, TransportError, WebSocketConnector};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::registry::{SubscriptionId, SubscriptionRegistry};
use crate::router::{Publisher, SubscriptionHandle};
use crate::{ClientConfig, ClientError};

// ---------------------------------------------------------------------------
// Observable state
// ---------------------------------------------------------------------------

/// Lifecycle of a channel's connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Dialing, or waiting to redial after a loss.
    Connecting,
    /// `CONNECTED` received; publishes go out.
    Open,
    /// Torn down on request.
    Closed,
    /// The initial open failed; no channel was created.
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Something observable happened on the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    StateChanged(ConnectionState),
    /// A transport or broker error. The channel keeps running.
    Error(String),
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Requests from handles to the channel task.
#[derive(Debug)]
pub(crate) enum ChannelCommand {
    Publish {
        destination: String,
        body: Vec<u8>,
    },
    Subscribe {
        id: SubscriptionId,
    },
    Unsubscribe {
        id: SubscriptionId,
    },
    Disconnect {
        unsubscribe: Vec<SubscriptionId>,
        done: oneshot::Sender<()>,
    },
}

// ---------------------------------------------------------------------------
// Channel handle
// ---------------------------------------------------------------------------

/// An open connection to a room broker.
///
/// Owned by whoever opened it. Dropping the channel without calling
/// [`disconnect`](Self::disconnect) still stops the channel task once the
/// last handle is gone.
pub struct Channel {
    commands: mpsc::UnboundedSender<ChannelCommand>,
    state: watch::Receiver<ConnectionState>,
    session: watch::Receiver<Option<SocketId>>,
    events: broadcast::Sender<ConnectionEvent>,
    registry: Arc<SubscriptionRegistry>,
}

impl Channel {
    /// Opens a WebSocket channel to `endpoint` (e.g. `ws://host:port/ws`).
    ///
    /// # Errors
    /// - [`ClientError::ConnectionTimeout`] if no `CONNECTED` arrives within
    ///   [`ClientConfig::connect_timeout`], even if the socket never
    ///   answers at all.
    /// - [`ClientError::ConnectionFailed`] if the socket is refused or the
    ///   broker answers with `ERROR`.
    pub async fn open(endpoint: &str, config: ClientConfig) -> Result<Self, ClientError> {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self::open_with(WebSocketConnector, endpoint, config, events).await
    }

    /// Opens a channel with a custom connector, reporting to `events`.
    ///
    /// Passing the event sender in lets a caller observe the
    /// `Connecting → Failed` transition of an open that never produces a
    /// channel.
    pub async fn open_with<C>(
        connector: C,
        endpoint: &str,
        config: ClientConfig,
        events: broadcast::Sender<ConnectionEvent>,
    ) -> Result<Self, ClientError>
    where
        C: Connector<Error = TransportError>,
        C::Connection: Connection<Error = TransportError>,
    {
        let _ = events.send(ConnectionEvent::StateChanged(ConnectionState::Connecting));
        tracing::info!(endpoint, "connecting");

        let attempt = handshake(&connector, endpoint, &config);
        let link = match tokio::time::timeout(config.connect_timeout, attempt).await {
            Ok(Ok(link)) => link,
            Ok(Err(e)) => {
                tracing::error!(endpoint, error = %e, "connection failed");
                let _ = events.send(ConnectionEvent::Error(e.to_string()));
                let _ = events.send(ConnectionEvent::StateChanged(ConnectionState::Failed));
                return Err(e);
            }
            Err(_) => {
                let err = ClientError::ConnectionTimeout(config.connect_timeout);
                tracing::error!(endpoint, error = %err, "connection failed");
                let _ = events.send(ConnectionEvent::Error(err.to_string()));
                let _ = events.send(ConnectionEvent::StateChanged(ConnectionState::Failed));
                return Err(err);
            }
        };
        tracing::info!(endpoint, session = ?link.session, "connected");

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Open);
        let (session_tx, session_rx) = watch::channel(link.session.clone());
        let registry = Arc::new(SubscriptionRegistry::new());
        let _ = events.send(ConnectionEvent::StateChanged(ConnectionState::Open));

        let actor = ChannelActor {
            connector,
            endpoint: endpoint.to_string(),
            config,
            registry: Arc::clone(&registry),
            commands: commands_rx,
            state: state_tx,
            session: session_tx,
            events: events.clone(),
            shutdown_ack: None,
        };
        tokio::spawn(actor.run(link));

        Ok(Self {
            commands: commands_tx,
            state: state_rx,
            session: session_rx,
            events,
            registry,
        })
    }

    /// Publishes `event` to `/app/<type>`. Dropped with a warning if the
    /// channel is not open.
    pub fn publish(&self, event: &RoomEvent) {
        self.publisher().publish(event);
    }

    /// Returns a cloneable publishing handle.
    pub fn publisher(&self) -> Publisher {
        Publisher::new(
            self.commands.downgrade(),
            self.state.clone(),
            self.session.clone(),
        )
    }

    /// Subscribes to `kind` events on `room_id`.
    ///
    /// `callback` runs on the channel task for each matching event, in
    /// broker delivery order. Events of other kinds on the same room are
    /// not delivered to it.
    pub fn subscribe<F>(&self, kind: EventKind, room_id: &RoomId, callback: F) -> SubscriptionHandle
    where
        F: FnMut(RoomEvent, &RoomId) + Send + 'static,
    {
        let id = self.registry.register(room_id.clone(), kind, Box::new(callback));
        tracing::debug!(subscription = %id, room = %room_id, %kind, "subscribing");
        let _ = self.commands.send(ChannelCommand::Subscribe { id });
        SubscriptionHandle::new(id, Arc::clone(&self.registry), self.commands.downgrade())
    }

    /// Tears down every subscription, then closes the connection.
    ///
    /// Once this returns no callback of this channel runs again. Calling it
    /// a second time does nothing.
    pub async fn disconnect(&self) {
        let unsubscribe = self.registry.teardown_all();
        let (done, wait) = oneshot::channel();
        let command = ChannelCommand::Disconnect { unsubscribe, done };
        if self.commands.send(command).is_err() {
            return;
        }
        let _ = wait.await;
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// A receiver that observes every state change.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    pub fn events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    /// The broker-assigned session id of the current connection.
    pub fn session_id(&self) -> Option<SocketId> {
        self.session.borrow().clone()
    }

    pub fn subscription_count(&self) -> usize {
        self.registry.len()
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("state", &self.state())
            .field("session", &self.session_id())
            .field("subscriptions", &self.registry.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Handshake
// ---------------------------------------------------------------------------

/// A connection that has completed the STOMP handshake.
struct Link<T> {
    conn: T,
    session: Option<SocketId>,
    heartbeat: Negotiated,
}

async fn handshake<C>(
    connector: &C,
    endpoint: &str,
    config: &ClientConfig,
) -> Result<Link<C::Connection>, ClientError>
where
    C: Connector<Error = TransportError>,
    C::Connection: Connection<Error = TransportError>,
{
    let failed = |e: TransportError| ClientError::ConnectionFailed(e.to_string());

    let conn = connector.connect(endpoint).await.map_err(failed)?;
    let ours = config.heartbeat.advertised();
    let connect = Frame::new(Command::Connect)
        .header("accept-version", STOMP_VERSION)
        .header("host", host_of(endpoint))
        .header("heart-beat", ours.to_header());
    conn.send(&connect.encode()).await.map_err(failed)?;

    loop {
        let data = conn
            .recv()
            .await
            .map_err(failed)?
            .ok_or_else(|| ClientError::ConnectionFailed("closed during handshake".into()))?;

        for packet in decode_packets(&data)? {
            let Packet::Frame(frame) = packet else {
                continue;
            };
            match frame.command {
                Command::Connected => {
                    let theirs = match frame.get("heart-beat") {
                        Some(value) => HeartBeat::parse(value)?,
                        None => HeartBeat::default(),
                    };
                    return Ok(Link {
                        session: frame.get("session").map(SocketId::new),
                        heartbeat: ours.negotiate(theirs),
                        conn,
                    });
                }
                Command::Error => return Err(ClientError::ConnectionFailed(error_message(&frame))),
                other => tracing::debug!(command = %other, "ignoring frame before CONNECTED"),
            }
        }
    }
}

/// `ws://host:port/path` → `host:port`.
fn host_of(endpoint: &str) -> &str {
    let rest = endpoint.split_once("://").map_or(endpoint, |(_, rest)| rest);
    rest.split(['/', '?']).next().unwrap_or(rest)
}

fn error_message(frame: &Frame) -> String {
    match frame.get("message") {
        Some(message) => message.to_string(),
        None => String::from_utf8_lossy(&frame.body).into_owned(),
    }
}

fn subscribe_frame(id: SubscriptionId, destination: &str) -> Frame {
    Frame::new(Command::Subscribe)
        .header("id", id.to_string())
        .header("destination", destination)
        .header("ack", "auto")
}

fn unsubscribe_frame(id: SubscriptionId) -> Frame {
    Frame::new(Command::Unsubscribe).header("id", id.to_string())
}

// ---------------------------------------------------------------------------
// Channel actor
// ---------------------------------------------------------------------------

enum Outcome {
    Shutdown,
    Lost(String),
}

struct ChannelActor<C: Connector> {
    connector: C,
    endpoint: String,
    config: ClientConfig,
    registry: Arc<SubscriptionRegistry>,
    commands: mpsc::UnboundedReceiver<ChannelCommand>,
    state: watch::Sender<ConnectionState>,
    session: watch::Sender<Option<SocketId>>,
    events: broadcast::Sender<ConnectionEvent>,
    shutdown_ack: Option<oneshot::Sender<()>>,
}

impl<C> ChannelActor<C>
where
    C: Connector<Error = TransportError>,
    C::Connection: Connection<Error = TransportError>,
{
    async fn run(mut self, link: Link<C::Connection>) {
        let mut link = link;
        loop {
            match self.serve(&link).await {
                Outcome::Shutdown => break,
                Outcome::Lost(reason) => {
                    tracing::warn!(endpoint = %self.endpoint, %reason, "connection lost");
                    let _ = link.conn.close().await;
                    self.emit(ConnectionEvent::Error(reason));
                    match self.reconnect().await {
                        Some(next) => link = next,
                        None => break,
                    }
                }
            }
        }

        self.registry.teardown_all();
        self.session.send_replace(None);
        self.set_state(ConnectionState::Closed);
        tracing::info!(endpoint = %self.endpoint, "channel closed");
        if let Some(ack) = self.shutdown_ack.take() {
            let _ = ack.send(());
        }
    }

    /// Drives one live connection until it is lost or shut down.
    async fn serve(&mut self, link: &Link<C::Connection>) -> Outcome {
        let conn = &link.conn;

        for (id, destination) in self.registry.destinations() {
            if let Err(e) = conn.send(&subscribe_frame(id, &destination).encode()).await {
                return Outcome::Lost(e.to_string());
            }
        }
        self.session.send_replace(link.session.clone());
        self.set_state(ConnectionState::Open);

        let mut heartbeat = link.heartbeat.send_every.map(|every| {
            let mut interval = tokio::time::interval_at(Instant::now() + every, every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });
        let silence_limit = link
            .heartbeat
            .expect_every
            .map(|every| every * self.config.heartbeat.silence_factor.max(1));
        let mut last_heard = Instant::now();

        loop {
            let deadline = silence_limit.map(|limit| last_heard + limit);
            tokio::select! {
                command = self.commands.recv() => {
                    let command = match command {
                        Some(command) => command,
                        // Every handle is gone.
                        None => ChannelCommand::Disconnect {
                            unsubscribe: self.registry.teardown_all(),
                            done: oneshot::channel().0,
                        },
                    };
                    match self.execute(conn, command).await {
                        Ok(true) => return Outcome::Shutdown,
                        Ok(false) => {}
                        Err(e) => return Outcome::Lost(e.to_string()),
                    }
                }
                incoming = conn.recv() => match incoming {
                    Ok(Some(data)) => {
                        last_heard = Instant::now();
                        self.handle_inbound(&data);
                    }
                    Ok(None) => return Outcome::Lost("closed by broker".into()),
                    Err(e) => return Outcome::Lost(e.to_string()),
                },
                _ = tick(&mut heartbeat) => {
                    if let Err(e) = conn.send(b"\n").await {
                        return Outcome::Lost(e.to_string());
                    }
                }
                _ = sleep_until(deadline) => {
                    return Outcome::Lost(format!(
                        "broker silent for {:?}",
                        silence_limit.unwrap_or_default()
                    ));
                }
            }
        }
    }

    /// Carries out one command on a live connection. Returns `Ok(true)` when
    /// the channel should shut down.
    async fn execute(
        &mut self,
        conn: &C::Connection,
        command: ChannelCommand,
    ) -> Result<bool, TransportError> {
        match command {
            ChannelCommand::Publish { destination, body } => {
                tracing::debug!(%destination, bytes = body.len(), "SEND");
                let frame = Frame::new(Command::Send)
                    .header("destination", destination)
                    .header("content-type", JsonCodec.content_type())
                    .body(body);
                conn.send(&frame.encode()).await?;
                Ok(false)
            }
            ChannelCommand::Subscribe { id } => {
                // Unsubscribed before the command got here.
                let Some(destination) = self.registry.destination_of(id) else {
                    return Ok(false);
                };
                conn.send(&subscribe_frame(id, &destination).encode()).await?;
                Ok(false)
            }
            ChannelCommand::Unsubscribe { id } => {
                conn.send(&unsubscribe_frame(id).encode()).await?;
                Ok(false)
            }
            ChannelCommand::Disconnect { unsubscribe, done } => {
                self.shutdown_ack = Some(done);
                for id in unsubscribe {
                    if conn.send(&unsubscribe_frame(id).encode()).await.is_err() {
                        break;
                    }
                }
                let goodbye = Frame::new(Command::Disconnect).header("receipt", "disconnect");
                if let Err(e) = conn.send(&goodbye.encode()).await {
                    tracing::debug!(error = %e, "DISCONNECT not delivered");
                }
                let _ = conn.close().await;
                Ok(true)
            }
        }
    }

    fn handle_inbound(&self, data: &[u8]) {
        let packets = match decode_packets(data) {
            Ok(packets) => packets,
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed frame");
                return;
            }
        };

        for packet in packets {
            let Packet::Frame(frame) = packet else {
                continue;
            };
            match frame.command {
                Command::Message => self.deliver(&frame),
                Command::Error => {
                    let message = error_message(&frame);
                    tracing::warn!(%message, "broker reported an error");
                    self.emit(ConnectionEvent::Error(message));
                }
                Command::Receipt => {
                    tracing::debug!(receipt = ?frame.get("receipt-id"), "receipt");
                }
                other => tracing::debug!(command = %other, "ignoring unexpected frame"),
            }
        }
    }

    fn deliver(&self, frame: &Frame) {
        let Some(id) = frame.get("subscription").and_then(SubscriptionId::parse) else {
            tracing::warn!(destination = ?frame.get("destination"), "MESSAGE without a known subscription");
            return;
        };
        let event: RoomEvent = match JsonCodec.decode(&frame.body) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(subscription = %id, error = %e, "dropping undecodable message");
                return;
            }
        };
        self.registry.dispatch(id, event);
    }

    /// Waits out the reconnect delay and dials again until a connection
    /// succeeds. Returns `None` if the channel is torn down meanwhile.
    async fn reconnect(&mut self) -> Option<Link<C::Connection>> {
        let mut attempt: u64 = 0;
        loop {
            attempt += 1;
            self.set_state(ConnectionState::Connecting);
            tracing::info!(
                endpoint = %self.endpoint,
                attempt,
                delay = ?self.config.reconnect_delay,
                "reconnecting"
            );

            let delay = tokio::time::sleep(self.config.reconnect_delay);
            tokio::pin!(delay);
            loop {
                tokio::select! {
                    _ = &mut delay => break,
                    command = self.commands.recv() => {
                        if Self::handle_offline(command, &mut self.shutdown_ack) {
                            return None;
                        }
                    }
                }
            }

            let dial = tokio::time::timeout(
                self.config.connect_timeout,
                handshake(&self.connector, &self.endpoint, &self.config),
            );
            tokio::pin!(dial);
            let result = loop {
                tokio::select! {
                    result = &mut dial => break result,
                    command = self.commands.recv() => {
                        if Self::handle_offline(command, &mut self.shutdown_ack) {
                            return None;
                        }
                    }
                }
            };

            match result {
                Ok(Ok(link)) => {
                    tracing::info!(endpoint = %self.endpoint, attempt, session = ?link.session, "reconnected");
                    return Some(link);
                }
                Ok(Err(e)) => {
                    tracing::warn!(endpoint = %self.endpoint, attempt, error = %e, "reconnect attempt failed");
                    self.emit(ConnectionEvent::Error(e.to_string()));
                }
                Err(_) => {
                    let err = ClientError::ConnectionTimeout(self.config.connect_timeout);
                    tracing::warn!(endpoint = %self.endpoint, attempt, error = %err, "reconnect attempt failed");
                    self.emit(ConnectionEvent::Error(err.to_string()));
                }
            }
        }
    }

    /// Handles a command while no connection is up. Returns `true` when the
    /// channel should shut down.
    fn handle_offline(
        command: Option<ChannelCommand>,
        shutdown_ack: &mut Option<oneshot::Sender<()>>,
    ) -> bool {
        match command {
            Some(ChannelCommand::Publish { destination, .. }) => {
                tracing::warn!(%destination, "not connected, dropping publish");
                false
            }
            // Registered subscriptions are replayed on reconnect.
            Some(ChannelCommand::Subscribe { .. } | ChannelCommand::Unsubscribe { .. }) => false,
            Some(ChannelCommand::Disconnect { done, .. }) => {
                *shutdown_ack = Some(done);
                true
            }
            None => true,
        }
    }

    fn set_state(&self, next: ConnectionState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
        if changed {
            tracing::debug!(endpoint = %self.endpoint, state = %next, "connection state changed");
            self.emit(ConnectionEvent::StateChanged(next));
        }
    }

    fn emit(&self, event: ConnectionEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
