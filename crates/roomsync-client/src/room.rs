//! `RoomClient`: a [`RoomSession`] driven over a [`Channel`].
//!
//! The client opens a channel, subscribes to the four server-to-client
//! event kinds on its room, announces itself with a JOIN and waits for the
//! room to answer. From then on inbound events flow through the session
//! on the channel task; the session's publishes go back out through the
//! channel and its notices are queued for [`RoomClient::next_notice`].

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use roomsync_protocol::{EventKind, Participant, RoomId, SocketId};
use roomsync_session::{
    IdentityProvider, RoomSession, SessionAction, SessionNotice, SessionState, UserProfile,
};
use roomsync_transport::{Connection, Connector, TransportError, WebSocketConnector};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::router::Publisher;
use crate::{Channel, ClientConfig, ClientError, ConnectionEvent, ConnectionState};

/// Event kinds the broker sends to room subscribers.
const INBOUND: [EventKind; 4] = [
    EventKind::Joined,
    EventKind::CodeChange,
    EventKind::SyncCode,
    EventKind::Disconnected,
];

type SharedSession = Arc<Mutex<RoomSession>>;

fn lock(session: &Mutex<RoomSession>) -> MutexGuard<'_, RoomSession> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Carries out session actions: publishes go to the channel, notices to
/// the consumer queue.
fn perform(
    actions: Vec<SessionAction>,
    publisher: &Publisher,
    notices: &mpsc::UnboundedSender<SessionNotice>,
) {
    for action in actions {
        match action {
            SessionAction::Publish(event) => publisher.publish(&event),
            SessionAction::Notify(notice) => {
                let _ = notices.send(notice);
            }
        }
    }
}

/// One user's live presence in one room.
///
/// # Example
///
/// ```rust,no_run
/// use roomsync_client::{ClientConfig, RoomClient};
/// use roomsync_protocol::RoomId;
/// use roomsync_session::UserProfile;
///
/// # async fn demo() -> Result<(), roomsync_client::ClientError> {
/// let mut client = RoomClient::join(
///     "ws://127.0.0.1:8080/ws",
///     RoomId::new("abc"),
///     UserProfile::new("Ada"),
///     ClientConfig::default(),
/// )
/// .await?;
///
/// client.edit("print(1)");
/// while let Some(notice) = client.next_notice().await {
///     println!("{notice:?}");
/// }
/// client.leave().await;
/// # Ok(())
/// # }
/// ```
pub struct RoomClient {
    channel: Channel,
    session: SharedSession,
    publisher: Publisher,
    notices: mpsc::UnboundedReceiver<SessionNotice>,
    pending: VecDeque<SessionNotice>,
    rejoin: Option<JoinHandle<()>>,
    left: bool,
}

impl RoomClient {
    /// Joins `room_id` through the broker at `endpoint`.
    ///
    /// # Errors
    /// - [`ClientError::ConnectionTimeout`] / [`ClientError::ConnectionFailed`]
    ///   if the channel cannot be opened.
    /// - [`ClientError::JoinTimeout`] if the room does not answer the JOIN
    ///   within [`ClientConfig::join_timeout`]. The channel is torn down
    ///   before the error is returned.
    pub async fn join(
        endpoint: &str,
        room_id: RoomId,
        profile: UserProfile,
        config: ClientConfig,
    ) -> Result<Self, ClientError> {
        Self::join_with(WebSocketConnector, endpoint, room_id, profile, config).await
    }

    /// Joins as whoever `identity` says the current user is.
    pub async fn join_as<I: IdentityProvider>(
        identity: &I,
        endpoint: &str,
        room_id: RoomId,
        config: ClientConfig,
    ) -> Result<Self, ClientError> {
        let profile = identity.current_user().await?;
        Self::join(endpoint, room_id, profile, config).await
    }

    /// Joins using a custom connector.
    pub async fn join_with<C>(
        connector: C,
        endpoint: &str,
        room_id: RoomId,
        profile: UserProfile,
        config: ClientConfig,
    ) -> Result<Self, ClientError>
    where
        C: Connector<Error = TransportError>,
        C::Connection: Connection<Error = TransportError>,
    {
        let session: SharedSession = Arc::new(Mutex::new(RoomSession::new(room_id.clone(), profile)));
        lock(&session).begin_connect()?;

        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let channel = match Channel::open_with(connector, endpoint, config.clone(), events).await {
            Ok(channel) => channel,
            Err(e) => {
                lock(&session).connection_lost();
                return Err(e);
            }
        };
        let publisher = channel.publisher();
        let (notice_tx, mut notices) = mpsc::unbounded_channel();

        for kind in INBOUND {
            let session = Arc::clone(&session);
            let publisher = publisher.clone();
            let notice_tx = notice_tx.clone();
            channel.subscribe(kind, &room_id, move |event, _room| {
                let actions = lock(&session).handle_event(event);
                perform(actions, &publisher, &notice_tx);
            });
        }

        let rejoin = tokio::spawn(rejoin_on_reconnect(
            channel.events(),
            Arc::clone(&session),
            publisher.clone(),
            notice_tx.clone(),
        ));

        let actions = lock(&session).connected(channel.session_id())?;
        perform(actions, &publisher, &notice_tx);
        drop(notice_tx);

        let mut pending = VecDeque::new();
        let acknowledged = tokio::time::timeout(config.join_timeout, async {
            while let Some(notice) = notices.recv().await {
                if matches!(notice, SessionNotice::Joined { .. }) {
                    return true;
                }
                pending.push_back(notice);
            }
            false
        })
        .await;

        let mut client = Self {
            channel,
            session,
            publisher,
            notices,
            pending,
            rejoin: Some(rejoin),
            left: false,
        };

        match acknowledged {
            Ok(true) => {
                tracing::info!(room = %room_id, socket = ?client.socket_id(), "room joined");
                Ok(client)
            }
            Ok(false) => {
                client.teardown().await;
                Err(ClientError::Closed)
            }
            Err(_) => {
                tracing::warn!(room = %room_id, timeout = ?config.join_timeout, "no JOINED from room");
                client.teardown().await;
                Err(ClientError::JoinTimeout(config.join_timeout))
            }
        }
    }

    /// Replaces the document with `code` and publishes it to the room.
    pub fn edit(&self, code: impl Into<String>) {
        let actions = lock(&self.session).edit(code);
        for action in actions {
            if let SessionAction::Publish(event) = action {
                self.publisher.publish(&event);
            }
        }
    }

    /// Waits for the next change to show. Returns `None` once the client
    /// has left.
    pub async fn next_notice(&mut self) -> Option<SessionNotice> {
        if let Some(notice) = self.pending.pop_front() {
            return Some(notice);
        }
        self.notices.recv().await
    }

    /// Returns a notice if one is already queued.
    pub fn try_next_notice(&mut self) -> Option<SessionNotice> {
        self.pending
            .pop_front()
            .or_else(|| self.notices.try_recv().ok())
    }

    /// Leaves the room: publishes LEAVE, tears down every subscription and
    /// closes the channel. Calling it again does nothing.
    pub async fn leave(&mut self) {
        if self.left {
            return;
        }
        let actions = lock(&self.session).begin_leave();
        for action in actions {
            if let SessionAction::Publish(event) = action {
                self.publisher.publish(&event);
            }
        }
        tracing::info!(room = %self.room_id(), "leaving room");
        self.teardown().await;
    }

    async fn teardown(&mut self) {
        self.left = true;
        if let Some(rejoin) = self.rejoin.take() {
            rejoin.abort();
        }
        self.channel.disconnect().await;
        lock(&self.session).finish_leave();

        self.pending.clear();
        self.notices.close();
        while self.notices.try_recv().is_ok() {}
    }

    pub fn room_id(&self) -> RoomId {
        lock(&self.session).room_id().clone()
    }

    /// Our session id in the room.
    pub fn socket_id(&self) -> Option<SocketId> {
        lock(&self.session).own_socket_id().cloned()
    }

    pub fn state(&self) -> SessionState {
        lock(&self.session).state()
    }

    pub fn roster(&self) -> Vec<Participant> {
        lock(&self.session).roster().participants()
    }

    /// The current document.
    pub fn document(&self) -> String {
        lock(&self.session).document().as_str().to_string()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.channel.state()
    }

    pub fn connection_events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.channel.events()
    }
}

impl Drop for RoomClient {
    fn drop(&mut self) {
        if let Some(rejoin) = self.rejoin.take() {
            rejoin.abort();
        }
    }
}

/// Reports a dropped connection, then re-announces presence once the
/// channel comes back. The broker hands out a new session id per
/// connection, so the old roster entry is gone.
async fn rejoin_on_reconnect(
    mut events: broadcast::Receiver<ConnectionEvent>,
    session: SharedSession,
    publisher: Publisher,
    notices: mpsc::UnboundedSender<SessionNotice>,
) {
    loop {
        match events.recv().await {
            Ok(ConnectionEvent::StateChanged(ConnectionState::Connecting)) => {
                let actions = lock(&session).connection_interrupted();
                perform(actions, &publisher, &notices);
            }
            Ok(ConnectionEvent::StateChanged(ConnectionState::Open)) => {
                let actions = {
                    let mut session = lock(&session);
                    if !session.state().is_present() {
                        continue;
                    }
                    match session.connected(publisher.session_id()) {
                        Ok(actions) => actions,
                        Err(e) => {
                            tracing::warn!(error = %e, "cannot rejoin after reconnect");
                            continue;
                        }
                    }
                };
                tracing::info!(socket = ?publisher.session_id(), "rejoining after reconnect");
                perform(actions, &publisher, &notices);
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "connection events lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
