//! The per-room session: one client's participation in one room.
//!
//! [`RoomSession`] is a pure state machine. It never touches the network;
//! every input (a connection established, an inbound event, a local edit)
//! returns a list of [`SessionAction`]s for the caller to carry out:
//! events to publish and notices to hand to the view.
//!
//! ```text
//! inbound RoomEvent ──→ RoomSession::handle_event ──→ [Publish(..), Notify(..)]
//! local edit        ──→ RoomSession::edit         ──→ [Publish(CodeChange)]
//! ```

use roomsync_protocol::{
    CodeChangePayload, DisconnectedPayload, JoinPayload, JoinedPayload, LeavePayload,
    Participant, RoomEvent, RoomId, SocketId, SyncCodePayload,
};

use crate::{CodeDocument, Roster, SessionError, SessionState, UserProfile};

// ---------------------------------------------------------------------------
// Actions and notices
// ---------------------------------------------------------------------------

/// Something the caller must do after feeding the session an input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Publish this event to the room.
    Publish(RoomEvent),
    /// Tell the view something changed.
    Notify(SessionNotice),
}

/// A change the view should reflect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotice {
    /// Our own JOIN was acknowledged; the session is now active.
    Joined { socket_id: Option<SocketId> },
    /// Another participant entered the room.
    PeerJoined { socket_id: SocketId, username: String },
    /// A participant left the room.
    PeerLeft { socket_id: SocketId, username: String },
    /// The roster was replaced or shrank.
    RosterChanged(Vec<Participant>),
    /// The document was updated by a remote peer.
    DocumentChanged(String),
    /// The connection dropped while present in the room. Emitted both when
    /// the client is about to reconnect and rejoin, and when it gives up.
    ConnectionLost,
}

// ---------------------------------------------------------------------------
// RoomSession
// ---------------------------------------------------------------------------

/// One client's view of one room: lifecycle state, roster and document.
#[derive(Debug)]
pub struct RoomSession {
    room_id: RoomId,
    profile: UserProfile,
    state: SessionState,
    own_socket_id: Option<SocketId>,
    roster: Roster,
    document: CodeDocument,
}

impl RoomSession {
    pub fn new(room_id: RoomId, profile: UserProfile) -> Self {
        Self {
            room_id,
            profile,
            state: SessionState::Disconnected,
            own_socket_id: None,
            roster: Roster::new(),
            document: CodeDocument::new(),
        }
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    pub fn profile(&self) -> &UserProfile {
        &self.profile
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Our session id as assigned by the broker, once connected.
    pub fn own_socket_id(&self) -> Option<&SocketId> {
        self.own_socket_id.as_ref()
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn document(&self) -> &CodeDocument {
        &self.document
    }

    /// Starts connecting. Only legal from `Disconnected`.
    pub fn begin_connect(&mut self) -> Result<(), SessionError> {
        self.transition(SessionState::Connecting)
    }

    /// The connection is established (or re-established after a transport
    /// reconnect). Announces presence with a JOIN.
    ///
    /// `own_socket_id` is the session id the broker reported, if any.
    pub fn connected(
        &mut self,
        own_socket_id: Option<SocketId>,
    ) -> Result<Vec<SessionAction>, SessionError> {
        match self.state {
            SessionState::Joining => {}
            _ => self.transition(SessionState::Joining)?,
        }
        self.own_socket_id = own_socket_id;

        let join = JoinPayload {
            room_id: self.room_id.clone(),
            username: Some(self.profile.display_name.clone()),
            photo_url: self.profile.photo_url.clone(),
            email: self.profile.email.clone(),
        };
        Ok(vec![SessionAction::Publish(RoomEvent::Join(join))])
    }

    /// Feeds one inbound room event through the session.
    ///
    /// Events for another room, events arriving while not present, and
    /// client-to-server event types are ignored.
    pub fn handle_event(&mut self, event: RoomEvent) -> Vec<SessionAction> {
        if let Some(room) = event.room_id() {
            if room != &self.room_id {
                tracing::debug!(room = %self.room_id, other = %room, "ignoring event for another room");
                return Vec::new();
            }
        }
        if !self.state.is_present() {
            tracing::debug!(room = %self.room_id, state = %self.state, kind = %event.kind(), "ignoring event while not present");
            return Vec::new();
        }

        match event {
            RoomEvent::Joined(payload) => self.on_joined(payload),
            RoomEvent::CodeChange(payload) => self.on_code_change(payload),
            RoomEvent::SyncCode(payload) => self.on_sync_code(payload),
            RoomEvent::Disconnected(payload) => self.on_disconnected(payload),
            RoomEvent::Join(_) | RoomEvent::Leave(_) => Vec::new(),
        }
    }

    /// Applies a local edit. While active, the edit is published as a
    /// CODE_CHANGE.
    pub fn edit(&mut self, code: impl Into<String>) -> Vec<SessionAction> {
        let code = code.into();
        self.document.apply_local(&code);

        if self.state != SessionState::Active {
            return Vec::new();
        }
        vec![SessionAction::Publish(RoomEvent::CodeChange(
            CodeChangePayload {
                room_id: self.room_id.clone(),
                code: Some(code),
            },
        ))]
    }

    /// Starts leaving. Publishes a LEAVE when our session id is known.
    ///
    /// Calling this when not present in the room does nothing.
    pub fn begin_leave(&mut self) -> Vec<SessionAction> {
        if !self.state.is_present() {
            return Vec::new();
        }
        self.state = SessionState::Leaving;

        match &self.own_socket_id {
            Some(socket_id) => vec![SessionAction::Publish(RoomEvent::Leave(LeavePayload {
                socket_id: socket_id.clone(),
                room_id: self.room_id.clone(),
            }))],
            None => Vec::new(),
        }
    }

    /// Completes the leave: the session is back to `Disconnected`.
    pub fn finish_leave(&mut self) {
        self.reset();
    }

    /// The connection dropped and is being re-established. The session
    /// stays as it is so that [`connected`](Self::connected) can rejoin.
    pub fn connection_interrupted(&self) -> Vec<SessionAction> {
        if self.state.is_present() {
            tracing::info!(room = %self.room_id, "connection interrupted");
            vec![SessionAction::Notify(SessionNotice::ConnectionLost)]
        } else {
            Vec::new()
        }
    }

    /// The connection failed for good. Returns a notice if the user was
    /// present in the room.
    pub fn connection_lost(&mut self) -> Vec<SessionAction> {
        let was_present = self.state.is_present();
        self.reset();
        if was_present {
            vec![SessionAction::Notify(SessionNotice::ConnectionLost)]
        } else {
            Vec::new()
        }
    }

    // -- Event handlers ----------------------------------------------------

    fn on_joined(&mut self, payload: JoinedPayload) -> Vec<SessionAction> {
        let JoinedPayload {
            clients,
            username,
            socket_id,
            ..
        } = payload;
        let is_self = self.own_socket_id.as_ref() == Some(&socket_id);
        let mut actions = Vec::new();

        self.roster.replace(clients);

        if self.state == SessionState::Joining && (is_self || self.own_socket_id.is_none()) {
            self.state = SessionState::Active;
            tracing::info!(room = %self.room_id, socket = %socket_id, "joined room");
            actions.push(SessionAction::Notify(SessionNotice::Joined {
                socket_id: self.own_socket_id.clone(),
            }));
        }

        if !is_self {
            actions.push(SessionAction::Notify(SessionNotice::PeerJoined {
                socket_id: socket_id.clone(),
                username,
            }));
        }
        actions.push(SessionAction::Notify(SessionNotice::RosterChanged(
            self.roster.participants(),
        )));

        if !is_self && !self.document.is_empty() {
            actions.push(SessionAction::Publish(RoomEvent::SyncCode(SyncCodePayload {
                code: self.document.as_str().to_string(),
                socket_id,
                room_id: self.room_id.clone(),
            })));
        }
        actions
    }

    fn on_code_change(&mut self, payload: CodeChangePayload) -> Vec<SessionAction> {
        let Some(code) = payload.code else {
            return Vec::new();
        };
        self.apply_remote(code)
    }

    fn on_sync_code(&mut self, payload: SyncCodePayload) -> Vec<SessionAction> {
        if self.own_socket_id.as_ref() != Some(&payload.socket_id) {
            return Vec::new();
        }
        self.apply_remote(payload.code)
    }

    fn on_disconnected(&mut self, payload: DisconnectedPayload) -> Vec<SessionAction> {
        let Some(removed) = self.roster.remove(&payload.socket_id) else {
            return Vec::new();
        };
        vec![
            SessionAction::Notify(SessionNotice::PeerLeft {
                socket_id: removed.socket_id,
                username: payload.username,
            }),
            SessionAction::Notify(SessionNotice::RosterChanged(self.roster.participants())),
        ]
    }

    fn apply_remote(&mut self, code: String) -> Vec<SessionAction> {
        if self.document.apply_remote(&code) {
            vec![SessionAction::Notify(SessionNotice::DocumentChanged(code))]
        } else {
            Vec::new()
        }
    }

    fn transition(&mut self, to: SessionState) -> Result<(), SessionError> {
        if !self.state.can_transition_to(to) {
            return Err(SessionError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        tracing::debug!(room = %self.room_id, from = %self.state, to = %to, "session transition");
        self.state = to;
        Ok(())
    }

    fn reset(&mut self) {
        self.state = SessionState::Disconnected;
        self.own_socket_id = None;
        self.roster.clear();
    }
}
