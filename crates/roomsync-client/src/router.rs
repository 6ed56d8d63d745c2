//! Topic router: room events in, room events out.
//!
//! Publishing maps an event to `/app/<type lowercased>`; subscribing maps
//! a room to `/topic/room/<roomId>` and filters by event type. Both sides
//! are fire-and-forget: nothing here returns a transport error.

use std::sync::Arc;

use roomsync_protocol::{destination, Codec, JsonCodec, RoomEvent, SocketId};
use tokio::sync::{mpsc, watch};

use crate::channel::ChannelCommand;
use crate::registry::{SubscriptionId, SubscriptionRegistry};
use crate::ConnectionState;

/// A cheap, cloneable handle for publishing room events on a channel.
///
/// Holding a publisher does not keep the channel alive.
#[derive(Debug, Clone)]
pub struct Publisher {
    commands: mpsc::WeakUnboundedSender<ChannelCommand>,
    state: watch::Receiver<ConnectionState>,
    session: watch::Receiver<Option<SocketId>>,
}

impl Publisher {
    pub(crate) fn new(
        commands: mpsc::WeakUnboundedSender<ChannelCommand>,
        state: watch::Receiver<ConnectionState>,
        session: watch::Receiver<Option<SocketId>>,
    ) -> Self {
        Self {
            commands,
            state,
            session,
        }
    }

    /// Serializes `event` and sends it to its `/app/...` destination.
    ///
    /// If the channel is not open the event is dropped with a warning.
    /// Nothing is queued for later.
    pub fn publish(&self, event: &RoomEvent) {
        let kind = event.kind();
        let state = *self.state.borrow();
        if state != ConnectionState::Open {
            tracing::warn!(%kind, %state, "not connected, dropping publish");
            return;
        }

        let body = match JsonCodec.encode(event) {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(%kind, error = %e, "failed to encode event");
                return;
            }
        };
        let command = ChannelCommand::Publish {
            destination: destination::publish_destination(kind),
            body,
        };
        let sent = self
            .commands
            .upgrade()
            .is_some_and(|tx| tx.send(command).is_ok());
        if !sent {
            tracing::warn!(%kind, "channel closed, dropping publish");
        }
    }

    /// The broker-assigned session id of the current connection.
    pub fn session_id(&self) -> Option<SocketId> {
        self.session.borrow().clone()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }
}

/// A live subscription created by [`Channel::subscribe`](crate::Channel::subscribe).
///
/// Dropping the handle leaves the subscription in place until the channel
/// is torn down; call [`unsubscribe`](Self::unsubscribe) to end it early.
#[derive(Debug)]
pub struct SubscriptionHandle {
    id: SubscriptionId,
    registry: Arc<SubscriptionRegistry>,
    commands: mpsc::WeakUnboundedSender<ChannelCommand>,
}

impl SubscriptionHandle {
    pub(crate) fn new(
        id: SubscriptionId,
        registry: Arc<SubscriptionRegistry>,
        commands: mpsc::WeakUnboundedSender<ChannelCommand>,
    ) -> Self {
        Self {
            id,
            registry,
            commands,
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Returns `true` until the subscription is removed, individually or by
    /// channel teardown.
    pub fn is_active(&self) -> bool {
        self.registry.contains(self.id)
    }

    /// Ends this subscription. Does nothing if teardown already removed it.
    pub fn unsubscribe(self) {
        if !self.registry.unregister(self.id) {
            return;
        }
        if let Some(tx) = self.commands.upgrade() {
            let _ = tx.send(ChannelCommand::Unsubscribe { id: self.id });
        }
    }
}
