//! Destination subscriptions and `MESSAGE` fan-out.

use std::collections::HashMap;

use roomsync_protocol::{Command, Frame, SocketId};
use tokio::sync::mpsc;

/// Encoded frames queued for one connection's writer.
pub(crate) type Outbox = mpsc::UnboundedSender<Vec<u8>>;

#[derive(Debug)]
struct Subscriber {
    session: SocketId,
    id: String,
    outbox: Outbox,
}

/// Subscribers per destination.
#[derive(Debug, Default)]
pub(crate) struct Topics {
    by_destination: HashMap<String, Vec<Subscriber>>,
    next_message: u64,
}

impl Topics {
    /// Adds a subscription. Re-using an id on the same session replaces the
    /// previous subscription with that id.
    pub(crate) fn subscribe(
        &mut self,
        destination: &str,
        session: &SocketId,
        id: &str,
        outbox: Outbox,
    ) {
        self.unsubscribe(session, id);
        self.by_destination
            .entry(destination.to_string())
            .or_default()
            .push(Subscriber {
                session: session.clone(),
                id: id.to_string(),
                outbox,
            });
    }

    /// Removes one subscription. Returns `false` if there was none.
    pub(crate) fn unsubscribe(&mut self, session: &SocketId, id: &str) -> bool {
        let mut removed = false;
        self.by_destination.retain(|_, subs| {
            let before = subs.len();
            subs.retain(|s| !(&s.session == session && s.id == id));
            removed |= subs.len() != before;
            !subs.is_empty()
        });
        removed
    }

    /// Removes every subscription of `session`.
    pub(crate) fn remove_session(&mut self, session: &SocketId) {
        self.by_destination.retain(|_, subs| {
            subs.retain(|s| &s.session != session);
            !subs.is_empty()
        });
    }

    /// Sends `body` as a `MESSAGE` to every subscriber of `destination`.
    /// Returns how many subscribers it reached.
    pub(crate) fn publish(&mut self, destination: &str, body: &[u8]) -> usize {
        let Some(subs) = self.by_destination.get_mut(destination) else {
            return 0;
        };

        let mut next_message = self.next_message;
        let mut delivered = 0;
        subs.retain(|sub| {
            next_message += 1;
            let frame = Frame::new(Command::Message)
                .header("destination", destination)
                .header("subscription", sub.id.as_str())
                .header("message-id", format!("msg-{next_message}"))
                .header("content-type", "application/json")
                .body(body.to_vec());
            // A closed outbox means the connection is gone.
            let alive = sub.outbox.send(frame.encode()).is_ok();
            delivered += usize::from(alive);
            alive
        });
        self.next_message = next_message;
        delivered
    }

    #[cfg(test)]
    pub(crate) fn subscriber_count(&self, destination: &str) -> usize {
        self.by_destination.get(destination).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use roomsync_protocol::{decode_packets, Packet};

    use super::*;

    fn message(bytes: &[u8]) -> Frame {
        match decode_packets(bytes).unwrap().pop() {
            Some(Packet::Frame(frame)) => frame,
            other => panic!("expected frame, got {other:?}"),
        }
    }

    #[test]
    fn test_publish_reaches_only_that_destination() {
        let mut topics = Topics::default();
        let (abc_tx, mut abc_rx) = mpsc::unbounded_channel();
        let (xyz_tx, mut xyz_rx) = mpsc::unbounded_channel();
        topics.subscribe("/topic/room/abc", &SocketId::new("s1"), "sub-1", abc_tx);
        topics.subscribe("/topic/room/xyz", &SocketId::new("s2"), "sub-1", xyz_tx);

        assert_eq!(topics.publish("/topic/room/abc", b"{}"), 1);

        let frame = message(&abc_rx.try_recv().unwrap());
        assert_eq!(frame.command, Command::Message);
        assert_eq!(frame.get("subscription"), Some("sub-1"));
        assert_eq!(frame.get("destination"), Some("/topic/room/abc"));
        assert!(xyz_rx.try_recv().is_err());
    }

    #[test]
    fn test_subscribe_same_id_replaces() {
        let mut topics = Topics::default();
        let (tx, _rx) = mpsc::unbounded_channel();
        topics.subscribe("/topic/room/abc", &SocketId::new("s1"), "sub-1", tx.clone());
        topics.subscribe("/topic/room/abc", &SocketId::new("s1"), "sub-1", tx);
        assert_eq!(topics.subscriber_count("/topic/room/abc"), 1);
    }

    #[test]
    fn test_unsubscribe_twice_second_is_false() {
        let mut topics = Topics::default();
        let (tx, _rx) = mpsc::unbounded_channel();
        topics.subscribe("/topic/room/abc", &SocketId::new("s1"), "sub-1", tx);
        assert!(topics.unsubscribe(&SocketId::new("s1"), "sub-1"));
        assert!(!topics.unsubscribe(&SocketId::new("s1"), "sub-1"));
        assert_eq!(topics.subscriber_count("/topic/room/abc"), 0);
    }

    #[test]
    fn test_publish_prunes_closed_outboxes() {
        let mut topics = Topics::default();
        let (tx, rx) = mpsc::unbounded_channel();
        topics.subscribe("/topic/room/abc", &SocketId::new("s1"), "sub-1", tx);
        drop(rx);

        assert_eq!(topics.publish("/topic/room/abc", b"{}"), 0);
        assert_eq!(topics.subscriber_count("/topic/room/abc"), 0);
    }

    #[test]
    fn test_remove_session_drops_all_its_subscriptions() {
        let mut topics = Topics::default();
        let (tx, _rx) = mpsc::unbounded_channel();
        topics.subscribe("/topic/room/abc", &SocketId::new("s1"), "sub-1", tx.clone());
        topics.subscribe("/topic/room/xyz", &SocketId::new("s1"), "sub-2", tx.clone());
        topics.subscribe("/topic/room/abc", &SocketId::new("s2"), "sub-1", tx);

        topics.remove_session(&SocketId::new("s1"));

        assert_eq!(topics.subscriber_count("/topic/room/abc"), 1);
        assert_eq!(topics.subscriber_count("/topic/room/xyz"), 0);
    }
}
