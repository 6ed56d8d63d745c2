//! Subscription registry: the callbacks a channel delivers room events to.
//!
//! One registry per [`Channel`](crate::Channel). The channel task looks
//! subscriptions up by id when a `MESSAGE` frame arrives; callers add and
//! remove them from any task.
//!
//! Each callback lives in its own mutex-guarded slot. Dispatch holds the
//! slot lock while the callback runs, and [`teardown_all`] takes every slot
//! under that same lock, so once teardown returns no callback is running
//! and none will run again.
//!
//! [`teardown_all`]: SubscriptionRegistry::teardown_all

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use roomsync_protocol::{destination, EventKind, RoomEvent, RoomId};

/// A room event callback. Receives the event and the room it was
/// subscribed on.
pub type EventCallback = Box<dyn FnMut(RoomEvent, &RoomId) + Send + 'static>;

/// Identifies one subscription. Doubles as the STOMP subscription `id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Parses the `subscription` header of a `MESSAGE` frame.
    pub fn parse(header: &str) -> Option<Self> {
        header.strip_prefix("sub-")?.parse().ok().map(Self)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

struct Slot {
    active: AtomicBool,
    callback: Mutex<Option<EventCallback>>,
}

struct Entry {
    id: SubscriptionId,
    room_id: RoomId,
    destination: String,
    kind: EventKind,
    slot: Arc<Slot>,
}

/// The set of live subscriptions for one channel.
pub struct SubscriptionRegistry {
    next_id: AtomicU64,
    entries: Mutex<Vec<Entry>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Adds a subscription to `kind` events on `room_id`.
    pub fn register(
        &self,
        room_id: RoomId,
        kind: EventKind,
        callback: EventCallback,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let entry = Entry {
            id,
            destination: destination::room_topic(&room_id),
            room_id,
            kind,
            slot: Arc::new(Slot {
                active: AtomicBool::new(true),
                callback: Mutex::new(Some(callback)),
            }),
        };
        lock(&self.entries).push(entry);
        id
    }

    /// Removes one subscription. Returns `false` if it was already gone.
    ///
    /// Safe to call from inside the subscription's own callback: the slot
    /// is deactivated rather than waited on.
    pub fn unregister(&self, id: SubscriptionId) -> bool {
        let mut entries = lock(&self.entries);
        let Some(pos) = entries.iter().position(|e| e.id == id) else {
            return false;
        };
        let entry = entries.remove(pos);
        entry.slot.active.store(false, Ordering::Release);
        true
    }

    /// Delivers `event` to subscription `id` if its event kind matches.
    ///
    /// Returns `true` if a callback ran.
    pub fn dispatch(&self, id: SubscriptionId, event: RoomEvent) -> bool {
        let found = lock(&self.entries)
            .iter()
            .find(|e| e.id == id)
            .map(|e| (e.kind, e.room_id.clone(), Arc::clone(&e.slot)));
        let Some((kind, room_id, slot)) = found else {
            tracing::debug!(subscription = %id, "message for unknown subscription");
            return false;
        };
        if event.kind() != kind {
            return false;
        }

        let mut callback = lock(&slot.callback);
        if !slot.active.load(Ordering::Acquire) {
            return false;
        }
        match callback.as_mut() {
            Some(cb) => {
                cb(event, &room_id);
                true
            }
            None => false,
        }
    }

    /// Removes every subscription and returns their ids.
    ///
    /// Waits for any callback that is running right now to finish. Calling
    /// it again returns an empty list. Must not be called from inside a
    /// callback.
    pub fn teardown_all(&self) -> Vec<SubscriptionId> {
        let drained: Vec<Entry> = lock(&self.entries).drain(..).collect();
        for entry in &drained {
            entry.slot.active.store(false, Ordering::Release);
            lock(&entry.slot.callback).take();
        }
        if !drained.is_empty() {
            tracing::debug!(count = drained.len(), "tore down subscriptions");
        }
        drained.into_iter().map(|e| e.id).collect()
    }

    /// Returns `true` if `id` is still registered.
    pub fn contains(&self, id: SubscriptionId) -> bool {
        lock(&self.entries).iter().any(|e| e.id == id)
    }

    /// Snapshot of `(id, destination)` for every live subscription, in
    /// registration order.
    pub fn destinations(&self) -> Vec<(SubscriptionId, String)> {
        lock(&self.entries)
            .iter()
            .map(|e| (e.id, e.destination.clone()))
            .collect()
    }

    pub fn destination_of(&self, id: SubscriptionId) -> Option<String> {
        lock(&self.entries)
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.destination.clone())
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("len", &self.len())
            .finish()
    }
}
