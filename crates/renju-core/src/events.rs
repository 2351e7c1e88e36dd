//! Typed intra-process publish/subscribe bus.
//!
//! Handlers and the room state machine announce state changes here; the
//! notifier subscribes and translates events into push packets. The bus is
//! the only back-channel from domain logic to the I/O edge.
//!
//! # Delivery contract
//!
//! - Publish is synchronous: it returns after all live subscribers ran.
//! - Subscribers run in subscription order; a panicking subscriber is
//!   isolated and does not stop the rest.
//! - Thread-safe: the subscription list sits behind a readers–writer lock;
//!   publish takes the read side and runs callbacks *outside* the lock, so
//!   subscribers may publish recursively. Pruning dead subscriptions takes
//!   the write side briefly.
//!
//! Subscriptions are RAII handles: dropping (or cancelling) a
//! [`Subscription`] expires it, and expired entries are pruned lazily on the
//! next publish of that event kind.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, RwLock,
};

/// Events carried on the bus. Closed catalogue; payloads are ids and plain
/// values, never references into the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameEvent {
    /// A user joined a room.
    PlayerJoined {
        /// Room that gained a member.
        room_id: u64,
        /// The joining user.
        user_id: u64,
    },
    /// A user left a room.
    PlayerLeft {
        /// Room that lost a member.
        room_id: u64,
        /// The leaving user.
        user_id: u64,
    },
    /// A stone was placed.
    PiecePlaced {
        /// Room the game runs in.
        room_id: u64,
        /// The mover.
        user_id: u64,
        /// Row.
        x: u32,
        /// Column.
        y: u32,
    },
    /// A game started.
    GameStarted {
        /// Room whose game began.
        room_id: u64,
    },
    /// A game ended. `winner_id` is 0 on a draw.
    GameEnded {
        /// Room whose game finished.
        room_id: u64,
        /// Winner, or 0 for a draw.
        winner_id: u64,
    },
    /// Room status or settings changed.
    RoomStatusChanged {
        /// Affected room.
        room_id: u64,
        /// User who triggered the change.
        user_id: u64,
        /// Human-readable status tag ("playing", "settings_updated", …).
        status: String,
    },
    /// A seated player asked for a draw.
    DrawRequested {
        /// Room with the pending request.
        room_id: u64,
        /// The requester.
        user_id: u64,
    },
    /// The opponent accepted a pending draw.
    DrawAccepted {
        /// Room whose game drew.
        room_id: u64,
        /// The accepting user.
        user_id: u64,
    },
    /// A seated player resigned.
    GiveUpRequested {
        /// Room with the resignation.
        room_id: u64,
        /// The resigning user.
        user_id: u64,
    },
    /// A room was created.
    RoomCreated {
        /// The new room.
        room_id: u64,
        /// Its owner.
        owner_id: u64,
    },
    /// A user logged in.
    UserLoggedIn {
        /// The user now online.
        user_id: u64,
    },
    /// The room list changed; lobby snapshots are stale.
    RoomListUpdated,
    /// A chat line arrived.
    ChatMessageRecv {
        /// Room the line belongs to.
        room_id: u64,
        /// The author.
        user_id: u64,
        /// The text.
        message: String,
    },
    /// Seat assignment changed.
    SyncSeat {
        /// Affected room.
        room_id: u64,
        /// Black seat occupant, 0 when empty.
        black_id: u64,
        /// White seat occupant, 0 when empty.
        white_id: u64,
    },
}

/// Discriminant used as the subscription key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// See [`GameEvent::PlayerJoined`].
    PlayerJoined,
    /// See [`GameEvent::PlayerLeft`].
    PlayerLeft,
    /// See [`GameEvent::PiecePlaced`].
    PiecePlaced,
    /// See [`GameEvent::GameStarted`].
    GameStarted,
    /// See [`GameEvent::GameEnded`].
    GameEnded,
    /// See [`GameEvent::RoomStatusChanged`].
    RoomStatusChanged,
    /// See [`GameEvent::DrawRequested`].
    DrawRequested,
    /// See [`GameEvent::DrawAccepted`].
    DrawAccepted,
    /// See [`GameEvent::GiveUpRequested`].
    GiveUpRequested,
    /// See [`GameEvent::RoomCreated`].
    RoomCreated,
    /// See [`GameEvent::UserLoggedIn`].
    UserLoggedIn,
    /// See [`GameEvent::RoomListUpdated`].
    RoomListUpdated,
    /// See [`GameEvent::ChatMessageRecv`].
    ChatMessageRecv,
    /// See [`GameEvent::SyncSeat`].
    SyncSeat,
}

/// All event kinds, for subscribe-to-everything consumers.
pub const ALL_EVENT_KINDS: [EventKind; 14] = [
    EventKind::PlayerJoined,
    EventKind::PlayerLeft,
    EventKind::PiecePlaced,
    EventKind::GameStarted,
    EventKind::GameEnded,
    EventKind::RoomStatusChanged,
    EventKind::DrawRequested,
    EventKind::DrawAccepted,
    EventKind::GiveUpRequested,
    EventKind::RoomCreated,
    EventKind::UserLoggedIn,
    EventKind::RoomListUpdated,
    EventKind::ChatMessageRecv,
    EventKind::SyncSeat,
];

impl GameEvent {
    /// The subscription key for this event.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::PlayerJoined { .. } => EventKind::PlayerJoined,
            Self::PlayerLeft { .. } => EventKind::PlayerLeft,
            Self::PiecePlaced { .. } => EventKind::PiecePlaced,
            Self::GameStarted { .. } => EventKind::GameStarted,
            Self::GameEnded { .. } => EventKind::GameEnded,
            Self::RoomStatusChanged { .. } => EventKind::RoomStatusChanged,
            Self::DrawRequested { .. } => EventKind::DrawRequested,
            Self::DrawAccepted { .. } => EventKind::DrawAccepted,
            Self::GiveUpRequested { .. } => EventKind::GiveUpRequested,
            Self::RoomCreated { .. } => EventKind::RoomCreated,
            Self::UserLoggedIn { .. } => EventKind::UserLoggedIn,
            Self::RoomListUpdated => EventKind::RoomListUpdated,
            Self::ChatMessageRecv { .. } => EventKind::ChatMessageRecv,
            Self::SyncSeat { .. } => EventKind::SyncSeat,
        }
    }
}

type Callback = Arc<dyn Fn(&GameEvent) + Send + Sync + 'static>;

struct Subscriber {
    alive: Arc<AtomicBool>,
    callback: Callback,
}

/// Handle for one subscription.
///
/// Dropping the handle cancels delivery deterministically; the bus prunes
/// the dead entry on the next publish of that event kind.
#[must_use = "dropping the subscription cancels it"]
pub struct Subscription {
    alive: Arc<AtomicBool>,
}

impl Subscription {
    /// Cancel explicitly. Equivalent to dropping the handle.
    pub fn cancel(&self) {
        self.alive.store(false, Ordering::Release);
    }

    /// True while the subscription still receives events.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::Release);
    }
}

/// The bus. An owned value, not a singleton: tests build as many independent
/// buses as they need, production wires one through the constructors.
#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<std::collections::HashMap<EventKind, Vec<Subscriber>>>,
}

impl EventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to one event kind.
    ///
    /// The callback runs synchronously inside [`EventBus::publish`], in
    /// subscription order, outside the bus lock.
    pub fn subscribe<F>(&self, kind: EventKind, callback: F) -> Subscription
    where
        F: Fn(&GameEvent) + Send + Sync + 'static,
    {
        let alive = Arc::new(AtomicBool::new(true));
        let subscriber = Subscriber { alive: Arc::clone(&alive), callback: Arc::new(callback) };

        let mut map = self.subscribers.write().unwrap_or_else(|e| e.into_inner());
        map.entry(kind).or_default().push(subscriber);

        Subscription { alive }
    }

    /// Publish an event to all live subscribers of its kind.
    pub fn publish(&self, event: &GameEvent) {
        let kind = event.kind();

        // Snapshot live callbacks under the read lock, run them outside it.
        let (callbacks, needs_prune) = {
            let map = self.subscribers.read().unwrap_or_else(|e| e.into_inner());
            match map.get(&kind) {
                None => return,
                Some(list) => {
                    let mut callbacks = Vec::with_capacity(list.len());
                    let mut dead = false;
                    for sub in list {
                        if sub.alive.load(Ordering::Acquire) {
                            callbacks.push(Arc::clone(&sub.callback));
                        } else {
                            dead = true;
                        }
                    }
                    (callbacks, dead)
                },
            }
        };

        for callback in callbacks {
            // One faulty subscriber must not deny service to the rest.
            let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| callback(event)));
        }

        if needs_prune {
            let mut map = self.subscribers.write().unwrap_or_else(|e| e.into_inner());
            if let Some(list) = map.get_mut(&kind) {
                list.retain(|sub| sub.alive.load(Ordering::Acquire));
            }
        }
    }

    /// Number of live subscriptions for a kind. Test and introspection aid.
    #[must_use]
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        let map = self.subscribers.read().unwrap_or_else(|e| e.into_inner());
        map.get(&kind)
            .map_or(0, |list| list.iter().filter(|s| s.alive.load(Ordering::Acquire)).count())
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let map = self.subscribers.read().unwrap_or_else(|e| e.into_inner());
        let total: usize = map.values().map(Vec::len).sum();
        f.debug_struct("EventBus").field("subscriptions", &total).finish()
    }
}
