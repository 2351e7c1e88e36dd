//! Object store: users, rooms, and the bidirectional index maps.
//!
//! One readers–writer lock guards the whole store; hot-path lookups take
//! the read side, creations and index mutations the write side. Lookups
//! hand out clones or closure-scoped references, never long-lived pointers
//! into the store.
//!
//! Persistence goes through the [`PersistenceGateway`] collaborator. Gateway
//! calls may block, so the store never holds its lock across one: callers
//! persist first (or after), then take the lock for the in-memory mutation.
//!
//! # Invariants
//!
//! - `session → user` and `user → session` form a bijection over online
//!   users.
//! - A user maps to at most one room, and only to a room whose member list
//!   contains them.
//! - Room ids are monotonic and never reused within a process lifetime;
//!   guest ids live in a reserved range disjoint from account ids.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, RwLock,
    },
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    room::{Room, RoomConfig, RoomStatus, MAX_MEMBERS},
    user::User,
};

/// Guest ids are minted from a counter starting here, far above any account
/// id the store or database will ever mint.
pub const GUEST_ID_BASE: u64 = 1 << 48;

/// Errors reported by the persistence gateway.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Underlying storage I/O failed.
    #[error("storage io error: {0}")]
    Io(String),
    /// Record failed to serialize or deserialize.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// Unique constraint violated (duplicate username).
    #[error("duplicate record: {0}")]
    Duplicate(String),
}

/// Errors from store operations. Display strings are the client-facing
/// reasons.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Signup with a username that exists.
    #[error("Username already exists")]
    UsernameTaken,
    /// Lookup for an unknown user id.
    #[error("User not found")]
    UserNotFound,
    /// Lookup for an unknown room id.
    #[error("Room not found")]
    RoomNotFound,
    /// Gateway failure; becomes an "internal error" reply.
    #[error("internal error: {0}")]
    Gateway(#[from] GatewayError),
}

/// A finished game, as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRecord {
    /// Room the game ran in.
    pub room_id: u64,
    /// Black seat occupant.
    pub black_player_id: u64,
    /// White seat occupant.
    pub white_player_id: u64,
    /// Winner, 0 on a draw.
    pub winner_id: u64,
    /// Terminal status tag ("win", "draw", "give_up", …).
    pub status: String,
    /// Move list as a JSON array of [x, y] pairs.
    pub moves_json: String,
    /// Game start, Unix seconds.
    pub start_time_secs: u64,
    /// Game end, Unix seconds.
    pub end_time_secs: u64,
}

/// Persistence collaborator interface.
///
/// Synchronous calls; implementations may block but are never invoked under
/// a core lock. Failure modes are reported by error return.
pub trait PersistenceGateway: Send + Sync + 'static {
    /// Load every account at startup.
    fn load_all_users(&self) -> Result<Vec<User>, GatewayError>;

    /// Insert a fresh account, returning its minted id.
    fn insert_user(&self, username: &str, password: &str) -> Result<u64, GatewayError>;

    /// Persist updated account fields.
    fn update_user(&self, user: &User) -> Result<(), GatewayError>;

    /// Resolve a username to its id.
    fn lookup_user_id(&self, username: &str) -> Result<Option<u64>, GatewayError>;

    /// Append a finished game.
    fn save_game_record(&self, record: &GameRecord) -> Result<(), GatewayError>;
}

#[derive(Default)]
struct StoreInner {
    users: HashMap<u64, User>,
    username_to_id: HashMap<String, u64>,
    rooms: HashMap<u64, Room>,
    session_to_user: HashMap<u64, u64>,
    user_to_session: HashMap<u64, u64>,
    user_to_room: HashMap<u64, u64>,
    next_room_id: u64,
}

/// The shared in-memory object store.
pub struct ObjectStore {
    gateway: Arc<dyn PersistenceGateway>,
    inner: RwLock<StoreInner>,
    next_guest: AtomicU64,
}

impl ObjectStore {
    /// Create an empty store over a gateway.
    #[must_use]
    pub fn new(gateway: Arc<dyn PersistenceGateway>) -> Self {
        Self {
            gateway,
            inner: RwLock::new(StoreInner { next_room_id: 1, ..StoreInner::default() }),
            next_guest: AtomicU64::new(0),
        }
    }

    /// The persistence gateway, for callers that write records directly.
    #[must_use]
    pub fn gateway(&self) -> &Arc<dyn PersistenceGateway> {
        &self.gateway
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, StoreInner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, StoreInner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    // --- users ---

    /// Bulk-load accounts from the gateway. Returns how many were loaded.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Gateway`] when the gateway read fails.
    pub fn load_users(&self) -> Result<usize, StoreError> {
        let users = self.gateway.load_all_users()?;
        let count = users.len();

        let mut inner = self.write();
        for user in users {
            inner.username_to_id.insert(user.username.clone(), user.id);
            inner.users.insert(user.id, user);
        }
        Ok(count)
    }

    /// Create an account. Fails when the username exists; the id is minted
    /// by the gateway.
    ///
    /// # Errors
    ///
    /// - [`StoreError::UsernameTaken`] / [`StoreError::Gateway`].
    pub fn create_user(&self, username: &str, password: &str) -> Result<User, StoreError> {
        if self.read().username_to_id.contains_key(username) {
            return Err(StoreError::UsernameTaken);
        }

        // Gateway insert happens outside the lock; a concurrent duplicate
        // surfaces as the gateway's unique-constraint error.
        let id = match self.gateway.insert_user(username, password) {
            Ok(id) => id,
            Err(GatewayError::Duplicate(_)) => return Err(StoreError::UsernameTaken),
            Err(err) => return Err(err.into()),
        };

        let user = User::new(id, username, password);
        let mut inner = self.write();
        inner.username_to_id.insert(username.to_string(), id);
        inner.users.insert(id, user.clone());
        Ok(user)
    }

    /// Account by username, cloned.
    #[must_use]
    pub fn user_by_username(&self, username: &str) -> Option<User> {
        let inner = self.read();
        let id = inner.username_to_id.get(username)?;
        inner.users.get(id).cloned()
    }

    /// Account by id, cloned.
    #[must_use]
    pub fn user(&self, user_id: u64) -> Option<User> {
        self.read().users.get(&user_id).cloned()
    }

    /// Mutate an account under the store lock and return the updated clone
    /// for persistence.
    pub fn with_user_mut<R>(
        &self,
        user_id: u64,
        f: impl FnOnce(&mut User) -> R,
    ) -> Option<(R, User)> {
        let mut inner = self.write();
        let user = inner.users.get_mut(&user_id)?;
        let result = f(user);
        Some((result, user.clone()))
    }

    /// Mint a guest id from the reserved high range. Guests never appear in
    /// the user table.
    #[must_use]
    pub fn mint_guest_id(&self) -> u64 {
        GUEST_ID_BASE + self.next_guest.fetch_add(1, Ordering::Relaxed)
    }

    /// Bounded snapshot of accounts for the lobby list, ordered by id:
    /// `(username, online)`.
    #[must_use]
    pub fn user_summaries(&self, max: usize) -> Vec<(String, bool)> {
        let inner = self.read();
        let mut ids: Vec<u64> = inner.users.keys().copied().collect();
        ids.sort_unstable();

        ids.into_iter()
            .take(max)
            .filter_map(|id| {
                let user = inner.users.get(&id)?;
                Some((user.username.clone(), inner.user_to_session.contains_key(&id)))
            })
            .collect()
    }

    // --- session <-> user ---

    /// Bind a session to a user, maintaining the bijection. Stale inverse
    /// entries from either side are dropped.
    pub fn bind_session(&self, session_id: u64, user_id: u64) {
        let mut inner = self.write();

        if let Some(old_user) = inner.session_to_user.insert(session_id, user_id) {
            inner.user_to_session.remove(&old_user);
        }
        if let Some(old_session) = inner.user_to_session.insert(user_id, session_id) {
            if old_session != session_id {
                inner.session_to_user.remove(&old_session);
            }
        }
    }

    /// Drop a session's user binding. Returns the user that was bound.
    pub fn unbind_session(&self, session_id: u64) -> Option<u64> {
        let mut inner = self.write();
        let user_id = inner.session_to_user.remove(&session_id)?;
        inner.user_to_session.remove(&user_id);
        Some(user_id)
    }

    /// Who is this session logged in as? 0-free: `None` when anonymous.
    #[must_use]
    pub fn user_for_session(&self, session_id: u64) -> Option<u64> {
        self.read().session_to_user.get(&session_id).copied()
    }

    /// Live session for a user, for pushes. `None` when offline.
    #[must_use]
    pub fn session_for_user(&self, user_id: u64) -> Option<u64> {
        self.read().user_to_session.get(&user_id).copied()
    }

    /// True when the user has a live session.
    #[must_use]
    pub fn is_online(&self, user_id: u64) -> bool {
        self.read().user_to_session.contains_key(&user_id)
    }

    /// All online users, ordered by id for stable broadcast order.
    #[must_use]
    pub fn online_user_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.read().user_to_session.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    // --- rooms ---

    /// Create a room, returning its id. Ids are monotonic from 1.
    #[must_use]
    pub fn create_room(&self, config: RoomConfig) -> u64 {
        let mut inner = self.write();
        let id = inner.next_room_id;
        inner.next_room_id += 1;
        inner.rooms.insert(id, Room::new(id, config));
        id
    }

    /// Destroy a room, clearing the `user → room` entries of anyone still
    /// indexed to it.
    pub fn remove_room(&self, room_id: u64) -> bool {
        let mut inner = self.write();
        let Some(room) = inner.rooms.remove(&room_id) else {
            return false;
        };
        for member in room.members() {
            inner.user_to_room.remove(member);
        }
        // Clean up any dangling index entries as well.
        inner.user_to_room.retain(|_, &mut mapped| mapped != room_id);
        true
    }

    /// Run a closure against a room under the store lock.
    ///
    /// The reference never escapes the closure; events returned by room
    /// methods are published after the lock is released.
    pub fn with_room<R>(&self, room_id: u64, f: impl FnOnce(&mut Room) -> R) -> Option<R> {
        let mut inner = self.write();
        let room = inner.rooms.get_mut(&room_id)?;
        Some(f(room))
    }

    /// True when the room exists.
    #[must_use]
    pub fn has_room(&self, room_id: u64) -> bool {
        self.read().rooms.contains_key(&room_id)
    }

    /// Member list of a room.
    #[must_use]
    pub fn room_members(&self, room_id: u64) -> Vec<u64> {
        self.read().rooms.get(&room_id).map(|room| room.members().to_vec()).unwrap_or_default()
    }

    /// Number of live rooms.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.read().rooms.len()
    }

    /// Bounded snapshot of room description lines, ordered by id.
    #[must_use]
    pub fn room_summaries(&self, max: usize) -> Vec<String> {
        let inner = self.read();
        let mut ids: Vec<u64> = inner.rooms.keys().copied().collect();
        ids.sort_unstable();

        ids.into_iter()
            .take(max)
            .filter_map(|id| inner.rooms.get(&id).map(Room::describe))
            .collect()
    }

    /// First Free room with an open member slot, lowest id first.
    #[must_use]
    pub fn find_open_room(&self) -> Option<u64> {
        let inner = self.read();
        let mut ids: Vec<u64> = inner.rooms.keys().copied().collect();
        ids.sort_unstable();

        ids.into_iter().find(|id| {
            inner.rooms.get(id).is_some_and(|room| {
                room.status() == RoomStatus::Free && room.members().len() < MAX_MEMBERS
            })
        })
    }

    // --- user <-> room ---

    /// Index a user into a room.
    pub fn map_user_room(&self, user_id: u64, room_id: u64) {
        self.write().user_to_room.insert(user_id, room_id);
    }

    /// Drop a user's room index entry.
    pub fn unmap_user_room(&self, user_id: u64) {
        self.write().user_to_room.remove(&user_id);
    }

    /// Which room is the user in?
    #[must_use]
    pub fn room_for_user(&self, user_id: u64) -> Option<u64> {
        self.read().user_to_room.get(&user_id).copied()
    }
}

impl std::fmt::Debug for ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.read();
        f.debug_struct("ObjectStore")
            .field("users", &inner.users.len())
            .field("rooms", &inner.rooms.len())
            .field("online", &inner.user_to_session.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Minimal in-memory gateway for store tests.
    #[derive(Default)]
    struct TestGateway {
        next_id: AtomicU64,
        records: Mutex<Vec<GameRecord>>,
    }

    impl PersistenceGateway for TestGateway {
        fn load_all_users(&self) -> Result<Vec<User>, GatewayError> {
            Ok(Vec::new())
        }

        fn insert_user(&self, _username: &str, _password: &str) -> Result<u64, GatewayError> {
            Ok(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
        }

        fn update_user(&self, _user: &User) -> Result<(), GatewayError> {
            Ok(())
        }

        fn lookup_user_id(&self, _username: &str) -> Result<Option<u64>, GatewayError> {
            Ok(None)
        }

        fn save_game_record(&self, record: &GameRecord) -> Result<(), GatewayError> {
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    fn store() -> ObjectStore {
        ObjectStore::new(Arc::new(TestGateway::default()))
    }

    #[test]
    fn create_user_mints_monotonic_ids() {
        let store = store();
        let a = store.create_user("a", "p").unwrap();
        let b = store.create_user("b", "p").unwrap();
        assert!(b.id > a.id);
    }

    #[test]
    fn duplicate_username_is_refused() {
        let store = store();
        store.create_user("a", "p").unwrap();
        assert_eq!(store.create_user("a", "q"), Err(StoreError::UsernameTaken));
    }

    #[test]
    fn lookup_by_username_and_id_agree() {
        let store = store();
        let created = store.create_user("alice", "pw").unwrap();

        assert_eq!(store.user_by_username("alice"), Some(created.clone()));
        assert_eq!(store.user(created.id), Some(created));
        assert_eq!(store.user_by_username("bob"), None);
    }

    #[test]
    fn session_binding_is_a_bijection() {
        let store = store();
        store.bind_session(100, 1);

        assert_eq!(store.user_for_session(100), Some(1));
        assert_eq!(store.session_for_user(1), Some(100));

        // Rebinding the user to a new session drops the old pair entirely.
        store.bind_session(200, 1);
        assert_eq!(store.user_for_session(200), Some(1));
        assert_eq!(store.session_for_user(1), Some(200));
        assert_eq!(store.user_for_session(100), None);

        // Rebinding the session to a new user drops the stale inverse.
        store.bind_session(200, 2);
        assert_eq!(store.session_for_user(2), Some(200));
        assert_eq!(store.session_for_user(1), None);
    }

    #[test]
    fn unbind_clears_both_directions() {
        let store = store();
        store.bind_session(100, 1);

        assert_eq!(store.unbind_session(100), Some(1));
        assert_eq!(store.user_for_session(100), None);
        assert_eq!(store.session_for_user(1), None);
        assert_eq!(store.unbind_session(100), None);
    }

    #[test]
    fn guest_ids_live_in_reserved_range() {
        let store = store();
        let first = store.mint_guest_id();
        let second = store.mint_guest_id();

        assert!(first >= GUEST_ID_BASE);
        assert_eq!(second, first + 1);

        let real = store.create_user("a", "p").unwrap();
        assert!(real.id < GUEST_ID_BASE);
    }

    #[test]
    fn room_ids_are_monotonic_and_never_reused() {
        let store = store();
        let first = store.create_room(RoomConfig::default());
        let second = store.create_room(RoomConfig::default());
        assert_eq!((first, second), (1, 2));

        assert!(store.remove_room(first));
        let third = store.create_room(RoomConfig::default());
        assert_eq!(third, 3);
    }

    #[test]
    fn remove_room_clears_member_indexes() {
        let store = store();
        let room_id = store.create_room(RoomConfig::default());
        store.with_room(room_id, |room| room.add_player(5)).unwrap().unwrap();
        store.map_user_room(5, room_id);

        assert!(store.remove_room(room_id));
        assert_eq!(store.room_for_user(5), None);
        assert!(!store.has_room(room_id));
    }

    #[test]
    fn user_room_index_follows_membership() {
        let store = store();
        let room_id = store.create_room(RoomConfig::default());

        store.with_room(room_id, |room| room.add_player(7)).unwrap().unwrap();
        store.map_user_room(7, room_id);
        assert_eq!(store.room_for_user(7), Some(room_id));
        assert!(store.room_members(room_id).contains(&7));

        store.unmap_user_room(7);
        assert_eq!(store.room_for_user(7), None);
    }

    #[test]
    fn summaries_are_bounded_and_ordered() {
        let store = store();
        for name in ["a", "b", "c"] {
            store.create_user(name, "p").unwrap();
        }
        store.bind_session(100, store.user_by_username("b").unwrap().id);

        let summaries = store.user_summaries(2);
        assert_eq!(summaries, vec![("a".to_string(), false), ("b".to_string(), true)]);

        for _ in 0..3 {
            let _ = store.create_room(RoomConfig::default());
        }
        assert_eq!(store.room_summaries(2).len(), 2);
    }

    #[test]
    fn find_open_room_skips_full_and_playing() {
        let store = store();
        let full = store.create_room(RoomConfig::default());
        store
            .with_room(full, |room| {
                room.add_player(1).unwrap();
                room.add_player(2).unwrap();
            })
            .unwrap();

        let open = store.create_room(RoomConfig::default());
        assert_eq!(store.find_open_room(), Some(open));
    }

    #[test]
    fn with_user_mut_returns_updated_clone() {
        let store = store();
        let user = store.create_user("a", "p").unwrap();

        let (_, updated) = store
            .with_user_mut(user.id, |u| {
                u.record_win();
            })
            .unwrap();

        assert_eq!(updated.win_count, 1);
        assert_eq!(store.user(user.id).unwrap().win_count, 1);
    }
}
