//! In-memory gateway for tests and ephemeral runs.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use renju_core::{GameRecord, GatewayError, PersistenceGateway, User};

#[derive(Default)]
struct Inner {
    users: HashMap<u64, User>,
    by_name: HashMap<String, u64>,
    records: Vec<GameRecord>,
    next_user_id: u64,
}

/// Gateway that keeps everything in process memory. Nothing survives a
/// restart; exists so the server and its tests run without a database file.
#[derive(Clone, Default)]
pub struct MemoryGateway {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryGateway {
    /// Create an empty gateway.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Saved game records, oldest first. Test aid.
    #[must_use]
    pub fn game_records(&self) -> Vec<GameRecord> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).records.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl PersistenceGateway for MemoryGateway {
    fn load_all_users(&self) -> Result<Vec<User>, GatewayError> {
        Ok(self.lock().users.values().cloned().collect())
    }

    fn insert_user(&self, username: &str, password: &str) -> Result<u64, GatewayError> {
        let mut inner = self.lock();
        if inner.by_name.contains_key(username) {
            return Err(GatewayError::Duplicate(username.to_string()));
        }

        inner.next_user_id += 1;
        let id = inner.next_user_id;
        inner.by_name.insert(username.to_string(), id);
        inner.users.insert(id, User::new(id, username, password));
        Ok(id)
    }

    fn update_user(&self, user: &User) -> Result<(), GatewayError> {
        let mut inner = self.lock();
        match inner.users.get_mut(&user.id) {
            Some(stored) => {
                *stored = user.clone();
                Ok(())
            },
            None => Err(GatewayError::Io(format!("no such user: {}", user.id))),
        }
    }

    fn lookup_user_id(&self, username: &str) -> Result<Option<u64>, GatewayError> {
        Ok(self.lock().by_name.get(username).copied())
    }

    fn save_game_record(&self, record: &GameRecord) -> Result<(), GatewayError> {
        self.lock().records.push(record.clone());
        Ok(())
    }
}
