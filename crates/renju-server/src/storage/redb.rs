//! Redb-backed durable gateway.
//!
//! Uses Redb's ACID transactions; accounts and game records survive server
//! restarts. Values are CBOR-encoded, keys are native integer/string types.
//!
//! Tables:
//!
//! - `users`: user id → CBOR-encoded [`User`]
//! - `usernames`: username → user id (unique-constraint index)
//! - `game_records`: record id → CBOR-encoded [`GameRecord`]
//! - `meta`: counter name → next value (id allocation)

use std::{path::Path, sync::Arc};

use redb::{Database, ReadableTable, TableDefinition};
use renju_core::{GameRecord, GatewayError, PersistenceGateway, User};

const USERS: TableDefinition<u64, &[u8]> = TableDefinition::new("users");
const USERNAMES: TableDefinition<&str, u64> = TableDefinition::new("usernames");
const GAME_RECORDS: TableDefinition<u64, &[u8]> = TableDefinition::new("game_records");
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

const NEXT_USER_ID: &str = "next_user_id";
const NEXT_RECORD_ID: &str = "next_record_id";

fn io_err(err: impl std::fmt::Display) -> GatewayError {
    GatewayError::Io(err.to_string())
}

fn ser_err(err: impl std::fmt::Display) -> GatewayError {
    GatewayError::Serialization(err.to_string())
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, GatewayError> {
    let mut bytes = Vec::new();
    ciborium::ser::into_writer(value, &mut bytes).map_err(ser_err)?;
    Ok(bytes)
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, GatewayError> {
    ciborium::de::from_reader(bytes).map_err(ser_err)
}

/// Durable gateway backed by Redb. Clone is cheap (shared `Arc`).
#[derive(Clone)]
pub struct RedbGateway {
    db: Arc<Database>,
}

impl RedbGateway {
    /// Open or create the database file and its tables.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::Io`] when the file cannot be opened or created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, GatewayError> {
        let db = Database::create(path.as_ref()).map_err(io_err)?;

        let txn = db.begin_write().map_err(io_err)?;
        {
            txn.open_table(USERS).map_err(io_err)?;
            txn.open_table(USERNAMES).map_err(io_err)?;
            txn.open_table(GAME_RECORDS).map_err(io_err)?;
            txn.open_table(META).map_err(io_err)?;
        }
        txn.commit().map_err(io_err)?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Allocate the next id from a meta counter, starting at 1.
    fn next_id(
        table: &mut redb::Table<'_, &str, u64>,
        counter: &str,
    ) -> Result<u64, GatewayError> {
        let next = table.get(counter).map_err(io_err)?.map_or(1, |v| v.value());
        table.insert(counter, next + 1).map_err(io_err)?;
        Ok(next)
    }
}

impl PersistenceGateway for RedbGateway {
    fn load_all_users(&self) -> Result<Vec<User>, GatewayError> {
        let txn = self.db.begin_read().map_err(io_err)?;
        let table = txn.open_table(USERS).map_err(io_err)?;

        let mut users = Vec::new();
        for entry in table.iter().map_err(io_err)? {
            let (_, value) = entry.map_err(io_err)?;
            users.push(decode(value.value())?);
        }
        Ok(users)
    }

    fn insert_user(&self, username: &str, password: &str) -> Result<u64, GatewayError> {
        let txn = self.db.begin_write().map_err(io_err)?;
        let id = {
            let mut names = txn.open_table(USERNAMES).map_err(io_err)?;
            if names.get(username).map_err(io_err)?.is_some() {
                return Err(GatewayError::Duplicate(username.to_string()));
            }

            let mut meta = txn.open_table(META).map_err(io_err)?;
            let id = Self::next_id(&mut meta, NEXT_USER_ID)?;

            let user = User::new(id, username, password);
            let mut users = txn.open_table(USERS).map_err(io_err)?;
            users.insert(id, encode(&user)?.as_slice()).map_err(io_err)?;
            names.insert(username, id).map_err(io_err)?;
            id
        };
        txn.commit().map_err(io_err)?;
        Ok(id)
    }

    fn update_user(&self, user: &User) -> Result<(), GatewayError> {
        let txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut users = txn.open_table(USERS).map_err(io_err)?;
            users.insert(user.id, encode(user)?.as_slice()).map_err(io_err)?;
        }
        txn.commit().map_err(io_err)?;
        Ok(())
    }

    fn lookup_user_id(&self, username: &str) -> Result<Option<u64>, GatewayError> {
        let txn = self.db.begin_read().map_err(io_err)?;
        let names = txn.open_table(USERNAMES).map_err(io_err)?;
        Ok(names.get(username).map_err(io_err)?.map(|v| v.value()))
    }

    fn save_game_record(&self, record: &GameRecord) -> Result<(), GatewayError> {
        let txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut meta = txn.open_table(META).map_err(io_err)?;
            let id = Self::next_id(&mut meta, NEXT_RECORD_ID)?;

            let mut records = txn.open_table(GAME_RECORDS).map_err(io_err)?;
            records.insert(id, encode(record)?.as_slice()).map_err(io_err)?;
        }
        txn.commit().map_err(io_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_temp() -> (RedbGateway, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let gateway = RedbGateway::open(dir.path().join("test.redb")).unwrap();
        (gateway, dir)
    }

    #[test]
    fn users_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.redb");

        {
            let gateway = RedbGateway::open(&path).unwrap();
            gateway.insert_user("a", "p").unwrap();
        }

        let gateway = RedbGateway::open(&path).unwrap();
        let users = gateway.load_all_users().unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].username, "a");
        assert_eq!(gateway.lookup_user_id("a").unwrap(), Some(users[0].id));
    }

    #[test]
    fn ids_are_monotonic_across_inserts() {
        let (gateway, _dir) = open_temp();
        let a = gateway.insert_user("a", "p").unwrap();
        let b = gateway.insert_user("b", "p").unwrap();
        assert_eq!((a, b), (1, 2));
    }

    #[test]
    fn duplicate_username_is_refused() {
        let (gateway, _dir) = open_temp();
        gateway.insert_user("a", "p").unwrap();
        assert!(matches!(
            gateway.insert_user("a", "q"),
            Err(GatewayError::Duplicate(_))
        ));
    }

    #[test]
    fn update_round_trips_through_cbor() {
        let (gateway, _dir) = open_temp();
        gateway.insert_user("a", "p").unwrap();

        let mut user = gateway.load_all_users().unwrap().remove(0);
        user.score = 2100.0;
        user.record_win();
        gateway.update_user(&user).unwrap();

        let reloaded = gateway.load_all_users().unwrap().remove(0);
        assert_eq!(reloaded, user);
        assert_eq!(reloaded.rank, "3D");
    }

    #[test]
    fn game_records_are_appended() {
        let (gateway, _dir) = open_temp();
        let record = GameRecord {
            room_id: 1,
            black_player_id: 10,
            white_player_id: 20,
            winner_id: 10,
            status: "win".to_string(),
            moves_json: "[[7,7]]".to_string(),
            start_time_secs: 1000,
            end_time_secs: 1060,
        };

        gateway.save_game_record(&record).unwrap();
        gateway.save_game_record(&record).unwrap();

        let txn = gateway.db.begin_read().unwrap();
        let table = txn.open_table(GAME_RECORDS).unwrap();
        assert_eq!(table.iter().unwrap().count(), 2);
    }
}
