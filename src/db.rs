use rusqlite::{ params, Connection, OptionalExtension };
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::MreadError;

/// Durable string-key to JSON-value store backing favorites, reading
/// progress and settings. Values are written with a single upsert, so a key
/// is never left half written; the connection mutex keeps writes to the same
/// store from interleaving.
pub(crate) struct KeyValueStore {
    conn: Mutex<Connection>,
}

fn initialize_store(conn: &Connection) -> Result<(), MreadError> {
    match
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (
            id INTEGER PRIMARY KEY,
            name TEXT UNIQUE NOT NULL,
            data TEXT NOT NULL
            )",
            []
        )
    {
        Ok(_) => Ok(()),
        Err(err) => Err(MreadError::DatabaseError(err)),
    }
}

impl KeyValueStore {
    pub(crate) fn open(path: &str) -> Result<KeyValueStore, MreadError> {
        let conn = match Connection::open(path) {
            Ok(conn) => conn,
            Err(err) => {
                return Err(MreadError::DatabaseError(err));
            }
        };
        match initialize_store(&conn) {
            Ok(()) => (),
            Err(err) => {
                return Err(err);
            }
        }
        Ok(KeyValueStore { conn: Mutex::new(conn) })
    }

    pub(crate) fn open_in_memory() -> Result<KeyValueStore, MreadError> {
        let conn = match Connection::open_in_memory() {
            Ok(conn) => conn,
            Err(err) => {
                return Err(MreadError::DatabaseError(err));
            }
        };
        match initialize_store(&conn) {
            Ok(()) => (),
            Err(err) => {
                return Err(err);
            }
        }
        Ok(KeyValueStore { conn: Mutex::new(conn) })
    }

    pub(crate) async fn get(&self, name: &str) -> Result<Option<Value>, MreadError> {
        let conn = self.conn.lock().await;
        let mut stmt = match conn.prepare("SELECT data FROM kv WHERE name = ?1") {
            Ok(stmt) => stmt,
            Err(err) => {
                return Err(MreadError::DatabaseError(err));
            }
        };
        let data: Option<String> = match
            stmt.query_row(params![name], |row| row.get(0)).optional()
        {
            Ok(data) => data,
            Err(err) => {
                return Err(MreadError::DatabaseError(err));
            }
        };
        match data {
            Some(data) =>
                match serde_json::from_str(&data) {
                    Ok(value) => Ok(Some(value)),
                    Err(err) => Err(MreadError::JsonError(err.to_string())),
                }
            None => Ok(None),
        }
    }

    pub(crate) async fn set(&self, name: &str, value: &Value) -> Result<(), MreadError> {
        let data = match serde_json::to_string(value) {
            Ok(data) => data,
            Err(err) => {
                return Err(MreadError::JsonError(err.to_string()));
            }
        };
        let conn = self.conn.lock().await;
        match
            conn.execute(
                "INSERT INTO kv (name, data) VALUES (?1, ?2)
        ON CONFLICT(name) DO UPDATE SET data = excluded.data",
                params![name, data]
            )
        {
            Ok(_) => Ok(()),
            Err(err) => Err(MreadError::DatabaseError(err)),
        }
    }
}

// a missing key reads back as None, not an error
#[tokio::test]
async fn test_get_missing_key_returns_none() {
    let store = KeyValueStore::open_in_memory().unwrap();

    let value = store.get("theme").await.unwrap();

    assert_eq!(value, None);
}

// set followed by get round-trips the JSON value
#[tokio::test]
async fn test_set_then_get_returns_value() {
    let store = KeyValueStore::open_in_memory().unwrap();

    store.set("theme", &serde_json::json!("dark")).await.unwrap();

    assert_eq!(store.get("theme").await.unwrap(), Some(serde_json::json!("dark")));
}

// a second set to the same key overwrites the previous value
#[tokio::test]
async fn test_set_overwrites_existing_value() {
    let store = KeyValueStore::open_in_memory().unwrap();

    store.set("adultContentEnabled", &serde_json::json!(false)).await.unwrap();
    store.set("adultContentEnabled", &serde_json::json!(true)).await.unwrap();

    assert_eq!(
        store.get("adultContentEnabled").await.unwrap(),
        Some(serde_json::json!(true))
    );
}

// writes to distinct keys do not disturb each other
#[tokio::test]
async fn test_distinct_keys_are_independent() {
    let store = KeyValueStore::open_in_memory().unwrap();

    store.set("readChapters_a", &serde_json::json!(["1"])).await.unwrap();
    store.set("readChapters_b", &serde_json::json!(["2"])).await.unwrap();

    assert_eq!(store.get("readChapters_a").await.unwrap(), Some(serde_json::json!(["1"])));
    assert_eq!(store.get("readChapters_b").await.unwrap(), Some(serde_json::json!(["2"])));
}
