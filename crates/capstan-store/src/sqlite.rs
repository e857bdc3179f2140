//! `SQLite`-backed implementation of [`DurableStore`].
//!
//! One `kv` table keyed by the full concatenated key. `SQLite` keeps the
//! primary key index ordered, so prefix scans are plain range queries.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{StoreError, StoreResult};
use crate::traits::{prefix_end, DurableStore};

/// Idempotent DDL for the key-value table.
const CREATE_TABLES: &str = "
CREATE TABLE IF NOT EXISTS kv (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
";

/// File-backed durable store.
///
/// Create with [`SqliteStore::open`] for persistence or
/// [`SqliteStore::in_memory`] for tests.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store database at `path`.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(CREATE_TABLES)?;
        tracing::info!(path = %path.display(), "durable store open");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(CREATE_TABLES)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn decode(key: &str, raw: String) -> StoreResult<serde_json::Value> {
        serde_json::from_str(&raw).map_err(|e| StoreError::CorruptRecord {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }
}

impl DurableStore for SqliteStore {
    fn get(&self, key: &str) -> StoreResult<Option<serde_json::Value>> {
        let conn = self.conn.lock().expect("lock poisoned");
        let raw: Option<String> = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        drop(conn);
        raw.map(|r| Self::decode(key, r)).transpose()
    }

    fn put(&self, key: &str, value: &serde_json::Value) -> StoreResult<()> {
        let raw = serde_json::to_string(value)?;
        let conn = self.conn.lock().expect("lock poisoned");
        conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, raw],
        )?;
        Ok(())
    }

    fn delete(&self, key: &str) -> StoreResult<bool> {
        let conn = self.conn.lock().expect("lock poisoned");
        let affected = conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(affected > 0)
    }

    fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<(String, serde_json::Value)>> {
        let conn = self.conn.lock().expect("lock poisoned");
        let mut rows: Vec<(String, String)> = Vec::new();
        match prefix_end(prefix) {
            Some(end) => {
                let mut stmt = conn.prepare(
                    "SELECT key, value FROM kv WHERE key >= ?1 AND key < ?2 ORDER BY key",
                )?;
                let mapped = stmt.query_map(params![prefix, end], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?;
                for row in mapped {
                    rows.push(row?);
                }
            }
            None => {
                let mut stmt =
                    conn.prepare("SELECT key, value FROM kv WHERE key >= ?1 ORDER BY key")?;
                let mapped = stmt.query_map(params![prefix], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?;
                for row in mapped {
                    rows.push(row?);
                }
            }
        }
        drop(conn);

        rows.into_iter()
            .map(|(key, raw)| {
                let value = Self::decode(&key, raw)?;
                Ok((key, value))
            })
            .collect()
    }
}
