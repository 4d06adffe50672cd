//! SQLite read-through store for block lookups.
//!
//! Owned by the RPC adapter; the ledger computation never reads it. Entries are JSON values
//! under content-hash keys, so any serializable lookup result can be stored.

use rusqlite::{Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS lookups (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        stored_at INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_lookups_stored_at ON lookups(stored_at);
";

pub struct Cache {
    conn: Mutex<Connection>,
}

impl Cache {
    /// Open or create the store at `path`, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::with_connection(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self, CacheError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, CacheError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// SHA-256 hex of a normalized lookup description, e.g. `block_ts:<steth>:<number>`.
    pub fn key_for(lookup: &str) -> String {
        hex::encode(Sha256::digest(lookup.as_bytes()))
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, CacheError> {
        self.conn
            .lock()
            .map_err(|e| CacheError::Io(std::io::Error::other(e.to_string())))
    }

    pub fn get_value<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        let raw: Option<String> = self
            .conn()?
            .query_row("SELECT value FROM lookups WHERE key = ?1", [key], |r| r.get(0))
            .optional()?;
        match raw {
            Some(json) => {
                debug!(key, "cache hit");
                Ok(Some(serde_json::from_str(&json)?))
            }
            None => Ok(None),
        }
    }

    pub fn set_value<T: Serialize>(&self, key: &str, value: &T) -> Result<(), CacheError> {
        let json = serde_json::to_string(value)?;
        let now = time::OffsetDateTime::now_utc().unix_timestamp();
        self.conn()?.execute(
            "INSERT OR REPLACE INTO lookups (key, value, stored_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![key, json, now],
        )?;
        Ok(())
    }

    /// Drop one entry, e.g. after a reorg. Returns whether it existed.
    pub fn invalidate(&self, key: &str) -> Result<bool, CacheError> {
        let removed = self
            .conn()?
            .execute("DELETE FROM lookups WHERE key = ?1", [key])?;
        Ok(removed > 0)
    }

    /// Drop entries stored before `cutoff` (unix seconds). Returns how many were removed.
    pub fn prune_before(&self, cutoff: i64) -> Result<usize, CacheError> {
        Ok(self
            .conn()?
            .execute("DELETE FROM lookups WHERE stored_at < ?1", [cutoff])?)
    }

    pub fn len(&self) -> Result<usize, CacheError> {
        let n: i64 = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM lookups", [], |r| r.get(0))?;
        Ok(usize::try_from(n).unwrap_or(0))
    }

    pub fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len()? == 0)
    }
}
