//! L2 persistent content cache backed by SQLite.
//! Keyed by the full domain-scoped cache key; entries do not expire, they are
//! only replaced on a new validated translation or removed when they fail
//! re-validation.

use std::path::Path;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache storage error: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("cache storage still failing after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: rusqlite::Error,
    },
}

impl CacheError {
    /// Busy, locked and disk-I/O failures are worth retrying; anything else is not.
    pub fn is_transient(&self) -> bool {
        match self {
            CacheError::Storage(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked | ErrorCode::SystemIoFailure
            ),
            _ => false,
        }
    }
}

/// SQLite-backed content cache (L2).
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the cache database at the given path.
    pub fn open(db_path: &Path, busy_timeout: Duration) -> Result<Self, CacheError> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            // A missing directory surfaces as an open error below.
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = Connection::open(db_path)?;
        conn.busy_timeout(busy_timeout)?;
        // WAL mode for concurrent readers alongside the single writer
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        let store = Self::init(conn)?;
        info!(path = %db_path.display(), "SQLite content cache opened");
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, CacheError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, CacheError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS content_cache (
                cache_key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let conn = self.conn.lock();
        let value = conn
            .query_row(
                "SELECT value FROM content_cache WHERE cache_key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        if value.is_some() {
            debug!("L2 cache hit");
        }
        Ok(value)
    }

    pub fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO content_cache (cache_key, value, updated_at)
             VALUES (?1, ?2, ?3)",
            params![key, value, now_unix()],
        )?;
        Ok(())
    }

    /// Returns whether a row was deleted.
    pub fn remove(&self, key: &str) -> Result<bool, CacheError> {
        let conn = self.conn.lock();
        let removed = conn.execute("DELETE FROM content_cache WHERE cache_key = ?1", params![key])?;
        Ok(removed > 0)
    }

    pub fn len(&self) -> Result<usize, CacheError> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM content_cache", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

/// Current time as Unix timestamp (seconds).
fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
