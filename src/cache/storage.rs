//! Partition storage trait and SQLite implementation.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

use super::types::{CachedResponse, RequestKey, Response, ResponseType};

/// Errors raised by a storage backend.
///
/// The strategy executor logs these and carries on; they never fail a request.
#[derive(Debug, Error)]
pub enum StoreError {
  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("failed to encode response headers: {0}")]
  Serialize(#[from] serde_json::Error),

  /// Only GET requests can be stored
  #[error("cannot store a {0} request")]
  UnsupportedMethod(String),

  #[error("storage lock poisoned")]
  LockPoisoned,

  #[error("failed to prepare cache directory {path}: {source}")]
  Io {
    path: PathBuf,
    source: std::io::Error,
  },

  #[error("corrupt cache entry: {0}")]
  Corrupt(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Trait for partition storage backends.
///
/// Single operations are atomic; nothing is transactional across entries.
/// Writes to the same key are last-write-wins.
pub trait CacheStorage: Send + Sync {
  /// Create the partition if it does not exist yet.
  fn open_partition(&self, name: &str) -> StoreResult<()>;

  /// Names of every partition currently on disk.
  fn partition_names(&self) -> StoreResult<Vec<String>>;

  /// Delete a partition and all its entries. Returns false if it did not exist.
  fn delete_partition(&self, name: &str) -> StoreResult<bool>;

  /// Look up a stored snapshot.
  fn match_request(&self, partition: &str, key: &RequestKey)
    -> StoreResult<Option<CachedResponse>>;

  /// Store (or overwrite) a snapshot, creating the partition if needed.
  fn put(&self, partition: &str, key: &RequestKey, response: &Response) -> StoreResult<()>;

  /// Remove one entry. Returns false if it was not stored.
  fn delete_entry(&self, partition: &str, key: &RequestKey) -> StoreResult<bool>;

  /// Number of entries in a partition.
  fn entry_count(&self, partition: &str) -> StoreResult<usize>;
}

/// SQLite-based partition storage.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open the storage at the given path, or at the default location.
  pub fn open(path: Option<&Path>) -> StoreResult<Self> {
    let path = match path {
      Some(p) => p.to_path_buf(),
      None => Self::default_path()?,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
      std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
        path: parent.to_path_buf(),
        source,
      })?;
    }

    Self::with_connection(Connection::open(&path)?)
  }

  /// Storage that lives only as long as the process.
  pub fn open_in_memory() -> StoreResult<Self> {
    Self::with_connection(Connection::open_in_memory()?)
  }

  fn with_connection(conn: Connection) -> StoreResult<Self> {
    conn.execute_batch(CACHE_SCHEMA)?;
    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  /// Get the default database path.
  fn default_path() -> StoreResult<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| StoreError::Io {
        path: PathBuf::from("~"),
        source: std::io::Error::new(
          std::io::ErrorKind::NotFound,
          "could not determine data directory",
        ),
      })?;

    Ok(data_dir.join("swcache").join("cache.db"))
  }

  fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|_| StoreError::LockPoisoned)
  }
}

const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS partitions (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One row per stored response, keyed by hashed request identity
CREATE TABLE IF NOT EXISTS entries (
    partition TEXT NOT NULL,
    key_hash TEXT NOT NULL,
    request_key TEXT NOT NULL,
    status INTEGER NOT NULL,
    response_type TEXT NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (partition, key_hash)
);
"#;

impl CacheStorage for SqliteStorage {
  fn open_partition(&self, name: &str) -> StoreResult<()> {
    let conn = self.lock()?;
    conn.execute(
      "INSERT OR IGNORE INTO partitions (name) VALUES (?)",
      params![name],
    )?;
    Ok(())
  }

  fn partition_names(&self) -> StoreResult<Vec<String>> {
    let conn = self.lock()?;
    let mut stmt = conn.prepare("SELECT name FROM partitions ORDER BY name")?;
    let names = stmt
      .query_map([], |row| row.get(0))?
      .collect::<Result<Vec<String>, _>>()?;
    Ok(names)
  }

  fn delete_partition(&self, name: &str) -> StoreResult<bool> {
    let mut conn = self.lock()?;
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM entries WHERE partition = ?", params![name])?;
    let removed = tx.execute("DELETE FROM partitions WHERE name = ?", params![name])?;
    tx.commit()?;
    Ok(removed > 0)
  }

  fn match_request(
    &self,
    partition: &str,
    key: &RequestKey,
  ) -> StoreResult<Option<CachedResponse>> {
    let conn = self.lock()?;
    let row: Option<(u16, String, String, Vec<u8>, String)> = conn
      .query_row(
        "SELECT status, response_type, headers, body, cached_at FROM entries
         WHERE partition = ? AND key_hash = ?",
        params![partition, key.hash()],
        |row| {
          Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
          ))
        },
      )
      .optional()?;

    let Some((status, response_type, headers, body, cached_at)) = row else {
      return Ok(None);
    };

    let response_type = ResponseType::parse(&response_type)
      .ok_or_else(|| StoreError::Corrupt(format!("unknown response type '{}'", response_type)))?;
    let headers: Vec<(String, String)> = serde_json::from_str(&headers)?;

    Ok(Some(CachedResponse {
      response: Response {
        status,
        response_type,
        headers,
        body: body.into(),
      },
      cached_at: parse_datetime(&cached_at)?,
    }))
  }

  fn put(&self, partition: &str, key: &RequestKey, response: &Response) -> StoreResult<()> {
    if key.method() != "GET" {
      return Err(StoreError::UnsupportedMethod(key.method().to_string()));
    }

    let headers = serde_json::to_string(&response.headers)?;
    let mut conn = self.lock()?;
    let tx = conn.transaction()?;
    tx.execute(
      "INSERT OR IGNORE INTO partitions (name) VALUES (?)",
      params![partition],
    )?;
    tx.execute(
      "INSERT OR REPLACE INTO entries
         (partition, key_hash, request_key, status, response_type, headers, body, cached_at)
       VALUES (?, ?, ?, ?, ?, ?, ?, datetime('now'))",
      params![
        partition,
        key.hash(),
        key.to_string(),
        response.status,
        response.response_type.as_str(),
        headers,
        &response.body[..],
      ],
    )?;
    tx.commit()?;
    Ok(())
  }

  fn delete_entry(&self, partition: &str, key: &RequestKey) -> StoreResult<bool> {
    let conn = self.lock()?;
    let removed = conn.execute(
      "DELETE FROM entries WHERE partition = ? AND key_hash = ?",
      params![partition, key.hash()],
    )?;
    Ok(removed > 0)
  }

  fn entry_count(&self, partition: &str) -> StoreResult<usize> {
    let conn = self.lock()?;
    let count: i64 = conn.query_row(
      "SELECT COUNT(*) FROM entries WHERE partition = ?",
      params![partition],
      |row| row.get(0),
    )?;
    Ok(count as usize)
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> StoreResult<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| StoreError::Corrupt(format!("bad timestamp '{}': {}", s, e)))
}
