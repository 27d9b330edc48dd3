use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use covidcast::{ObjectMeta, ObjectStore, StoreError};

use crate::schema;

/// A SQLite-backed object store keyed by artifact path.
///
/// `put` replaces the whole object and stamps it with the current time,
/// which is what the differ compares catalog updates against.
pub struct SqliteObjectStore {
    conn: Mutex<rusqlite::Connection>,
}

impl SqliteObjectStore {
    /// Open a store backed by a file on disk.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn =
            rusqlite::Connection::open(path).map_err(|e| StoreError::Database(e.to_string()))?;
        Self::with_connection(conn)
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = rusqlite::Connection::open_in_memory()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Self::with_connection(conn)
    }

    fn with_connection(mut conn: rusqlite::Connection) -> Result<Self, StoreError> {
        schema::migrations()
            .to_latest(&mut conn)
            .map_err(|e| StoreError::Migration(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Overwrite an object's modification time (for testing staleness).
    pub fn set_last_modified(&self, key: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        let updated = conn
            .execute(
                "UPDATE objects SET last_modified = ?1 WHERE key = ?2",
                rusqlite::params![at.timestamp_millis(), key],
            )
            .map_err(|e| StoreError::Database(e.to_string()))?;

        if updated == 0 {
            return Err(StoreError::NotFound(key.to_owned()));
        }
        Ok(())
    }

    pub fn count(&self) -> Result<usize, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT COUNT(*) FROM objects", [], |row| row.get::<_, i64>(0))
            .map(|n| n as usize)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn row_to_meta(row: &rusqlite::Row) -> rusqlite::Result<ObjectMeta> {
        let key: String = row.get(0)?;
        let millis: i64 = row.get(1)?;
        let size: i64 = row.get(2)?;

        Ok(ObjectMeta {
            key,
            last_modified: DateTime::<Utc>::from_timestamp_millis(millis).unwrap_or_default(),
            size: size.max(0) as u64,
        })
    }
}

#[async_trait::async_trait]
impl ObjectStore for SqliteObjectStore {
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>, StoreError> {
        let conn = self.conn.lock().unwrap();

        // substr keeps `_` and `%` in keys literal, unlike LIKE.
        let mut stmt = conn
            .prepare(
                "SELECT key, last_modified, length(body)
                 FROM objects
                 WHERE substr(key, 1, length(?1)) = ?1
                 ORDER BY key",
            )
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let objects = stmt
            .query_map([prefix], Self::row_to_meta)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(objects)
    }

    async fn put(&self, key: &str, body: Vec<u8>) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        let size = body.len();

        conn.execute(
            "INSERT OR REPLACE INTO objects (key, body, last_modified) VALUES (?1, ?2, ?3)",
            rusqlite::params![key, body, Utc::now().timestamp_millis()],
        )
        .map_err(|e| StoreError::Database(e.to_string()))?;

        tracing::trace!(key, size, "object stored");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let conn = self.conn.lock().unwrap();

        conn.query_row("SELECT body FROM objects WHERE key = ?1", [key], |row| {
            row.get(0)
        })
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound(key.to_owned()),
            other => StoreError::Database(other.to_string()),
        })
    }
}
