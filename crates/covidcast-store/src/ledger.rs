use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use covidcast::config::DEFAULT_MAX_BATCH_SIZE;
use covidcast::{ChangeEntry, PublishError, Publisher, RevisionSummary, StoreError};

use crate::schema;

/// A local record of published dataset revisions.
///
/// Each `publish` creates a revision, imports the batches in order and
/// finalizes it, all in one transaction. Batches larger than the accepted
/// size are refused outright.
pub struct RevisionLedger {
    conn: Mutex<rusqlite::Connection>,
    max_batch_size: usize,
}

impl RevisionLedger {
    /// Open a ledger backed by a file on disk.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn =
            rusqlite::Connection::open(path).map_err(|e| StoreError::Database(e.to_string()))?;
        Self::with_connection(conn)
    }

    /// Open an in-memory ledger (for testing).
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
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
        })
    }

    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }

    /// All revisions, newest first.
    pub fn revisions(&self) -> Result<Vec<RevisionSummary>, PublishError> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn
            .prepare(&format!("{SUMMARY_SELECT} ORDER BY r.id DESC"))
            .map_err(storage_error)?;

        let revisions = stmt
            .query_map([], Self::row_to_summary)
            .map_err(storage_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(storage_error)?;

        Ok(revisions)
    }

    /// Entries imported into a revision, in import order.
    pub fn assets(&self, revision_id: i64) -> Result<Vec<ChangeEntry>, PublishError> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn
            .prepare(
                "SELECT bucket, key FROM revision_assets
                 WHERE revision_id = ?1
                 ORDER BY position",
            )
            .map_err(storage_error)?;

        let assets = stmt
            .query_map([revision_id], |row| {
                Ok(ChangeEntry::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(storage_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(storage_error)?;

        Ok(assets)
    }

    fn row_to_summary(row: &rusqlite::Row) -> rusqlite::Result<RevisionSummary> {
        let id: i64 = row.get(0)?;
        let comment: String = row.get(1)?;
        let created_at: i64 = row.get(2)?;
        let finalized: bool = row.get(3)?;
        let asset_count: i64 = row.get(4)?;

        Ok(RevisionSummary {
            id,
            comment,
            created_at: DateTime::<Utc>::from_timestamp_millis(created_at).unwrap_or_default(),
            finalized,
            asset_count: asset_count.max(0) as usize,
        })
    }
}

const SUMMARY_SELECT: &str = "SELECT r.id, r.comment, r.created_at, r.finalized,
        (SELECT COUNT(*) FROM revision_assets a WHERE a.revision_id = r.id)
     FROM revisions r";

fn storage_error(e: rusqlite::Error) -> PublishError {
    PublishError::Storage(e.to_string())
}

#[async_trait::async_trait]
impl Publisher for RevisionLedger {
    async fn latest_revision(&self) -> Result<Option<RevisionSummary>, PublishError> {
        let conn = self.conn.lock().unwrap();

        match conn.query_row(
            &format!("{SUMMARY_SELECT} ORDER BY r.id DESC LIMIT 1"),
            [],
            Self::row_to_summary,
        ) {
            Ok(summary) => Ok(Some(summary)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(storage_error(e)),
        }
    }

    async fn publish(
        &self,
        batches: &[Vec<ChangeEntry>],
        comment: &str,
    ) -> Result<RevisionSummary, PublishError> {
        if batches.iter().all(Vec::is_empty) {
            return Err(PublishError::Rejected("no entries to publish".into()));
        }
        if let Some((index, oversized)) = batches
            .iter()
            .enumerate()
            .find(|(_, b)| b.len() > self.max_batch_size)
        {
            return Err(PublishError::Rejected(format!(
                "batch {index} has {} entries, limit is {}",
                oversized.len(),
                self.max_batch_size
            )));
        }

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(storage_error)?;
        let created_at = Utc::now().timestamp_millis();

        tx.execute(
            "INSERT INTO revisions (comment, created_at, finalized) VALUES (?1, ?2, 0)",
            rusqlite::params![comment, created_at],
        )
        .map_err(storage_error)?;
        let revision_id = tx.last_insert_rowid();

        let mut position = 0i64;
        for (batch_index, batch) in batches.iter().enumerate() {
            for entry in batch {
                tx.execute(
                    "INSERT INTO revision_assets (revision_id, position, batch, bucket, key)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    rusqlite::params![revision_id, position, batch_index as i64, entry.bucket, entry.key],
                )
                .map_err(storage_error)?;
                position += 1;
            }
            tracing::debug!(revision = revision_id, batch = batch_index, entries = batch.len(), "batch imported");
        }

        tx.execute(
            "UPDATE revisions SET finalized = 1 WHERE id = ?1",
            [revision_id],
        )
        .map_err(storage_error)?;

        let summary = tx
            .query_row(
                &format!("{SUMMARY_SELECT} WHERE r.id = ?1"),
                [revision_id],
                Self::row_to_summary,
            )
            .map_err(storage_error)?;
        tx.commit().map_err(storage_error)?;

        Ok(summary)
    }
}
