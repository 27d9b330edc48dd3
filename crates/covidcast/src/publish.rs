use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};

use crate::engine::CycleReport;
use crate::error::SyncError;
use crate::storage::ChangeEntry;

/// Errors raised by a dataset publisher.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("publication rejected: {0}")]
    Rejected(String),

    #[error("publication storage error: {0}")]
    Storage(String),
}

/// A dataset revision as seen by the publisher.
#[derive(Debug, Clone, PartialEq)]
pub struct RevisionSummary {
    pub id: i64,
    pub comment: String,
    pub created_at: DateTime<Utc>,
    pub finalized: bool,
    pub asset_count: usize,
}

/// Turns change batches into a new dataset revision.
#[async_trait::async_trait]
pub trait Publisher: Send + Sync {
    /// The most recent revision, if any exists.
    async fn latest_revision(&self) -> Result<Option<RevisionSummary>, PublishError>;

    /// Create a revision, import every batch into it in order, then finalize it.
    async fn publish(
        &self,
        batches: &[Vec<ChangeEntry>],
        comment: &str,
    ) -> Result<RevisionSummary, PublishError>;
}

#[async_trait::async_trait]
impl<T: Publisher + ?Sized> Publisher for Arc<T> {
    async fn latest_revision(&self) -> Result<Option<RevisionSummary>, PublishError> {
        (**self).latest_revision().await
    }

    async fn publish(
        &self,
        batches: &[Vec<ChangeEntry>],
        comment: &str,
    ) -> Result<RevisionSummary, PublishError> {
        (**self).publish(batches, comment).await
    }
}

pub fn revision_comment(date: NaiveDate) -> String {
    format!("Revision Updates v{}", date.format("%Y-%m-%d"))
}

/// Hand a finished cycle to `publisher`. Returns `None` when the cycle
/// produced nothing to publish.
pub async fn publish_cycle(
    publisher: &dyn Publisher,
    report: &CycleReport,
    date: NaiveDate,
) -> Result<Option<RevisionSummary>, SyncError> {
    if report.batches.is_empty() {
        tracing::info!(outcome = %report.outcome, "nothing to publish");
        return Ok(None);
    }

    let comment = revision_comment(date);
    let revision = publisher.publish(&report.batches, &comment).await?;

    tracing::info!(
        revision = revision.id,
        assets = revision.asset_count,
        batches = report.batches.len(),
        "published revision"
    );

    Ok(Some(revision))
}
