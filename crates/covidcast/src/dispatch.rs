use futures::{StreamExt, TryStreamExt, stream};

use crate::error::SyncError;
use crate::fetch::{SkippedWindow, WindowedFetcher};
use crate::partition::{PartitionDescriptor, PartitionKey};
use crate::storage::ChangeEntry;
use crate::writer::PartitionWriter;

/// Workers for a run of `partitions` stale partitions: half the workload,
/// at least one, at most `max_workers`.
pub fn worker_count(partitions: usize, max_workers: usize) -> usize {
    (partitions / 2).clamp(1, max_workers.max(1))
}

/// Result of fetching and writing one partition.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionSync {
    pub key: PartitionKey,
    pub entries: [ChangeEntry; 2],
    pub records: usize,
    pub windows: usize,
    pub skipped: Vec<SkippedWindow>,
}

/// Runs fetch then write for many partitions on a bounded set of workers.
pub struct Dispatcher {
    fetcher: WindowedFetcher,
    writer: PartitionWriter,
    max_workers: usize,
}

impl Dispatcher {
    pub fn new(fetcher: WindowedFetcher, writer: PartitionWriter, max_workers: usize) -> Self {
        Self {
            fetcher,
            writer,
            max_workers,
        }
    }

    pub async fn sync_partition(&self, descriptor: &PartitionDescriptor) -> Result<PartitionSync, SyncError> {
        let fetched = self.fetcher.fetch(descriptor).await?;
        let entries = self.writer.write_partition(descriptor, &fetched.records).await?;

        tracing::info!(
            partition = %descriptor.key(),
            records = fetched.records.len(),
            windows = fetched.windows,
            "partition synced"
        );

        Ok(PartitionSync {
            key: descriptor.key(),
            entries,
            records: fetched.records.len(),
            windows: fetched.windows,
            skipped: fetched.skipped,
        })
    }

    /// Sync every partition in `needs_update`.
    ///
    /// The first failure is returned as soon as it happens and the pipelines
    /// still in flight are dropped. On success, results follow input order.
    pub async fn sync_all(&self, needs_update: &[PartitionDescriptor]) -> Result<Vec<PartitionSync>, SyncError> {
        if needs_update.is_empty() {
            return Ok(Vec::new());
        }

        let workers = worker_count(needs_update.len(), self.max_workers);
        tracing::info!(partitions = needs_update.len(), workers, "syncing partitions");

        let mut synced: Vec<(usize, PartitionSync)> = stream::iter(needs_update.iter().enumerate())
            .map(|(index, descriptor)| async move {
                self.sync_partition(descriptor).await.map(|sync| (index, sync))
            })
            .buffer_unordered(workers)
            .try_collect()
            .await?;

        synced.sort_by_key(|(index, _)| *index);
        Ok(synced.into_iter().map(|(_, sync)| sync).collect())
    }
}
