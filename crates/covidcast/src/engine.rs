use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::api::EpidataApi;
use crate::batch::batch;
use crate::catalog::Catalog;
use crate::config::{SyncConfig, UnchangedPolicy};
use crate::diff::{CatalogDiff, CatalogDiffer};
use crate::dispatch::Dispatcher;
use crate::error::SyncError;
use crate::fetch::{SkippedWindow, WindowedFetcher};
use crate::publish::Publisher;
use crate::retry::retry;
use crate::storage::{ArtifactFormat, ChangeEntry, ObjectStore, PartitionSnapshot};
use crate::writer::PartitionWriter;

/// How a cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Stale partitions were fetched and rewritten.
    Synced,
    /// Nothing was stale; the stored artifacts are batched again.
    Republish,
    /// Nothing was stale and the latest revision is final.
    UpToDate,
}

impl fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Synced => write!(f, "synced"),
            Self::Republish => write!(f, "republish"),
            Self::UpToDate => write!(f, "up to date"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub catalog_partitions: usize,
    pub rejected_rows: usize,
    pub excluded: usize,
    pub unchanged: usize,
    pub synced: usize,
    pub windows: usize,
    pub records: usize,
    pub entries: usize,
}

/// Output of a completed cycle, ready for a publisher.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub outcome: CycleOutcome,
    pub batches: Vec<Vec<ChangeEntry>>,
    pub stats: CycleStats,
    pub skipped_windows: Vec<SkippedWindow>,
}

/// Catalog, snapshot and their classification, before anything is fetched.
#[derive(Debug, Clone)]
pub struct CyclePlan {
    pub catalog: Catalog,
    pub snapshot: PartitionSnapshot,
    pub diff: CatalogDiff,
}

/// Drives one sync cycle: catalog, snapshot, diff, sync, metadata, batches.
pub struct SyncEngine {
    api: Arc<dyn EpidataApi>,
    store: Arc<dyn ObjectStore>,
    publisher: Arc<dyn Publisher>,
    config: SyncConfig,
    differ: CatalogDiffer,
    writer: PartitionWriter,
    dispatcher: Dispatcher,
}

impl SyncEngine {
    pub fn new(
        api: Arc<dyn EpidataApi>,
        store: Arc<dyn ObjectStore>,
        publisher: Arc<dyn Publisher>,
        config: SyncConfig,
    ) -> Result<Self, SyncError> {
        config.validate()?;

        let differ = CatalogDiffer::new(&config);
        let writer = PartitionWriter::new(Arc::clone(&store), &config);
        let fetcher = WindowedFetcher::new(Arc::clone(&api), &config);
        let dispatcher = Dispatcher::new(fetcher, writer.clone(), config.max_partition_workers);

        Ok(Self {
            api,
            store,
            publisher,
            config,
            differ,
            writer,
            dispatcher,
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub async fn fetch_catalog(&self) -> Result<Catalog, SyncError> {
        let api = self.api.as_ref();
        let response = retry(&self.config.retry, move |_| api.catalog())
            .await
            .map_err(|failure| SyncError::CatalogTransport {
                url: failure.error.url.clone(),
                attempts: failure.attempts,
                source: failure.error,
            })?;

        let catalog = Catalog::from_response(response)?;
        tracing::info!(
            partitions = catalog.partitions.len(),
            rejected = catalog.rejected,
            "catalog fetched"
        );
        Ok(catalog)
    }

    /// List the dataset prefix once.
    pub async fn snapshot(&self) -> Result<PartitionSnapshot, SyncError> {
        let objects = self.store.list(self.writer.layout().prefix()).await?;
        Ok(PartitionSnapshot::new(objects))
    }

    /// Fetch the catalog and snapshot and classify every partition.
    pub async fn plan(&self) -> Result<CyclePlan, SyncError> {
        let catalog = self.fetch_catalog().await?;
        let snapshot = self.snapshot().await?;
        let diff = self.differ.diff(&catalog.partitions, &snapshot);
        Ok(CyclePlan {
            catalog,
            snapshot,
            diff,
        })
    }

    /// Run one full cycle and return the batches to publish.
    ///
    /// Any fatal error aborts the cycle before batches exist, so nothing
    /// from a failed cycle reaches the publisher. Artifacts written before
    /// the failure stay in the store and are picked up as fresh next time.
    pub async fn run_cycle(&self) -> Result<CycleReport, SyncError> {
        let CyclePlan {
            catalog,
            snapshot,
            diff,
        } = self.plan().await?;

        let mut stats = CycleStats {
            catalog_partitions: catalog.partitions.len(),
            rejected_rows: catalog.rejected,
            excluded: diff.excluded.len(),
            unchanged: diff.unchanged.len(),
            ..CycleStats::default()
        };

        if diff.is_up_to_date() {
            let metadata = self.stored_metadata(&snapshot);
            let last_stored = metadata
                .iter()
                .filter_map(|e| snapshot.last_modified(&e.key))
                .chain(diff.last_stored())
                .max();

            let outcome = self.unchanged_outcome(last_stored).await?;
            let batches = match outcome {
                CycleOutcome::Republish => {
                    batch(metadata, diff.unchanged_entries(), self.config.max_batch_size)
                }
                _ => Vec::new(),
            };
            stats.entries = batches.iter().map(Vec::len).sum();

            tracing::info!(%outcome, unchanged = stats.unchanged, "catalog unchanged");
            return Ok(CycleReport {
                outcome,
                batches,
                stats,
                skipped_windows: Vec::new(),
            });
        }

        let synced = self.dispatcher.sync_all(&diff.needs_update).await?;

        let mut new_entries = Vec::with_capacity(synced.len() * 2 + 2);
        let mut skipped_windows = Vec::new();
        for partition in synced {
            stats.synced += 1;
            stats.windows += partition.windows;
            stats.records += partition.records;
            new_entries.extend(partition.entries);
            skipped_windows.extend(partition.skipped);
        }

        new_entries.extend(self.writer.write_metadata(&catalog.records).await?);

        let batches = batch(new_entries, diff.unchanged_entries(), self.config.max_batch_size);
        stats.entries = batches.iter().map(Vec::len).sum();

        tracing::info!(
            synced = stats.synced,
            unchanged = stats.unchanged,
            entries = stats.entries,
            batches = batches.len(),
            skipped_windows = skipped_windows.len(),
            "cycle complete"
        );

        Ok(CycleReport {
            outcome: CycleOutcome::Synced,
            batches,
            stats,
            skipped_windows,
        })
    }

    // Metadata artifacts already in the store, JSONL first.
    fn stored_metadata(&self, snapshot: &PartitionSnapshot) -> Vec<ChangeEntry> {
        let layout = self.writer.layout();
        ArtifactFormat::ALL
            .into_iter()
            .map(|format| layout.metadata_key(format))
            .filter(|key| snapshot.contains(key))
            .map(|key| ChangeEntry::new(self.config.bucket.clone(), key))
            .collect()
    }

    /// A finalized revision only covers artifacts written before it was
    /// created. Anything stored later was never published and goes out again.
    async fn unchanged_outcome(
        &self,
        last_stored: Option<DateTime<Utc>>,
    ) -> Result<CycleOutcome, SyncError> {
        match self.config.unchanged_policy {
            UnchangedPolicy::AlwaysRepublish => Ok(CycleOutcome::Republish),
            UnchangedPolicy::SkipWhenFinalized => {
                let Some(revision) = self.publisher.latest_revision().await? else {
                    return Ok(CycleOutcome::Republish);
                };
                if !revision.finalized {
                    return Ok(CycleOutcome::Republish);
                }
                match last_stored {
                    Some(stored_at) if stored_at > revision.created_at => {
                        tracing::info!(
                            revision = revision.id,
                            created_at = %revision.created_at,
                            stored_at = %stored_at,
                            "artifacts written after the latest revision"
                        );
                        Ok(CycleOutcome::Republish)
                    }
                    _ => Ok(CycleOutcome::UpToDate),
                }
            }
        }
    }
}
