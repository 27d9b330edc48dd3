use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};

use crate::config::SyncConfig;
use crate::partition::{PartitionDescriptor, PartitionKey};
use crate::storage::{ChangeEntry, KeyLayout, PartitionSnapshot};

/// A partition whose stored artifacts are newer than its catalog entry.
#[derive(Debug, Clone, PartialEq)]
pub struct UnchangedPartition {
    pub key: PartitionKey,
    /// JSONL entry first, then CSV.
    pub entries: [ChangeEntry; 2],
    /// Later of the two artifacts' modification times.
    pub stored_at: DateTime<Utc>,
}

/// Classification of one catalog against one snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogDiff {
    pub needs_update: Vec<PartitionDescriptor>,
    pub unchanged: Vec<UnchangedPartition>,
    pub excluded: Vec<PartitionKey>,
}

impl CatalogDiff {
    pub fn unchanged_entries(&self) -> Vec<ChangeEntry> {
        self.unchanged
            .iter()
            .flat_map(|p| p.entries.iter().cloned())
            .collect()
    }

    /// True when stored artifacts exist and none of them is stale.
    pub fn is_up_to_date(&self) -> bool {
        self.needs_update.is_empty() && !self.unchanged.is_empty()
    }

    /// Most recent write among the unchanged partitions.
    pub fn last_stored(&self) -> Option<DateTime<Utc>> {
        self.unchanged.iter().map(|p| p.stored_at).max()
    }
}

pub struct CatalogDiffer {
    config: SyncConfig,
    layout: KeyLayout,
}

impl CatalogDiffer {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            config: config.clone(),
            layout: KeyLayout::new(config.dataset_key_prefix.clone()),
        }
    }

    /// Classify every catalog partition exactly once.
    ///
    /// Rows sharing an identity are collapsed to the freshest one. Output is
    /// ordered by partition key, so it does not depend on catalog order.
    pub fn diff(&self, catalog: &[PartitionDescriptor], snapshot: &PartitionSnapshot) -> CatalogDiff {
        let mut by_key: BTreeMap<PartitionKey, &PartitionDescriptor> = BTreeMap::new();
        for descriptor in catalog {
            by_key
                .entry(descriptor.key())
                .and_modify(|current| {
                    if freshness(descriptor) > freshness(current) {
                        *current = descriptor;
                    }
                })
                .or_insert(descriptor);
        }

        let mut diff = CatalogDiff::default();
        for (key, descriptor) in by_key {
            if self.config.is_excluded(&key.source) {
                diff.excluded.push(key);
                continue;
            }

            let keys = self.layout.partition_keys(&key);
            let [jsonl_at, csv_at] = keys.each_ref().map(|k| snapshot.last_modified(k));

            match (jsonl_at, csv_at) {
                (Some(jsonl_at), Some(csv_at))
                    if jsonl_at > descriptor.last_update && csv_at > descriptor.last_update =>
                {
                    let entries = keys.map(|k| ChangeEntry::new(self.config.bucket.clone(), k));
                    diff.unchanged.push(UnchangedPartition {
                        key,
                        entries,
                        stored_at: jsonl_at.max(csv_at),
                    });
                }
                _ => diff.needs_update.push(descriptor.clone()),
            }
        }

        tracing::debug!(
            needs_update = diff.needs_update.len(),
            unchanged = diff.unchanged.len(),
            excluded = diff.excluded.len(),
            "catalog diffed"
        );

        diff
    }
}

// Total order used to pick between duplicate catalog rows.
fn freshness(d: &PartitionDescriptor) -> (DateTime<Utc>, NaiveDate, NaiveDate, u64) {
    (d.last_update, d.max_time, d.min_time, d.num_locations)
}
