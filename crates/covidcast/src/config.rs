use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

/// Row cap of a single Epidata call.
pub const DEFAULT_MAX_ROWS_PER_CALL: u64 = 3650;

/// Entries accepted per publication call.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;

/// What to emit when the catalog reports nothing new.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnchangedPolicy {
    /// Emit nothing if the latest revision is already finalized; otherwise
    /// re-batch the unchanged artifacts.
    #[default]
    SkipWhenFinalized,
    /// Always re-batch the unchanged artifacts.
    AlwaysRepublish,
}

/// Settings for one sync engine. Built by the caller; the engine never
/// consults the process environment.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    pub bucket: String,
    pub dataset_key_prefix: String,
    pub max_rows_per_call: u64,
    pub max_batch_size: usize,
    pub excluded_sources: Vec<String>,
    /// In-flight window calls per partition.
    pub window_concurrency: usize,
    /// Upper bound on partitions synced at once.
    pub max_partition_workers: usize,
    pub retry: RetryPolicy,
    pub unchanged_policy: UnchangedPolicy,
}

/// Errors for settings that cannot drive a sync.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("bucket must not be empty")]
    EmptyBucket,

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Sources left out of every sync.
pub fn default_excluded_sources() -> Vec<String> {
    vec!["covid-act-now".to_owned()]
}

impl SyncConfig {
    /// Defaults for a dataset named `dataset_name` in `bucket`; artifacts land
    /// under `<dataset_name>/dataset/`.
    pub fn new(bucket: impl Into<String>, dataset_name: &str) -> Self {
        Self {
            bucket: bucket.into(),
            dataset_key_prefix: format!("{dataset_name}/dataset/"),
            max_rows_per_call: DEFAULT_MAX_ROWS_PER_CALL,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            excluded_sources: default_excluded_sources(),
            window_concurrency: 16,
            max_partition_workers: 4,
            retry: RetryPolicy::default(),
            unchanged_policy: UnchangedPolicy::default(),
        }
    }

    pub fn is_excluded(&self, source: &str) -> bool {
        self.excluded_sources.iter().any(|s| s == source)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bucket.trim().is_empty() {
            return Err(ConfigError::EmptyBucket);
        }
        if self.max_rows_per_call == 0 {
            return Err(ConfigError::Zero("max_rows_per_call"));
        }
        if self.max_batch_size == 0 {
            return Err(ConfigError::Zero("max_batch_size"));
        }
        if self.window_concurrency == 0 {
            return Err(ConfigError::Zero("window_concurrency"));
        }
        if self.max_partition_workers == 0 {
            return Err(ConfigError::Zero("max_partition_workers"));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Zero("retry.max_attempts"));
        }
        Ok(())
    }
}
