use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::partition::PartitionKey;

/// Stem used for the catalog metadata artifacts.
pub const METADATA_STEM: &str = "covidcast_meta";

/// A reference to a written artifact, handed to the publisher.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChangeEntry {
    #[serde(rename = "Bucket")]
    pub bucket: String,
    #[serde(rename = "Key")]
    pub key: String,
}

impl ChangeEntry {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for ChangeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

/// Listing entry for one stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    pub key: String,
    pub last_modified: DateTime<Utc>,
    pub size: u64,
}

/// Errors that can occur when talking to the object store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("migration error: {0}")]
    Migration(String),

    #[error("object not found: {0}")]
    NotFound(String),
}

/// The object store artifacts are synced into.
///
/// `put` overwrites; `list` reflects every completed `put`.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// All objects whose key starts with `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>, StoreError>;

    /// Write `body` under `key`, replacing any previous object.
    async fn put(&self, key: &str, body: Vec<u8>) -> Result<(), StoreError>;

    /// Read an object back. The sync cycle never reads artifacts; this is
    /// for verifying what was written.
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;
}

#[async_trait::async_trait]
impl<T: ObjectStore + ?Sized> ObjectStore for Arc<T> {
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>, StoreError> {
        (**self).list(prefix).await
    }

    async fn put(&self, key: &str, body: Vec<u8>) -> Result<(), StoreError> {
        (**self).put(key, body).await
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        (**self).get(key).await
    }
}

/// Last-modified times of everything under the dataset prefix, read once
/// at the start of a cycle.
#[derive(Debug, Clone, Default)]
pub struct PartitionSnapshot {
    modified: HashMap<String, DateTime<Utc>>,
}

impl PartitionSnapshot {
    pub fn new(objects: impl IntoIterator<Item = ObjectMeta>) -> Self {
        Self {
            modified: objects
                .into_iter()
                .map(|meta| (meta.key, meta.last_modified))
                .collect(),
        }
    }

    pub fn last_modified(&self, key: &str) -> Option<DateTime<Utc>> {
        self.modified.get(key).copied()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.modified.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.modified.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modified.is_empty()
    }
}

/// The two encodings every partition is written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactFormat {
    Jsonl,
    Csv,
}

impl ArtifactFormat {
    pub const ALL: [ArtifactFormat; 2] = [ArtifactFormat::Jsonl, ArtifactFormat::Csv];

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jsonl => "jsonl",
            Self::Csv => "csv",
        }
    }
}

impl fmt::Display for ArtifactFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Deterministic key scheme: `<prefix><format>/<source>/<signal>/<time_type>/<geo_type>.<format>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyLayout {
    prefix: String,
}

impl KeyLayout {
    /// A trailing `/` is added to a non-empty prefix if missing.
    pub fn new(prefix: impl Into<String>) -> Self {
        let mut prefix = prefix.into();
        if !prefix.is_empty() && !prefix.ends_with('/') {
            prefix.push('/');
        }
        Self { prefix }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn partition_key(&self, partition: &PartitionKey, format: ArtifactFormat) -> String {
        self.artifact_key(&partition.path(), format)
    }

    pub fn metadata_key(&self, format: ArtifactFormat) -> String {
        self.artifact_key(METADATA_STEM, format)
    }

    /// Both keys for a partition, JSONL first.
    pub fn partition_keys(&self, partition: &PartitionKey) -> [String; 2] {
        ArtifactFormat::ALL.map(|format| self.partition_key(partition, format))
    }

    fn artifact_key(&self, stem: &str, format: ArtifactFormat) -> String {
        let ext = format.extension();
        format!("{}{ext}/{stem}.{ext}", self.prefix)
    }
}
