use std::sync::Arc;

use crate::config::SyncConfig;
use crate::encode::encode;
use crate::error::SyncError;
use crate::partition::PartitionDescriptor;
use crate::record::Record;
use crate::storage::{ArtifactFormat, ChangeEntry, KeyLayout, ObjectStore};

/// Encodes record collections and writes them under the dataset prefix.
///
/// Every write overwrites, so writing the same records twice leaves the
/// store byte-for-byte unchanged.
#[derive(Clone)]
pub struct PartitionWriter {
    store: Arc<dyn ObjectStore>,
    layout: KeyLayout,
    bucket: String,
}

impl PartitionWriter {
    pub fn new(store: Arc<dyn ObjectStore>, config: &SyncConfig) -> Self {
        Self {
            store,
            layout: KeyLayout::new(config.dataset_key_prefix.clone()),
            bucket: config.bucket.clone(),
        }
    }

    pub fn layout(&self) -> &KeyLayout {
        &self.layout
    }

    /// Write both artifacts for a partition. JSONL entry first, then CSV.
    pub async fn write_partition(
        &self,
        descriptor: &PartitionDescriptor,
        records: &[Record],
    ) -> Result<[ChangeEntry; 2], SyncError> {
        let keys = self.layout.partition_keys(&descriptor.key());
        self.write_pair(keys, records).await
    }

    /// Write the verbatim catalog rows as the dataset's metadata artifacts.
    pub async fn write_metadata(&self, catalog: &[Record]) -> Result<[ChangeEntry; 2], SyncError> {
        let keys = ArtifactFormat::ALL.map(|format| self.layout.metadata_key(format));
        self.write_pair(keys, catalog).await
    }

    async fn write_pair(
        &self,
        keys: [String; 2],
        records: &[Record],
    ) -> Result<[ChangeEntry; 2], SyncError> {
        let [jsonl_key, csv_key] = keys;
        let jsonl = self.write_artifact(jsonl_key, ArtifactFormat::Jsonl, records).await?;
        let csv = self.write_artifact(csv_key, ArtifactFormat::Csv, records).await?;
        Ok([jsonl, csv])
    }

    async fn write_artifact(
        &self,
        key: String,
        format: ArtifactFormat,
        records: &[Record],
    ) -> Result<ChangeEntry, SyncError> {
        let body = encode(format, records).map_err(|source| SyncError::Encode {
            artifact: key.clone(),
            source,
        })?;
        let bytes = body.len();

        self.store.put(&key, body).await?;
        tracing::debug!(key = %key, bytes, records = records.len(), "artifact written");

        Ok(ChangeEntry::new(self.bucket.clone(), key))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, NaiveDate, Utc};
    use serde_json::json;

    use crate::encode::decode_jsonl;
    use crate::partition::TimeType;
    use crate::test_support::InMemoryObjectStore;

    use super::*;

    fn descriptor() -> PartitionDescriptor {
        PartitionDescriptor {
            source: "jhu-csse".into(),
            signal: "confirmed_incidence_num".into(),
            time_type: TimeType::Day,
            geo_type: "state".into(),
            min_time: NaiveDate::from_ymd_opt(2020, 3, 1).unwrap(),
            max_time: NaiveDate::from_ymd_opt(2020, 3, 2).unwrap(),
            num_locations: 2,
            last_update: DateTime::<Utc>::from_timestamp(0, 0).unwrap(),
        }
    }

    fn records() -> Vec<Record> {
        vec![
            json!({"geo_value": "pa", "time_value": 20200301, "value": 12.0})
                .as_object()
                .cloned()
                .unwrap(),
            json!({"geo_value": "ny", "time_value": 20200301, "value": null})
                .as_object()
                .cloned()
                .unwrap(),
        ]
    }

    fn writer(store: &Arc<InMemoryObjectStore>) -> PartitionWriter {
        PartitionWriter::new(store.clone(), &SyncConfig::new("bucket", "covidcast"))
    }

    #[tokio::test]
    async fn writes_both_formats_under_partition_keys() {
        let store = Arc::new(InMemoryObjectStore::new());
        let entries = writer(&store).write_partition(&descriptor(), &records()).await.unwrap();

        assert_eq!(
            entries,
            [
                ChangeEntry::new(
                    "bucket",
                    "covidcast/dataset/jsonl/jhu-csse/confirmed_incidence_num/day/state.jsonl"
                ),
                ChangeEntry::new(
                    "bucket",
                    "covidcast/dataset/csv/jhu-csse/confirmed_incidence_num/day/state.csv"
                ),
            ]
        );

        let jsonl = store.object(&entries[0].key).unwrap();
        assert_eq!(decode_jsonl(&jsonl).unwrap(), records());

        let csv = store.object(&entries[1].key).unwrap();
        assert_eq!(
            String::from_utf8(csv).unwrap(),
            "geo_value,time_value,value\r\npa,20200301,12.0\r\nny,20200301,\r\n"
        );
    }

    #[tokio::test]
    async fn empty_partition_writes_zero_length_artifacts() {
        let store = Arc::new(InMemoryObjectStore::new());
        let entries = writer(&store).write_partition(&descriptor(), &[]).await.unwrap();

        for entry in &entries {
            assert_eq!(store.object(&entry.key), Some(Vec::new()));
        }
    }

    #[tokio::test]
    async fn rewriting_is_byte_identical() {
        let store = Arc::new(InMemoryObjectStore::new());
        let writer = writer(&store);

        let first = writer.write_partition(&descriptor(), &records()).await.unwrap();
        let before: Vec<_> = first.iter().map(|e| store.object(&e.key).unwrap()).collect();

        let second = writer.write_partition(&descriptor(), &records()).await.unwrap();
        let after: Vec<_> = second.iter().map(|e| store.object(&e.key).unwrap()).collect();

        assert_eq!(first, second);
        assert_eq!(before, after);
        assert_eq!(store.len(), 2);
        assert_eq!(store.put_count(), 4);
    }

    #[tokio::test]
    async fn metadata_lands_beside_partitions() {
        let store = Arc::new(InMemoryObjectStore::new());
        let entries = writer(&store).write_metadata(&records()).await.unwrap();

        assert_eq!(entries[0].key, "covidcast/dataset/jsonl/covidcast_meta.jsonl");
        assert_eq!(entries[1].key, "covidcast/dataset/csv/covidcast_meta.csv");
        assert!(store.object(&entries[1].key).is_some());
    }
}
