use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{Value, json};

use crate::api::{EpidataApi, TransportError, WindowQuery};
use crate::partition::PartitionKey;
use crate::publish::{PublishError, Publisher, RevisionSummary};
use crate::record::{EpidataResponse, Record};
use crate::storage::{ChangeEntry, ObjectMeta, ObjectStore, StoreError};
use crate::window::format_time_value;

#[derive(Debug, Clone)]
struct StoredObject {
    body: Vec<u8>,
    last_modified: DateTime<Utc>,
}

/// In-memory object store. `put` stamps objects with the wall clock.
#[derive(Default)]
pub struct InMemoryObjectStore {
    objects: Mutex<BTreeMap<String, StoredObject>>,
    puts: AtomicUsize,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an object with an explicit modification time.
    pub fn put_at(&self, key: &str, body: Vec<u8>, last_modified: DateTime<Utc>) {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_owned(), StoredObject { body, last_modified });
    }

    pub fn set_last_modified(&self, key: &str, last_modified: DateTime<Utc>) {
        if let Some(object) = self.objects.lock().unwrap().get_mut(key) {
            object.last_modified = last_modified;
        }
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).map(|o| o.body.clone())
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>, StoreError> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, object)| ObjectMeta {
                key: key.clone(),
                last_modified: object.last_modified,
                size: object.body.len() as u64,
            })
            .collect())
    }

    async fn put(&self, key: &str, body: Vec<u8>) -> Result<(), StoreError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.put_at(key, body, Utc::now());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.object(key)
            .ok_or_else(|| StoreError::NotFound(key.to_owned()))
    }
}

type Scripted = Result<EpidataResponse, TransportError>;

/// Epidata fake driven by per-window scripts.
///
/// Responses queued with [`respond`](Self::respond) are consumed in order for
/// their `(partition, time_values)` pair. Once a window's script runs out,
/// it answers with one generated row per call.
pub struct ScriptedEpidata {
    catalog: Vec<Record>,
    catalog_script: Mutex<VecDeque<Scripted>>,
    scripts: Mutex<HashMap<(String, String), VecDeque<Scripted>>>,
    window_delays: Mutex<HashMap<(String, String), Duration>>,
    default_delay: Mutex<Duration>,
    queries: Mutex<Vec<WindowQuery>>,
    catalog_calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl ScriptedEpidata {
    pub fn new(catalog: Vec<Record>) -> Self {
        Self {
            catalog,
            catalog_script: Mutex::new(VecDeque::new()),
            scripts: Mutex::new(HashMap::new()),
            window_delays: Mutex::new(HashMap::new()),
            default_delay: Mutex::new(Duration::ZERO),
            queries: Mutex::new(Vec::new()),
            catalog_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn respond(&self, partition: &PartitionKey, time_values: &str, response: Scripted) {
        self.scripts
            .lock()
            .unwrap()
            .entry((partition.path(), time_values.to_owned()))
            .or_default()
            .push_back(response);
    }

    /// Queue a response for the next catalog call; afterwards the catalog
    /// passed to [`new`](Self::new) is served.
    pub fn respond_catalog(&self, response: Scripted) {
        self.catalog_script.lock().unwrap().push_back(response);
    }

    pub fn delay_window(&self, partition: &PartitionKey, time_values: &str, delay: Duration) {
        self.window_delays
            .lock()
            .unwrap()
            .insert((partition.path(), time_values.to_owned()), delay);
    }

    pub fn delay_all(&self, delay: Duration) {
        *self.default_delay.lock().unwrap() = delay;
    }

    pub fn queries(&self) -> Vec<WindowQuery> {
        self.queries.lock().unwrap().clone()
    }

    pub fn query_count(&self) -> usize {
        self.queries.lock().unwrap().len()
    }

    pub fn catalog_calls(&self) -> usize {
        self.catalog_calls.load(Ordering::SeqCst)
    }

    /// Most window calls observed running at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn generated(query: &WindowQuery) -> EpidataResponse {
        let time_type = query.window.time_type;
        let mut row = Record::new();
        row.insert("geo_value".into(), json!("pa"));
        row.insert("signal".into(), Value::String(query.partition.signal.clone()));
        row.insert(
            "time_value".into(),
            json!(format_time_value(time_type, query.window.start)),
        );
        row.insert("value".into(), json!(1.5));
        EpidataResponse::ok(vec![row])
    }
}

#[async_trait::async_trait]
impl EpidataApi for ScriptedEpidata {
    async fn catalog(&self) -> Result<EpidataResponse, TransportError> {
        self.catalog_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(scripted) = self.catalog_script.lock().unwrap().pop_front() {
            return scripted;
        }
        Ok(EpidataResponse::ok(self.catalog.clone()))
    }

    async fn query(&self, query: &WindowQuery) -> Result<EpidataResponse, TransportError> {
        let slot = (query.partition.path(), query.window.time_values());
        self.queries.lock().unwrap().push(query.clone());

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);

        let delay = self
            .window_delays
            .lock()
            .unwrap()
            .get(&slot)
            .copied()
            .unwrap_or_else(|| *self.default_delay.lock().unwrap());
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&slot)
            .and_then(VecDeque::pop_front);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        scripted.unwrap_or_else(|| Ok(Self::generated(query)))
    }
}

/// A publication that reached [`RecordingPublisher`].
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedRevision {
    pub comment: String,
    pub batches: Vec<Vec<ChangeEntry>>,
}

/// Publisher fake that keeps every publication in memory.
pub struct RecordingPublisher {
    latest: Mutex<Option<RevisionSummary>>,
    published: Mutex<Vec<PublishedRevision>>,
    max_batch_size: usize,
}

impl Default for RecordingPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self {
            latest: Mutex::new(None),
            published: Mutex::new(Vec::new()),
            max_batch_size: crate::config::DEFAULT_MAX_BATCH_SIZE,
        }
    }

    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }

    /// Pretend a revision already exists.
    pub fn with_latest(self, finalized: bool) -> Self {
        *self.latest.lock().unwrap() = Some(RevisionSummary {
            id: 1,
            comment: "Revision Updates v2020-01-01".into(),
            created_at: DateTime::<Utc>::from_timestamp(1_577_836_800, 0).unwrap_or_default(),
            finalized,
            asset_count: 0,
        });
        self
    }

    pub fn published(&self) -> Vec<PublishedRevision> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Publisher for RecordingPublisher {
    async fn latest_revision(&self) -> Result<Option<RevisionSummary>, PublishError> {
        Ok(self.latest.lock().unwrap().clone())
    }

    async fn publish(
        &self,
        batches: &[Vec<ChangeEntry>],
        comment: &str,
    ) -> Result<RevisionSummary, PublishError> {
        if let Some(oversized) = batches.iter().find(|b| b.len() > self.max_batch_size) {
            return Err(PublishError::Rejected(format!(
                "batch of {} entries exceeds limit of {}",
                oversized.len(),
                self.max_batch_size
            )));
        }

        let mut latest = self.latest.lock().unwrap();
        let revision = RevisionSummary {
            id: latest.as_ref().map_or(1, |r| r.id + 1),
            comment: comment.to_owned(),
            created_at: Utc::now(),
            finalized: true,
            asset_count: batches.iter().map(Vec::len).sum(),
        };
        *latest = Some(revision.clone());

        self.published.lock().unwrap().push(PublishedRevision {
            comment: comment.to_owned(),
            batches: batches.to_vec(),
        });

        Ok(revision)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use crate::partition::TimeType;
    use crate::window::TimeWindow;

    use super::*;

    fn query(start: (i32, u32, u32)) -> WindowQuery {
        let date = NaiveDate::from_ymd_opt(start.0, start.1, start.2).unwrap();
        WindowQuery {
            partition: PartitionKey::new("src", "sig", TimeType::Day, "state"),
            window: TimeWindow {
                time_type: TimeType::Day,
                start: date,
                end: date,
            },
        }
    }

    #[tokio::test]
    async fn store_lists_by_prefix() {
        let store = InMemoryObjectStore::new();
        store.put("a/1", b"one".to_vec()).await.unwrap();
        store.put("b/1", b"two".to_vec()).await.unwrap();

        let listed = store.list("a/").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].key, "a/1");
        assert_eq!(listed[0].size, 3);
        assert!(matches!(store.get("missing").await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn scripted_responses_are_consumed_before_generated_rows() {
        let api = ScriptedEpidata::new(vec![]);
        let q = query((2020, 1, 1));
        api.respond(&q.partition, "20200101-20200101", Ok(EpidataResponse::partial(-2, "no results")));

        assert_eq!(api.query(&q).await.unwrap().result, -2);

        let generated = api.query(&q).await.unwrap().into_records();
        assert_eq!(generated[0]["time_value"], json!(20200101));
        assert_eq!(api.query_count(), 2);
    }

    #[tokio::test]
    async fn publisher_rejects_oversized_batches() {
        let publisher = RecordingPublisher::new().with_max_batch_size(1);
        let batch = vec![ChangeEntry::new("b", "1"), ChangeEntry::new("b", "2")];

        let result = publisher.publish(&[batch], "c").await;
        assert!(matches!(result, Err(PublishError::Rejected(_))));
        assert!(publisher.latest_revision().await.unwrap().is_none());
    }
}
