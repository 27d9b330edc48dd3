pub mod api;
pub mod batch;
pub mod catalog;
pub mod config;
pub mod diff;
pub mod dispatch;
pub mod encode;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod partition;
pub mod publish;
pub mod record;
pub mod retry;
pub mod storage;
pub mod window;
pub mod writer;

pub use api::{EpidataApi, TransportError, TransportErrorKind, WindowQuery};
pub use batch::batch;
pub use catalog::Catalog;
pub use config::{ConfigError, SyncConfig, UnchangedPolicy};
pub use diff::{CatalogDiff, CatalogDiffer, UnchangedPartition};
pub use dispatch::{Dispatcher, PartitionSync, worker_count};
pub use encode::{EncodeError, decode_jsonl, encode, encode_csv, encode_jsonl};
pub use engine::{CycleOutcome, CyclePlan, CycleReport, CycleStats, SyncEngine};
pub use error::SyncError;
pub use fetch::{PartitionFetch, SkippedWindow, WindowedFetcher};
pub use partition::{DescriptorError, PartitionDescriptor, PartitionKey, TimeType};
pub use publish::{PublishError, Publisher, RevisionSummary, publish_cycle, revision_comment};
pub use record::{EpidataResponse, RESULT_OK, Record};
pub use retry::{RetryFailure, RetryPolicy, retry};
pub use storage::{
    ArtifactFormat, ChangeEntry, KeyLayout, METADATA_STEM, ObjectMeta, ObjectStore,
    PartitionSnapshot, StoreError,
};
pub use window::{TimeWindow, format_time_value, parse_time_value, plan_windows, window_size};
pub use writer::PartitionWriter;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
