use std::sync::Arc;

use futures::{StreamExt, TryStreamExt, stream};

use crate::api::{EpidataApi, WindowQuery};
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::partition::{PartitionDescriptor, PartitionKey};
use crate::record::Record;
use crate::retry::{RetryPolicy, retry};
use crate::window::{TimeWindow, plan_windows};

/// A window the API answered with a non-success `result`.
///
/// These are not errors: the window contributes no rows and the partition
/// carries on with its other windows.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedWindow {
    pub partition: PartitionKey,
    pub window: TimeWindow,
    pub result: i64,
    pub message: Option<String>,
}

/// Everything fetched for one partition.
#[derive(Debug, Clone, Default)]
pub struct PartitionFetch {
    /// Rows of every window, in window order then API order.
    pub records: Vec<Record>,
    pub skipped: Vec<SkippedWindow>,
    pub windows: usize,
}

enum WindowOutcome {
    Rows(Vec<Record>),
    Skipped(SkippedWindow),
}

/// Downloads a partition one window per call.
#[derive(Clone)]
pub struct WindowedFetcher {
    api: Arc<dyn EpidataApi>,
    max_rows_per_call: u64,
    window_concurrency: usize,
    retry: RetryPolicy,
}

impl WindowedFetcher {
    pub fn new(api: Arc<dyn EpidataApi>, config: &SyncConfig) -> Self {
        Self {
            api,
            max_rows_per_call: config.max_rows_per_call,
            window_concurrency: config.window_concurrency.max(1),
            retry: config.retry,
        }
    }

    pub fn windows(&self, descriptor: &PartitionDescriptor) -> Vec<TimeWindow> {
        plan_windows(descriptor, self.max_rows_per_call)
    }

    /// Fetch every window of `descriptor` and concatenate the rows.
    ///
    /// Up to `window_concurrency` calls are in flight; results are reassembled
    /// in window order. The first window that exhausts its retries fails the
    /// partition and drops the calls still in flight.
    pub async fn fetch(&self, descriptor: &PartitionDescriptor) -> Result<PartitionFetch, SyncError> {
        let partition = descriptor.key();
        let windows = self.windows(descriptor);
        let window_count = windows.len();

        tracing::debug!(%partition, windows = window_count, "fetching partition");

        let outcomes: Vec<WindowOutcome> = stream::iter(windows)
            .map(|window| {
                let query = WindowQuery {
                    partition: partition.clone(),
                    window,
                };
                async move { self.fetch_window(query).await }
            })
            .buffered(self.window_concurrency)
            .try_collect()
            .await?;

        let mut fetched = PartitionFetch {
            windows: window_count,
            ..PartitionFetch::default()
        };
        for outcome in outcomes {
            match outcome {
                WindowOutcome::Rows(rows) => fetched.records.extend(rows),
                WindowOutcome::Skipped(skip) => fetched.skipped.push(skip),
            }
        }

        tracing::debug!(
            %partition,
            records = fetched.records.len(),
            skipped = fetched.skipped.len(),
            "partition fetched"
        );

        Ok(fetched)
    }

    async fn fetch_window(&self, query: WindowQuery) -> Result<WindowOutcome, SyncError> {
        let api: &dyn EpidataApi = self.api.as_ref();
        let q = &query;

        let response = retry(&self.retry, move |_| api.query(q))
            .await
            .map_err(|failure| SyncError::Fetch {
                partition: query.partition.clone(),
                url: failure.error.url.clone(),
                attempts: failure.attempts,
                source: failure.error,
            })?;

        if response.is_success() {
            return Ok(WindowOutcome::Rows(response.into_records()));
        }

        tracing::warn!(
            partition = %query.partition,
            window = %query.window,
            result = response.result,
            message = response.message.as_deref().unwrap_or(""),
            "window returned no data"
        );

        Ok(WindowOutcome::Skipped(SkippedWindow {
            partition: query.partition,
            window: query.window,
            result: response.result,
            message: response.message,
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{DateTime, NaiveDate, Utc};
    use serde_json::json;

    use crate::api::{TransportError, TransportErrorKind};
    use crate::partition::TimeType;
    use crate::record::EpidataResponse;
    use crate::test_support::ScriptedEpidata;

    use super::*;

    fn descriptor(num_locations: u64, min: (i32, u32, u32), max: (i32, u32, u32)) -> PartitionDescriptor {
        PartitionDescriptor {
            source: "src".into(),
            signal: "sig".into(),
            time_type: TimeType::Day,
            geo_type: "state".into(),
            min_time: NaiveDate::from_ymd_opt(min.0, min.1, min.2).unwrap(),
            max_time: NaiveDate::from_ymd_opt(max.0, max.1, max.2).unwrap(),
            num_locations,
            last_update: DateTime::<Utc>::from_timestamp(0, 0).unwrap(),
        }
    }

    fn row(geo: &str, time_value: i64) -> crate::record::Record {
        json!({"geo_value": geo, "time_value": time_value})
            .as_object()
            .cloned()
            .unwrap()
    }

    fn unavailable(url: &str) -> TransportError {
        TransportError::new(url, TransportErrorKind::Status(503), "service unavailable")
    }

    fn fetcher(api: Arc<ScriptedEpidata>, window_concurrency: usize) -> WindowedFetcher {
        let mut config = SyncConfig::new("bucket", "ds");
        config.max_rows_per_call = 10;
        config.window_concurrency = window_concurrency;
        WindowedFetcher::new(api, &config)
    }

    #[tokio::test]
    async fn concatenates_windows_in_order() {
        // 5 locations, cap 10 => 2-day windows
        let d = descriptor(5, (2020, 1, 1), (2020, 1, 6));
        let key = d.key();
        let api = Arc::new(ScriptedEpidata::new(vec![]));
        api.respond(&key, "20200101-20200102", Ok(EpidataResponse::ok(vec![row("a", 1), row("b", 1)])));
        api.respond(&key, "20200103-20200104", Ok(EpidataResponse::ok(vec![row("a", 3)])));
        api.respond(&key, "20200105-20200106", Ok(EpidataResponse::ok(vec![row("c", 5), row("a", 5)])));
        api.delay_window(&key, "20200101-20200102", Duration::from_millis(30));

        let fetched = fetcher(Arc::clone(&api), 16).fetch(&d).await.unwrap();

        let order: Vec<(String, i64)> = fetched
            .records
            .iter()
            .map(|r| (r["geo_value"].as_str().unwrap().to_owned(), r["time_value"].as_i64().unwrap()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("a".into(), 1),
                ("b".into(), 1),
                ("a".into(), 3),
                ("c".into(), 5),
                ("a".into(), 5)
            ]
        );
        assert_eq!(fetched.windows, 3);
        assert!(fetched.skipped.is_empty());
        assert_eq!(api.query_count(), 3);
    }

    #[tokio::test]
    async fn partial_result_skips_window_and_continues() {
        let d = descriptor(5, (2020, 1, 1), (2020, 1, 4));
        let key = d.key();
        let api = Arc::new(ScriptedEpidata::new(vec![]));
        api.respond(&key, "20200101-20200102", Ok(EpidataResponse::partial(-2, "no results")));
        api.respond(&key, "20200103-20200104", Ok(EpidataResponse::ok(vec![row("a", 3)])));

        let fetched = fetcher(api, 1).fetch(&d).await.unwrap();

        assert_eq!(fetched.records.len(), 1);
        assert_eq!(fetched.skipped.len(), 1);
        assert_eq!(fetched.skipped[0].result, -2);
        assert_eq!(fetched.skipped[0].window.time_values(), "20200101-20200102");
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_on_fourth_attempt_after_linear_backoff() {
        let d = descriptor(10, (2020, 1, 1), (2020, 1, 1));
        let key = d.key();
        let api = Arc::new(ScriptedEpidata::new(vec![]));
        for _ in 0..3 {
            api.respond(&key, "20200101-20200101", Err(unavailable("http://epidata/q1")));
        }
        api.respond(&key, "20200101-20200101", Ok(EpidataResponse::ok(vec![row("pa", 20200101)])));

        let started = tokio::time::Instant::now();
        let fetched = fetcher(Arc::clone(&api), 16).fetch(&d).await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(fetched.records.len(), 1);
        assert_eq!(api.query_count(), 4);
        assert!(elapsed >= Duration::from_millis(200 + 400 + 600));
        assert!(elapsed < Duration::from_millis(1300));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_fail_with_url() {
        let d = descriptor(10, (2020, 1, 1), (2020, 1, 1));
        let key = d.key();
        let api = Arc::new(ScriptedEpidata::new(vec![]));
        for _ in 0..5 {
            api.respond(&key, "20200101-20200101", Err(unavailable("http://epidata/q1")));
        }

        let err = fetcher(Arc::clone(&api), 16).fetch(&d).await.unwrap_err();

        match &err {
            SyncError::Fetch {
                partition,
                url,
                attempts,
                ..
            } => {
                assert_eq!(partition, &key);
                assert_eq!(url, "http://epidata/q1");
                assert_eq!(*attempts, 5);
            }
            other => panic!("expected fetch error, got {other:?}"),
        }
        assert_eq!(err.url(), Some("http://epidata/q1"));
        assert!(err.to_string().contains("src/sig/day/state"));
        assert_eq!(api.query_count(), 5);
    }
}
