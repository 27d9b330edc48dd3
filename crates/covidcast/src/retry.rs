use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::api::TransportError;

/// Linear backoff: after the n-th failed attempt, wait `base_delay × n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 200,
        }
    }
}

impl RetryPolicy {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// Delay slept after `attempt` (1-based) fails.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay() * attempt
    }
}

/// The last error seen once retries are given up on.
#[derive(Debug, Clone)]
pub struct RetryFailure {
    pub attempts: u32,
    pub error: TransportError,
}

/// Run `op` until it succeeds, a non-transient error occurs, or the attempt
/// ceiling is reached. Attempts for one operation are strictly sequential.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, RetryFailure>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, TransportError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_transient() && attempt < max_attempts => {
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    url = %error.url,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "request failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(error) => {
                tracing::error!(url = %error.url, attempts = attempt, error = %error, "giving up");
                return Err(RetryFailure {
                    attempts: attempt,
                    error,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::api::TransportErrorKind;

    use super::*;

    fn transient() -> TransportError {
        TransportError::new("http://epidata/api", TransportErrorKind::Status(503), "unavailable")
    }

    #[test]
    fn delays_grow_linearly() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(600));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let started = tokio::time::Instant::now();

        let result = retry(&RetryPolicy::default(), |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 4 {
                    Err(transient())
                } else {
                    Ok(attempt)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(result, 4);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(200 + 400 + 600));
        assert!(elapsed < Duration::from_millis(1300));
    }

    #[tokio::test(start_paused = true)]
    async fn stops_at_attempt_ceiling() {
        let calls = AtomicU32::new(0);

        let failure = retry(&RetryPolicy::default(), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(transient()) }
        })
        .await
        .unwrap_err();

        assert_eq!(failure.attempts, 5);
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(failure.error.url, "http://epidata/api");
    }

    #[tokio::test(start_paused = true)]
    async fn decode_errors_are_not_retried() {
        let calls = AtomicU32::new(0);

        let failure = retry(&RetryPolicy::default(), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err::<(), _>(TransportError::new(
                    "http://epidata/api",
                    TransportErrorKind::Decode,
                    "expected value at line 1",
                ))
            }
        })
        .await
        .unwrap_err();

        assert_eq!(failure.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_url_fails_without_backoff() {
        let start = tokio::time::Instant::now();

        let failure = retry(&RetryPolicy::default(), |_| async {
            Err::<(), _>(TransportError::new(
                "not a url",
                TransportErrorKind::InvalidUrl,
                "relative URL without a base",
            ))
        })
        .await
        .unwrap_err();

        assert_eq!(failure.attempts, 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
