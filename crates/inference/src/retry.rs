//! Exponential backoff with jitter for inference calls

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::InferenceError;

/// Retry schedule applied uniformly at the inference call sites
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_millis(8000),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn from_config(config: &cgm_rg_common::config::InferenceConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }

    /// Backoff before retry number `attempt` (1-based), without jitter
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or the retry budget is spent.
    ///
    /// # Errors
    /// Returns the last error produced by `operation`.
    pub async fn run<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, InferenceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, InferenceError>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    let base = self.backoff(attempt);
                    let jitter = rand::rng().random_range(0.0..=0.25);
                    let delay = base.mul_f64(1.0 + jitter);
                    warn!(
                        "{} failed (attempt {}/{}), retrying in {:?}: {}",
                        label,
                        attempt,
                        self.max_retries + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn unavailable() -> InferenceError {
        InferenceError::Status {
            service: "pose".into(),
            status: 503,
            body: String::new(),
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_millis(1000));
        assert_eq!(policy.backoff(4), Duration::from_millis(4000));
        assert_eq!(policy.backoff(6), Duration::from_millis(8000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failures() {
        let calls = &AtomicU32::new(0);
        let start = tokio::time::Instant::now();
        let value = RetryPolicy::default()
            .run("height", || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(unavailable())
                } else {
                    Ok(42)
                }
            })
            .await
            .unwrap();
        assert_eq!(value, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 500ms + 1000ms of backoff, each stretched by at most 25% jitter
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(1500));
        assert!(waited <= Duration::from_millis(1875));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_budget() {
        let calls = &AtomicU32::new(0);
        let err = RetryPolicy::default()
            .run("height", || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(unavailable())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, InferenceError::Status { status: 503, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_fails_fast() {
        let calls = &AtomicU32::new(0);
        let err = RetryPolicy::default()
            .run("height", || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(InferenceError::UnknownService("height".into()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, InferenceError::UnknownService(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
