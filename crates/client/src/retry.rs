//! Bounded retry for transient remote failures.
//!
//! Retry `n` (1-based) waits `n * base_delay` before re-invoking the
//! operation. Non-transient errors and exhausted retries propagate
//! unchanged, so worst-case latency is bounded by `max_retries + 1` attempts.

use std::future::Future;
use std::time::Duration;

use quotesync_core::AppConfig;

use crate::remote::RemoteError;

/// Retry budget for a single remote operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 3, base_delay: Duration::from_secs(1) }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self { max_retries: config.retry_max_retries, base_delay: config.retry_base_delay() }
    }

    /// Delay before retry `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(retry)
    }
}

/// Run `op`, retrying transient failures according to `policy`.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T, RemoteError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RemoteError>>,
{
    let mut retry = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && retry < policy.max_retries => {
                retry += 1;
                let delay = policy.delay_for(retry);
                tracing::warn!(
                    operation = label,
                    attempt = retry + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient remote failure, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy() -> RetryPolicy {
        RetryPolicy { max_retries: 3, base_delay: Duration::from_millis(100) }
    }

    #[test]
    fn test_delay_is_linear_in_attempt() {
        let policy = policy();
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let calls = &AtomicU32::new(0);
        let start = tokio::time::Instant::now();

        let result = with_retry(&policy(), "get", move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 { Err(RemoteError::DeadlineExceeded) } else { Ok(7) }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(start.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_retries() {
        let calls = &AtomicU32::new(0);

        let result: Result<(), _> = with_retry(&policy(), "set", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(RemoteError::Unavailable("down".into()))
        })
        .await;

        assert!(matches!(result, Err(RemoteError::Unavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_non_transient_propagates_immediately() {
        let calls = &AtomicU32::new(0);

        let result: Result<(), _> = with_retry(&policy(), "set", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(RemoteError::Http { status: 403 })
        })
        .await;

        assert!(matches!(result, Err(RemoteError::Http { status: 403 })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_resource_exhausted_is_not_retried_here() {
        let calls = &AtomicU32::new(0);

        let result: Result<(), _> = with_retry(&policy(), "set", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(RemoteError::ResourceExhausted("quota".into()))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
