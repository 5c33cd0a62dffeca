//! Serialized write queue in front of the remote store.
//!
//! One worker task runs queued operations strictly one at a time:
//!
//! - consecutive operation starts are spaced by `min_delay`
//! - an operation failing with resource exhaustion bumps a consecutive-error
//!   counter and holds the queue for `min(cap, base * 2^errors)`
//! - any success resets the counter
//! - after every operation the worker pauses `settle_yield`
//!
//! A failed operation rejects only its own caller; the queue moves on.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::FutureExt;
use quotesync_core::AppConfig;
use tokio::sync::{mpsc, oneshot};

use crate::remote::RemoteError;
use crate::throttle::Throttle;

type Job = Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = JobStatus> + Send>> + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobStatus {
    Succeeded,
    Failed,
    Exhausted,
}

/// Queue pacing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueConfig {
    pub min_delay: Duration,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    pub settle_yield: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(100),
            backoff_base: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(30),
            settle_yield: Duration::from_millis(10),
        }
    }
}

impl QueueConfig {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            min_delay: config.queue_min_delay(),
            backoff_base: config.queue_backoff_base(),
            backoff_cap: config.queue_backoff_cap(),
            settle_yield: config.queue_yield(),
        }
    }

    /// Admission backoff after `consecutive_errors` exhausted operations.
    pub fn backoff_delay(&self, consecutive_errors: u32) -> Duration {
        let factor = 2u32.checked_pow(consecutive_errors).unwrap_or(u32::MAX);
        self.backoff_base.saturating_mul(factor).min(self.backoff_cap)
    }
}

/// Single-writer operation queue.
///
/// Must be created inside a tokio runtime. Clones feed the same worker, which
/// stops once every clone is dropped and the remaining operations have run.
#[derive(Debug, Clone)]
pub struct OperationQueue {
    tx: mpsc::UnboundedSender<Job>,
    pending: Arc<AtomicUsize>,
}

impl OperationQueue {
    pub fn new(config: QueueConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        tokio::spawn(run_worker(rx, config, pending.clone()));
        Self { tx, pending }
    }

    /// Operations queued or running.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Queue `op` and wait for its result.
    pub async fn enqueue<T, F, Fut>(&self, op: F) -> Result<T, RemoteError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, RemoteError>> + Send + 'static,
        T: Send + 'static,
    {
        let (result_tx, result_rx) = oneshot::channel();
        let job: Job = Box::new(move || {
            Box::pin(async move {
                let result = op().await;
                let status = match &result {
                    Ok(_) => JobStatus::Succeeded,
                    Err(e) if e.is_resource_exhausted() => JobStatus::Exhausted,
                    Err(_) => JobStatus::Failed,
                };
                // the caller may have stopped waiting
                let _ = result_tx.send(result);
                status
            })
        });

        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(job).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(RemoteError::Other("operation queue stopped".into()));
        }

        result_rx
            .await
            .map_err(|_| RemoteError::Other("queued operation was abandoned".into()))?
    }
}

async fn run_worker(mut rx: mpsc::UnboundedReceiver<Job>, config: QueueConfig, pending: Arc<AtomicUsize>) {
    let throttle = Throttle::new(config.min_delay);
    let mut consecutive_errors: u32 = 0;

    while let Some(job) = rx.recv().await {
        throttle.acquire().await;

        let status = match AssertUnwindSafe(job()).catch_unwind().await {
            Ok(status) => status,
            Err(_) => {
                tracing::error!("queued operation panicked");
                JobStatus::Failed
            }
        };
        pending.fetch_sub(1, Ordering::SeqCst);

        match status {
            JobStatus::Succeeded => consecutive_errors = 0,
            JobStatus::Exhausted => {
                consecutive_errors = consecutive_errors.saturating_add(1);
                let delay = config.backoff_delay(consecutive_errors);
                tracing::warn!(
                    consecutive_errors,
                    delay_ms = delay.as_millis() as u64,
                    "remote store exhausted, backing off queue"
                );
                tokio::time::sleep(delay).await;
            }
            JobStatus::Failed => {}
        }

        tokio::time::sleep(config.settle_yield).await;
    }

    tracing::debug!("operation queue worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use tokio::time::Instant;

    fn config() -> QueueConfig {
        QueueConfig {
            min_delay: Duration::from_millis(100),
            backoff_base: Duration::from_millis(1_000),
            backoff_cap: Duration::from_millis(5_000),
            settle_yield: Duration::from_millis(10),
        }
    }

    #[test]
    fn test_backoff_delay_doubles_and_caps() {
        let config = config();
        assert_eq!(config.backoff_delay(1), Duration::from_millis(2_000));
        assert_eq!(config.backoff_delay(2), Duration::from_millis(4_000));
        assert_eq!(config.backoff_delay(3), Duration::from_millis(5_000));
        assert_eq!(config.backoff_delay(40), Duration::from_millis(5_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_operation_result() {
        let queue = OperationQueue::new(config());
        let value = queue.enqueue(|| async { Ok::<_, RemoteError>(42) }).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_one_at_a_time_with_spacing() {
        let queue = Arc::new(OperationQueue::new(config()));
        let log = Arc::new(Mutex::new(Vec::new()));
        let running = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for i in 0..3 {
            let queue = queue.clone();
            let log = log.clone();
            let running = running.clone();
            handles.push(tokio::spawn(async move {
                queue
                    .enqueue(move || async move {
                        assert_eq!(running.fetch_add(1, Ordering::SeqCst), 0);
                        log.lock().push((i, Instant::now()));
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        running.fetch_sub(1, Ordering::SeqCst);
                        Ok::<_, RemoteError>(())
                    })
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let log = log.lock();
        assert_eq!(log.len(), 3);
        for pair in log.windows(2) {
            assert!(pair[1].1 - pair[0].1 >= Duration::from_millis(100));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_rejects_caller_and_queue_continues() {
        let queue = OperationQueue::new(config());

        let failed = queue
            .enqueue(|| async { Err::<(), _>(RemoteError::Http { status: 400 }) })
            .await;
        assert!(matches!(failed, Err(RemoteError::Http { status: 400 })));

        let ok = queue.enqueue(|| async { Ok::<_, RemoteError>("next") }).await;
        assert_eq!(ok.unwrap(), "next");
        assert_eq!(queue.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_backs_off_next_operation() {
        let queue = OperationQueue::new(config());

        let start = Instant::now();
        let _ = queue
            .enqueue(|| async { Err::<(), _>(RemoteError::ResourceExhausted("quota".into())) })
            .await;
        queue.enqueue(|| async { Ok::<_, RemoteError>(()) }).await.unwrap();

        // one exhausted error: 1s * 2^1
        assert!(start.elapsed() >= Duration::from_millis(2_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_operation_does_not_stop_queue() {
        let queue = OperationQueue::new(config());

        let result = queue
            .enqueue(|| async {
                if true {
                    panic!("boom");
                }
                Ok::<(), RemoteError>(())
            })
            .await;
        assert!(result.is_err());

        assert!(queue.enqueue(|| async { Ok::<_, RemoteError>(1) }).await.is_ok());
    }
}
