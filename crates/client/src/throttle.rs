//! Start-to-start spacing for remote operations.
//!
//! A leaky bucket with capacity one: each `acquire` waits until at least
//! `min_interval` has passed since the previous caller was admitted. Used by
//! the operation queue between writes and by the chunk codec between chunk
//! writes.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Enforces a minimum interval between admissions.
#[derive(Debug)]
pub struct Throttle {
    last_admitted: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl Throttle {
    pub fn new(min_interval: Duration) -> Self {
        Self { last_admitted: Mutex::new(None), min_interval }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait for admission. Returns how long the caller was held back.
    pub async fn acquire(&self) -> Duration {
        let mut last = self.last_admitted.lock().await;
        let waited = match *last {
            Some(prev) => {
                let elapsed = prev.elapsed();
                if elapsed < self.min_interval {
                    let wait = self.min_interval - elapsed;
                    tracing::trace!(wait_ms = wait.as_millis() as u64, "throttling remote operation");
                    tokio::time::sleep(wait).await;
                    wait
                } else {
                    Duration::ZERO
                }
            }
            None => Duration::ZERO,
        };
        *last = Some(Instant::now());
        waited
    }
}
