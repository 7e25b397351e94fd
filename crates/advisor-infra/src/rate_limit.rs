//! Token bucket limiting how fast the worker starts tasks of each type.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use advisor_core::models::TaskType;
use tokio::sync::Mutex;

/// File purges are cheap; they only get a ceiling so a mass delete does not
/// flood the storage backend.
const PURGE_TASKS_PER_SECOND: f64 = 20.0;

#[derive(Debug)]
struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(per_second: f64) -> Self {
        let capacity = per_second.max(1.0);
        Self {
            capacity,
            tokens: capacity,
            refill_per_sec: per_second,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
    }

    /// Takes a token, or returns how long until one is available.
    fn take(&mut self, now: Instant) -> Result<(), Duration> {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let missing = 1.0 - self.tokens;
            Err(Duration::from_secs_f64(missing / self.refill_per_sec))
        }
    }
}

/// Per-task-type limiter. A non-positive rate disables limiting for that type.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    buckets: Arc<Mutex<HashMap<TaskType, TokenBucket>>>,
}

impl RateLimiter {
    pub fn new(generation_per_sec: f64) -> Self {
        Self::with_rates([
            (TaskType::GenerateReport, generation_per_sec),
            (TaskType::PurgeReportFiles, PURGE_TASKS_PER_SECOND),
        ])
    }

    pub fn with_rates(rates: impl IntoIterator<Item = (TaskType, f64)>) -> Self {
        let buckets = rates
            .into_iter()
            .filter(|(_, rate)| *rate > 0.0 && rate.is_finite())
            .map(|(task_type, rate)| (task_type, TokenBucket::new(rate)))
            .collect();
        Self {
            buckets: Arc::new(Mutex::new(buckets)),
        }
    }

    /// Waits until a task of `task_type` may start.
    pub async fn acquire(&self, task_type: &TaskType) {
        loop {
            let wait = {
                let mut buckets = self.buckets.lock().await;
                match buckets.get_mut(task_type) {
                    None => return,
                    Some(bucket) => match bucket.take(Instant::now()) {
                        Ok(()) => return,
                        Err(wait) => wait,
                    },
                }
            };
            tracing::debug!(task_type = %task_type, wait_ms = wait.as_millis() as u64, "Task rate limited");
            tokio::time::sleep(wait).await;
        }
    }

    /// Non-blocking variant of [`RateLimiter::acquire`].
    pub async fn try_acquire(&self, task_type: &TaskType) -> bool {
        let mut buckets = self.buckets.lock().await;
        match buckets.get_mut(task_type) {
            None => true,
            Some(bucket) => bucket.take(Instant::now()).is_ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_refills_over_time() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new(2.0);
        assert!(bucket.take(start).is_ok());
        assert!(bucket.take(start).is_ok());
        let wait = bucket.take(start).unwrap_err();
        assert!(wait <= Duration::from_millis(500));

        assert!(bucket.take(start + Duration::from_millis(600)).is_ok());
    }

    #[test]
    fn fractional_rates_allow_one_burst() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new(0.5);
        assert!(bucket.take(start).is_ok());
        let wait = bucket.take(start).unwrap_err();
        assert!(wait > Duration::from_millis(1900));
    }

    #[tokio::test]
    async fn limits_only_configured_types() {
        let limiter = RateLimiter::with_rates([(TaskType::GenerateReport, 1.0)]);
        assert!(limiter.try_acquire(&TaskType::GenerateReport).await);
        assert!(!limiter.try_acquire(&TaskType::GenerateReport).await);
        for _ in 0..100 {
            assert!(limiter.try_acquire(&TaskType::PurgeReportFiles).await);
        }
    }

    #[tokio::test]
    async fn zero_rate_disables_limit() {
        let limiter = RateLimiter::new(0.0);
        for _ in 0..10 {
            limiter.acquire(&TaskType::GenerateReport).await;
        }
    }
}
