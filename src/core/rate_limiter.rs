use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Global send pacing shared by every worker of a run.
///
/// Each `acquire` reserves the next free slot under the mutex (check and
/// update happen together) and then sleeps outside the lock until that slot.
/// Grants are therefore at least `interval` apart no matter how many workers
/// call in concurrently.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    last_grant: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn per_second(rate: f64) -> Self {
        Self::with_interval(Duration::from_secs_f64(1.0 / rate.max(1e-6)))
    }

    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            last_grant: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub async fn acquire(&self) {
        let slot = self.reserve();
        if slot > Instant::now() {
            tokio::time::sleep_until(slot).await;
        }
    }

    fn reserve(&self) -> Instant {
        let mut last = self
            .last_grant
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        let slot = match *last {
            Some(previous) => (previous + self.interval).max(now),
            None => now,
        };
        *last = Some(slot);
        slot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_first_acquire_is_immediate() {
        let limiter = RateLimiter::per_second(2.0);
        let start = Instant::now();
        limiter.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(limiter.interval(), Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_acquires_are_spaced() {
        let limiter = RateLimiter::per_second(4.0);
        let start = Instant::now();
        for _ in 0..5 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_acquires_never_share_a_slot() {
        let limiter = Arc::new(RateLimiter::per_second(10.0));
        let mut handles = Vec::new();
        for _ in 0..12 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                limiter.acquire().await;
                Instant::now()
            }));
        }

        let mut grants = Vec::new();
        for handle in handles {
            grants.push(handle.await.unwrap());
        }
        grants.sort();

        for pair in grants.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(100));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_gap_does_not_bank_credit() {
        let limiter = RateLimiter::per_second(1.0);
        limiter.acquire().await;
        tokio::time::sleep(Duration::from_secs(5)).await;

        let start = Instant::now();
        limiter.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
        limiter.acquire().await;
        let waited = start.elapsed();
        assert!(waited >= Duration::from_secs(1));
        assert!(waited < Duration::from_millis(1100));
    }
}
