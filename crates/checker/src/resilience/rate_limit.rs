//! Token-bucket rate limiting for provider calls.

use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::{sleep, Instant};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Sustained rate.
    pub requests_per_second: f64,
    /// Requests that may go out back to back.
    pub burst_size: u64,
    /// Longest wait for a token; zero fails immediately.
    #[serde(with = "crate::serde_millis")]
    pub max_wait: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 5.0,
            burst_size: 10,
            max_wait: Duration::from_secs(2),
        }
    }
}

impl RateLimitConfig {
    pub fn with_requests_per_second(mut self, rps: f64) -> Self {
        self.requests_per_second = rps;
        self
    }

    pub fn with_burst_size(mut self, burst: u64) -> Self {
        self.burst_size = burst;
        self
    }

    pub fn with_max_wait(mut self, wait: Duration) -> Self {
        self.max_wait = wait;
        self
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_update: Instant,
    total_requests: u64,
    total_waited: u64,
    total_rejected: u64,
}

#[derive(Debug)]
pub struct TokenBucket {
    config: RateLimitConfig,
    inner: Mutex<Bucket>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitStats {
    pub available_tokens: f64,
    pub total_requests: u64,
    pub total_waited: u64,
    pub total_rejected: u64,
}

impl TokenBucket {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Bucket {
                tokens: config.burst_size as f64,
                last_update: Instant::now(),
                total_requests: 0,
                total_waited: 0,
                total_rejected: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Bucket> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn refill(&self, bucket: &mut Bucket) {
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_update).as_secs_f64();
        bucket.last_update = now;
        bucket.tokens =
            (bucket.tokens + elapsed * self.config.requests_per_second).min(self.config.burst_size as f64);
    }

    /// Take a token if one is available right now.
    pub fn try_acquire(&self) -> bool {
        let mut bucket = self.lock();
        self.refill(&mut bucket);
        bucket.total_requests += 1;
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            bucket.total_rejected += 1;
            false
        }
    }

    /// Take a token, sleeping up to `max_wait` for one to appear.
    pub async fn acquire(&self) -> bool {
        let start = Instant::now();
        {
            self.lock().total_requests += 1;
        }

        loop {
            let wait = {
                let mut bucket = self.lock();
                self.refill(&mut bucket);
                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    if start.elapsed() > Duration::ZERO {
                        bucket.total_waited += 1;
                    }
                    return true;
                }
                if start.elapsed() >= self.config.max_wait || self.config.requests_per_second <= 0.0
                {
                    bucket.total_rejected += 1;
                    return false;
                }
                let needed = 1.0 - bucket.tokens;
                Duration::from_secs_f64((needed / self.config.requests_per_second).min(0.1))
            };
            sleep(wait.min(self.config.max_wait.saturating_sub(start.elapsed())).max(Duration::from_millis(1)))
                .await;
        }
    }

    pub fn stats(&self) -> RateLimitStats {
        let bucket = self.lock();
        RateLimitStats {
            available_tokens: bucket.tokens,
            total_requests: bucket.total_requests,
            total_waited: bucket.total_waited,
            total_rejected: bucket.total_rejected,
        }
    }
}
