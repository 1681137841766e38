//! Token bucket rate limiting, shared per provider key.
//!
//! Tokens accrue at `refill_rate` per second up to `capacity`; each request
//! takes one. Networks served by the same provider share a key and so share
//! a bucket, across every concurrently running ingestion cycle.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::debug;

/// Outcome of asking for a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquire {
    Allowed,
    /// No token available; one will be after `retry_after`.
    RateLimited { retry_after: Duration },
}

impl Acquire {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Injectable limiter service keyed by provider.
pub trait RateLimiter: Send + Sync {
    fn acquire(&self, key: &str) -> Acquire;
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// A single thread-safe token bucket.
pub struct TokenBucket {
    capacity: f64,
    refill_rate: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// A full bucket.
    pub fn new(capacity: f64, refill_rate: f64) -> Self {
        Self {
            capacity,
            refill_rate,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// `capacity = refill_rate = rps`: a burst of one second's worth.
    pub fn per_second(rps: f64) -> Self {
        Self::new(rps, rps)
    }

    pub fn try_acquire(&self) -> Acquire {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_rate).min(self.capacity);
        state.last_refill = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            Acquire::Allowed
        } else {
            let deficit = 1.0 - state.tokens;
            let retry_after = if self.refill_rate > 0.0 {
                Duration::from_secs_f64(deficit / self.refill_rate)
            } else {
                Duration::MAX
            };
            Acquire::RateLimited { retry_after }
        }
    }
}

/// One [`TokenBucket`] per key.
///
/// Keys must be registered with their rate; unknown keys get
/// `default_rps`.
pub struct KeyedRateLimiter {
    default_rps: f64,
    buckets: Mutex<HashMap<String, Arc<TokenBucket>>>,
}

impl KeyedRateLimiter {
    pub fn new(default_rps: f64) -> Self {
        Self {
            default_rps,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Register `key` with its own rate. The first registration wins, so
    /// networks sharing a key share the bucket configured first.
    pub fn register(&self, key: &str, rps: f64) {
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        buckets
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(TokenBucket::per_second(rps)));
    }

    fn bucket(&self, key: &str) -> Arc<TokenBucket> {
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        buckets
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(TokenBucket::per_second(self.default_rps)))
            .clone()
    }
}

impl RateLimiter for KeyedRateLimiter {
    fn acquire(&self, key: &str) -> Acquire {
        // Map lock is released before the bucket lock is taken.
        let outcome = self.bucket(key).try_acquire();
        if let Acquire::RateLimited { retry_after } = outcome {
            debug!(key, retry_after_ms = retry_after.as_millis() as u64, "rate limited");
        }
        outcome
    }
}

/// Block until `limiter` hands out a token for `key`.
pub async fn acquire_blocking(limiter: &dyn RateLimiter, key: &str) {
    loop {
        match limiter.acquire(key) {
            Acquire::Allowed => return,
            Acquire::RateLimited { retry_after } => {
                tokio::time::sleep(retry_after.min(Duration::from_secs(1))).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_per_second_rejects_the_sixth() {
        let limiter = KeyedRateLimiter::new(100.0);
        limiter.register("alchemy", 5.0);
        let outcomes: Vec<Acquire> = (0..6).map(|_| limiter.acquire("alchemy")).collect();
        assert_eq!(outcomes.iter().filter(|o| o.is_allowed()).count(), 5);
        assert!(matches!(outcomes[5], Acquire::RateLimited { .. }));
    }

    #[test]
    fn keys_have_independent_buckets() {
        let limiter = KeyedRateLimiter::new(1.0);
        assert!(limiter.acquire("a").is_allowed());
        assert!(limiter.acquire("b").is_allowed());
        assert!(!limiter.acquire("a").is_allowed());
    }

    #[test]
    fn retry_after_reflects_refill_rate() {
        let bucket = TokenBucket::new(1.0, 10.0);
        assert!(bucket.try_acquire().is_allowed());
        match bucket.try_acquire() {
            Acquire::RateLimited { retry_after } => {
                assert!(retry_after <= Duration::from_millis(100), "{retry_after:?}");
                assert!(retry_after >= Duration::from_millis(50), "{retry_after:?}");
            }
            Acquire::Allowed => panic!("bucket should be empty"),
        }
    }

    #[tokio::test]
    async fn blocking_acquire_waits_for_refill() {
        let limiter = KeyedRateLimiter::new(20.0);
        for _ in 0..20 {
            limiter.acquire("k");
        }
        let started = Instant::now();
        acquire_blocking(&limiter, "k").await;
        assert!(started.elapsed() >= Duration::from_millis(20));
    }
}
