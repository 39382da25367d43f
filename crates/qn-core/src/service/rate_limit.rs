//! Per-client token-bucket rate limiting.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use qn_config::RateLimitConfig;
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateDecision {
    pub allowed: bool,
    pub remaining: u32,
}

pub trait RateLimiter: Send + Sync {
    fn check_limit(&self, client: &str) -> RateDecision;
    /// Drop state for clients idle longer than the sweep age.
    fn cleanup(&self);
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Continuous-refill token bucket keyed by client id.
#[derive(Debug)]
pub struct TokenBucketLimiter {
    capacity: f64,
    refill_per_sec: f64,
    idle_sweep: Duration,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl TokenBucketLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            capacity: f64::from(config.capacity),
            refill_per_sec: config.refill_per_sec(),
            idle_sweep: Duration::from_secs(config.idle_sweep_secs),
            buckets: Mutex::new(HashMap::new()),
        }
    }

    pub fn tracked_clients(&self) -> usize {
        self.buckets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn check_at(&self, client: &str, now: Instant) -> RateDecision {
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        let bucket = match buckets.entry(client.to_string()) {
            Entry::Occupied(slot) => slot.into_mut(),
            Entry::Vacant(slot) => {
                let tokens = (self.capacity - 1.0).max(0.0);
                slot.insert(Bucket {
                    tokens,
                    last_refill: now,
                });
                return RateDecision {
                    allowed: self.capacity >= 1.0,
                    remaining: tokens as u32,
                };
            }
        };

        let elapsed = now.saturating_duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        bucket.last_refill = now;
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            RateDecision {
                allowed: true,
                remaining: bucket.tokens.floor() as u32,
            }
        } else {
            RateDecision {
                allowed: false,
                remaining: 0,
            }
        }
    }

    fn cleanup_at(&self, now: Instant) {
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        let before = buckets.len();
        buckets.retain(|_, b| now.saturating_duration_since(b.last_refill) <= self.idle_sweep);
        if buckets.len() != before {
            debug!(removed = before - buckets.len(), "rate limiter swept idle clients");
        }
    }
}

impl RateLimiter for TokenBucketLimiter {
    fn check_limit(&self, client: &str) -> RateDecision {
        self.check_at(client, Instant::now())
    }

    fn cleanup(&self) {
        self.cleanup_at(Instant::now());
    }
}
