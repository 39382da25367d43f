//! Response cache keyed by request parameters.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use qn_common::BoundingBox;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Entries kept by [`MemoryCache`] before the oldest is evicted.
pub const MEMORY_CACHE_CAPACITY: usize = 100;

/// Get/set store with an age check. Values are opaque JSON documents.
pub trait ResponseCache: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&self, key: &str, value: Value);
    /// True when `key` is absent or older than `max_age`.
    fn is_stale(&self, key: &str, max_age: Duration) -> bool;
}

/// `predict:` followed by the hex SHA-256 of `bbox,cellDeg,horizon`.
pub fn prediction_cache_key(bbox: &BoundingBox, cell_deg: f64, horizon_days: f64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{bbox},{cell_deg},{horizon_days}").as_bytes());
    format!("predict:{}", hex::encode(hasher.finalize()))
}

#[derive(Debug)]
struct Entry {
    value: Value,
    stored_at: Instant,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    order: VecDeque<String>,
}

/// Bounded in-process cache; insertion order decides eviction.
#[derive(Debug)]
pub struct MemoryCache {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::with_capacity(MEMORY_CACHE_CAPACITY)
    }
}

impl MemoryCache {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResponseCache for MemoryCache {
    fn get(&self, key: &str) -> Option<Value> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.entries.get(key).map(|e| e.value.clone())
    }

    fn set(&self, key: &str, value: Value) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = Entry {
            value,
            stored_at: Instant::now(),
        };
        if inner.entries.insert(key.to_string(), entry).is_none() {
            inner.order.push_back(key.to_string());
        }
        while inner.entries.len() > self.capacity {
            let Some(oldest) = inner.order.pop_front() else {
                break;
            };
            inner.entries.remove(&oldest);
        }
    }

    fn is_stale(&self, key: &str, max_age: Duration) -> bool {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner
            .entries
            .get(key)
            .map_or(true, |e| e.stored_at.elapsed() > max_age)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_is_stable_and_parameter_sensitive() {
        let b = BoundingBox::new(95.0, -12.0, 141.0, 7.0);
        let k1 = prediction_cache_key(&b, 0.25, 7.0);
        assert_eq!(k1, prediction_cache_key(&b, 0.25, 7.0));
        assert!(k1.starts_with("predict:"));
        assert_eq!(k1.len(), "predict:".len() + 64);
        assert_ne!(k1, prediction_cache_key(&b, 0.5, 7.0));
        assert_ne!(k1, prediction_cache_key(&b, 0.25, 3.0));
    }

    #[test]
    fn missing_key_is_stale() {
        let cache = MemoryCache::default();
        assert!(cache.get("x").is_none());
        assert!(cache.is_stale("x", Duration::from_secs(900)));
    }

    #[test]
    fn fresh_entry_is_served() {
        let cache = MemoryCache::default();
        cache.set("x", json!({"a": 1}));
        assert_eq!(cache.get("x"), Some(json!({"a": 1})));
        assert!(!cache.is_stale("x", Duration::from_secs(900)));
    }

    #[test]
    fn evicts_oldest_beyond_capacity() {
        let cache = MemoryCache::with_capacity(2);
        cache.set("a", json!(1));
        cache.set("b", json!(2));
        cache.set("a", json!(3));
        cache.set("c", json!(4));
        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_none());
        assert_eq!(cache.get("c"), Some(json!(4)));
    }
}
