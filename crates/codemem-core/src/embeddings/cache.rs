//! Content-addressed embedding cache keyed by `(model_id, text)` (§4.2).
//!
//! Backed by an `lru::LruCache` behind a mutex. Writes are idempotent: the
//! value stored for a key is wholly derived from the key's inputs, so a
//! race between two misses for the same key is safe — last write wins and
//! both writers would have produced the same vector.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;
use sha2::{Digest, Sha256};

/// Default capacity when none is specified.
const DEFAULT_CAPACITY: usize = 10_000;

fn cache_key(model_id: &str, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(model_id.as_bytes());
    hasher.update(b"\0");
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// A thread-safe, content-addressed cache from `(model_id, text)` to vector.
pub struct EmbeddingCache {
    inner: Mutex<LruCache<String, Vec<f32>>>,
}

impl EmbeddingCache {
    /// A cache holding up to `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity is at least 1");
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Look up `(model_id, text)`.
    pub fn get(&self, model_id: &str, text: &str) -> Option<Vec<f32>> {
        let key = cache_key(model_id, text);
        self.inner
            .lock()
            .expect("embedding cache lock poisoned")
            .get(&key)
            .cloned()
    }

    /// Insert or overwrite the vector for `(model_id, text)`.
    pub fn put(&self, model_id: &str, text: &str, vector: Vec<f32>) {
        let key = cache_key(model_id, text);
        self.inner
            .lock()
            .expect("embedding cache lock poisoned")
            .put(key, vector);
    }

    /// Number of entries currently cached.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("embedding cache lock poisoned").len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EmbeddingCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
