//! Strict least-recently-used map over `lru::LruCache`
use lru::LruCache;
use std::hash::Hash;
use std::num::NonZeroUsize;

/// Bounded map that reports which entry an insert pushed out
///
/// `get` and `insert` both mark the entry most-recently-used; `contains`
/// does not.
pub struct LruMap<K, V> {
    inner: LruCache<K, V>,
}

impl<K: Hash + Eq + Clone, V: Clone> LruMap<K, V> {
    /// A capacity of zero is raised to one
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: LruCache::new(capacity),
        }
    }

    /// Look up and mark most-recently-used
    pub fn get(&mut self, key: &K) -> Option<V> {
        self.inner.get(key).cloned()
    }

    /// Insert as most-recently-used, returning the evicted entry if capacity was exceeded
    pub fn insert(&mut self, key: K, value: V) -> Option<(K, V)> {
        if self.inner.contains(&key) {
            self.inner.put(key, value);
            return None;
        }
        self.inner.push(key, value)
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.inner.pop(key)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.inner.contains(key)
    }

    /// Keys, most-recently-used first
    pub fn keys_by_recency(&self) -> Vec<K> {
        self.inner.iter().map(|(key, _)| key.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.cap().get()
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }
}
