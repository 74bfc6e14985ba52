//! Wraps a base cache with hit/miss counters and `log`-crate tracing,
//! the outermost decorator so every access (regardless of what's
//! underneath) gets counted.

use super::{Cache, CacheEntry, CacheKey};
use std::sync::atomic::{AtomicU64, Ordering};

pub struct LoggingCache<C: Cache> {
    namespace: String,
    inner: C,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<C: Cache> LoggingCache<C> {
    pub fn new(namespace: impl Into<String>, inner: C) -> Self {
        Self {
            namespace: namespace.into(),
            inner,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn hit_ratio(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed) as f64;
        let misses = self.misses.load(Ordering::Relaxed) as f64;
        if hits + misses == 0.0 {
            0.0
        } else {
            hits / (hits + misses)
        }
    }
}

impl<C: Cache> Cache for LoggingCache<C> {
    fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        let hit = self.inner.get(key);
        if hit.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            log::debug!("cache '{}' hit for statement '{}'", self.namespace, key.statement_id);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            log::debug!("cache '{}' miss for statement '{}'", self.namespace, key.statement_id);
        }
        hit
    }

    fn put(&self, key: CacheKey, entry: CacheEntry) {
        log::trace!("cache '{}' storing entry for statement '{}'", self.namespace, key.statement_id);
        self.inner.put(key, entry);
    }

    fn remove(&self, key: &CacheKey) {
        self.inner.remove(key);
    }

    fn clear(&self) {
        log::debug!("cache '{}' cleared ({} entries)", self.namespace, self.inner.len());
        self.inner.clear();
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::lru::LruCache;
    use crate::value::Value;

    #[test]
    fn tracks_hit_ratio() {
        let cache = LoggingCache::new("demo.User", LruCache::new(0));
        let key = CacheKey::new("s", "env", "select 1");
        assert!(cache.get(&key).is_none());
        cache.put(key.clone(), CacheEntry::new(Value::I32(1)));
        assert!(cache.get(&key).is_some());
        assert!((cache.hit_ratio() - 0.5).abs() < f64::EPSILON);
    }
}
