//! Per-key locking so concurrent misses for the same key don't stampede
//! the underlying query: the first caller to miss holds the key's lock
//! until it populates the cache, later callers block and then hit.

use super::{Cache, CacheEntry, CacheKey};
use dashmap::DashMap;
use std::sync::{Arc, Mutex};

pub struct BlockingCache<C: Cache> {
    inner: C,
    locks: DashMap<CacheKey, Arc<Mutex<()>>>,
}

impl<C: Cache> BlockingCache<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            locks: DashMap::new(),
        }
    }

    fn lock_for(&self, key: &CacheKey) -> Arc<Mutex<()>> {
        self.locks.entry(key.clone()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Runs `compute` only if no other thread is already populating
    /// `key`; everyone else waits for the result in the cache.
    pub fn get_or_compute(
        &self,
        key: CacheKey,
        compute: impl FnOnce() -> CacheEntry,
    ) -> CacheEntry {
        if let Some(hit) = self.inner.get(&key) {
            return hit;
        }
        let lock = self.lock_for(&key);
        let _guard = lock.lock().expect("blocking cache mutex poisoned");
        if let Some(hit) = self.inner.get(&key) {
            return hit;
        }
        let entry = compute();
        self.inner.put(key, entry.clone());
        entry
    }
}

impl<C: Cache> Cache for BlockingCache<C> {
    fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.inner.get(key)
    }

    fn put(&self, key: CacheKey, entry: CacheEntry) {
        self.inner.put(key, entry);
    }

    fn remove(&self, key: &CacheKey) {
        self.inner.remove(key);
    }

    fn clear(&self) {
        self.inner.clear();
        self.locks.clear();
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
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn computes_once_per_key() {
        let cache = BlockingCache::new(LruCache::new(0));
        let key = CacheKey::new("s", "env", "select 1");
        let calls = AtomicU32::new(0);
        for _ in 0..3 {
            cache.get_or_compute(key.clone(), || {
                calls.fetch_add(1, Ordering::SeqCst);
                CacheEntry::new(Value::I32(7))
            });
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
