//! Size-bounded, least-recently-used base store.

use super::{Cache, CacheEntry, CacheKey};
use std::collections::HashMap;
use std::sync::Mutex;

struct Inner {
    entries: HashMap<CacheKey, CacheEntry>,
    order: Vec<CacheKey>,
    capacity: usize,
}

impl Inner {
    fn touch(&mut self, key: &CacheKey) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            let k = self.order.remove(pos);
            self.order.push(k);
        }
    }

    fn evict_if_needed(&mut self) {
        while self.entries.len() > self.capacity && !self.order.is_empty() {
            let oldest = self.order.remove(0);
            self.entries.remove(&oldest);
        }
    }
}

/// Evicts the least recently *accessed* entry once `capacity` is
/// exceeded. `capacity` of `0` means unbounded.
pub struct LruCache {
    inner: Mutex<Inner>,
}

impl LruCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: Vec::new(),
                capacity: if capacity == 0 { usize::MAX } else { capacity },
            }),
        }
    }
}

impl Cache for LruCache {
    fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        let mut inner = self.inner.lock().expect("lru cache mutex poisoned");
        let hit = inner.entries.get(key).cloned();
        if hit.is_some() {
            inner.touch(key);
        }
        hit
    }

    fn put(&self, key: CacheKey, entry: CacheEntry) {
        let mut inner = self.inner.lock().expect("lru cache mutex poisoned");
        if inner.entries.insert(key.clone(), entry).is_none() {
            inner.order.push(key);
        } else {
            inner.touch(&key);
        }
        inner.evict_if_needed();
    }

    fn remove(&self, key: &CacheKey) {
        let mut inner = self.inner.lock().expect("lru cache mutex poisoned");
        inner.entries.remove(key);
        inner.order.retain(|k| k != key);
    }

    fn clear(&self) {
        let mut inner = self.inner.lock().expect("lru cache mutex poisoned");
        inner.entries.clear();
        inner.order.clear();
    }

    fn len(&self) -> usize {
        self.inner.lock().expect("lru cache mutex poisoned").entries.len()
    }
}
