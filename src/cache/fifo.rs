//! Size-bounded, first-in-first-out base store: eviction order is
//! insertion order only, unaffected by reads.

use super::{Cache, CacheEntry, CacheKey};
use std::collections::HashMap;
use std::sync::Mutex;

struct Inner {
    entries: HashMap<CacheKey, CacheEntry>,
    order: Vec<CacheKey>,
    capacity: usize,
}

pub struct FifoCache {
    inner: Mutex<Inner>,
}

impl FifoCache {
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

impl Cache for FifoCache {
    fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.inner.lock().expect("fifo cache mutex poisoned").entries.get(key).cloned()
    }

    fn put(&self, key: CacheKey, entry: CacheEntry) {
        let mut inner = self.inner.lock().expect("fifo cache mutex poisoned");
        if inner.entries.insert(key.clone(), entry).is_none() {
            inner.order.push(key);
        }
        while inner.entries.len() > inner.capacity && !inner.order.is_empty() {
            let oldest = inner.order.remove(0);
            inner.entries.remove(&oldest);
        }
    }

    fn remove(&self, key: &CacheKey) {
        let mut inner = self.inner.lock().expect("fifo cache mutex poisoned");
        inner.entries.remove(key);
        inner.order.retain(|k| k != key);
    }

    fn clear(&self) {
        let mut inner = self.inner.lock().expect("fifo cache mutex poisoned");
        inner.entries.clear();
        inner.order.clear();
    }

    fn len(&self) -> usize {
        self.inner.lock().expect("fifo cache mutex poisoned").entries.len()
    }
}
