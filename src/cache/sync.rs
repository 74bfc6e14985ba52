//! Wraps a base cache with a scheduled full clear, for namespaces that
//! declare `flushInterval` rather than relying on statement-triggered
//! invalidation alone.

use super::{Cache, CacheEntry, CacheKey};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

pub struct ScheduledClearCache<C: Cache> {
    inner: C,
    interval: Duration,
    epoch: Instant,
    last_clear_millis: AtomicU64,
}

impl<C: Cache> ScheduledClearCache<C> {
    pub fn new(inner: C, interval: Duration) -> Self {
        Self {
            inner,
            interval,
            epoch: Instant::now(),
            last_clear_millis: AtomicU64::new(0),
        }
    }

    fn clear_if_due(&self) {
        let now_millis = self.epoch.elapsed().as_millis() as u64;
        let last = self.last_clear_millis.load(Ordering::Relaxed);
        if now_millis.saturating_sub(last) >= self.interval.as_millis() as u64 {
            self.inner.clear();
            self.last_clear_millis.store(now_millis, Ordering::Relaxed);
        }
    }
}

impl<C: Cache> Cache for ScheduledClearCache<C> {
    fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.clear_if_due();
        self.inner.get(key)
    }

    fn put(&self, key: CacheKey, entry: CacheEntry) {
        self.clear_if_due();
        self.inner.put(key, entry);
    }

    fn remove(&self, key: &CacheKey) {
        self.inner.remove(key);
    }

    fn clear(&self) {
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
    fn clears_once_interval_elapses() {
        let cache = ScheduledClearCache::new(LruCache::new(0), Duration::from_millis(0));
        let key = CacheKey::new("s", "env", "select 1");
        cache.put(key.clone(), CacheEntry::new(Value::I32(1)));
        std::thread::sleep(Duration::from_millis(1));
        assert!(cache.get(&key).is_none());
    }
}
