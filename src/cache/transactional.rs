//! Stages second-tier cache writes for the duration of an open
//! transaction: nothing touches the shared cache until
//! `commit`, and `rollback` discards the staging area untouched.

use super::{Cache, CacheEntry, CacheKey};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Default)]
struct Staging {
    puts: HashMap<CacheKey, CacheEntry>,
    removals: HashSet<CacheKey>,
    clear_all: bool,
}

/// One per namespace-scoped cache per open transaction. Reads still see
/// the shared cache directly (plus anything already staged this
/// transaction); writes only land in `commit`.
pub struct TransactionalCacheManager {
    delegate: Arc<dyn Cache>,
    staging: Staging,
}

impl TransactionalCacheManager {
    pub fn new(delegate: Arc<dyn Cache>) -> Self {
        Self {
            delegate,
            staging: Staging::default(),
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        if self.staging.clear_all || self.staging.removals.contains(key) {
            return self.staging.puts.get(key).cloned();
        }
        self.staging.puts.get(key).cloned().or_else(|| self.delegate.get(key))
    }

    pub fn put(&mut self, key: CacheKey, entry: CacheEntry) {
        self.staging.removals.remove(&key);
        self.staging.puts.insert(key, entry);
    }

    pub fn remove(&mut self, key: CacheKey) {
        self.staging.puts.remove(&key);
        self.staging.removals.insert(key);
    }

    /// An update statement with `flushCache` flushes the whole
    /// namespace once the transaction commits.
    pub fn flush_on_commit(&mut self) {
        self.staging.clear_all = true;
        self.staging.puts.clear();
        self.staging.removals.clear();
    }

    pub fn commit(mut self) {
        if self.staging.clear_all {
            self.delegate.clear();
        }
        for key in self.staging.removals.drain() {
            self.delegate.remove(&key);
        }
        for (key, entry) in self.staging.puts.drain() {
            self.delegate.put(key, entry);
        }
    }

    pub fn rollback(self) {
        // staging is simply dropped; the delegate was never touched.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::lru::LruCache;
    use crate::value::Value;

    fn key(id: &str) -> CacheKey {
        CacheKey::new(id, "env", "select 1")
    }

    #[test]
    fn rollback_never_touches_the_shared_cache() {
        let shared: Arc<dyn Cache> = Arc::new(LruCache::new(0));
        let mut staged = TransactionalCacheManager::new(shared.clone());
        staged.put(key("a"), CacheEntry::new(Value::I32(1)));
        assert!(staged.get(&key("a")).is_some());
        staged.rollback();
        assert!(shared.get(&key("a")).is_none());
    }

    #[test]
    fn commit_applies_staged_writes() {
        let shared: Arc<dyn Cache> = Arc::new(LruCache::new(0));
        let mut staged = TransactionalCacheManager::new(shared.clone());
        staged.put(key("a"), CacheEntry::new(Value::I32(1)));
        staged.commit();
        assert!(shared.get(&key("a")).is_some());
    }

    #[test]
    fn flush_on_commit_clears_the_shared_cache() {
        let shared: Arc<dyn Cache> = Arc::new(LruCache::new(0));
        shared.put(key("existing"), CacheEntry::new(Value::I32(9)));
        let mut staged = TransactionalCacheManager::new(shared.clone());
        staged.flush_on_commit();
        staged.commit();
        assert!(shared.get(&key("existing")).is_none());
    }
}
