//! Second-tier (cross-session) query result cache.
//!
//! A namespace's cache is built by wrapping a base store in a fixed
//! decorator order — synchronized, logging, size-limited eviction —
//! mirroring the way a `<cache>` element's child settings compose. Staged writes
//! during an open transaction go through [`transactional::TransactionalCacheManager`]
//! so a rollback never lets another session observe them.

pub mod blocking;
pub mod fifo;
pub mod logging;
pub mod lru;
pub mod sync;
pub mod transactional;

use crate::registry::cache_config::{CacheConfig, EvictionPolicy};
use crate::value::Value;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Identifies one cached result set: the statement, the exact bound
/// values, the pagination bounds (if any), and the environment, so that
/// two sessions against different environments never share an entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub statement_id: String,
    pub environment_id: String,
    pub sql: String,
    pub bound_values: Vec<String>,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
}

impl CacheKey {
    pub fn new(statement_id: impl Into<String>, environment_id: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            statement_id: statement_id.into(),
            environment_id: environment_id.into(),
            sql: sql.into(),
            bound_values: Vec::new(),
            offset: None,
            limit: None,
        }
    }

    pub fn with_bindings(mut self, values: &[Value]) -> Self {
        self.bound_values = values.iter().map(render_value).collect();
        self
    }

    pub fn with_bounds(mut self, offset: Option<u64>, limit: Option<u64>) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }

    pub fn digest(&self) -> u64 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

fn render_value(v: &Value) -> String {
    format!("{v:?}")
}

/// A cached value: the row data plus its approximate footprint, used by
/// size-limited stores to decide what to evict.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: Value,
    pub weight: usize,
}

impl CacheEntry {
    pub fn new(value: Value) -> Self {
        let weight = estimate_weight(&value);
        Self { value, weight }
    }
}

fn estimate_weight(v: &Value) -> usize {
    match v {
        Value::Str(s) => s.len() + 1,
        Value::Bytes(b) => b.len() + 1,
        Value::List(items) => 1 + items.iter().map(estimate_weight).sum::<usize>(),
        Value::Map(fields) => 1 + fields.values().map(estimate_weight).sum::<usize>(),
        _ => 8,
    }
}

/// The seam every decorator and base store implements. Kept
/// intentionally narrow — eviction policy, synchronization, and logging
/// are composed around it rather than baked in.
pub trait Cache: Send + Sync {
    fn get(&self, key: &CacheKey) -> Option<CacheEntry>;
    fn put(&self, key: CacheKey, entry: CacheEntry);
    fn remove(&self, key: &CacheKey);
    fn clear(&self);
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Cache for Arc<dyn Cache> {
    fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.as_ref().get(key)
    }
    fn put(&self, key: CacheKey, entry: CacheEntry) {
        self.as_ref().put(key, entry)
    }
    fn remove(&self, key: &CacheKey) {
        self.as_ref().remove(key)
    }
    fn clear(&self) {
        self.as_ref().clear()
    }
    fn len(&self) -> usize {
        self.as_ref().len()
    }
}

/// Builds the decorator stack a `<cache>` declaration describes: a
/// size-limited base store, optionally wrapped in a scheduled clear, with
/// hit/miss logging on the outside.
pub fn build(cfg: &CacheConfig) -> Arc<dyn Cache> {
    let base: Arc<dyn Cache> = match cfg.eviction {
        EvictionPolicy::Lru => Arc::new(lru::LruCache::new(cfg.size)),
        EvictionPolicy::Fifo => Arc::new(fifo::FifoCache::new(cfg.size)),
    };
    let scheduled: Arc<dyn Cache> = match cfg.flush_interval {
        Some(interval) => Arc::new(sync::ScheduledClearCache::new(base, interval)),
        None => base,
    };
    Arc::new(logging::LoggingCache::new(cfg.namespace.clone(), scheduled))
}
