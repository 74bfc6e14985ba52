//! Per-namespace second-tier cache configuration, as declared on a
//! `<mapper>`'s `<cache>` element.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionPolicy {
    Lru,
    Fifo,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub namespace: String,
    pub eviction: EvictionPolicy,
    pub size: usize,
    pub flush_interval: Option<Duration>,
}

impl CacheConfig {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            eviction: EvictionPolicy::Lru,
            size: 1024,
            flush_interval: None,
        }
    }
}
