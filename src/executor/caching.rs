//! Second-tier cache decorator: one [`TransactionalCacheManager`]
//! per cache namespace, consulted before falling through to the wrapped
//! [`SimpleExecutor`]. Staged writes land in the shared cache only when
//! the owning `Session` commits.

use super::simple::SimpleExecutor;
use crate::cache::transactional::TransactionalCacheManager;
use crate::cache::{Cache, CacheEntry, CacheKey};
use crate::error::SqlweaveError;
use crate::interceptor::InterceptorChain;
use crate::registry::mapped_statement::MappedStatement;
use crate::registry::FrozenRegistry;
use crate::udbc::connection::Connection;
use crate::udbc::driver::Driver;
use crate::value::Value;
use std::collections::HashMap;
use std::sync::Arc;

pub struct CachingExecutor {
    inner: SimpleExecutor,
    environment_id: String,
    caches: HashMap<String, Arc<dyn Cache>>,
    managers: HashMap<String, TransactionalCacheManager>,
}

impl CachingExecutor {
    pub fn new(environment_id: impl Into<String>, caches: HashMap<String, Arc<dyn Cache>>) -> Self {
        let environment_id = environment_id.into();
        Self {
            inner: SimpleExecutor::new(environment_id.clone()),
            environment_id,
            caches,
            managers: HashMap::new(),
        }
    }

    pub fn clear_cache(&mut self) {
        self.inner.clear_cache();
        for cache in self.caches.values() {
            cache.clear();
        }
        self.managers.clear();
    }

    fn manager_for(&mut self, namespace: &str) -> Option<&mut TransactionalCacheManager> {
        if !self.managers.contains_key(namespace) {
            let delegate = self.caches.get(namespace)?.clone();
            self.managers.insert(namespace.to_string(), TransactionalCacheManager::new(delegate));
        }
        self.managers.get_mut(namespace)
    }

    pub async fn query(
        &mut self,
        conn: &mut dyn Connection,
        driver: &dyn Driver,
        statement: &MappedStatement,
        param: Value,
        registry: &FrozenRegistry,
        interceptors: &InterceptorChain,
    ) -> Result<Vec<Value>, SqlweaveError> {
        let Some(namespace) = statement.cache_namespace.clone().filter(|_| statement.use_cache) else {
            return self.inner.query(conn, driver, statement, param, registry, interceptors).await;
        };

        let key = CacheKey::new(&statement.id, &self.environment_id, format!("{param:?}"));
        if let Some(manager) = self.manager_for(&namespace) {
            if let Some(entry) = manager.get(&key) {
                if let Value::List(rows) = entry.value {
                    return Ok(rows);
                }
            }
        }

        let rows = self.inner.query(conn, driver, statement, param, registry, interceptors).await?;
        if let Some(manager) = self.manager_for(&namespace) {
            manager.put(key, CacheEntry::new(Value::List(rows.clone())));
        }
        Ok(rows)
    }

    pub async fn update(
        &mut self,
        conn: &mut dyn Connection,
        driver: &dyn Driver,
        statement: &MappedStatement,
        param: Value,
        registry: &FrozenRegistry,
        interceptors: &InterceptorChain,
    ) -> Result<u64, SqlweaveError> {
        if let Some(namespace) = &statement.cache_namespace {
            if statement.flush_cache {
                if let Some(manager) = self.manager_for(namespace) {
                    manager.flush_on_commit();
                }
            }
        }
        self.inner.update(conn, driver, statement, param, registry, interceptors).await
    }

    /// Applies every namespace's staged writes. Called by `Session::commit`
    /// after the underlying connection has committed.
    pub fn commit(&mut self) {
        for (_, manager) in self.managers.drain() {
            manager.commit();
        }
    }

    /// Discards every namespace's staged writes without touching the
    /// shared caches. Called by `Session::rollback`.
    pub fn rollback(&mut self) {
        for (_, manager) in self.managers.drain() {
            manager.rollback();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::lru::LruCache;
    use crate::registry::mapped_statement::{Command, MappedStatement};
    use crate::registry::Registry;
    use crate::sql::parser;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct CountingConnection {
        queries: Arc<AtomicU64>,
    }

    #[async_trait]
    impl Connection for CountingConnection {
        async fn query(&mut self, _sql: &str, _args: &[(String, Value)]) -> Result<Vec<HashMap<String, Value>>, SqlweaveError> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            let mut row = HashMap::new();
            row.insert("id".to_string(), Value::I64(1));
            Ok(vec![row])
        }
        async fn execute(&mut self, _sql: &str, _args: &[(String, Value)]) -> Result<u64, SqlweaveError> {
            Ok(1)
        }
        async fn last_insert_id(&mut self) -> Result<u64, SqlweaveError> {
            Ok(1)
        }
        async fn begin(&mut self) -> Result<(), SqlweaveError> {
            Ok(())
        }
        async fn commit(&mut self) -> Result<(), SqlweaveError> {
            Ok(())
        }
        async fn rollback(&mut self) -> Result<(), SqlweaveError> {
            Ok(())
        }
    }

    struct NoopDriver;

    #[async_trait]
    impl Driver for NoopDriver {
        fn name(&self) -> &str {
            "test"
        }
        fn r#type(&self) -> &str {
            "test"
        }
        fn placeholder(&self, _seq: usize, _name: &str) -> String {
            "?".to_string()
        }
        async fn acquire(&self) -> Result<Box<dyn Connection>, SqlweaveError> {
            unimplemented!()
        }
        async fn close(&self) -> Result<(), SqlweaveError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn second_level_cache_survives_across_executor_instances() {
        let registry = Registry::default().freeze().unwrap();
        let mut statement = MappedStatement::new("t.findAll", Command::Select, parser::parse("select id from users"));
        statement.cache_namespace = Some("t".to_string());

        let shared: Arc<dyn Cache> = Arc::new(LruCache::new(16));
        let mut caches = HashMap::new();
        caches.insert("t".to_string(), shared);

        let driver = NoopDriver;
        let interceptors = InterceptorChain::new();
        let queries = Arc::new(AtomicU64::new(0));

        let mut first = CachingExecutor::new("test-env", caches.clone());
        let mut conn = CountingConnection { queries: queries.clone() };
        first
            .query(&mut conn, &driver, &statement, Value::Null, &registry, &interceptors)
            .await
            .unwrap();
        // Staged writes only reach the shared cache on commit.
        first.commit();

        // A fresh executor sharing the same backing cache should still hit.
        let mut second = CachingExecutor::new("test-env", caches);
        second
            .query(&mut conn, &driver, &statement, Value::Null, &registry, &interceptors)
            .await
            .unwrap();

        assert_eq!(queries.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn uncached_namespace_hits_the_connection_every_time() {
        let registry = Registry::default().freeze().unwrap();
        let statement = MappedStatement::new("t.findAll", Command::Select, parser::parse("select id from users"));

        let driver = NoopDriver;
        let interceptors = InterceptorChain::new();
        let queries = Arc::new(AtomicU64::new(0));
        let mut conn = CountingConnection { queries: queries.clone() };
        let mut executor = CachingExecutor::new("test-env", HashMap::new());

        executor
            .query(&mut conn, &driver, &statement, Value::Null, &registry, &interceptors)
            .await
            .unwrap();
        executor
            .query(&mut conn, &driver, &statement, Value::Null, &registry, &interceptors)
            .await
            .unwrap();

        assert_eq!(queries.load(Ordering::SeqCst), 1, "first-level cache still applies");
    }
}
