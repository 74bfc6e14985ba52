//! The per-call entry point: one `Session` owns one [`CachingExecutor`] and
//! at most one open [`Transaction`] as an owned field rather than a
//! thread-local lookup, so a session can move freely across tasks without
//! smuggling hidden state through thread-locals.

use crate::cache::Cache;
use crate::error::SqlweaveError;
use crate::executor::caching::CachingExecutor;
use crate::executor::transaction::Transaction;
use crate::interceptor::InterceptorChain;
use crate::registry::FrozenRegistry;
use crate::udbc::driver::Driver;
use crate::value::{to_value, FromValue, Value};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Client-side pagination, applied after mapping since `Connection` has no
/// `LIMIT`/`OFFSET` channel of its own.
#[derive(Debug, Clone, Copy, Default)]
pub struct RowBounds {
    pub offset: u64,
    pub limit: u64,
}

impl RowBounds {
    pub fn new(offset: u64, limit: u64) -> Self {
        Self { offset, limit }
    }

    fn apply(self, rows: Vec<Value>) -> Vec<Value> {
        rows.into_iter().skip(self.offset as usize).take(self.limit as usize).collect()
    }
}

/// A lazily-materialized result set. `Connection` returns every row
/// eagerly, so this wraps an already-resolved buffer rather than a live
/// streaming handle — document the gap rather than fake the laziness.
pub struct Cursor<R> {
    rows: std::vec::IntoIter<Value>,
    _marker: std::marker::PhantomData<R>,
}

impl<R: FromValue> Iterator for Cursor<R> {
    type Item = Result<R, SqlweaveError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.rows.next().map(R::from_value)
    }
}

pub struct Session {
    driver: Arc<dyn Driver>,
    registry: Arc<FrozenRegistry>,
    executor: CachingExecutor,
    transaction: Option<Transaction>,
    interceptors: InterceptorChain,
    closed: bool,
}

impl Session {
    pub(crate) fn new(
        driver: Arc<dyn Driver>,
        registry: Arc<FrozenRegistry>,
        caches: HashMap<String, Arc<dyn Cache>>,
        interceptors: InterceptorChain,
    ) -> Self {
        Self {
            executor: CachingExecutor::new(driver.name().to_string(), caches),
            driver,
            registry,
            transaction: None,
            interceptors,
            closed: false,
        }
    }

    fn ensure_open(&self) -> Result<(), SqlweaveError> {
        if self.closed {
            return Err(SqlweaveError::SessionClosed);
        }
        Ok(())
    }

    fn params_to_value<P: Serialize>(&self, params: &P) -> Result<Value, SqlweaveError> {
        Ok(crate::param::normalize(to_value(params)?))
    }

    async fn query_rows(&mut self, id: &str, param: Value) -> Result<Vec<Value>, SqlweaveError> {
        self.ensure_open()?;
        let statement = self.registry.statement(id)?;
        let param = self.interceptors.before_bind(&statement, param)?;
        self.interceptors.before_query(&statement, &param).await?;

        let rows = match self.transaction.as_mut() {
            Some(tx) => {
                self.executor
                    .query(tx.connection_mut(), self.driver.as_ref(), &statement, param, &self.registry, &self.interceptors)
                    .await?
            }
            None => {
                let mut conn = self.driver.acquire().await?;
                self.executor
                    .query(conn.as_mut(), self.driver.as_ref(), &statement, param, &self.registry, &self.interceptors)
                    .await?
            }
        };

        self.interceptors.after_query(&statement, &rows).await?;
        self.interceptors.after_map(&statement, rows)
    }

    pub async fn select_one<P: Serialize, R: FromValue>(&mut self, id: &str, params: &P) -> Result<Option<R>, SqlweaveError> {
        let param = self.params_to_value(params)?;
        let rows = self.query_rows(id, param).await?;
        if rows.len() > 1 {
            return Err(SqlweaveError::Mapping(format!(
                "statement '{id}' returned {} rows for select_one, expected at most one",
                rows.len()
            )));
        }
        rows.into_iter().next().map(R::from_value).transpose()
    }

    pub async fn select_list<P: Serialize, R: FromValue>(
        &mut self,
        id: &str,
        params: &P,
        bounds: Option<RowBounds>,
    ) -> Result<Vec<R>, SqlweaveError> {
        let param = self.params_to_value(params)?;
        let mut rows = self.query_rows(id, param).await?;
        if let Some(bounds) = bounds {
            rows = bounds.apply(rows);
        }
        rows.into_iter().map(R::from_value).collect()
    }

    pub async fn select_map<P: Serialize, K: FromValue + std::hash::Hash + Eq, R: FromValue>(
        &mut self,
        id: &str,
        params: &P,
        key_property: &str,
        bounds: Option<RowBounds>,
    ) -> Result<HashMap<K, R>, SqlweaveError> {
        let param = self.params_to_value(params)?;
        let mut rows = self.query_rows(id, param).await?;
        if let Some(bounds) = bounds {
            rows = bounds.apply(rows);
        }
        let mut out = HashMap::with_capacity(rows.len());
        for row in rows {
            let key_value = match &row {
                Value::Map(fields) => fields.get(key_property).cloned().unwrap_or(Value::Null),
                _ => {
                    return Err(SqlweaveError::Mapping(format!(
                        "select_map requires mapped rows, got {row:?}"
                    )))
                }
            };
            let key = K::from_value(key_value)?;
            out.insert(key, R::from_value(row)?);
        }
        Ok(out)
    }

    pub async fn select_cursor<P: Serialize, R: FromValue>(
        &mut self,
        id: &str,
        params: &P,
        bounds: Option<RowBounds>,
    ) -> Result<Cursor<R>, SqlweaveError> {
        let param = self.params_to_value(params)?;
        let mut rows = self.query_rows(id, param).await?;
        if let Some(bounds) = bounds {
            rows = bounds.apply(rows);
        }
        Ok(Cursor { rows: rows.into_iter(), _marker: std::marker::PhantomData })
    }

    pub async fn execute_mapped<P: Serialize, R: FromValue>(&mut self, id: &str, params: &P) -> Result<R, SqlweaveError> {
        self.ensure_open()?;
        let statement = self.registry.statement(id)?;
        let param = self.params_to_value(params)?;
        let param = self.interceptors.before_bind(&statement, param)?;
        self.interceptors.before_update(&statement, &param).await?;

        let affected = match self.transaction.as_mut() {
            Some(tx) => {
                self.executor
                    .update(tx.connection_mut(), self.driver.as_ref(), &statement, param, &self.registry, &self.interceptors)
                    .await?
            }
            None => {
                let mut conn = self.driver.acquire().await?;
                self.executor
                    .update(conn.as_mut(), self.driver.as_ref(), &statement, param, &self.registry, &self.interceptors)
                    .await?
            }
        };

        self.interceptors.after_update(&statement, affected).await?;
        R::from_value(Value::U64(affected))
    }

    pub fn is_transaction_active(&self) -> bool {
        self.transaction.is_some()
    }

    pub async fn begin(&mut self) -> Result<(), SqlweaveError> {
        self.ensure_open()?;
        if self.transaction.is_some() {
            return Err(SqlweaveError::Configuration("a transaction is already open on this session".into()));
        }
        self.transaction = Some(Transaction::begin(self.driver.clone()).await?);
        Ok(())
    }

    pub async fn commit(&mut self) -> Result<(), SqlweaveError> {
        self.ensure_open()?;
        let mut tx = self
            .transaction
            .take()
            .ok_or_else(|| SqlweaveError::Configuration("no transaction is open on this session".into()))?;
        tx.commit().await?;
        self.executor.commit();
        Ok(())
    }

    pub async fn rollback(&mut self) -> Result<(), SqlweaveError> {
        self.ensure_open()?;
        let mut tx = self
            .transaction
            .take()
            .ok_or_else(|| SqlweaveError::Configuration("no transaction is open on this session".into()))?;
        tx.rollback().await?;
        self.executor.rollback();
        Ok(())
    }

    /// MyBatis flushes queued batch statements here; this engine executes
    /// eagerly, so there is nothing to flush but the first-level cache
    /// entries a pending batch would have invalidated anyway.
    pub fn flush_statements(&mut self) {
        self.executor.clear_cache();
    }

    pub fn clear_cache(&mut self) {
        self.executor.clear_cache();
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Runs the nested statement a [`crate::lazy::Deferred`] points at and
    /// shapes the result the way an eager nested-query splice would have.
    /// Called by `Lazy::get` on first read, never by application code
    /// directly.
    pub(crate) async fn resolve_lazy(&mut self, deferred: &crate::lazy::Deferred) -> Result<Value, SqlweaveError> {
        let param = crate::param::normalize(deferred.parameter.clone());
        let rows = self.query_rows(&deferred.statement_id, param).await?;
        if deferred.is_collection {
            Ok(Value::List(rows))
        } else {
            Ok(rows.into_iter().next().unwrap_or(Value::Null))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::mapped_statement::{Command, MappedStatement};
    use crate::registry::result_map::ResultMap;
    use crate::registry::Registry;
    use crate::sql::parser;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(serde::Serialize)]
    struct ById {
        id: i64,
    }

    #[derive(Debug, PartialEq, Eq)]
    struct User {
        id: i64,
    }

    impl FromValue for User {
        fn from_value(v: Value) -> Result<Self, SqlweaveError> {
            let map = v.as_map().ok_or_else(|| SqlweaveError::Mapping("expected a row".into()))?;
            let id = match map.get("id") {
                Some(Value::I64(n)) => *n,
                _ => return Err(SqlweaveError::Mapping("missing id".into())),
            };
            Ok(User { id })
        }
    }

    struct FakeConnection {
        calls: Arc<AtomicU64>,
    }

    #[async_trait]
    impl crate::udbc::connection::Connection for FakeConnection {
        async fn query(&mut self, _sql: &str, _args: &[(String, Value)]) -> Result<Vec<HashMap<String, Value>>, SqlweaveError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut row = HashMap::new();
            row.insert("id".to_string(), Value::I64(7));
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

    struct FakeDriver {
        calls: Arc<AtomicU64>,
    }

    #[async_trait]
    impl Driver for FakeDriver {
        fn name(&self) -> &str {
            "fake"
        }
        fn r#type(&self) -> &str {
            "fake"
        }
        fn placeholder(&self, _seq: usize, _name: &str) -> String {
            "?".to_string()
        }
        async fn acquire(&self) -> Result<Box<dyn crate::udbc::connection::Connection>, SqlweaveError> {
            Ok(Box::new(FakeConnection { calls: self.calls.clone() }))
        }
        async fn close(&self) -> Result<(), SqlweaveError> {
            Ok(())
        }
    }

    fn session_with_find_by_id() -> (Session, Arc<AtomicU64>) {
        let registry = Registry::default();
        let mut result_map = ResultMap::new("t.user", "User");
        result_map.mappings.push(crate::registry::result_map::ResultMapping::column("id", "id"));
        registry.register_result_map(result_map).unwrap();
        let mut statement = MappedStatement::new(
            "t.findById",
            Command::Select,
            parser::parse("select id from users where id = #{id}"),
        );
        statement.result_map_ids.push("t.user".to_string());
        registry.register_statement(statement).unwrap();
        let frozen = Arc::new(registry.freeze().unwrap());

        let calls = Arc::new(AtomicU64::new(0));
        let driver: Arc<dyn Driver> = Arc::new(FakeDriver { calls: calls.clone() });
        let session = Session::new(driver, frozen, HashMap::new(), InterceptorChain::new());
        (session, calls)
    }

    #[tokio::test]
    async fn select_one_maps_the_first_row() {
        let (mut session, _calls) = session_with_find_by_id();
        let user: Option<User> = session.select_one("t.findById", &ById { id: 7 }).await.unwrap();
        assert_eq!(user, Some(User { id: 7 }));
    }

    #[tokio::test]
    async fn without_a_transaction_every_call_acquires_a_fresh_connection() {
        let (mut session, calls) = session_with_find_by_id();
        let _: Option<User> = session.select_one("t.findById", &ById { id: 7 }).await.unwrap();
        let _: Option<User> = session.select_one("t.findById", &ById { id: 7 }).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1, "first-level cache still applies within a session");
    }

    #[tokio::test]
    async fn begin_then_commit_round_trips_cleanly() {
        let (mut session, _calls) = session_with_find_by_id();
        assert!(!session.is_transaction_active());
        session.begin().await.unwrap();
        assert!(session.is_transaction_active());
        let _: Option<User> = session.select_one("t.findById", &ById { id: 7 }).await.unwrap();
        session.commit().await.unwrap();
        assert!(!session.is_transaction_active());
    }

    #[tokio::test]
    async fn committing_without_an_open_transaction_is_an_error() {
        let (mut session, _calls) = session_with_find_by_id();
        let err = session.commit().await.unwrap_err();
        assert!(matches!(err, SqlweaveError::Configuration(_)));
    }

    struct TwoRowConnection;

    #[async_trait]
    impl crate::udbc::connection::Connection for TwoRowConnection {
        async fn query(&mut self, _sql: &str, _args: &[(String, Value)]) -> Result<Vec<HashMap<String, Value>>, SqlweaveError> {
            let mut a = HashMap::new();
            a.insert("id".to_string(), Value::I64(7));
            let mut b = HashMap::new();
            b.insert("id".to_string(), Value::I64(8));
            Ok(vec![a, b])
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

    struct TwoRowDriver;

    #[async_trait]
    impl Driver for TwoRowDriver {
        fn name(&self) -> &str {
            "fake"
        }
        fn r#type(&self) -> &str {
            "fake"
        }
        fn placeholder(&self, _seq: usize, _name: &str) -> String {
            "?".to_string()
        }
        async fn acquire(&self) -> Result<Box<dyn crate::udbc::connection::Connection>, SqlweaveError> {
            Ok(Box::new(TwoRowConnection))
        }
        async fn close(&self) -> Result<(), SqlweaveError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn select_one_fails_when_more_than_one_row_matches() {
        let registry = Registry::default();
        let mut result_map = ResultMap::new("t.user", "User");
        result_map.mappings.push(crate::registry::result_map::ResultMapping::column("id", "id"));
        registry.register_result_map(result_map).unwrap();
        let mut statement = MappedStatement::new(
            "t.findById",
            Command::Select,
            parser::parse("select id from users where id = #{id}"),
        );
        statement.result_map_ids.push("t.user".to_string());
        registry.register_statement(statement).unwrap();
        let frozen = Arc::new(registry.freeze().unwrap());
        let driver: Arc<dyn Driver> = Arc::new(TwoRowDriver);
        let mut session = Session::new(driver, frozen, HashMap::new(), InterceptorChain::new());

        let err = session.select_one::<_, User>("t.findById", &ById { id: 7 }).await.unwrap_err();
        assert!(matches!(err, SqlweaveError::Mapping(_)));
    }

    #[tokio::test]
    async fn calls_after_close_are_rejected() {
        let (mut session, _calls) = session_with_find_by_id();
        session.close();
        let err = session.select_one::<_, User>("t.findById", &ById { id: 7 }).await.unwrap_err();
        assert!(matches!(err, SqlweaveError::SessionClosed));
    }
}
