//! Render → execute → log pipeline plus the session-scoped first-level
//! cache, driving full `MappedStatement`/`ResultMap` resolution including
//! nested queries.

use crate::cache::CacheKey;
use crate::error::SqlweaveError;
use crate::handler::{parameter_handler, result_set_handler, statement_handler::StatementHandler};
use crate::interceptor::InterceptorChain;
use crate::key_generator;
use crate::registry::mapped_statement::{Command, MappedStatement};
use crate::registry::result_map::ResultMap;
use crate::registry::FrozenRegistry;
use crate::sql;
use crate::udbc::connection::Connection;
use crate::udbc::driver::Driver;
use crate::value::Value;
use log::debug;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Instant;

/// Per-session cache of fully-resolved query results, keyed by statement
/// and bound values. Every write statement flushes it (MyBatis' default
/// `flushCache` for non-SELECT statements); `clear` is also exposed
/// directly for `Session::clear_cache`.
pub struct SimpleExecutor {
    environment_id: String,
    first_level_cache: HashMap<CacheKey, Vec<Value>>,
    query_depth: u32,
}

impl SimpleExecutor {
    pub fn new(environment_id: impl Into<String>) -> Self {
        Self {
            environment_id: environment_id.into(),
            first_level_cache: HashMap::new(),
            query_depth: 0,
        }
    }

    pub fn clear_cache(&mut self) {
        self.first_level_cache.clear();
    }

    fn result_map_for<'a>(
        &self,
        statement: &MappedStatement,
        registry: &'a FrozenRegistry,
    ) -> Result<ResultMap, SqlweaveError> {
        match statement.result_map_ids.first() {
            Some(id) => Ok(registry.result_map(id)?.as_ref().clone()),
            None => Ok(ResultMap::new(format!("{}#inline", statement.id), "")),
        }
    }

    /// Renders, executes, and fully resolves one SELECT, including any
    /// nested-query (`select="..."`) mappings, recursing through the
    /// same entry point.
    pub fn query<'a>(
        &'a mut self,
        conn: &'a mut dyn Connection,
        driver: &'a dyn Driver,
        statement: &'a MappedStatement,
        param: Value,
        registry: &'a FrozenRegistry,
        interceptors: &'a InterceptorChain,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Value>, SqlweaveError>> + Send + 'a>> {
        Box::pin(async move {
            debug_assert_eq!(statement.command, Command::Select);

            let bound = sql::render(&statement.sql, &param, driver, &registry.fragments)?;
            let bindings = parameter_handler::prepare_bindings(&statement.sql, bound.bindings)?;
            interceptors.before_execute(statement, &bound.sql).await?;
            let key = CacheKey::new(&statement.id, &self.environment_id, &bound.sql).with_bindings(
                &bindings.iter().map(|(_, v)| v.clone()).collect::<Vec<_>>(),
            );

            if let Some(cached) = self.first_level_cache.get(&key) {
                debug!("first-level cache hit for '{}'", statement.id);
                return Ok(cached.clone());
            }

            let start = Instant::now();
            let handler = StatementHandler::new(statement);
            let bound_for_exec = sql::BoundSql { sql: bound.sql.clone(), bindings };
            let rows = handler.query(conn, &bound_for_exec).await;
            let elapsed = start.elapsed().as_millis();
            let rows = match rows {
                Ok(rows) => {
                    debug!("query '{}' took {}ms, {} rows", statement.id, elapsed, rows.len());
                    rows
                }
                Err(source) => {
                    return Err(SqlweaveError::Execution {
                        statement_id: statement.id.clone(),
                        sql: bound_for_exec.sql,
                        source: Box::new(source),
                    });
                }
            };

            let result_map = self.result_map_for(statement, registry)?;
            let mapped = result_set_handler::map_rows(rows, &result_map, registry)?;

            self.query_depth += 1;
            log::trace!("query depth {} resolving nested queries for '{}'", self.query_depth, statement.id);
            let mut resolved = Vec::with_capacity(mapped.len());
            for row in mapped {
                let mut value = row.value;
                for pending in row.pending {
                    let nested_statement = registry.statement(&pending.statement_id)?;
                    let nested_param = crate::param::normalize(pending.parameter);
                    let nested_rows = self
                        .query(conn, driver, nested_statement.as_ref(), nested_param, registry, interceptors)
                        .await?;
                    let spliced = if pending.is_collection {
                        Value::List(nested_rows)
                    } else {
                        nested_rows.into_iter().next().unwrap_or(Value::Null)
                    };
                    if let Value::Map(fields) = &mut value {
                        fields.insert(pending.property.clone(), spliced);
                    }
                }
                resolved.push(value);
            }
            self.query_depth -= 1;

            if statement.use_cache {
                self.first_level_cache.insert(key, resolved.clone());
            }
            Ok(resolved)
        })
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
        debug_assert_ne!(statement.command, Command::Select);

        let bound = sql::render(&statement.sql, &param, driver, &registry.fragments)?;
        let bindings = parameter_handler::prepare_bindings(&statement.sql, bound.bindings)?;
        interceptors.before_execute(statement, &bound.sql).await?;
        let bound = sql::BoundSql { sql: bound.sql, bindings };

        let start = Instant::now();
        let handler = StatementHandler::new(statement);
        let result = handler.update(conn, &bound).await;
        let elapsed = start.elapsed().as_millis();

        let affected = match result {
            Ok(n) => {
                debug!("update '{}' took {}ms, affected={}", statement.id, elapsed, n);
                n
            }
            Err(source) => {
                return Err(SqlweaveError::Execution {
                    statement_id: statement.id.clone(),
                    sql: bound.sql,
                    source: Box::new(source),
                });
            }
        };

        if statement.command == Command::Insert {
            if let Some(id) = key_generator::after_insert(statement.key_generator, conn).await? {
                debug!("insert '{}' generated key {}", statement.id, id);
            }
        }

        if statement.flush_cache {
            self.clear_cache();
        }
        Ok(affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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
            row.insert("name".to_string(), Value::Str("ada".into()));
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

    use std::sync::Arc;

    fn select_statement(id: &str) -> MappedStatement {
        MappedStatement::new(id, Command::Select, parser::parse("select id, name from users"))
    }

    #[tokio::test]
    async fn repeated_query_hits_the_first_level_cache() {
        let registry = Registry::default().freeze().unwrap();
        let statement = select_statement("t.findAll");
        let driver = NoopDriver;
        let queries = Arc::new(AtomicU64::new(0));
        let mut conn = CountingConnection { queries: queries.clone() };
        let mut executor = SimpleExecutor::new("test-env");

        let interceptors = InterceptorChain::new();
        executor.query(&mut conn, &driver, &statement, Value::Null, &registry, &interceptors).await.unwrap();
        executor.query(&mut conn, &driver, &statement, Value::Null, &registry, &interceptors).await.unwrap();

        assert_eq!(queries.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn update_flushes_the_first_level_cache() {
        let registry = Registry::default().freeze().unwrap();
        let select = select_statement("t.findAll");
        let update = MappedStatement::new("t.touch", Command::Update, parser::parse("update users set name = #{name}"));
        let driver = NoopDriver;
        let queries = Arc::new(AtomicU64::new(0));
        let mut conn = CountingConnection { queries: queries.clone() };
        let mut executor = SimpleExecutor::new("test-env");

        let interceptors = InterceptorChain::new();
        executor.query(&mut conn, &driver, &select, Value::Null, &registry, &interceptors).await.unwrap();
        let mut params = HashMap::new();
        params.insert("name".to_string(), Value::Str("ada".into()));
        executor.update(&mut conn, &driver, &update, Value::Map(params), &registry, &interceptors).await.unwrap();
        executor.query(&mut conn, &driver, &select, Value::Null, &registry, &interceptors).await.unwrap();

        assert_eq!(queries.load(Ordering::SeqCst), 2);
    }

    struct ScriptedConnection {
        calls: Arc<AtomicU64>,
    }

    #[async_trait]
    impl Connection for ScriptedConnection {
        async fn query(&mut self, sql: &str, _args: &[(String, Value)]) -> Result<Vec<HashMap<String, Value>>, SqlweaveError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if sql.contains("accounts") {
                let mut row = HashMap::new();
                row.insert("id".to_string(), Value::I64(9));
                row.insert("owner_id".to_string(), Value::I64(1));
                return Ok(vec![row]);
            }
            let mut row = HashMap::new();
            row.insert("id".to_string(), Value::I64(1));
            Ok(vec![row])
        }
        async fn execute(&mut self, _sql: &str, _args: &[(String, Value)]) -> Result<u64, SqlweaveError> {
            unreachable!("not exercised by this test")
        }
        async fn last_insert_id(&mut self) -> Result<u64, SqlweaveError> {
            unreachable!("not exercised by this test")
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

    #[tokio::test]
    async fn resolves_a_nested_query_and_splices_the_result() {
        use crate::registry::result_map::ResultMapping;

        let registry = Registry::default();
        let mut user_map = ResultMap::new("t.userWithAccounts", "User");
        user_map.mappings.push(ResultMapping::column("id", "id"));
        user_map.mappings.push(ResultMapping {
            property: "accounts".into(),
            column: Some("id".into()),
            nested_query_id: Some("t.findAccountsByUserId".into()),
            is_collection: true,
            ..Default::default()
        });
        registry.register_result_map(user_map).unwrap();

        let mut find_user = select_statement("t.findUser");
        find_user.result_map_ids.push("t.userWithAccounts".to_string());
        let find_accounts = MappedStatement::new(
            "t.findAccountsByUserId",
            Command::Select,
            parser::parse("select id, owner_id from accounts where owner_id = #{value}"),
        );
        registry.register_statement(find_user.clone()).unwrap();
        registry.register_statement(find_accounts).unwrap();
        let frozen = registry.freeze().unwrap();

        let driver = NoopDriver;
        let calls = Arc::new(AtomicU64::new(0));
        let mut conn = ScriptedConnection { calls: calls.clone() };
        let mut executor = SimpleExecutor::new("test-env");

        let interceptors = InterceptorChain::new();
        let rows = executor.query(&mut conn, &driver, &find_user, Value::Null, &frozen, &interceptors).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let fields = rows[0].as_map().unwrap();
        let accounts = fields.get("accounts").unwrap().as_list().unwrap();
        assert_eq!(accounts.len(), 1);
        let account = accounts[0].as_map().unwrap();
        assert_eq!(account.get("id"), Some(&Value::I64(9)));
    }

    #[tokio::test]
    async fn lazy_nested_query_issues_no_sub_query_until_the_property_is_read() {
        use crate::registry::result_map::ResultMapping;

        let registry = Registry::default();
        let mut user_map = ResultMap::new("t.userWithLazyAccounts", "User");
        user_map.mappings.push(ResultMapping::column("id", "id"));
        user_map.mappings.push(ResultMapping {
            property: "accounts".into(),
            column: Some("id".into()),
            nested_query_id: Some("t.findAccountsByUserId".into()),
            is_collection: true,
            lazy: true,
            ..Default::default()
        });
        registry.register_result_map(user_map).unwrap();

        let mut find_user = select_statement("t.findUserLazy");
        find_user.result_map_ids.push("t.userWithLazyAccounts".to_string());
        let find_accounts = MappedStatement::new(
            "t.findAccountsByUserId",
            Command::Select,
            parser::parse("select id, owner_id from accounts where owner_id = #{value}"),
        );
        registry.register_statement(find_user.clone()).unwrap();
        registry.register_statement(find_accounts).unwrap();
        let frozen = registry.freeze().unwrap();

        let driver = NoopDriver;
        let calls = Arc::new(AtomicU64::new(0));
        let mut conn = ScriptedConnection { calls: calls.clone() };
        let mut executor = SimpleExecutor::new("test-env");

        let interceptors = InterceptorChain::new();
        let rows = executor.query(&mut conn, &driver, &find_user, Value::Null, &frozen, &interceptors).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1, "the nested query must not run until the property is read");

        let fields = rows[0].as_map().unwrap();
        let sentinel = fields.get("accounts").unwrap().clone();
        let lazy = crate::lazy::Lazy::<Value>::from_value(sentinel).unwrap();
        assert!(!lazy.is_loaded());
    }
}
