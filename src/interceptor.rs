//! Typed interceptor hooks at four fixed seams: query/update execution,
//! statement rendering, parameter binding, and result mapping. MyBatis
//! wraps these as reflective dynamic proxies around arbitrary method
//! signatures; without reflection that isn't idiomatic here, so each seam
//! gets its own narrow trait instead. A [`Session`](crate::session::Session) runs every
//! registered interceptor, in registration order, around the matching
//! call.

use crate::error::SqlweaveError;
use crate::registry::mapped_statement::MappedStatement;
use crate::value::Value;
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait ExecutorInterceptor: Send + Sync {
    async fn before_query(&self, _statement: &MappedStatement, _param: &Value) -> Result<(), SqlweaveError> {
        Ok(())
    }
    async fn after_query(&self, _statement: &MappedStatement, _rows: &[Value]) -> Result<(), SqlweaveError> {
        Ok(())
    }
    async fn before_update(&self, _statement: &MappedStatement, _param: &Value) -> Result<(), SqlweaveError> {
        Ok(())
    }
    async fn after_update(&self, _statement: &MappedStatement, _affected: u64) -> Result<(), SqlweaveError> {
        Ok(())
    }
}

#[async_trait]
pub trait StatementInterceptor: Send + Sync {
    /// Runs once the statement's SQL is rendered but before it reaches the
    /// connection. Returning `Err` aborts the call.
    async fn before_execute(&self, _statement: &MappedStatement, _sql: &str) -> Result<(), SqlweaveError> {
        Ok(())
    }
}

pub trait ParameterInterceptor: Send + Sync {
    /// May rewrite the parameter object before it is bound into SQL.
    fn before_bind(&self, _statement: &MappedStatement, param: Value) -> Result<Value, SqlweaveError> {
        Ok(param)
    }
}

pub trait ResultSetInterceptor: Send + Sync {
    /// May rewrite mapped rows before they are handed back to the caller.
    fn after_map(&self, _statement: &MappedStatement, rows: Vec<Value>) -> Result<Vec<Value>, SqlweaveError> {
        Ok(rows)
    }
}

/// The ordered set of interceptors a `SessionFactory` runs every call
/// through. Cheap to clone: every entry is an `Arc`.
#[derive(Default, Clone)]
pub struct InterceptorChain {
    executor: Vec<Arc<dyn ExecutorInterceptor>>,
    statement: Vec<Arc<dyn StatementInterceptor>>,
    parameter: Vec<Arc<dyn ParameterInterceptor>>,
    result_set: Vec<Arc<dyn ResultSetInterceptor>>,
}

impl InterceptorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_executor(&mut self, interceptor: Arc<dyn ExecutorInterceptor>) {
        self.executor.push(interceptor);
    }

    pub fn register_statement(&mut self, interceptor: Arc<dyn StatementInterceptor>) {
        self.statement.push(interceptor);
    }

    pub fn register_parameter(&mut self, interceptor: Arc<dyn ParameterInterceptor>) {
        self.parameter.push(interceptor);
    }

    pub fn register_result_set(&mut self, interceptor: Arc<dyn ResultSetInterceptor>) {
        self.result_set.push(interceptor);
    }

    pub async fn before_query(&self, statement: &MappedStatement, param: &Value) -> Result<(), SqlweaveError> {
        for i in &self.executor {
            i.before_query(statement, param).await?;
        }
        Ok(())
    }

    pub async fn after_query(&self, statement: &MappedStatement, rows: &[Value]) -> Result<(), SqlweaveError> {
        for i in &self.executor {
            i.after_query(statement, rows).await?;
        }
        Ok(())
    }

    pub async fn before_update(&self, statement: &MappedStatement, param: &Value) -> Result<(), SqlweaveError> {
        for i in &self.executor {
            i.before_update(statement, param).await?;
        }
        Ok(())
    }

    pub async fn after_update(&self, statement: &MappedStatement, affected: u64) -> Result<(), SqlweaveError> {
        for i in &self.executor {
            i.after_update(statement, affected).await?;
        }
        Ok(())
    }

    pub async fn before_execute(&self, statement: &MappedStatement, sql: &str) -> Result<(), SqlweaveError> {
        for i in &self.statement {
            i.before_execute(statement, sql).await?;
        }
        Ok(())
    }

    pub fn before_bind(&self, statement: &MappedStatement, mut param: Value) -> Result<Value, SqlweaveError> {
        for i in &self.parameter {
            param = i.before_bind(statement, param)?;
        }
        Ok(param)
    }

    pub fn after_map(&self, statement: &MappedStatement, mut rows: Vec<Value>) -> Result<Vec<Value>, SqlweaveError> {
        for i in &self.result_set {
            rows = i.after_map(statement, rows)?;
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::mapped_statement::{Command, MappedStatement};
    use std::sync::atomic::{AtomicU64, Ordering};

    struct CountingInterceptor(Arc<AtomicU64>);

    #[async_trait]
    impl ExecutorInterceptor for CountingInterceptor {
        async fn before_query(&self, _statement: &MappedStatement, _param: &Value) -> Result<(), SqlweaveError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn runs_registered_interceptors_in_order() {
        let counter = Arc::new(AtomicU64::new(0));
        let mut chain = InterceptorChain::new();
        chain.register_executor(Arc::new(CountingInterceptor(counter.clone())));
        chain.register_executor(Arc::new(CountingInterceptor(counter.clone())));

        let statement = MappedStatement::new("t.find", Command::Select, Vec::new());
        chain.before_query(&statement, &Value::Null).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}
