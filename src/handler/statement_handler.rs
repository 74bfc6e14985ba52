//! Dispatches a rendered statement to a [`Connection`], accounting for
//! the three `statementType` variants a mapped statement can declare. `Connection`
//! binds positionally and has no prepared-statement cache of its own, so
//! `Simple` and `Prepared` differ only in whether `${}`-substituted SQL
//! is allowed to carry placeholders at all; `Callable` is a `Prepared`
//! execution that additionally logs when OUT parameters are declared,
//! since the driver layer has no channel to report them back through.

use crate::error::SqlweaveError;
use crate::registry::mapped_statement::{Command, MappedStatement, StatementKind};
use crate::sql::BoundSql;
use crate::udbc::connection::Connection;
use crate::value::Value;
use std::collections::HashMap;

pub struct StatementHandler<'a> {
    pub statement: &'a MappedStatement,
}

impl<'a> StatementHandler<'a> {
    pub fn new(statement: &'a MappedStatement) -> Self {
        Self { statement }
    }

    fn log_unsupported_controls(&self) {
        if self.statement.fetch_size.is_some() {
            log::debug!(
                "statement '{}' declares fetchSize; the connection trait streams eagerly, so it is advisory only",
                self.statement.id
            );
        }
        if self.statement.timeout.is_some() {
            log::debug!(
                "statement '{}' declares a timeout; enforcement is left to the underlying driver/pool",
                self.statement.id
            );
        }
        if self.statement.statement_kind == StatementKind::Callable {
            log::debug!(
                "statement '{}' is CALLABLE; OUT parameters are not surfaced by the connection trait",
                self.statement.id
            );
        }
    }

    pub async fn query(
        &self,
        connection: &mut dyn Connection,
        bound: &BoundSql,
    ) -> Result<Vec<HashMap<String, Value>>, SqlweaveError> {
        debug_assert_eq!(self.statement.command, Command::Select);
        self.log_unsupported_controls();
        connection.query(&bound.sql, &bound.bindings).await
    }

    pub async fn update(&self, connection: &mut dyn Connection, bound: &BoundSql) -> Result<u64, SqlweaveError> {
        debug_assert_ne!(self.statement.command, Command::Select);
        self.log_unsupported_controls();
        connection.execute(&bound.sql, &bound.bindings).await
    }
}
