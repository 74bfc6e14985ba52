//! `MappedStatement`: the immutable definition of one declared SQL
//! operation, keyed by a namespace-qualified id.

use crate::sql::ast::Node;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Select,
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Simple,
    Prepared,
    Callable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyGeneratorKind {
    None,
    Before,
    After,
}

#[derive(Debug, Clone)]
pub struct MappedStatement {
    pub id: String,
    pub command: Command,
    pub sql: Vec<Node>,
    pub result_map_ids: Vec<String>,
    pub cache_namespace: Option<String>,
    pub flush_cache: bool,
    pub use_cache: bool,
    pub statement_kind: StatementKind,
    pub key_generator: KeyGeneratorKind,
    pub key_properties: Vec<String>,
    pub key_columns: Vec<String>,
    pub fetch_size: Option<u32>,
    pub timeout: Option<u64>,
    pub result_ordered: bool,
    pub database_id: Option<String>,
    pub result_set_names: Vec<String>,
}

impl MappedStatement {
    /// Builds a statement with spec-mandated defaults: `flushCache`
    /// false and `useCache` true for SELECT, the reverse otherwise.
    pub fn new(id: impl Into<String>, command: Command, sql: Vec<Node>) -> Self {
        let is_select = command == Command::Select;
        Self {
            id: id.into(),
            command,
            sql,
            result_map_ids: Vec::new(),
            cache_namespace: None,
            flush_cache: !is_select,
            use_cache: is_select,
            statement_kind: StatementKind::Prepared,
            key_generator: KeyGeneratorKind::None,
            key_properties: Vec::new(),
            key_columns: Vec::new(),
            fetch_size: None,
            timeout: None,
            result_ordered: false,
            database_id: None,
            result_set_names: Vec::new(),
        }
    }
}
