//! `ResultMap`: declarative rules turning a row (or row graph) into a
//! record of a given type, including discriminated and nested mappings.

use crate::error::SqlweaveError;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct ResultMapping {
    pub property: String,
    pub column: Option<String>,
    pub nested_result_map_id: Option<String>,
    pub nested_query_id: Option<String>,
    pub lazy: bool,
    pub not_null_columns: Vec<String>,
    pub column_prefix: Option<String>,
    pub composites: Vec<ResultMapping>,
    pub result_set_name: Option<String>,
    pub foreign_column: Option<String>,
    pub is_constructor: bool,
    pub is_id: bool,
    /// Set for `<collection>` mappings; `false` for `<association>` and
    /// plain `<id>`/`<result>` columns. Controls whether a nested query or
    /// nested result map splices a single value or a `Value::List`.
    pub is_collection: bool,
}

impl ResultMapping {
    pub fn column(property: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            column: Some(column.into()),
            ..Default::default()
        }
    }

    /// Invariant: a non-identity mapping must carry a plain
    /// column (handled by a type handler), a nested result map, or a
    /// nested query.
    fn is_well_formed(&self) -> bool {
        self.is_id
            || self.column.is_some()
            || self.nested_result_map_id.is_some()
            || self.nested_query_id.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct Discriminator {
    pub column: String,
    pub cases: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct ResultMap {
    pub id: String,
    pub record_type: String,
    pub mappings: Vec<ResultMapping>,
    pub discriminator: Option<Discriminator>,
    pub extends: Option<String>,
    pub auto_map: bool,
}

impl ResultMap {
    pub fn new(id: impl Into<String>, record_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            record_type: record_type.into(),
            mappings: Vec::new(),
            discriminator: None,
            extends: None,
            auto_map: true,
        }
    }

    pub fn id_mappings(&self) -> impl Iterator<Item = &ResultMapping> {
        self.mappings.iter().filter(|m| m.is_id)
    }

    pub fn constructor_mappings(&self) -> impl Iterator<Item = &ResultMapping> {
        self.mappings.iter().filter(|m| m.is_constructor)
    }

    pub fn has_nested_result_mappings(&self) -> bool {
        self.mappings.iter().any(|m| m.nested_result_map_id.is_some())
    }

    pub fn has_nested_queries(&self) -> bool {
        self.mappings.iter().any(|m| m.nested_query_id.is_some())
    }

    /// Flattens `extends` chains (parent mappings first) and checks the
    /// non-identity-mapping invariant. Called at registry freeze.
    pub fn resolve(&self, all: &HashMap<String, ResultMap>) -> Result<ResultMap, SqlweaveError> {
        let mut chain = Vec::new();
        let mut current = self;
        let mut seen = std::collections::HashSet::new();
        loop {
            if !seen.insert(current.id.clone()) {
                return Err(SqlweaveError::Configuration(format!(
                    "result map '{}' has a cyclic extends chain",
                    self.id
                )));
            }
            chain.push(current);
            match &current.extends {
                Some(parent_id) => {
                    current = all.get(parent_id).ok_or_else(|| {
                        SqlweaveError::Configuration(format!(
                            "result map '{}' extends unknown parent '{}'",
                            current.id, parent_id
                        ))
                    })?;
                }
                None => break,
            }
        }

        let mut mappings = Vec::new();
        for rm in chain.into_iter().rev() {
            mappings.extend(rm.mappings.iter().cloned());
        }
        for mapping in &mappings {
            if !mapping.is_well_formed() {
                return Err(SqlweaveError::Configuration(format!(
                    "result map '{}': property '{}' has neither a column, a nested result map, nor a nested query",
                    self.id, mapping.property
                )));
            }
            if mapping.nested_query_id.is_some() && mapping.nested_result_map_id.is_some() {
                return Err(SqlweaveError::Configuration(format!(
                    "result map '{}': property '{}' declares both a nested query and a nested result map",
                    self.id, mapping.property
                )));
            }
        }

        Ok(ResultMap {
            id: self.id.clone(),
            record_type: self.record_type.clone(),
            mappings,
            discriminator: self.discriminator.clone(),
            extends: None,
            auto_map: self.auto_map,
        })
    }
}
