//! Process-wide store of declared SQL mappings. Statements, result maps,
//! cache configs and reusable SQL fragments accumulate here (typically
//! from a `ctor` hook emitted by `sqlweave_macros::mapper_assets!`)
//! before a [`SessionFactory`](crate::session_factory::SessionFactory) is
//! built. `freeze` turns the mutable store into an immutable,
//! cross-reference-checked [`FrozenRegistry`].

pub mod cache_config;
pub mod mapped_statement;
pub mod result_map;
pub mod xml;

use crate::error::SqlweaveError;
use crate::sql::ast::Node;
use crate::sql::Fragments;
use cache_config::CacheConfig;
use dashmap::DashMap;
use mapped_statement::MappedStatement;
use result_map::ResultMap;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

#[derive(Default)]
pub struct Registry {
    statements: DashMap<String, Arc<MappedStatement>>,
    result_maps: DashMap<String, Arc<ResultMap>>,
    fragments: DashMap<String, Vec<Node>>,
    caches: DashMap<String, CacheConfig>,
}

static REGISTRY: OnceLock<Registry> = OnceLock::new();

impl Registry {
    pub fn global() -> &'static Registry {
        REGISTRY.get_or_init(Registry::default)
    }

    pub fn register_statement(&self, stmt: MappedStatement) -> Result<(), SqlweaveError> {
        if self.statements.contains_key(&stmt.id) {
            return Err(SqlweaveError::Configuration(format!(
                "duplicate mapped statement id '{}'",
                stmt.id
            )));
        }
        self.statements.insert(stmt.id.clone(), Arc::new(stmt));
        Ok(())
    }

    pub fn register_result_map(&self, rm: ResultMap) -> Result<(), SqlweaveError> {
        if self.result_maps.contains_key(&rm.id) {
            return Err(SqlweaveError::Configuration(format!(
                "duplicate result map id '{}'",
                rm.id
            )));
        }
        self.result_maps.insert(rm.id.clone(), Arc::new(rm));
        Ok(())
    }

    pub fn register_fragment(&self, id: String, body: Vec<Node>) {
        self.fragments.insert(id, body);
    }

    pub fn register_cache(&self, cfg: CacheConfig) {
        self.caches.insert(cfg.namespace.clone(), cfg);
    }

    pub fn statement(&self, id: &str) -> Option<Arc<MappedStatement>> {
        self.statements.get(id).map(|e| e.clone())
    }

    pub fn result_map(&self, id: &str) -> Option<Arc<ResultMap>> {
        self.result_maps.get(id).map(|e| e.clone())
    }

    pub fn cache_config(&self, namespace: &str) -> Option<CacheConfig> {
        self.caches.get(namespace).map(|e| e.clone())
    }

    fn fragments_snapshot(&self) -> Fragments {
        self.fragments.iter().map(|e| (e.key().clone(), e.value().clone())).collect()
    }

    /// Resolves `extends` chains, checks every discriminator branch and
    /// nested mapping target, and checks every statement's `resultMap`
    /// and cache-namespace references. Produces `Configuration` errors
    /// for anything still unresolved — the loading phase tolerates
    /// forward references across files, freezing does not.
    pub fn freeze(&self) -> Result<FrozenRegistry, SqlweaveError> {
        let raw: HashMap<String, ResultMap> = self
            .result_maps
            .iter()
            .map(|e| (e.key().clone(), e.value().as_ref().clone()))
            .collect();

        let mut resolved = HashMap::new();
        for (id, rm) in &raw {
            resolved.insert(id.clone(), rm.resolve(&raw)?);
        }

        for rm in resolved.values() {
            if let Some(disc) = &rm.discriminator {
                for target in disc.cases.values() {
                    if !resolved.contains_key(target) {
                        return Err(SqlweaveError::Configuration(format!(
                            "result map '{}' discriminator references unknown result map '{}'",
                            rm.id, target
                        )));
                    }
                }
            }
            for mapping in &rm.mappings {
                if let Some(nested) = &mapping.nested_result_map_id {
                    if !resolved.contains_key(nested) {
                        return Err(SqlweaveError::Configuration(format!(
                            "result map '{}': property '{}' references unknown nested result map '{}'",
                            rm.id, mapping.property, nested
                        )));
                    }
                }
            }
        }

        let statements: HashMap<String, Arc<MappedStatement>> = self
            .statements
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();

        for stmt in statements.values() {
            for rm_id in &stmt.result_map_ids {
                if !resolved.contains_key(rm_id) {
                    return Err(SqlweaveError::Configuration(format!(
                        "mapped statement '{}' references unknown result map '{}'",
                        stmt.id, rm_id
                    )));
                }
            }
            if let Some(ns) = &stmt.cache_namespace {
                if self.cache_config(ns).is_none() {
                    return Err(SqlweaveError::Configuration(format!(
                        "mapped statement '{}' references unknown cache namespace '{}'",
                        stmt.id, ns
                    )));
                }
            }
        }

        Ok(FrozenRegistry {
            statements,
            result_maps: resolved.into_iter().map(|(k, v)| (k, Arc::new(v))).collect(),
            fragments: self.fragments_snapshot(),
            caches: self.caches.iter().map(|e| (e.key().clone(), e.value().clone())).collect(),
        })
    }
}

/// Validated, immutable view of a [`Registry`] produced by `freeze`.
#[derive(Clone)]
pub struct FrozenRegistry {
    pub statements: HashMap<String, Arc<MappedStatement>>,
    pub result_maps: HashMap<String, Arc<ResultMap>>,
    pub fragments: Fragments,
    pub caches: HashMap<String, CacheConfig>,
}

impl FrozenRegistry {
    pub fn statement(&self, id: &str) -> Result<Arc<MappedStatement>, SqlweaveError> {
        self.statements
            .get(id)
            .cloned()
            .ok_or_else(|| SqlweaveError::Binding(format!("no mapped statement registered for id '{id}'")))
    }

    pub fn result_map(&self, id: &str) -> Result<Arc<ResultMap>, SqlweaveError> {
        self.result_maps
            .get(id)
            .cloned()
            .ok_or_else(|| SqlweaveError::Configuration(format!("no result map registered for id '{id}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::mapped_statement::Command;

    #[test]
    fn freeze_rejects_unresolved_result_map_reference() {
        let registry = Registry::default();
        let mut stmt = MappedStatement::new("t.find", Command::Select, crate::sql::parser::parse("select 1"));
        stmt.result_map_ids.push("t.missing".to_string());
        registry.register_statement(stmt).unwrap();
        assert!(registry.freeze().is_err());
    }

    #[test]
    fn freeze_succeeds_when_references_resolve() {
        let registry = Registry::default();
        let rm = ResultMap::new("t.row", "Row");
        registry.register_result_map(rm).unwrap();
        let mut stmt = MappedStatement::new("t.find", Command::Select, crate::sql::parser::parse("select 1"));
        stmt.result_map_ids.push("t.row".to_string());
        registry.register_statement(stmt).unwrap();
        let frozen = registry.freeze().unwrap();
        assert!(frozen.statement("t.find").is_ok());
    }
}
