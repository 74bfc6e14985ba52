//! Turns raw rows into the record graph a [`ResultMap`] describes:
//! discriminator dispatch to a fixed point, `columnPrefix`/alias
//! handling, and row-keyed deduplication (collecting into a list for
//! one-to-many `<collection>` mappings) for nested `resultMap` mappings
//! mapped from a join.
//!
//! Nested *queries* (`select="..."`) are reported back to the caller as
//! [`PendingNestedQuery`] entries rather than resolved here: only the
//! executor has a session to run another statement through. A `lazy`
//! mapping skips that queue entirely and is spliced in as a
//! [`crate::lazy`] sentinel instead, so it is never run until something
//! actually reads the property.

use crate::error::SqlweaveError;
use crate::registry::result_map::{ResultMap, ResultMapping};
use crate::registry::FrozenRegistry;
use crate::value::Value;
use std::collections::HashMap;

/// A nested query a caller still needs to run and splice back in at
/// `property`.
#[derive(Debug, Clone)]
pub struct PendingNestedQuery {
    pub property: String,
    pub statement_id: String,
    pub parameter: Value,
    pub is_collection: bool,
}

/// One mapped row, plus whatever nested queries it still needs.
#[derive(Debug, Clone)]
pub struct MappedRow {
    pub value: Value,
    pub pending: Vec<PendingNestedQuery>,
}

fn prefixed(column: &str, prefix: &Option<String>) -> String {
    match prefix {
        Some(p) => format!("{p}{column}"),
        None => column.to_string(),
    }
}

fn column_value(row: &HashMap<String, Value>, column: &str) -> Value {
    row.iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(column))
        .map(|(_, v)| v.clone())
        .unwrap_or(Value::Null)
}

/// Resolves the discriminator chain to a fixed point, returning the
/// final `ResultMap` that should actually drive this row's mapping. An
/// unmapped discriminator value is not an error: the chain simply stops
/// and the enclosing map (the last one resolved) is used as-is.
fn resolve_discriminated(
    result_map: &ResultMap,
    row: &HashMap<String, Value>,
    registry: &FrozenRegistry,
) -> Result<ResultMap, SqlweaveError> {
    let mut current = result_map.clone();
    let mut seen = std::collections::HashSet::new();
    while let Some(discriminator) = current.discriminator.clone() {
        if !seen.insert(current.id.clone()) {
            return Err(SqlweaveError::Mapping(format!(
                "result map '{}' discriminator cycle",
                current.id
            )));
        }
        let actual = column_value(row, &discriminator.column).to_display_string();
        match discriminator.cases.get(&actual) {
            Some(target_id) => {
                current = registry.result_map(target_id)?.as_ref().clone();
            }
            None => break,
        }
    }
    Ok(current)
}

/// Groups consecutive rows that share the same key, as produced by
/// `key_of`. Rows are expected to arrive already ordered by that key (the
/// flattened-join assumption MyBatis-style result maps rely on).
fn group_consecutive_by<'a>(
    rows: &[&'a HashMap<String, Value>],
    key_of: impl Fn(usize, &HashMap<String, Value>) -> Vec<Value>,
) -> Vec<Vec<&'a HashMap<String, Value>>> {
    let mut groups: Vec<Vec<&HashMap<String, Value>>> = Vec::new();
    let mut last_key: Option<Vec<Value>> = None;
    for (idx, &row) in rows.iter().enumerate() {
        let key = key_of(idx, row);
        if last_key.as_ref() == Some(&key) {
            groups.last_mut().expect("a key was already seen").push(row);
        } else {
            groups.push(vec![row]);
            last_key = Some(key);
        }
    }
    groups
}

/// Row key used to fold multiple flattened join rows that describe the
/// same logical record (driven by the result map's `<id>` mappings).
fn row_key(result_map: &ResultMap, row: &HashMap<String, Value>, column_prefix: &Option<String>) -> Vec<Value> {
    result_map
        .id_mappings()
        .filter_map(|m| m.column.as_deref())
        .map(|c| column_value(row, &prefixed(c, column_prefix)))
        .collect()
}

/// Sub-groups a parent's joined rows by a nested result map's own `<id>`
/// key, deduplicating repeated child rows. A nested map with no identity
/// mappings can't be deduplicated, so every row becomes its own item.
fn group_nested<'a>(
    nested_map: &ResultMap,
    group: &[&'a HashMap<String, Value>],
    registry: &FrozenRegistry,
    column_prefix: &Option<String>,
) -> Result<Vec<Vec<&'a HashMap<String, Value>>>, SqlweaveError> {
    if nested_map.id_mappings().next().is_none() {
        return Ok(group.iter().map(|&r| vec![r]).collect());
    }
    let mut targets = Vec::with_capacity(group.len());
    for &row in group {
        targets.push(resolve_discriminated(nested_map, row, registry)?);
    }
    Ok(group_consecutive_by(group, |idx, row| row_key(&targets[idx], row, column_prefix)))
}

fn map_mapping(
    mapping: &ResultMapping,
    group: &[&HashMap<String, Value>],
    registry: &FrozenRegistry,
    pending: &mut Vec<PendingNestedQuery>,
) -> Result<Value, SqlweaveError> {
    let primary = group[0];

    if let Some(nested_id) = &mapping.nested_query_id {
        let param_column = mapping.column.as_deref().ok_or_else(|| {
            SqlweaveError::Configuration(format!(
                "property '{}' declares a nested query but no column to feed it",
                mapping.property
            ))
        })?;
        let parameter = column_value(primary, param_column);
        if mapping.lazy {
            return Ok(crate::lazy::sentinel(nested_id, parameter, mapping.is_collection));
        }
        pending.push(PendingNestedQuery {
            property: mapping.property.clone(),
            statement_id: nested_id.clone(),
            parameter,
            is_collection: mapping.is_collection,
        });
        return Ok(Value::Null);
    }

    if let Some(nested_map_id) = &mapping.nested_result_map_id {
        let nested_map = registry.result_map(nested_map_id)?;
        if mapping.is_collection {
            let sub_groups = group_nested(&nested_map, group, registry, &mapping.column_prefix)?;
            let mut items = Vec::with_capacity(sub_groups.len());
            for sub_group in &sub_groups {
                let target = resolve_discriminated(&nested_map, sub_group[0], registry)?;
                items.push(map_row_with(&target, sub_group, registry, &mapping.column_prefix, pending)?);
            }
            return Ok(Value::List(items));
        }
        let target = resolve_discriminated(&nested_map, primary, registry)?;
        return map_row_with(&target, &group[..1], registry, &mapping.column_prefix, pending);
    }

    let column = mapping
        .column
        .as_deref()
        .ok_or_else(|| SqlweaveError::Configuration(format!("property '{}' has no column", mapping.property)))?;
    Ok(column_value(primary, &prefixed(column, &mapping.column_prefix)))
}

fn map_row_with(
    result_map: &ResultMap,
    group: &[&HashMap<String, Value>],
    registry: &FrozenRegistry,
    column_prefix: &Option<String>,
    pending: &mut Vec<PendingNestedQuery>,
) -> Result<Value, SqlweaveError> {
    let primary = group[0];
    let mut fields = HashMap::new();
    for mapping in &result_map.mappings {
        for not_null in &mapping.not_null_columns {
            if column_value(primary, &prefixed(not_null, column_prefix)).is_null() {
                return Err(SqlweaveError::Mapping(format!(
                    "result map '{}': required column '{}' was null",
                    result_map.id, not_null
                )));
            }
        }
        let sub_prefix = match (&mapping.column_prefix, column_prefix) {
            (Some(inner), Some(outer)) => Some(format!("{outer}{inner}")),
            (Some(inner), None) => Some(inner.clone()),
            (None, outer) => outer.clone(),
        };
        let value = map_mapping(
            &ResultMapping {
                column_prefix: sub_prefix,
                ..mapping.clone()
            },
            group,
            registry,
            pending,
        )?;
        fields.insert(mapping.property.clone(), value);
    }

    if result_map.auto_map {
        for (column, value) in primary {
            let property = column.to_lowercase();
            fields.entry(property).or_insert_with(|| value.clone());
        }
    }

    Ok(Value::Map(fields))
}

/// Maps every row, grouping consecutive rows that share the same
/// `<id>`-derived key into a single logical record when the result map
/// carries at least one `<id>` mapping (the flattened-join case). Any
/// `<collection resultMap="...">` property collects its own group of
/// consecutive child rows, deduplicated by the nested map's identity key,
/// into a `Value::List` rather than a single `Value::Map`.
pub fn map_rows(
    rows: Vec<HashMap<String, Value>>,
    result_map: &ResultMap,
    registry: &FrozenRegistry,
) -> Result<Vec<MappedRow>, SqlweaveError> {
    let has_identity = result_map.id_mappings().next().is_some();
    let refs: Vec<&HashMap<String, Value>> = rows.iter().collect();

    if !has_identity {
        return refs
            .iter()
            .map(|&row| {
                let target = resolve_discriminated(result_map, row, registry)?;
                let mut pending = Vec::new();
                let value = map_row_with(&target, &[row], registry, &None, &mut pending)?;
                Ok(MappedRow { value, pending })
            })
            .collect();
    }

    let mut targets = Vec::with_capacity(refs.len());
    for &row in &refs {
        targets.push(resolve_discriminated(result_map, row, registry)?);
    }

    let groups = group_consecutive_by(&refs, |idx, row| row_key(&targets[idx], row, &None));

    let mut out = Vec::with_capacity(groups.len());
    let mut group_start = 0;
    for group in groups {
        let target = &targets[group_start];
        group_start += group.len();
        let mut pending = Vec::new();
        let value = map_row_with(target, &group, registry, &None, &mut pending)?;
        out.push(MappedRow { value, pending });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::result_map::ResultMapping;
    use crate::registry::Registry;

    fn row(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn maps_plain_columns() {
        let registry = Registry::default();
        let mut rm = ResultMap::new("t.user", "User");
        rm.mappings.push(ResultMapping::column("id", "id"));
        rm.mappings.push(ResultMapping::column("name", "name"));
        let frozen = freeze_with(&registry, vec![rm.clone()]);

        let rows = vec![row(&[("id", Value::I64(1)), ("name", Value::Str("ada".into()))])];
        let mapped = map_rows(rows, &rm, &frozen).unwrap();
        assert_eq!(mapped.len(), 1);
        let map = mapped[0].value.as_map().unwrap();
        assert_eq!(map.get("name"), Some(&Value::Str("ada".into())));
    }

    #[test]
    fn folds_joined_rows_sharing_an_identity() {
        let registry = Registry::default();
        let mut rm = ResultMap::new("t.user", "User");
        let mut id_mapping = ResultMapping::column("id", "id");
        id_mapping.is_id = true;
        rm.mappings.push(id_mapping);
        rm.mappings.push(ResultMapping::column("name", "name"));
        let frozen = freeze_with(&registry, vec![rm.clone()]);

        let rows = vec![
            row(&[("id", Value::I64(1)), ("name", Value::Str("ada".into()))]),
            row(&[("id", Value::I64(1)), ("name", Value::Str("ada".into()))]),
            row(&[("id", Value::I64(2)), ("name", Value::Str("babbage".into()))]),
        ];
        let mapped = map_rows(rows, &rm, &frozen).unwrap();
        assert_eq!(mapped.len(), 2);
    }

    #[test]
    fn nested_query_column_becomes_a_pending_fetch() {
        let registry = Registry::default();
        let mut rm = ResultMap::new("t.user", "User");
        rm.mappings.push(ResultMapping::column("id", "id"));
        rm.mappings.push(ResultMapping {
            property: "accounts".into(),
            column: Some("id".into()),
            nested_query_id: Some("t.findAccountsByUserId".into()),
            is_collection: true,
            ..Default::default()
        });
        let frozen = freeze_with(&registry, vec![rm.clone()]);

        let rows = vec![row(&[("id", Value::I64(1))])];
        let mapped = map_rows(rows, &rm, &frozen).unwrap();
        assert_eq!(mapped[0].pending.len(), 1);
        assert_eq!(mapped[0].pending[0].statement_id, "t.findAccountsByUserId");
        assert!(mapped[0].pending[0].is_collection);
    }

    #[test]
    fn lazy_nested_query_is_spliced_as_a_sentinel_instead_of_queued() {
        let registry = Registry::default();
        let mut rm = ResultMap::new("t.user", "User");
        rm.mappings.push(ResultMapping::column("id", "id"));
        rm.mappings.push(ResultMapping {
            property: "accounts".into(),
            column: Some("id".into()),
            nested_query_id: Some("t.findAccountsByUserId".into()),
            is_collection: true,
            lazy: true,
            ..Default::default()
        });
        let frozen = freeze_with(&registry, vec![rm.clone()]);

        let rows = vec![row(&[("id", Value::I64(1))])];
        let mapped = map_rows(rows, &rm, &frozen).unwrap();
        assert!(mapped[0].pending.is_empty(), "a lazy mapping must not be queued for eager resolution");
        let fields = mapped[0].value.as_map().unwrap();
        let deferred = crate::lazy::Lazy::<Value>::from_value(fields.get("accounts").unwrap().clone()).unwrap();
        assert!(!deferred.is_loaded());
    }

    #[test]
    fn discriminator_falls_back_to_the_enclosing_map_for_an_unmapped_value() {
        let registry = Registry::default();
        let mut male = ResultMap::new("t.male", "MaleReport");
        male.mappings.push(ResultMapping::column("id", "id"));
        let mut base = ResultMap::new("t.base", "Report");
        base.mappings.push(ResultMapping::column("id", "id"));
        base.mappings.push(ResultMapping::column("sex", "sex"));
        base.discriminator = Some(crate::registry::result_map::Discriminator {
            column: "sex".into(),
            cases: [("M".to_string(), "t.male".to_string())].into_iter().collect(),
        });
        let frozen = freeze_with(&registry, vec![male, base.clone()]);

        let rows = vec![row(&[("id", Value::I64(1)), ("sex", Value::Str("X".into()))])];
        let mapped = map_rows(rows, &base, &frozen).unwrap();
        let fields = mapped[0].value.as_map().unwrap();
        assert_eq!(fields.get("sex"), Some(&Value::Str("X".into())));
    }

    #[test]
    fn one_to_many_collection_deduplicates_and_groups_child_rows() {
        let registry = Registry::default();
        let mut account_map = ResultMap::new("t.account", "Account");
        let mut account_id = ResultMapping::column("id", "account_id");
        account_id.is_id = true;
        account_map.mappings.push(account_id);
        account_map.mappings.push(ResultMapping::column("balance", "balance"));

        let mut user_map = ResultMap::new("t.user", "User");
        let mut user_id = ResultMapping::column("id", "id");
        user_id.is_id = true;
        user_map.mappings.push(user_id);
        user_map.mappings.push(ResultMapping::column("name", "name"));
        user_map.mappings.push(ResultMapping {
            property: "accounts".into(),
            nested_result_map_id: Some("t.account".into()),
            is_collection: true,
            ..Default::default()
        });
        let frozen = freeze_with(&registry, vec![account_map, user_map.clone()]);

        let rows = vec![
            row(&[
                ("id", Value::I64(1)),
                ("name", Value::Str("ada".into())),
                ("account_id", Value::I64(9)),
                ("balance", Value::I64(100)),
            ]),
            row(&[
                ("id", Value::I64(1)),
                ("name", Value::Str("ada".into())),
                ("account_id", Value::I64(9)),
                ("balance", Value::I64(100)),
            ]),
            row(&[
                ("id", Value::I64(1)),
                ("name", Value::Str("ada".into())),
                ("account_id", Value::I64(10)),
                ("balance", Value::I64(50)),
            ]),
            row(&[
                ("id", Value::I64(2)),
                ("name", Value::Str("babbage".into())),
                ("account_id", Value::I64(11)),
                ("balance", Value::I64(0)),
            ]),
        ];

        let mapped = map_rows(rows, &user_map, &frozen).unwrap();
        assert_eq!(mapped.len(), 2, "two distinct users");

        let ada = mapped[0].value.as_map().unwrap();
        let accounts = ada.get("accounts").unwrap().as_list().unwrap();
        assert_eq!(accounts.len(), 2, "the repeated account_id=9 row must be deduplicated");

        let babbage = mapped[1].value.as_map().unwrap();
        let babbage_accounts = babbage.get("accounts").unwrap().as_list().unwrap();
        assert_eq!(babbage_accounts.len(), 1);
    }

    fn freeze_with(registry: &Registry, maps: Vec<ResultMap>) -> FrozenRegistry {
        for rm in maps {
            registry.register_result_map(rm).unwrap();
        }
        registry.freeze().unwrap()
    }
}
