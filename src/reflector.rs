//! Property-expression resolution over the engine's generic `Value` tree.
//!
//! The source engine this design is modeled on caches per-type reflective
//! accessor tables. Since every parameter object and result row here is
//! already normalized to a `Value::Map`/`Value::List` tree (via `ToValue` /
//! `TableRow`), "reflection" reduces to walking that tree by a parsed
//! property path — no per-type accessor cache is needed, only the path
//! parser below.

use crate::error::SqlweaveError;
use crate::value::Value;

/// One segment of a dotted/indexed property expression: `user.addresses[0].city`.
#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Field(String),
    Index(usize),
}

/// A parsed property expression, ready for repeated resolution against
/// different parameter objects.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyPath {
    segments: Vec<Segment>,
}

impl PropertyPath {
    pub fn parse(expr: &str) -> Result<Self, SqlweaveError> {
        let mut segments = Vec::new();
        let mut chars = expr.char_indices().peekable();
        let mut current = String::new();

        let flush = |current: &mut String, segments: &mut Vec<Segment>| {
            if !current.is_empty() {
                segments.push(Segment::Field(std::mem::take(current)));
            }
        };

        while let Some((_, c)) = chars.next() {
            match c {
                '.' => flush(&mut current, &mut segments),
                '[' => {
                    flush(&mut current, &mut segments);
                    let mut index = String::new();
                    for (_, c2) in chars.by_ref() {
                        if c2 == ']' {
                            break;
                        }
                        index.push(c2);
                    }
                    let idx: usize = index.trim().parse().map_err(|_| {
                        SqlweaveError::Binding(format!(
                            "invalid index '{}' in property expression '{}'",
                            index, expr
                        ))
                    })?;
                    segments.push(Segment::Index(idx));
                }
                _ => current.push(c),
            }
        }
        flush(&mut current, &mut segments);

        if segments.is_empty() {
            return Err(SqlweaveError::Binding(format!(
                "empty property expression '{}'",
                expr
            )));
        }
        Ok(PropertyPath { segments })
    }

    pub fn resolve<'a>(&self, root: &'a Value) -> Result<&'a Value, SqlweaveError> {
        let mut current = root;
        for segment in &self.segments {
            current = match (segment, current) {
                (Segment::Field(name), Value::Map(map)) => map.get(name).ok_or_else(|| {
                    SqlweaveError::Binding(format!("no such property '{}'", name))
                })?,
                (Segment::Index(i), Value::List(list)) => list.get(*i).ok_or_else(|| {
                    SqlweaveError::Binding(format!("index {} out of bounds", i))
                })?,
                (Segment::Field(name), _) => {
                    return Err(SqlweaveError::Binding(format!(
                        "cannot resolve field '{}' on a non-map value",
                        name
                    )));
                }
                (Segment::Index(i), _) => {
                    return Err(SqlweaveError::Binding(format!(
                        "cannot index [{}] into a non-list value",
                        i
                    )));
                }
            };
        }
        Ok(current)
    }
}

/// Resolves a dotted/indexed expression (`a.b[0].c`) against a `Value` tree
/// in one shot. Prefer `PropertyPath::parse` + `resolve` when the same
/// expression is evaluated repeatedly (e.g. once per row).
pub fn resolve(root: &Value, expr: &str) -> Result<Value, SqlweaveError> {
    PropertyPath::parse(expr)?.resolve(root).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn user() -> Value {
        let mut address = HashMap::new();
        address.insert("city".to_string(), Value::Str("Springfield".to_string()));
        let mut user = HashMap::new();
        user.insert(
            "addresses".to_string(),
            Value::List(vec![Value::Map(address)]),
        );
        Value::Map(user)
    }

    #[test]
    fn resolves_dotted_indexed_path() {
        let v = resolve(&user(), "addresses[0].city").unwrap();
        assert_eq!(v, Value::Str("Springfield".to_string()));
    }

    #[test]
    fn missing_field_is_a_binding_error() {
        let err = resolve(&user(), "addresses[0].zip").unwrap_err();
        assert!(matches!(err, SqlweaveError::Binding(_)));
    }
}
