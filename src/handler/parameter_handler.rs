//! Turns a rendered [`BoundSql`](crate::sql::BoundSql) into the
//! `(name, value)` pairs a [`Connection`](crate::udbc::Connection) binds,
//! applying any `jdbcType` hint from a `#{expr,jdbcType=...}` placeholder.

use crate::error::SqlweaveError;
use crate::sql::ast::Node;
use crate::value::Value;
use std::collections::HashMap;

fn jdbc_type_hints(sql: &[Node], hints: &mut HashMap<String, String>) {
    for node in sql {
        match node {
            Node::Param { expr, jdbc_type: Some(t) } => {
                hints.insert(expr.clone(), t.clone());
            }
            Node::If { body, .. } | Node::Where(body) | Node::Set(body) => jdbc_type_hints(body, hints),
            Node::Trim { body, .. } | Node::Foreach { body, .. } => jdbc_type_hints(body, hints),
            Node::Choose { whens, otherwise } => {
                for (_, body) in whens {
                    jdbc_type_hints(body, hints);
                }
                jdbc_type_hints(otherwise, hints);
            }
            _ => {}
        }
    }
}

/// Coerces a bound value to match an explicit `jdbcType` hint (e.g.
/// `#{age,jdbcType=VARCHAR}` on an integer property). Values that
/// already match, or that have no hint, pass through unchanged.
fn coerce(value: Value, jdbc_type: &str) -> Result<Value, SqlweaveError> {
    match (jdbc_type.to_ascii_uppercase().as_str(), &value) {
        (_, Value::Null) => Ok(Value::Null),
        ("VARCHAR" | "CHAR" | "TEXT" | "NVARCHAR", Value::Str(_)) => Ok(value),
        ("VARCHAR" | "CHAR" | "TEXT" | "NVARCHAR", other) => Ok(Value::Str(other.to_display_string())),
        ("INTEGER" | "BIGINT" | "SMALLINT" | "TINYINT", Value::I64(_)) => Ok(value),
        ("INTEGER" | "BIGINT" | "SMALLINT" | "TINYINT", other) => {
            let text = other.to_display_string();
            text.parse::<i64>()
                .map(Value::I64)
                .map_err(|_| SqlweaveError::Binding(format!("cannot coerce '{text}' to jdbcType {jdbc_type}")))
        }
        ("DECIMAL" | "NUMERIC", Value::Decimal(_)) => Ok(value),
        ("DECIMAL" | "NUMERIC", other) => {
            let text = other.to_display_string();
            text.parse()
                .map(Value::Decimal)
                .map_err(|_| SqlweaveError::Binding(format!("cannot coerce '{text}' to jdbcType {jdbc_type}")))
        }
        _ => Ok(value),
    }
}

/// Applies `jdbcType` coercions declared on the statement's `#{}`
/// placeholders to the rendered bindings, in order.
pub fn prepare_bindings(sql: &[Node], bindings: Vec<(String, Value)>) -> Result<Vec<(String, Value)>, SqlweaveError> {
    let mut hints = HashMap::new();
    jdbc_type_hints(sql, &mut hints);
    if hints.is_empty() {
        return Ok(bindings);
    }
    bindings
        .into_iter()
        .map(|(name, value)| match hints.get(&name) {
            Some(jdbc_type) => coerce(value, jdbc_type).map(|v| (name, v)),
            None => Ok((name, value)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::parser;

    #[test]
    fn coerces_string_parameter_to_integer() {
        let sql = parser::parse("select * from t where id = #{id,jdbcType=INTEGER}");
        let out = prepare_bindings(&sql, vec![("id".to_string(), Value::Str("42".to_string()))]).unwrap();
        assert_eq!(out, vec![("id".to_string(), Value::I64(42))]);
    }

    #[test]
    fn passes_through_bindings_with_no_hint() {
        let sql = parser::parse("select * from t where id = #{id}");
        let out = prepare_bindings(&sql, vec![("id".to_string(), Value::I32(9))]).unwrap();
        assert_eq!(out, vec![("id".to_string(), Value::I32(9))]);
    }
}
