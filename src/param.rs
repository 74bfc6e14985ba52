//! Parameter assembly: turns whatever the caller passed into a
//! single `Value` that dotted property expressions resolve against.
//!
//! Operations generated by `#[sqlweave::mapper]` always build a name-keyed
//! struct (one field per declared argument) before calling into the
//! session, which already satisfies rule 3 below. This module implements
//! the general algorithm so `Session::select_one` and friends behave
//! correctly when called directly with a bare scalar, a single record, or a
//! collection, not just through a generated mapper proxy.

use crate::value::{ToValue, Value};
use std::collections::HashMap;

/// Reserved keys synthesized for collection/array parameters (rule 4).
pub const COLLECTION_KEY: &str = "collection";
pub const LIST_KEY: &str = "list";
pub const ARRAY_KEY: &str = "array";

/// Builds the context a dynamic SQL tree and its `#{}`/`${}` expressions
/// evaluate against, following four fixed normalization rules.
///
/// * `Value::Null` (no parameters) becomes an empty map — rule 1.
/// * A struct/map parameter (the common case: a generated mapper-arg struct,
///   or a `#[derive(TableRow)]` record) is used as-is — it is already
///   name-keyed, satisfying rule 3.
/// * A bare list is wrapped under `collection`/`list` (rule 4); the list
///   itself is not otherwise addressable by name.
/// * Anything else (a lone scalar, e.g. `select_one("findUserById", &41i64)`)
///   passes through as `parameterObject` verbatim — property expressions
///   resolve directly against it, matching rule 2.
pub fn build_context<T: ToValue + ?Sized>(params: &T) -> Value {
    normalize(params.to_value())
}

/// The normalization half of [`build_context`], exposed directly for
/// callers (like [`crate::session::Session`]) that already produced a
/// `Value` via `serde::Serialize` rather than [`ToValue`].
pub fn normalize(v: Value) -> Value {
    match v {
        Value::Null => Value::Map(HashMap::new()),
        Value::Map(_) => v,
        Value::List(items) => {
            let mut map = HashMap::new();
            map.insert(COLLECTION_KEY.to_string(), Value::List(items.clone()));
            map.insert(LIST_KEY.to_string(), Value::List(items));
            Value::Map(map)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_params_is_an_empty_map() {
        let ctx = build_context(&Value::Null);
        assert_eq!(ctx, Value::Map(HashMap::new()));
    }

    #[test]
    fn scalar_passes_through() {
        let ctx = build_context(&41i64);
        assert_eq!(ctx, Value::I64(41));
    }

    #[test]
    fn collection_is_wrapped() {
        let ctx = build_context(&vec![1i64, 2, 3]);
        let map = ctx.as_map().unwrap();
        assert_eq!(
            map.get(COLLECTION_KEY),
            Some(&Value::List(vec![Value::I64(1), Value::I64(2), Value::I64(3)]))
        );
        assert_eq!(map.get(LIST_KEY), map.get(COLLECTION_KEY));
    }

    #[test]
    fn map_passes_through_unwrapped() {
        let mut m = HashMap::new();
        m.insert("id".to_string(), Value::I64(7));
        let ctx = build_context(&Value::Map(m.clone()));
        assert_eq!(ctx, Value::Map(m));
    }
}
