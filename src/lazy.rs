//! Deferred nested-query loading.
//!
//! A `fetchType="lazy"` mapping is never run while a row is being mapped:
//! [`crate::handler::result_set_handler`] drops a small sentinel
//! [`Value::Map`] under the property instead of queuing a fetch, and
//! [`Lazy::get`] turns that sentinel into the real query the first (and
//! only the first) time the property is actually read. This is the
//! "consulted by accessors" side-table option rather than a dynamic proxy:
//! there is no bytecode generation here, just an enum the caller matches on.

use crate::error::SqlweaveError;
use crate::session::Session;
use crate::value::{FromValue, Value};
use std::collections::HashMap;

const SENTINEL_STATEMENT: &str = "__sqlweave_lazy_statement";
const SENTINEL_PARAMETER: &str = "__sqlweave_lazy_parameter";
const SENTINEL_COLLECTION: &str = "__sqlweave_lazy_collection";

/// What a not-yet-loaded [`Lazy`] property needs to run its own query.
#[derive(Debug, Clone)]
pub struct Deferred {
    pub statement_id: String,
    pub parameter: Value,
    pub is_collection: bool,
}

/// Builds the sentinel value the result-set handler splices in place of a
/// lazy mapping's usual eager result.
pub(crate) fn sentinel(statement_id: &str, parameter: Value, is_collection: bool) -> Value {
    let mut map = HashMap::with_capacity(3);
    map.insert(SENTINEL_STATEMENT.to_string(), Value::Str(statement_id.to_string()));
    map.insert(SENTINEL_PARAMETER.to_string(), parameter);
    map.insert(SENTINEL_COLLECTION.to_string(), Value::Bool(is_collection));
    Value::Map(map)
}

fn as_deferred(v: &Value) -> Option<Deferred> {
    let map = v.as_map()?;
    let statement_id = match map.get(SENTINEL_STATEMENT)? {
        Value::Str(s) => s.clone(),
        _ => return None,
    };
    let parameter = map.get(SENTINEL_PARAMETER)?.clone();
    let is_collection = matches!(map.get(SENTINEL_COLLECTION), Some(Value::Bool(true)));
    Some(Deferred { statement_id, parameter, is_collection })
}

/// A property that may still need its nested query run. Resolves exactly
/// once: after the first successful [`Lazy::get`] the value is cached in
/// place and later calls never touch the session again.
#[derive(Debug, Clone)]
pub enum Lazy<T> {
    Loaded(T),
    Deferred(Deferred),
}

impl<T: FromValue> Lazy<T> {
    /// Runs the nested query on first access; returns the cached value on
    /// every subsequent call without issuing another query.
    pub async fn get(&mut self, session: &mut Session) -> Result<&T, SqlweaveError> {
        if let Lazy::Deferred(deferred) = self {
            let value = session.resolve_lazy(deferred).await?;
            *self = Lazy::Loaded(T::from_value(value)?);
        }
        match self {
            Lazy::Loaded(v) => Ok(v),
            Lazy::Deferred(_) => unreachable!("resolved above"),
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, Lazy::Loaded(_))
    }
}

impl<T: FromValue> FromValue for Lazy<T> {
    fn from_value(v: Value) -> Result<Self, SqlweaveError> {
        match as_deferred(&v) {
            Some(deferred) => Ok(Lazy::Deferred(deferred)),
            None => Ok(Lazy::Loaded(T::from_value(v)?)),
        }
    }
}
