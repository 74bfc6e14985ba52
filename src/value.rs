//! Generic value type bridging native Rust values, driver column values, and
//! the row maps the result-set handler builds.

use crate::error::SqlweaveError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde::ser::{self, *};
use std::collections::HashMap;

/// A database-compatible value. Acts as the intermediate representation
/// between native Rust types, bound parameters, and driver column values.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    I128(i128),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    U128(u128),
    F32(f32),
    F64(f64),
    Char(char),
    Str(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    DateTimeUtc(DateTime<Utc>),
    Decimal(Decimal),
    List(Vec<Value>),
    Map(HashMap<String, Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_map(&self) -> Option<&HashMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Renders the value as a string for use as a discriminator or map key,
    /// without the type information a `Debug` impl would add.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::I8(v) => v.to_string(),
            Value::I16(v) => v.to_string(),
            Value::I32(v) => v.to_string(),
            Value::I64(v) => v.to_string(),
            Value::I128(v) => v.to_string(),
            Value::U8(v) => v.to_string(),
            Value::U16(v) => v.to_string(),
            Value::U32(v) => v.to_string(),
            Value::U64(v) => v.to_string(),
            Value::U128(v) => v.to_string(),
            Value::F32(v) => v.to_string(),
            Value::F64(v) => v.to_string(),
            Value::Char(v) => v.to_string(),
            Value::Str(v) => v.clone(),
            Value::Bytes(v) => String::from_utf8_lossy(v).into_owned(),
            Value::Date(v) => v.to_string(),
            Value::Time(v) => v.to_string(),
            Value::DateTime(v) => v.to_string(),
            Value::DateTimeUtc(v) => v.to_rfc3339(),
            Value::Decimal(v) => v.to_string(),
            Value::List(_) | Value::Map(_) => format!("{:?}", self),
        }
    }
}

macro_rules! from_impl {
    ($ty:ty, $variant:ident) => {
        impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::$variant(v)
            }
        }
    };
}

from_impl!(bool, Bool);
from_impl!(i8, I8);
from_impl!(i16, I16);
from_impl!(i32, I32);
from_impl!(i64, I64);
from_impl!(i128, I128);
from_impl!(u8, U8);
from_impl!(u16, U16);
from_impl!(u32, U32);
from_impl!(u64, U64);
from_impl!(u128, U128);
from_impl!(f32, F32);
from_impl!(f64, F64);
from_impl!(char, Char);
from_impl!(String, Str);
from_impl!(Vec<u8>, Bytes);
from_impl!(NaiveDate, Date);
from_impl!(NaiveTime, Time);
from_impl!(NaiveDateTime, DateTime);
from_impl!(Decimal, Decimal);

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

/// Converts a native Rust value into the engine's `Value` representation.
/// Structs implement this via `#[derive(TableRow)]`; everything else is
/// produced generically by serializing through `ValueSerializer`.
pub trait ToValue {
    fn to_value(&self) -> Value;
}

/// Reconstructs a native Rust value from a `Value`, used to materialize
/// result rows (and, for `CALLABLE` statements, OUT parameters) into typed
/// records.
pub trait FromValue: Sized {
    fn from_value(v: Value) -> Result<Self, SqlweaveError>;
}

impl ToValue for Value {
    fn to_value(&self) -> Value {
        self.clone()
    }
}

impl FromValue for Value {
    fn from_value(v: Value) -> Result<Self, SqlweaveError> {
        Ok(v)
    }
}

macro_rules! to_from_value_impl {
    ($ty:ty, $variant:ident) => {
        impl ToValue for $ty {
            fn to_value(&self) -> Value {
                Value::$variant(self.clone())
            }
        }
        impl FromValue for $ty {
            fn from_value(v: Value) -> Result<Self, SqlweaveError> {
                match v {
                    Value::$variant(x) => Ok(x),
                    other => Err(SqlweaveError::Mapping(format!(
                        "expected {}, got {:?}",
                        stringify!($ty),
                        other
                    ))),
                }
            }
        }
    };
}

to_from_value_impl!(bool, Bool);
to_from_value_impl!(i8, I8);
to_from_value_impl!(i16, I16);
to_from_value_impl!(i32, I32);
to_from_value_impl!(i64, I64);
to_from_value_impl!(i128, I128);
to_from_value_impl!(u8, U8);
to_from_value_impl!(u16, U16);
to_from_value_impl!(u32, U32);
to_from_value_impl!(u64, U64);
to_from_value_impl!(u128, U128);
to_from_value_impl!(f32, F32);
to_from_value_impl!(f64, F64);
to_from_value_impl!(char, Char);
to_from_value_impl!(String, Str);
to_from_value_impl!(Vec<u8>, Bytes);
to_from_value_impl!(NaiveDate, Date);
to_from_value_impl!(NaiveTime, Time);
to_from_value_impl!(NaiveDateTime, DateTime);
to_from_value_impl!(Decimal, Decimal);

impl FromValue for () {
    fn from_value(_v: Value) -> Result<Self, SqlweaveError> {
        Ok(())
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(v: Value) -> Result<Self, SqlweaveError> {
        if v.is_null() {
            Ok(None)
        } else {
            Ok(Some(T::from_value(v)?))
        }
    }
}

impl<T: ToValue> ToValue for Vec<T> {
    fn to_value(&self) -> Value {
        Value::List(self.iter().map(ToValue::to_value).collect())
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(v: Value) -> Result<Self, SqlweaveError> {
        match v {
            Value::List(items) => items.into_iter().map(T::from_value).collect(),
            other => Err(SqlweaveError::Mapping(format!(
                "expected a list, got {:?}",
                other
            ))),
        }
    }
}

impl<T: ToValue> ToValue for Option<T> {
    fn to_value(&self) -> Value {
        match self {
            Some(v) => v.to_value(),
            None => Value::Null,
        }
    }
}

/// Serializes any `serde::Serialize` value into a `Value` tree. Used for the
/// synthetic parameter-bag structs the `#[mapper]` macro generates, and as
/// the fallback `ToValue` path for types that don't derive `TableRow`.
pub fn to_value<T: Serialize + ?Sized>(value: &T) -> Result<Value, SqlweaveError> {
    value.serialize(ValueSerializer)
}

pub struct ValueSerializer;

impl Serializer for ValueSerializer {
    type Ok = Value;
    type Error = SqlweaveError;
    type SerializeSeq = ListSerializer;
    type SerializeTuple = ListSerializer;
    type SerializeTupleStruct = ListSerializer;
    type SerializeTupleVariant = ListSerializer;
    type SerializeMap = MapSerializer;
    type SerializeStruct = MapSerializer;
    type SerializeStructVariant = MapSerializer;

    fn serialize_bool(self, v: bool) -> Result<Self::Ok, Self::Error> {
        Ok(Value::Bool(v))
    }
    fn serialize_i8(self, v: i8) -> Result<Self::Ok, Self::Error> {
        Ok(Value::I8(v))
    }
    fn serialize_i16(self, v: i16) -> Result<Self::Ok, Self::Error> {
        Ok(Value::I16(v))
    }
    fn serialize_i32(self, v: i32) -> Result<Self::Ok, Self::Error> {
        Ok(Value::I32(v))
    }
    fn serialize_i64(self, v: i64) -> Result<Self::Ok, Self::Error> {
        Ok(Value::I64(v))
    }
    fn serialize_i128(self, v: i128) -> Result<Self::Ok, Self::Error> {
        Ok(Value::I128(v))
    }
    fn serialize_u8(self, v: u8) -> Result<Self::Ok, Self::Error> {
        Ok(Value::U8(v))
    }
    fn serialize_u16(self, v: u16) -> Result<Self::Ok, Self::Error> {
        Ok(Value::U16(v))
    }
    fn serialize_u32(self, v: u32) -> Result<Self::Ok, Self::Error> {
        Ok(Value::U32(v))
    }
    fn serialize_u64(self, v: u64) -> Result<Self::Ok, Self::Error> {
        Ok(Value::U64(v))
    }
    fn serialize_u128(self, v: u128) -> Result<Self::Ok, Self::Error> {
        Ok(Value::U128(v))
    }
    fn serialize_f32(self, v: f32) -> Result<Self::Ok, Self::Error> {
        Ok(Value::F32(v))
    }
    fn serialize_f64(self, v: f64) -> Result<Self::Ok, Self::Error> {
        Ok(Value::F64(v))
    }
    fn serialize_char(self, v: char) -> Result<Self::Ok, Self::Error> {
        Ok(Value::Char(v))
    }
    fn serialize_str(self, v: &str) -> Result<Self::Ok, Self::Error> {
        Ok(Value::Str(v.to_string()))
    }
    fn serialize_bytes(self, v: &[u8]) -> Result<Self::Ok, Self::Error> {
        Ok(Value::Bytes(v.to_vec()))
    }
    fn serialize_none(self) -> Result<Self::Ok, Self::Error> {
        Ok(Value::Null)
    }
    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Result<Self::Ok, Self::Error> {
        value.serialize(self)
    }
    fn serialize_unit(self) -> Result<Self::Ok, Self::Error> {
        Ok(Value::Null)
    }
    fn serialize_unit_struct(self, _: &'static str) -> Result<Self::Ok, Self::Error> {
        Ok(Value::Null)
    }
    fn serialize_unit_variant(
        self,
        _: &'static str,
        _: u32,
        variant: &'static str,
    ) -> Result<Self::Ok, Self::Error> {
        Ok(Value::Str(variant.to_string()))
    }
    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _: &'static str,
        value: &T,
    ) -> Result<Self::Ok, Self::Error> {
        value.serialize(self)
    }
    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        value: &T,
    ) -> Result<Self::Ok, Self::Error> {
        value.serialize(self)
    }
    fn serialize_seq(self, len: Option<usize>) -> Result<Self::SerializeSeq, Self::Error> {
        Ok(ListSerializer {
            vec: Vec::with_capacity(len.unwrap_or(0)),
        })
    }
    fn serialize_tuple(self, len: usize) -> Result<Self::SerializeTuple, Self::Error> {
        self.serialize_seq(Some(len))
    }
    fn serialize_tuple_struct(
        self,
        _: &'static str,
        len: usize,
    ) -> Result<Self::SerializeTupleStruct, Self::Error> {
        self.serialize_seq(Some(len))
    }
    fn serialize_tuple_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        len: usize,
    ) -> Result<Self::SerializeTupleVariant, Self::Error> {
        self.serialize_seq(Some(len))
    }
    fn serialize_map(self, len: Option<usize>) -> Result<Self::SerializeMap, Self::Error> {
        Ok(MapSerializer {
            map: HashMap::with_capacity(len.unwrap_or(0)),
            key: None,
        })
    }
    fn serialize_struct(
        self,
        _: &'static str,
        len: usize,
    ) -> Result<Self::SerializeStruct, Self::Error> {
        Ok(MapSerializer {
            map: HashMap::with_capacity(len),
            key: None,
        })
    }
    fn serialize_struct_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        len: usize,
    ) -> Result<Self::SerializeStructVariant, Self::Error> {
        Ok(MapSerializer {
            map: HashMap::with_capacity(len),
            key: None,
        })
    }
}

pub struct ListSerializer {
    vec: Vec<Value>,
}

macro_rules! impl_serialize_seq {
    ($trait:ident, $method:ident) => {
        impl $trait for ListSerializer {
            type Ok = Value;
            type Error = SqlweaveError;

            fn $method<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), Self::Error> {
                self.vec.push(value.serialize(ValueSerializer)?);
                Ok(())
            }

            fn end(self) -> Result<Self::Ok, Self::Error> {
                Ok(Value::List(self.vec))
            }
        }
    };
}

impl_serialize_seq!(SerializeSeq, serialize_element);
impl_serialize_seq!(SerializeTuple, serialize_element);
impl_serialize_seq!(SerializeTupleStruct, serialize_field);
impl_serialize_seq!(SerializeTupleVariant, serialize_field);

pub struct MapSerializer {
    pub map: HashMap<String, Value>,
    pub key: Option<String>,
}

impl SerializeMap for MapSerializer {
    type Ok = Value;
    type Error = SqlweaveError;

    fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> Result<(), Self::Error> {
        let k = key.serialize(ValueSerializer)?;
        match k {
            Value::Str(s) => {
                self.key = Some(s);
                Ok(())
            }
            other => Ok(self.key = Some(other.to_display_string())),
        }
    }

    fn serialize_value<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), Self::Error> {
        let v = value.serialize(ValueSerializer)?;
        let key = self
            .key
            .take()
            .ok_or_else(|| ser::Error::custom("missing key for value"))?;
        self.map.insert(key, v);
        Ok(())
    }

    fn end(self) -> Result<Self::Ok, Self::Error> {
        Ok(Value::Map(self.map))
    }
}

macro_rules! impl_serialize_struct {
    ($trait:ident) => {
        impl $trait for MapSerializer {
            type Ok = Value;
            type Error = SqlweaveError;

            fn serialize_field<T: ?Sized + Serialize>(
                &mut self,
                key: &'static str,
                value: &T,
            ) -> Result<(), Self::Error> {
                let v = value.serialize(ValueSerializer)?;
                self.map.insert(key.to_string(), v);
                Ok(())
            }

            fn end(self) -> Result<Self::Ok, Self::Error> {
                Ok(Value::Map(self.map))
            }
        }
    };
}

impl_serialize_struct!(SerializeStruct);
impl_serialize_struct!(SerializeStructVariant);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_struct_args_serialize_to_null() {
        let v = to_value(&()).unwrap();
        assert_eq!(v, Value::Null);
    }

    #[test]
    fn tuple_serializes_in_order() {
        let v = to_value(&(1i32, "hello")).unwrap();
        match v {
            Value::List(list) => {
                assert_eq!(list[0], Value::I32(1));
                assert_eq!(list[1], Value::Str("hello".to_string()));
            }
            other => panic!("expected list, got {other:?}"),
        }
    }

    #[derive(Serialize)]
    struct Args<'a> {
        id: &'a i64,
        name: &'a str,
    }

    #[test]
    fn struct_serializes_to_map() {
        let id = 41i64;
        let v = to_value(&Args { id: &id, name: "ada" }).unwrap();
        let map = v.as_map().unwrap();
        assert_eq!(map.get("id"), Some(&Value::I64(41)));
        assert_eq!(map.get("name"), Some(&Value::Str("ada".to_string())));
    }
}
