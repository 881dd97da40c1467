//! Dynamic scalar values exchanged with the database.
//!
//! [`Value`] is the single currency between parameter objects, the type
//! coercion registry, the driver, and result objects. [`ScalarType`] names
//! the declared type of a property or result column, and [`FieldValue`]
//! lets plain Rust field types participate in entity accessor tables.

use crate::error::{MapperError, MapperResult};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Text layouts accepted when reading a timestamp stored as text.
const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
];

/// A single database value.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// SQL NULL
    Null,
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    Float(f64),
    Text(String),
    /// Binary data (base64 encoded in JSON)
    #[serde(with = "base64_bytes")]
    Bytes(Vec<u8>),
    Timestamp(NaiveDateTime),
}

/// Declared type of a property, parameter or result column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ScalarType {
    Bool,
    Int,
    Float,
    Text,
    Bytes,
    Timestamp,
    /// Unknown or dynamic; values pass through unchanged.
    Any,
}

impl ScalarType {
    /// Resolve a type alias such as `int`, `long`, `string` or `date`.
    pub fn from_alias(alias: &str) -> Option<Self> {
        let lower = alias.trim().to_ascii_lowercase();
        let ty = match lower.as_str() {
            "bool" | "boolean" | "_boolean" => Self::Bool,
            "int" | "integer" | "long" | "short" | "byte" | "_int" | "_long" | "i32" | "i64"
            | "bigint" => Self::Int,
            "float" | "double" | "decimal" | "bigdecimal" | "f32" | "f64" => Self::Float,
            "string" | "str" | "char" | "text" => Self::Text,
            "bytes" | "byte[]" | "blob" => Self::Bytes,
            "date" | "timestamp" | "datetime" => Self::Timestamp,
            "object" | "any" | "map" | "hashmap" => Self::Any,
            _ => return None,
        };
        Some(ty)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Text => "text",
            Self::Bytes => "bytes",
            Self::Timestamp => "timestamp",
            Self::Any => "any",
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Value {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The scalar type carried by this value; `Any` for null.
    pub fn scalar_type(&self) -> ScalarType {
        match self {
            Self::Null => ScalarType::Any,
            Self::Bool(_) => ScalarType::Bool,
            Self::Int(_) => ScalarType::Int,
            Self::Float(_) => ScalarType::Float,
            Self::Text(_) => ScalarType::Text,
            Self::Bytes(_) => ScalarType::Bytes,
            Self::Timestamp(_) => ScalarType::Timestamp,
        }
    }

    /// Get the type name of this value for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            other => other.scalar_type().name(),
        }
    }

    /// Coerce into the requested scalar type. Null stays null.
    pub fn coerce(self, target: ScalarType) -> MapperResult<Value> {
        if self.is_null() || target == ScalarType::Any || self.scalar_type() == target {
            return Ok(self);
        }
        let converted = match (target, &self) {
            (ScalarType::Int, Value::Bool(b)) => Some(Value::Int(i64::from(*b))),
            (ScalarType::Int, Value::Float(f)) if f.fract() == 0.0 => Some(Value::Int(*f as i64)),
            (ScalarType::Int, Value::Text(s)) => s.trim().parse().ok().map(Value::Int),
            (ScalarType::Int, Value::Timestamp(ts)) => {
                Some(Value::Int(ts.and_utc().timestamp_millis()))
            }
            (ScalarType::Float, Value::Int(i)) => Some(Value::Float(*i as f64)),
            (ScalarType::Float, Value::Text(s)) => s.trim().parse().ok().map(Value::Float),
            (ScalarType::Bool, Value::Int(i)) => Some(Value::Bool(*i != 0)),
            (ScalarType::Bool, Value::Text(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "y" | "yes" => Some(Value::Bool(true)),
                "false" | "0" | "n" | "no" => Some(Value::Bool(false)),
                _ => None,
            },
            (ScalarType::Text, Value::Bytes(b)) => {
                String::from_utf8(b.clone()).ok().map(Value::Text)
            }
            (ScalarType::Text, Value::Timestamp(ts)) => {
                Some(Value::Text(ts.format("%Y-%m-%d %H:%M:%S%.3f").to_string()))
            }
            (ScalarType::Text, other) => Some(Value::Text(other.to_string())),
            (ScalarType::Bytes, Value::Text(s)) => Some(Value::Bytes(s.clone().into_bytes())),
            (ScalarType::Timestamp, Value::Text(s)) => parse_timestamp(s).map(Value::Timestamp),
            (ScalarType::Timestamp, Value::Int(millis)) => {
                DateTime::from_timestamp_millis(*millis).map(|dt| Value::Timestamp(dt.naive_utc()))
            }
            _ => None,
        };
        converted.ok_or_else(|| MapperError::type_conversion(&self, target.name()))
    }
}

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
            Self::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Self::Timestamp(ts) => write!(f, "{}", ts.format("%Y-%m-%d %H:%M:%S%.3f")),
        }
    }
}

// Floats compare by bit pattern so that equal inputs always produce equal
// cache keys, including NaN.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            (Self::Timestamp(a), Self::Timestamp(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Null => {}
            Self::Bool(b) => b.hash(state),
            Self::Int(i) => i.hash(state),
            Self::Float(v) => v.to_bits().hash(state),
            Self::Text(s) => s.hash(state),
            Self::Bytes(b) => b.hash(state),
            Self::Timestamp(ts) => ts.hash(state),
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident $(as $cast:ty)?),+ $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v $(as $cast)?)
                }
            }
        )+
    };
}

value_from! {
    bool => Bool,
    i64 => Int,
    i32 => Int as i64,
    u32 => Int as i64,
    f64 => Float,
    f32 => Float as f64,
    String => Text,
    Vec<u8> => Bytes,
    NaiveDateTime => Timestamp,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// A Rust field type that can live in an entity accessor table.
///
/// `NULLABLE` types (`Option<T>`) accept null; the others are treated as
/// primitives and keep their current value when a null column is auto-mapped.
pub trait FieldValue: Sized {
    const SCALAR: ScalarType;
    const NULLABLE: bool = false;

    fn to_value(&self) -> Value;

    fn from_value(value: Value) -> MapperResult<Self>;
}

macro_rules! field_value {
    ($ty:ty, $scalar:ident, |$v:ident| $extract:expr) => {
        impl FieldValue for $ty {
            const SCALAR: ScalarType = ScalarType::$scalar;

            fn to_value(&self) -> Value {
                Value::from(self.clone())
            }

            fn from_value(value: Value) -> MapperResult<Self> {
                match value.coerce(ScalarType::$scalar)? {
                    $v => $extract
                        .ok_or_else(|| MapperError::type_conversion(stringify!($ty), stringify!($ty))),
                }
            }
        }
    };
}

field_value!(i64, Int, |v| match v {
    Value::Int(i) => Some(i),
    _ => None,
});
field_value!(i32, Int, |v| match v {
    Value::Int(i) => i32::try_from(i).ok(),
    _ => None,
});
field_value!(f64, Float, |v| match v {
    Value::Float(f) => Some(f),
    _ => None,
});
field_value!(bool, Bool, |v| match v {
    Value::Bool(b) => Some(b),
    _ => None,
});
field_value!(String, Text, |v| match v {
    Value::Text(s) => Some(s),
    _ => None,
});
field_value!(Vec<u8>, Bytes, |v| match v {
    Value::Bytes(b) => Some(b),
    _ => None,
});
field_value!(NaiveDateTime, Timestamp, |v| match v {
    Value::Timestamp(ts) => Some(ts),
    _ => None,
});

impl FieldValue for Value {
    const SCALAR: ScalarType = ScalarType::Any;
    const NULLABLE: bool = true;

    fn to_value(&self) -> Value {
        self.clone()
    }

    fn from_value(value: Value) -> MapperResult<Self> {
        Ok(value)
    }
}

impl<T: FieldValue> FieldValue for Option<T> {
    const SCALAR: ScalarType = T::SCALAR;
    const NULLABLE: bool = true;

    fn to_value(&self) -> Value {
        self.as_ref().map(T::to_value).unwrap_or(Value::Null)
    }

    fn from_value(value: Value) -> MapperResult<Self> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}

/// Custom serialization for binary data as base64.
mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Serialize, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        STANDARD.encode(bytes).serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(v: &Value) -> u64 {
        let mut h = DefaultHasher::new();
        v.hash(&mut h);
        h.finish()
    }

    #[test]
    fn test_null_equality_is_deterministic() {
        assert_eq!(Value::Null, Value::Null);
        assert_eq!(hash_of(&Value::Null), hash_of(&Value::Null));
        assert_ne!(Value::Null, Value::Int(0));
    }

    #[test]
    fn test_float_equality_uses_bits() {
        assert_eq!(Value::Float(f64::NAN), Value::Float(f64::NAN));
        assert_ne!(Value::Float(0.0), Value::Float(-0.0));
    }

    #[test]
    fn test_coerce_text_to_int() {
        assert_eq!(Value::from("42").coerce(ScalarType::Int).unwrap(), Value::Int(42));
        assert!(Value::from("forty").coerce(ScalarType::Int).is_err());
    }

    #[test]
    fn test_coerce_timestamp_from_text() {
        let v = Value::from("2024-03-01 10:20:30").coerce(ScalarType::Timestamp).unwrap();
        match v {
            Value::Timestamp(ts) => assert_eq!(ts.format("%H:%M").to_string(), "10:20"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_coerce_null_passthrough() {
        assert_eq!(Value::Null.coerce(ScalarType::Int).unwrap(), Value::Null);
    }

    #[test]
    fn test_field_value_option() {
        assert_eq!(Option::<i64>::from_value(Value::Null).unwrap(), None);
        assert_eq!(Option::<i64>::from_value(Value::Int(3)).unwrap(), Some(3));
        assert!(<Option<String> as FieldValue>::NULLABLE);
        assert!(!<i64 as FieldValue>::NULLABLE);
    }

    #[test]
    fn test_scalar_alias() {
        assert_eq!(ScalarType::from_alias("long"), Some(ScalarType::Int));
        assert_eq!(ScalarType::from_alias("String"), Some(ScalarType::Text));
        assert_eq!(ScalarType::from_alias("nonsense"), None);
    }

    #[test]
    fn test_bytes_serialize_base64() {
        let json = serde_json::to_string(&Value::Bytes(vec![1, 2, 3])).unwrap();
        assert_eq!(json, "\"AQID\"");
    }
}
