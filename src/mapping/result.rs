//! Mapped result objects.

use crate::error::{MapperError, MapperResult};
use crate::reflection::{Entity, EntityType};
use crate::value::{FieldValue, Value};
use chrono::NaiveDateTime;
use std::collections::BTreeMap;

/// One mapped row.
#[derive(Debug, Clone)]
pub enum ResultObject {
    /// Single column read through a scalar converter.
    Scalar(Value),
    Entity(Box<dyn Entity>),
    /// Column label to value.
    Row(BTreeMap<String, Value>),
}

impl ResultObject {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Scalar(v) => v.type_name(),
            Self::Entity(e) => e.descriptor().type_name,
            Self::Row(_) => "row",
        }
    }

    pub fn has_getter(&self, name: &str) -> bool {
        match self {
            Self::Scalar(_) => false,
            Self::Entity(e) => e.descriptor().has_getter(name),
            Self::Row(row) => row.contains_key(name) || row.keys().any(|k| k.eq_ignore_ascii_case(name)),
        }
    }

    pub fn get_property(&self, name: &str) -> MapperResult<Value> {
        match self {
            Self::Scalar(_) => Err(MapperError::no_getter(name, self.type_name())),
            Self::Entity(e) => e.get_property(name),
            Self::Row(row) => row
                .get(name)
                .or_else(|| {
                    row.iter()
                        .find(|(k, _)| k.eq_ignore_ascii_case(name))
                        .map(|(_, v)| v)
                })
                .cloned()
                .ok_or_else(|| MapperError::no_getter(name, "row")),
        }
    }

    /// The object as a single value: a scalar itself, or the only column of a row.
    pub fn into_value(self) -> MapperResult<Value> {
        match self {
            Self::Scalar(v) => Ok(v),
            Self::Row(row) if row.len() == 1 => Ok(row.into_values().next().unwrap_or(Value::Null)),
            other => Err(MapperError::type_conversion(other.type_name(), "scalar value")),
        }
    }

    pub fn into_entity<T: EntityType>(self) -> MapperResult<T> {
        match self {
            Self::Entity(e) => e.downcast::<T>(),
            other => Err(MapperError::type_conversion(
                other.type_name(),
                T::entity_descriptor().type_name,
            )),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Scalar(v) => serde_json::to_value(v).unwrap_or(serde_json::Value::Null),
            Self::Entity(e) => e.to_json(),
            Self::Row(row) => serde_json::to_value(row).unwrap_or(serde_json::Value::Null),
        }
    }
}

/// Conversion from a mapped row into a caller-facing type.
pub trait FromResult: Sized {
    fn from_result(object: ResultObject) -> MapperResult<Self>;
}

impl FromResult for ResultObject {
    fn from_result(object: ResultObject) -> MapperResult<Self> {
        Ok(object)
    }
}

impl FromResult for BTreeMap<String, Value> {
    fn from_result(object: ResultObject) -> MapperResult<Self> {
        match object {
            ResultObject::Row(row) => Ok(row),
            other => Err(MapperError::type_conversion(other.type_name(), "row")),
        }
    }
}

impl FromResult for Value {
    fn from_result(object: ResultObject) -> MapperResult<Self> {
        object.into_value()
    }
}

macro_rules! from_result_scalar {
    ($($ty:ty),+) => {
        $(
            impl FromResult for $ty {
                fn from_result(object: ResultObject) -> MapperResult<Self> {
                    <$ty as FieldValue>::from_value(object.into_value()?)
                }
            }
        )+
    };
}

from_result_scalar!(i64, i32, f64, bool, String, Vec<u8>, NaiveDateTime);

impl<T: FieldValue> FromResult for Option<T> {
    fn from_result(object: ResultObject) -> MapperResult<Self> {
        <Option<T> as FieldValue>::from_value(object.into_value()?)
    }
}
