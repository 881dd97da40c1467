//! Per-invocation SQL and parameter bindings.

use crate::error::MapperResult;
use crate::reflection::{Param, ParamMap, PropertyTokenizer};
use crate::types::converters::TypeConverter;
use crate::types::{DbTypeTag, TypeConverterRegistry};
use crate::value::{ScalarType, Value};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParameterMode {
    #[default]
    In,
    Out,
    InOut,
}

impl ParameterMode {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "IN" => Some(Self::In),
            "OUT" => Some(Self::Out),
            "INOUT" => Some(Self::InOut),
            _ => None,
        }
    }
}

/// One positional placeholder: where its value comes from and how to bind it.
#[derive(Clone)]
pub struct ParameterMapping {
    pub property: String,
    pub scalar_type: ScalarType,
    pub tag: Option<DbTypeTag>,
    pub mode: ParameterMode,
    pub numeric_scale: Option<u32>,
    pub converter: Arc<dyn TypeConverter>,
}

impl ParameterMapping {
    pub fn new(property: impl Into<String>, scalar_type: ScalarType, converter: Arc<dyn TypeConverter>) -> Self {
        Self {
            property: property.into(),
            scalar_type,
            tag: None,
            mode: ParameterMode::In,
            numeric_scale: None,
            converter,
        }
    }
}

impl fmt::Debug for ParameterMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterMapping")
            .field("property", &self.property)
            .field("type", &self.scalar_type)
            .field("tag", &self.tag)
            .field("mode", &self.mode)
            .field("converter", &self.converter.name())
            .finish()
    }
}

/// Final SQL text with `?` placeholders, their mappings in order, and the
/// additional parameters computed while assembling dynamic SQL.
#[derive(Debug, Clone)]
pub struct BoundSql {
    sql: String,
    parameter_mappings: Vec<ParameterMapping>,
    additional_parameters: Param,
}

impl BoundSql {
    pub fn new(sql: impl Into<String>, parameter_mappings: Vec<ParameterMapping>) -> Self {
        Self {
            sql: sql.into(),
            parameter_mappings,
            additional_parameters: Param::Map(ParamMap::new()),
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn parameter_mappings(&self) -> &[ParameterMapping] {
        &self.parameter_mappings
    }

    /// Whether the root name of `path` is an additional parameter.
    pub fn has_additional_parameter(&self, path: &str) -> bool {
        let name = PropertyTokenizer::new(path).name();
        self.additional_parameters
            .as_map()
            .is_some_and(|m| m.contains_key(name))
    }

    pub fn additional_parameter(&self, path: &str) -> MapperResult<Value> {
        self.additional_parameters.get_value(path)
    }

    pub fn set_additional_parameter(&mut self, name: impl Into<String>, value: impl Into<Param>) {
        if let Param::Map(map) = &mut self.additional_parameters {
            map.insert(name, value);
        }
    }

    pub fn additional_parameters(&self) -> &Param {
        &self.additional_parameters
    }

    /// Resolve the value bound for `mapping`.
    ///
    /// Additional parameters win; a null parameter binds null; a single
    /// scalar with its own converter is bound whole; anything else is read
    /// through the property path.
    pub fn parameter_value(
        &self,
        mapping: &ParameterMapping,
        param: &Param,
        registry: &TypeConverterRegistry,
    ) -> MapperResult<Value> {
        let property = mapping.property.as_str();
        if self.has_additional_parameter(property) {
            return self.additional_parameter(property);
        }
        match param {
            Param::Null => Ok(Value::Null),
            Param::Scalar(v) if v.is_null() => Ok(Value::Null),
            Param::Scalar(v) if registry.has_converter(v.scalar_type()) => Ok(v.clone()),
            other => other.get_value(property),
        }
    }
}
