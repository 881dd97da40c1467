//! SQL sources: templates that produce a [`BoundSql`] for a parameter.

use crate::builder::expression::ParameterExpression;
use crate::builder::node::{DynamicContext, SqlNode};
use crate::builder::token::GenericTokenParser;
use crate::error::{MapperError, MapperResult};
use crate::mapping::{BoundSql, ParameterMapping, ParameterMode};
use crate::reflection::{Param, ParameterType};
use crate::types::{DbTypeTag, TypeConverterRegistry};
use crate::value::ScalarType;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

const VALID_ATTRIBUTES: &str =
    "javaType,jdbcType,mode,numericScale,resultMap,typeHandler,jdbcTypeName";

/// Produces the bound statement for one invocation.
pub trait SqlSource: Send + Sync + fmt::Debug {
    fn bound_sql(&self, param: &Param) -> MapperResult<BoundSql>;
}

/// Already-parsed SQL: `?` placeholders plus their mappings.
#[derive(Debug, Clone)]
pub struct StaticSqlSource {
    sql: String,
    parameter_mappings: Vec<ParameterMapping>,
}

impl StaticSqlSource {
    pub fn new(sql: impl Into<String>, parameter_mappings: Vec<ParameterMapping>) -> Self {
        Self {
            sql: sql.into(),
            parameter_mappings,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }
}

impl SqlSource for StaticSqlSource {
    fn bound_sql(&self, _param: &Param) -> MapperResult<BoundSql> {
        Ok(BoundSql::new(self.sql.clone(), self.parameter_mappings.clone()))
    }
}

/// Turns `#{...}` templates into static sources.
#[derive(Debug, Clone)]
pub struct SqlSourceBuilder {
    registry: Arc<TypeConverterRegistry>,
}

impl SqlSourceBuilder {
    pub fn new(registry: Arc<TypeConverterRegistry>) -> Self {
        Self { registry }
    }

    /// Parse `original` into SQL with `?` placeholders.
    ///
    /// `additional` holds values computed during dynamic assembly; their
    /// runtime types take precedence over the declared parameter type.
    pub fn parse(
        &self,
        original: &str,
        parameter_type: ParameterType,
        additional: Option<&Param>,
    ) -> MapperResult<StaticSqlSource> {
        let mut mappings = Vec::new();
        let sql = GenericTokenParser::parameters().parse(original, |content| {
            mappings.push(self.build_parameter_mapping(content, parameter_type, additional)?);
            Ok("?".to_string())
        })?;
        trace!(sql = %sql, parameters = mappings.len(), "Parsed SQL source");
        Ok(StaticSqlSource::new(sql, mappings))
    }

    fn build_parameter_mapping(
        &self,
        content: &str,
        parameter_type: ParameterType,
        additional: Option<&Param>,
    ) -> MapperResult<ParameterMapping> {
        let expression = ParameterExpression::parse(content)?;
        let property = expression.property.clone();

        let mut scalar_type = self.property_type(&property, parameter_type, additional);
        let mut tag = None;
        let mut mode = ParameterMode::In;
        let mut numeric_scale = None;
        let mut converter_name = None;

        for (name, value) in &expression.attributes {
            match name.as_str() {
                "javaType" => {
                    scalar_type = ScalarType::from_alias(value).ok_or_else(|| {
                        MapperError::configuration(format!(
                            "Unknown javaType '{value}' in mapping #{{{content}}}"
                        ))
                    })?;
                }
                "jdbcType" => {
                    tag = Some(DbTypeTag::from_name(value).ok_or_else(|| {
                        MapperError::configuration(format!(
                            "Unknown jdbcType '{value}' in mapping #{{{content}}}"
                        ))
                    })?);
                }
                "mode" => {
                    mode = ParameterMode::from_name(value).ok_or_else(|| {
                        MapperError::configuration(format!(
                            "Unknown mode '{value}' in mapping #{{{content}}}"
                        ))
                    })?;
                }
                "numericScale" => {
                    numeric_scale = Some(value.parse().map_err(|_| {
                        MapperError::configuration(format!(
                            "Invalid numericScale '{value}' in mapping #{{{content}}}"
                        ))
                    })?);
                }
                "typeHandler" => converter_name = Some(value.clone()),
                "resultMap" | "jdbcTypeName" => {}
                other => {
                    return Err(MapperError::configuration(format!(
                        "An invalid property '{other}' was found in mapping #{{{content}}}. Valid properties are {VALID_ATTRIBUTES}"
                    )));
                }
            }
        }

        let converter = match converter_name {
            Some(name) => self.registry.find_by_name(&name).ok_or_else(|| {
                MapperError::configuration(format!(
                    "Type handler '{name}' is not registered (mapping #{{{content}}})"
                ))
            })?,
            None => self.registry.get_converter(scalar_type, tag).ok_or_else(|| {
                MapperError::configuration(format!(
                    "Type handler was null on parameter mapping for property '{property}'. \
                     It was either not specified and/or could not be found for the javaType ({}) : jdbcType ({}) combination.",
                    scalar_type,
                    tag.map(|t| t.to_string()).unwrap_or_else(|| "null".to_string())
                ))
            })?,
        };

        Ok(ParameterMapping {
            property,
            scalar_type,
            tag,
            mode,
            numeric_scale,
            converter,
        })
    }

    fn property_type(
        &self,
        property: &str,
        parameter_type: ParameterType,
        additional: Option<&Param>,
    ) -> ScalarType {
        if let Some(extra) = additional {
            if let Ok(value) = extra.get_value(property) {
                if !value.is_null() {
                    return value.scalar_type();
                }
            }
        }
        match parameter_type {
            ParameterType::Scalar(ty) if self.registry.has_converter(ty) => ty,
            other => other.property_type(property).unwrap_or(ScalarType::Any),
        }
    }
}

/// Template without dynamic nodes, parsed once at construction.
#[derive(Debug, Clone)]
pub struct RawSqlSource {
    inner: StaticSqlSource,
}

impl RawSqlSource {
    pub fn new(
        registry: Arc<TypeConverterRegistry>,
        sql: &str,
        parameter_type: ParameterType,
    ) -> MapperResult<Self> {
        let inner = SqlSourceBuilder::new(registry).parse(sql, parameter_type, None)?;
        Ok(Self { inner })
    }

    pub fn sql(&self) -> &str {
        self.inner.sql()
    }
}

impl SqlSource for RawSqlSource {
    fn bound_sql(&self, param: &Param) -> MapperResult<BoundSql> {
        self.inner.bound_sql(param)
    }
}

/// Template assembled per call from a node tree, then parsed.
pub struct DynamicSqlSource {
    builder: SqlSourceBuilder,
    root: Box<dyn SqlNode>,
}

impl DynamicSqlSource {
    pub fn new(registry: Arc<TypeConverterRegistry>, root: Box<dyn SqlNode>) -> Self {
        Self {
            builder: SqlSourceBuilder::new(registry),
            root,
        }
    }
}

impl fmt::Debug for DynamicSqlSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicSqlSource").finish_non_exhaustive()
    }
}

impl SqlSource for DynamicSqlSource {
    fn bound_sql(&self, param: &Param) -> MapperResult<BoundSql> {
        let mut context = DynamicContext::new(param);
        self.root.apply(&mut context)?;
        let (sql, bindings) = context.finish();
        let bindings = Param::Map(bindings);
        let source = self
            .builder
            .parse(&sql, ParameterType::of(param), Some(&bindings))?;
        let mut bound = source.bound_sql(param)?;
        if let Param::Map(map) = bindings {
            for (name, value) in map.iter() {
                bound.set_additional_parameter(name, value.clone());
            }
        }
        Ok(bound)
    }
}
