//! Placeholder expression parsing.
//!
//! Grammar: `property[:DBTYPE][, attr=value]*`, with surrounding whitespace
//! ignored. Expression-based parameters (`(expr)`) are rejected.

use crate::error::{MapperError, MapperResult};

/// Parsed content of one `#{...}` placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterExpression {
    pub property: String,
    /// Attributes in declaration order; `:DBTYPE` appears as `jdbcType`.
    pub attributes: Vec<(String, String)>,
}

impl ParameterExpression {
    pub fn parse(expression: &str) -> MapperResult<Self> {
        let body = expression.trim_start();
        if body.starts_with('(') {
            return Err(MapperError::configuration(format!(
                "Expression based parameters are not supported: #{{{expression}}}"
            )));
        }

        let property_end = body.find([',', ':']).unwrap_or(body.len());
        let property = body[..property_end].trim().to_string();
        let mut attributes = Vec::new();
        let mut rest = &body[property_end..];

        if let Some(after_colon) = rest.strip_prefix(':') {
            let type_end = after_colon.find(',').unwrap_or(after_colon.len());
            let db_type = after_colon[..type_end].trim();
            if db_type.is_empty() {
                return Err(parse_error(expression, property_end));
            }
            attributes.push(("jdbcType".to_string(), db_type.to_string()));
            rest = &after_colon[type_end..];
        }

        if let Some(options) = rest.strip_prefix(',') {
            for option in options.split(',') {
                let Some((name, value)) = option.split_once('=') else {
                    return Err(parse_error(expression, property_end));
                };
                let name = name.trim();
                if name.is_empty() {
                    return Err(parse_error(expression, property_end));
                }
                attributes.push((name.to_string(), value.trim().to_string()));
            }
        } else if !rest.trim().is_empty() {
            return Err(parse_error(expression, property_end));
        }

        Ok(Self {
            property,
            attributes,
        })
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

fn parse_error(expression: &str, position: usize) -> MapperError {
    MapperError::configuration(format!(
        "Parsing error in {{{expression}}} in position {position}"
    ))
}
