//! Positional parameter binding.

use crate::driver::PreparedCommand;
use crate::error::{MapperError, MapperResult};
use crate::mapping::{BoundSql, ParameterMode};
use crate::reflection::Param;
use crate::types::TypeConverterRegistry;
use tracing::trace;

/// Binds every input mapping of a [`BoundSql`] into a command, in order.
pub struct ParameterHandler<'a> {
    registry: &'a TypeConverterRegistry,
    bound_sql: &'a BoundSql,
    parameter: &'a Param,
}

impl<'a> ParameterHandler<'a> {
    pub fn new(
        registry: &'a TypeConverterRegistry,
        bound_sql: &'a BoundSql,
        parameter: &'a Param,
    ) -> Self {
        Self {
            registry,
            bound_sql,
            parameter,
        }
    }

    pub fn parameter(&self) -> &Param {
        self.parameter
    }

    pub fn set_parameters(&self, command: &mut PreparedCommand) -> MapperResult<()> {
        for (index, mapping) in self.bound_sql.parameter_mappings().iter().enumerate() {
            if mapping.mode == ParameterMode::Out {
                continue;
            }
            let value = self
                .bound_sql
                .parameter_value(mapping, self.parameter, self.registry)?;
            trace!(index, property = %mapping.property, value = %value, "Binding parameter");
            mapping
                .converter
                .set_parameter(command, index, &value, mapping.tag)
                .map_err(|e| {
                    MapperError::type_conversion(
                        value,
                        format!("parameter #{} ({}): {e}", index + 1, mapping.property),
                    )
                })?;
        }
        Ok(())
    }
}
