//! Built-in converters.

use crate::driver::{PreparedCommand, RowView};
use crate::error::{MapperError, MapperResult};
use crate::types::DbTypeTag;
use crate::value::{ScalarType, Value};
use std::fmt;

/// Binds values into commands and reads them back out of rows.
pub trait TypeConverter: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Bind `value` at the zero-based `index`.
    fn set_parameter(
        &self,
        command: &mut PreparedCommand,
        index: usize,
        value: &Value,
        tag: Option<DbTypeTag>,
    ) -> MapperResult<()>;

    fn get_result(&self, row: &RowView<'_>, column: &str) -> MapperResult<Value>;

    fn get_result_at(&self, row: &RowView<'_>, index: usize) -> MapperResult<Value>;
}

fn column_value<'a>(row: &RowView<'a>, column: &str) -> MapperResult<&'a Value> {
    row.get(column).ok_or_else(|| {
        MapperError::database(
            format!("Column '{column}' not found in result"),
            None,
            "Check the column labels selected by the statement",
        )
    })
}

fn column_value_at<'a>(row: &RowView<'a>, index: usize) -> MapperResult<&'a Value> {
    row.get_at(index).ok_or_else(|| {
        MapperError::internal(format!(
            "Column index {} out of bounds (len: {})",
            index,
            row.len()
        ))
    })
}

/// Converter for one concrete scalar type. Values are coerced on the way in
/// and on the way out; a textual tag binds the textual form.
#[derive(Debug, Clone)]
pub struct ScalarConverter {
    name: &'static str,
    target: ScalarType,
}

impl ScalarConverter {
    pub const fn new(name: &'static str, target: ScalarType) -> Self {
        Self { name, target }
    }

    pub fn target(&self) -> ScalarType {
        self.target
    }
}

impl TypeConverter for ScalarConverter {
    fn name(&self) -> &str {
        self.name
    }

    fn set_parameter(
        &self,
        command: &mut PreparedCommand,
        index: usize,
        value: &Value,
        tag: Option<DbTypeTag>,
    ) -> MapperResult<()> {
        if value.is_null() {
            command.bind(index, Value::Null);
            return Ok(());
        }
        let mut bound = value.clone().coerce(self.target)?;
        if tag.is_some_and(|t| t.is_textual()) {
            bound = bound.coerce(ScalarType::Text)?;
        }
        command.bind(index, bound);
        Ok(())
    }

    fn get_result(&self, row: &RowView<'_>, column: &str) -> MapperResult<Value> {
        column_value(row, column)?.clone().coerce(self.target)
    }

    fn get_result_at(&self, row: &RowView<'_>, index: usize) -> MapperResult<Value> {
        column_value_at(row, index)?.clone().coerce(self.target)
    }
}

/// Pass-through converter for values of unknown type.
#[derive(Debug, Clone, Default)]
pub struct ObjectConverter;

impl TypeConverter for ObjectConverter {
    fn name(&self) -> &str {
        "object"
    }

    fn set_parameter(
        &self,
        command: &mut PreparedCommand,
        index: usize,
        value: &Value,
        _tag: Option<DbTypeTag>,
    ) -> MapperResult<()> {
        command.bind(index, value.clone());
        Ok(())
    }

    fn get_result(&self, row: &RowView<'_>, column: &str) -> MapperResult<Value> {
        column_value(row, column).cloned()
    }

    fn get_result_at(&self, row: &RowView<'_>, index: usize) -> MapperResult<Value> {
        column_value_at(row, index).cloned()
    }
}
