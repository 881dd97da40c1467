//! Row-to-object mapping.

use crate::driver::{ResultSet, RowView};
use crate::error::{MapperError, MapperResult};
use crate::executor::result_handler::{ResultContext, ResultHandler};
use crate::mapping::{MappedStatement, ResultMap, ResultMapping, ResultObject, ResultType, RowBounds};
use crate::reflection::EntityDescriptor;
use crate::types::TypeConverterRegistry;
use crate::types::converters::TypeConverter;
use crate::value::{ScalarType, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::trace;

/// A fetched result set with its columns split by a result map into
/// explicitly mapped and automatically mapped labels.
pub struct ResultSetWrapper<'a> {
    result_set: &'a ResultSet,
    mapped_columns: Vec<String>,
    unmapped_columns: Vec<String>,
}

impl<'a> ResultSetWrapper<'a> {
    pub fn new(result_set: &'a ResultSet, result_map: &ResultMap) -> Self {
        let (mapped_columns, unmapped_columns) = result_set
            .columns
            .iter()
            .map(|c| c.name.clone())
            .partition(|name| result_map.is_mapped_column(name));
        Self {
            result_set,
            mapped_columns,
            unmapped_columns,
        }
    }

    pub fn result_set(&self) -> &'a ResultSet {
        self.result_set
    }

    pub fn mapped_column_names(&self) -> &[String] {
        &self.mapped_columns
    }

    pub fn unmapped_column_names(&self) -> &[String] {
        &self.unmapped_columns
    }
}

/// Maps the rows of one statement's result set.
pub struct ResultSetHandler<'a> {
    registry: &'a TypeConverterRegistry,
    statement: &'a MappedStatement,
    row_bounds: RowBounds,
}

impl<'a> ResultSetHandler<'a> {
    pub fn new(
        registry: &'a TypeConverterRegistry,
        statement: &'a MappedStatement,
        row_bounds: RowBounds,
    ) -> Self {
        Self {
            registry,
            statement,
            row_bounds,
        }
    }

    /// Map the rows inside the row bounds. With a handler, rows are passed
    /// to it one by one and the returned list is empty.
    pub fn handle_result_set(
        &self,
        result_set: &ResultSet,
        mut handler: Option<&mut dyn ResultHandler>,
    ) -> MapperResult<Vec<ResultObject>> {
        let result_map = self.statement.result_maps().first().ok_or_else(|| {
            MapperError::configuration(format!(
                "A query was run and no Result Maps were found for the Mapped Statement '{}'. \
                 It's likely that neither a result type nor a result map was specified.",
                self.statement.id()
            ))
        })?;
        let wrapper = ResultSetWrapper::new(result_set, result_map);

        let mut objects = Vec::new();
        let mut context = ResultContext::new();
        let rows = result_set
            .iter()
            .skip(self.row_bounds.offset)
            .take(self.row_bounds.limit);
        for row in rows {
            if context.is_stopped() {
                break;
            }
            let object = self.map_row(&row, result_map, &wrapper)?;
            match handler.as_deref_mut() {
                Some(h) => {
                    context.next_object(object);
                    h.handle_result(&mut context)?;
                }
                None => objects.push(object),
            }
        }
        trace!(
            statement = %self.statement.id(),
            rows = result_set.rows.len(),
            mapped = objects.len().max(context.count()),
            "Mapped result set"
        );
        Ok(objects)
    }

    fn map_row(
        &self,
        row: &RowView<'_>,
        result_map: &ResultMap,
        wrapper: &ResultSetWrapper<'_>,
    ) -> MapperResult<ResultObject> {
        match result_map.result_type {
            ResultType::Scalar(ty) => self.map_scalar(row, result_map, ty),
            ResultType::Entity(descriptor) => self.map_entity(row, result_map, wrapper, descriptor),
            ResultType::Map => self.map_columns(row, result_map, wrapper),
        }
    }

    fn map_scalar(
        &self,
        row: &RowView<'_>,
        result_map: &ResultMap,
        ty: ScalarType,
    ) -> MapperResult<ResultObject> {
        let value = match result_map.mappings.first() {
            Some(mapping) => self.mapping_converter(mapping, ty)?.get_result(row, &mapping.column)?,
            None => self.type_converter(ty)?.get_result_at(row, 0)?,
        };
        Ok(ResultObject::Scalar(value))
    }

    fn map_entity(
        &self,
        row: &RowView<'_>,
        result_map: &ResultMap,
        wrapper: &ResultSetWrapper<'_>,
        descriptor: &'static EntityDescriptor,
    ) -> MapperResult<ResultObject> {
        let mut entity = descriptor.instantiate();

        if result_map.auto_mapping {
            for column in wrapper.unmapped_column_names() {
                let Some(property) = descriptor.find_property(column) else {
                    continue;
                };
                let value = self
                    .type_converter(property.scalar_type)?
                    .get_result(row, column)?;
                if !value.is_null() || property.nullable {
                    entity.set_property(property.name, value)?;
                }
            }
        }

        for mapping in &result_map.mappings {
            if !descriptor.has_setter(&mapping.property) {
                return Err(MapperError::no_setter(&mapping.property, descriptor.type_name));
            }
            let declared = match mapping.scalar_type {
                ScalarType::Any => descriptor.property_type(&mapping.property)?,
                ty => ty,
            };
            let value = self
                .mapping_converter(mapping, declared)?
                .get_result(row, &mapping.column)?;
            if value.is_null() {
                continue;
            }
            entity.set_property(&mapping.property, value)?;
        }
        Ok(ResultObject::Entity(entity))
    }

    fn map_columns(
        &self,
        row: &RowView<'_>,
        result_map: &ResultMap,
        wrapper: &ResultSetWrapper<'_>,
    ) -> MapperResult<ResultObject> {
        let mut columns = BTreeMap::new();
        if result_map.auto_mapping {
            for column in wrapper.unmapped_column_names() {
                let value = row.get(column).cloned().unwrap_or(Value::Null);
                columns.insert(column.clone(), value);
            }
        }
        for mapping in &result_map.mappings {
            let value = self
                .mapping_converter(mapping, mapping.scalar_type)?
                .get_result(row, &mapping.column)?;
            columns.insert(mapping.property.clone(), value);
        }
        Ok(ResultObject::Row(columns))
    }

    fn type_converter(&self, ty: ScalarType) -> MapperResult<Arc<dyn TypeConverter>> {
        self.registry.get_converter(ty, None).ok_or_else(|| {
            MapperError::configuration(format!("No type converter registered for {ty}"))
        })
    }

    fn mapping_converter(
        &self,
        mapping: &ResultMapping,
        ty: ScalarType,
    ) -> MapperResult<Arc<dyn TypeConverter>> {
        if let Some(converter) = &mapping.converter {
            return Ok(converter.clone());
        }
        self.registry.get_converter(ty, mapping.tag).ok_or_else(|| {
            MapperError::configuration(format!(
                "No type converter registered for {ty} (column '{}')",
                mapping.column
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::StaticSqlSource;
    use crate::driver::ColumnInfo;
    use crate::mapping::{CommandKind, ResultMapping};

    #[derive(Debug, Clone, Default)]
    struct User {
        id: i64,
        user_name: Option<String>,
        score: f64,
    }

    crate::entity!(User {
        id: i64,
        user_name: Option<String>,
        score: f64,
    });

    fn statement(result_map: ResultMap) -> MappedStatement {
        MappedStatement::builder(
            "app.UserMapper.find",
            CommandKind::Select,
            Arc::new(StaticSqlSource::new("select", Vec::new())),
        )
        .result_map(Arc::new(result_map))
        .build()
    }

    fn users() -> ResultSet {
        ResultSet::new(
            vec![
                ColumnInfo::new("id", None),
                ColumnInfo::new("user_name", None),
                ColumnInfo::new("SCORE", None),
            ],
            vec![
                vec![Value::Int(7), Value::from("ann"), Value::Null],
                vec![Value::Int(8), Value::Null, Value::Float(2.5)],
                vec![Value::Int(9), Value::from("cy"), Value::Int(3)],
            ],
        )
    }

    fn map_all(ms: &MappedStatement, bounds: RowBounds) -> Vec<ResultObject> {
        let registry = TypeConverterRegistry::new();
        ResultSetHandler::new(&registry, ms, bounds)
            .handle_result_set(&users(), None)
            .unwrap()
    }

    #[test]
    fn test_auto_mapping_underscore_names() {
        let ms = statement(ResultMap::entity::<User>("u"));
        let rows = map_all(&ms, RowBounds::default());
        let first = rows[0].clone().into_entity::<User>().unwrap();
        assert_eq!(first.id, 7);
        assert_eq!(first.user_name.as_deref(), Some("ann"));
        assert_eq!(first.score, 0.0);
        let third = rows[2].clone().into_entity::<User>().unwrap();
        assert_eq!(third.score, 3.0);
    }

    #[test]
    fn test_explicit_mapping_skips_null() {
        let map = ResultMap::entity::<User>("u")
            .with_auto_mapping(false)
            .with_mapping(ResultMapping::new("id", "ID"))
            .with_mapping(ResultMapping::new("userName", "user_name"));
        let ms = statement(map);
        let rows = map_all(&ms, RowBounds::default());
        let second = rows[1].clone().into_entity::<User>().unwrap();
        assert_eq!(second.id, 8);
        assert!(second.user_name.is_none());
    }

    #[test]
    fn test_unknown_mapped_property() {
        let map = ResultMap::entity::<User>("u").with_mapping(ResultMapping::new("nope", "id"));
        let ms = statement(map);
        let registry = TypeConverterRegistry::new();
        let err = ResultSetHandler::new(&registry, &ms, RowBounds::default())
            .handle_result_set(&users(), None)
            .unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn test_scalar_and_row_targets() {
        let ms = statement(ResultMap::new("s", ResultType::Scalar(ScalarType::Text)));
        let rows = map_all(&ms, RowBounds::default());
        assert!(matches!(&rows[0], ResultObject::Scalar(Value::Text(s)) if s == "7"));

        let ms = statement(ResultMap::new("m", ResultType::Map));
        let rows = map_all(&ms, RowBounds::default());
        match &rows[2] {
            ResultObject::Row(row) => {
                assert_eq!(row.get("SCORE"), Some(&Value::Int(3)));
                assert_eq!(row.len(), 3);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_row_bounds_window() {
        let ms = statement(ResultMap::new("s", ResultType::Scalar(ScalarType::Int)));
        let rows = map_all(&ms, RowBounds::new(1, 1));
        assert_eq!(rows.len(), 1);
        assert!(matches!(rows[0], ResultObject::Scalar(Value::Int(8))));
    }

    #[test]
    fn test_handler_receives_rows_and_stops() {
        let ms = statement(ResultMap::new("s", ResultType::Scalar(ScalarType::Int)));
        let registry = TypeConverterRegistry::new();
        let mut seen = Vec::new();
        let mut handler = |ctx: &mut ResultContext| -> MapperResult<()> {
            seen.push(ctx.take_object());
            if ctx.count() == 2 {
                ctx.stop();
            }
            Ok(())
        };
        let rows = ResultSetHandler::new(&registry, &ms, RowBounds::default())
            .handle_result_set(&users(), Some(&mut handler))
            .unwrap();
        assert!(rows.is_empty());
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn test_missing_result_map() {
        let ms = MappedStatement::builder(
            "ns.q",
            CommandKind::Select,
            Arc::new(StaticSqlSource::new("select", Vec::new())),
        )
        .build();
        let registry = TypeConverterRegistry::new();
        let err = ResultSetHandler::new(&registry, &ms, RowBounds::default())
            .handle_result_set(&users(), None)
            .unwrap_err();
        assert!(err.to_string().contains("no Result Maps"));
    }
}
