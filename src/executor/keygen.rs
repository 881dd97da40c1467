//! Primary key generation strategies.
//!
//! A [`KeyGenerator`] runs around an insert: [`SelectKeyGenerator`] may
//! fetch a key before the statement or after it, [`GeneratedKeysGenerator`]
//! reads the keys the driver reports after it, and [`NoKeyGenerator`] does
//! nothing. Keys are written back onto the parameter object through its
//! key properties.

use crate::driver::{Connection, ResultSet, UpdateOutcome};
use crate::error::{MapperError, MapperResult};
use crate::executor::statement::StatementHandler;
use crate::mapping::{MappedStatement, ResultObject, RowBounds};
use crate::reflection::Param;
use crate::session::Configuration;
use crate::value::Value;
use std::fmt;
use tracing::debug;

/// Names under which a batch of parameter objects can be passed inside a map.
const BATCH_NAMES: &[&str] = &["collection", "list", "array"];

/// What a key generator may use while running: the configuration and the
/// connection the main statement runs on.
pub struct KeyContext<'a> {
    configuration: &'a Configuration,
    connection: &'a mut dyn Connection,
}

impl<'a> KeyContext<'a> {
    pub fn new(configuration: &'a Configuration, connection: &'a mut dyn Connection) -> Self {
        Self {
            configuration,
            connection,
        }
    }

    pub fn configuration(&self) -> &Configuration {
        self.configuration
    }

    /// Run a registered select on the same connection, bypassing caches.
    pub fn select(&mut self, statement_id: &str, param: &Param) -> MapperResult<Vec<ResultObject>> {
        let statement = self.configuration.get_statement(statement_id)?;
        let bound_sql = statement.bound_sql(param)?;
        let handler =
            StatementHandler::new(self.configuration, &statement, bound_sql, RowBounds::default());
        let mut command = handler.prepare(&mut *self.connection, None)?;
        handler.parameterize(&mut command, param)?;
        handler.query(&mut *self.connection, &mut command, None)
    }
}

pub trait KeyGenerator: Send + Sync + fmt::Debug {
    fn process_before(
        &self,
        _context: &mut KeyContext<'_>,
        _statement: &MappedStatement,
        _param: &mut Param,
    ) -> MapperResult<()> {
        Ok(())
    }

    fn process_after(
        &self,
        _context: &mut KeyContext<'_>,
        _statement: &MappedStatement,
        _outcome: &UpdateOutcome,
        _param: &mut Param,
    ) -> MapperResult<()> {
        Ok(())
    }

    /// Whether the driver must report generated keys for the statement.
    fn requests_generated_keys(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoKeyGenerator;

impl KeyGenerator for NoKeyGenerator {}

/// Copies driver-generated keys onto the key properties after an insert.
///
/// A list parameter (or a map holding one under `list`, `collection` or
/// `array`) receives one generated row per element.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeneratedKeysGenerator;

impl GeneratedKeysGenerator {
    fn assign_batch(
        items: &mut [Param],
        keys: &ResultSet,
        key_properties: &[String],
        key_columns: &[String],
    ) -> MapperResult<()> {
        if keys.rows.len() > items.len() {
            return Err(too_many_keys(items.len()));
        }
        for (index, item) in items.iter_mut().enumerate().take(keys.rows.len()) {
            assign_row(item, keys, index, key_properties, key_columns)?;
        }
        Ok(())
    }
}

impl KeyGenerator for GeneratedKeysGenerator {
    fn process_after(
        &self,
        _context: &mut KeyContext<'_>,
        statement: &MappedStatement,
        outcome: &UpdateOutcome,
        param: &mut Param,
    ) -> MapperResult<()> {
        let key_properties = statement.key_properties();
        let keys = &outcome.generated_keys;
        if key_properties.is_empty() || keys.is_empty() || param.is_null() {
            return Ok(());
        }
        debug!(
            statement = %statement.id(),
            keys = keys.rows.len(),
            "Assigning generated keys"
        );
        let key_columns = statement.key_columns();
        if let Param::List(items) = param {
            return Self::assign_batch(items, keys, key_properties, key_columns);
        }
        if let Param::Map(map) = param {
            let batch = BATCH_NAMES
                .iter()
                .copied()
                .find(|name| matches!(map.get(name), Some(Param::List(_))));
            if let Some(Param::List(items)) = batch.and_then(|name| map.get_mut(name)) {
                return Self::assign_batch(items, keys, key_properties, key_columns);
            }
        }
        if keys.rows.len() > 1 {
            return Err(too_many_keys(1));
        }
        assign_row(param, keys, 0, key_properties, key_columns)
    }

    fn requests_generated_keys(&self) -> bool {
        true
    }
}

fn too_many_keys(targets: usize) -> MapperError {
    MapperError::cardinality(format!(
        "Too many keys are generated. There are only {targets} target objects. \
         You either specified a wrong 'keyProperty' or the driver reported extra rows."
    ))
}

/// Write generated row `index` onto `target`. Each key property reads the
/// matching key column, or the column at the same position.
fn assign_row(
    target: &mut Param,
    keys: &ResultSet,
    index: usize,
    key_properties: &[String],
    key_columns: &[String],
) -> MapperResult<()> {
    let Some(row) = keys.row(index) else {
        return Ok(());
    };
    for (position, property) in key_properties.iter().enumerate() {
        let value = match key_columns.get(position) {
            Some(column) => row.get(column),
            None => row.get_at(position),
        };
        let Some(value) = value else {
            debug!(property = %property, "No generated key column for key property");
            continue;
        };
        assign_key(target, property, value.clone())?;
    }
    Ok(())
}

/// Set one key property. A bare property name on a map with a single entity
/// argument addresses that entity.
fn assign_key(target: &mut Param, property: &str, value: Value) -> MapperResult<()> {
    if let Param::Map(map) = target {
        if !property.contains('.') && !map.contains_key(property) && map.len() == 1 {
            let name = map.names().next().map(str::to_string);
            if let Some(Param::Entity(entity)) = name.as_deref().and_then(|n| map.get_mut(n)) {
                return entity.set_property(property, value);
            }
        }
    }
    if !target.has_setter(property) {
        return Err(MapperError::reflection(format!(
            "No setter found for the keyProperty '{property}' in '{}'.",
            target.type_name()
        )));
    }
    target.set_value(property, value)
}

/// Runs a separate select statement before or after the insert and copies
/// its single row onto the key properties.
#[derive(Debug, Clone)]
pub struct SelectKeyGenerator {
    key_statement_id: String,
    execute_before: bool,
}

impl SelectKeyGenerator {
    /// Conventional id suffix of a select-key statement.
    pub const SELECT_KEY_SUFFIX: &'static str = "!selectKey";

    pub fn new(key_statement_id: impl Into<String>, execute_before: bool) -> Self {
        Self {
            key_statement_id: key_statement_id.into(),
            execute_before,
        }
    }

    pub fn key_statement_id(&self) -> &str {
        &self.key_statement_id
    }

    pub fn execute_before(&self) -> bool {
        self.execute_before
    }

    fn process_generated_keys(
        &self,
        context: &mut KeyContext<'_>,
        statement: &MappedStatement,
        param: &mut Param,
    ) -> MapperResult<()> {
        let key_properties = statement.key_properties();
        if param.is_null() || key_properties.is_empty() {
            return Ok(());
        }
        let key_statement = context.configuration().get_statement(&self.key_statement_id)?;
        let mut rows = context.select(&self.key_statement_id, param)?;
        let result = match rows.len() {
            0 => return Err(MapperError::cardinality("SelectKey returned no data.")),
            1 => rows.remove(0),
            _ => {
                return Err(MapperError::cardinality(
                    "SelectKey returned more than one value.",
                ));
            }
        };
        debug!(
            statement = %statement.id(),
            key_statement = %self.key_statement_id,
            "Assigning selected key"
        );

        if let [property] = key_properties {
            let value = if result.has_getter(property) {
                result.get_property(property)?
            } else {
                // The key statement returns the key itself.
                result.into_value()?
            };
            return assign_key(param, property, value);
        }

        let key_columns = key_statement.key_columns();
        if key_columns.is_empty() {
            for property in key_properties {
                assign_key(param, property, result.get_property(property)?)?;
            }
        } else if key_columns.len() != key_properties.len() {
            return Err(MapperError::configuration(
                "If SelectKey has key columns, the number must match the number of key properties.",
            ));
        } else {
            for (property, column) in key_properties.iter().zip(key_columns) {
                assign_key(param, property, result.get_property(column)?)?;
            }
        }
        Ok(())
    }
}

impl KeyGenerator for SelectKeyGenerator {
    fn process_before(
        &self,
        context: &mut KeyContext<'_>,
        statement: &MappedStatement,
        param: &mut Param,
    ) -> MapperResult<()> {
        if self.execute_before {
            self.process_generated_keys(context, statement, param)?;
        }
        Ok(())
    }

    fn process_after(
        &self,
        context: &mut KeyContext<'_>,
        statement: &MappedStatement,
        _outcome: &UpdateOutcome,
        param: &mut Param,
    ) -> MapperResult<()> {
        if !self.execute_before {
            self.process_generated_keys(context, statement, param)?;
        }
        Ok(())
    }
}
