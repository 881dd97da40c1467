//! Physical connection layer.
//!
//! The engine is synchronous. A [`Driver`] opens [`Connection`]s; a
//! connection runs one [`PreparedCommand`] at a time and returns either a
//! tabular [`ResultSet`] or an [`UpdateOutcome`]. Transactions follow the
//! auto-commit model: when auto-commit is off, the first statement opens a
//! transaction that lasts until `commit` or `rollback`.
//!
//! # Architecture
//!
//! - `sqlite`: [`SqliteDriver`], backed by `sqlx` and driven by a tokio runtime

pub mod sqlite;

use crate::error::{MapperError, MapperResult};
use crate::value::Value;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

pub use sqlite::SqliteDriver;

/// Column label under which drivers report generated keys.
pub const GENERATED_KEY_COLUMN: &str = "generated_key";

/// User credentials passed to a driver.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Credentials {
    pub fn new(username: Option<String>, password: Option<String>) -> Self {
        Self { username, password }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Transaction isolation level requested for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

/// Opens physical connections.
pub trait Driver: Send + Sync + fmt::Debug {
    /// Short driver name for logs.
    fn name(&self) -> &str;

    /// Whether this driver understands the URL.
    fn accepts(&self, url: &str) -> bool;

    fn connect(&self, url: &str, credentials: &Credentials) -> MapperResult<Box<dyn Connection>>;
}

/// A single physical (or pooled) database connection.
pub trait Connection: Send {
    /// Identity of the underlying physical connection.
    fn id(&self) -> u64;

    /// Create a command for `sql`; fails on a closed connection.
    fn prepare(&mut self, sql: &str) -> MapperResult<PreparedCommand> {
        if self.is_closed() {
            return Err(MapperError::connection(
                "Cannot prepare a statement on a closed connection",
                "Acquire a new connection",
            ));
        }
        Ok(PreparedCommand::new(sql))
    }

    fn query(&mut self, command: &PreparedCommand) -> MapperResult<ResultSet>;

    fn execute(&mut self, command: &PreparedCommand) -> MapperResult<UpdateOutcome>;

    fn auto_commit(&self) -> MapperResult<bool>;

    /// Switching auto-commit on commits any open transaction.
    fn set_auto_commit(&mut self, auto_commit: bool) -> MapperResult<()>;

    fn set_isolation(&mut self, _level: IsolationLevel) -> MapperResult<()> {
        Ok(())
    }

    fn commit(&mut self) -> MapperResult<()>;

    fn rollback(&mut self) -> MapperResult<()>;

    /// Liveness probe: run `query` if given, otherwise a driver-native ping.
    fn ping(&mut self, query: Option<&str>) -> MapperResult<()>;

    fn is_closed(&self) -> bool;

    fn close(&mut self) -> MapperResult<()>;
}

/// SQL text plus positional parameter values, ready to run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreparedCommand {
    pub sql: String,
    pub params: Vec<Value>,
    pub return_generated_keys: bool,
    pub timeout: Option<Duration>,
    pub fetch_size: Option<u32>,
}

impl PreparedCommand {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            ..Default::default()
        }
    }

    /// Set the value at a zero-based position, growing with nulls as needed.
    pub fn bind(&mut self, index: usize, value: Value) {
        if self.params.len() <= index {
            self.params.resize(index + 1, Value::Null);
        }
        self.params[index] = value;
    }
}

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    /// Declared type as reported by the driver, e.g. "INTEGER"
    pub declared_type: Option<String>,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, declared_type: Option<String>) -> Self {
        Self {
            name: name.into(),
            declared_type,
        }
    }
}

/// A fully fetched tabular result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<ColumnInfo>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultSet {
    pub fn new(columns: Vec<ColumnInfo>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    /// One column, one row per value.
    pub fn single_column(name: &str, values: impl IntoIterator<Item = Value>) -> Self {
        Self {
            columns: vec![ColumnInfo::new(name, None)],
            rows: values.into_iter().map(|v| vec![v]).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn row(&self, index: usize) -> Option<RowView<'_>> {
        self.rows.get(index).map(|values| RowView {
            columns: &self.columns,
            values,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = RowView<'_>> {
        self.rows.iter().map(|values| RowView {
            columns: &self.columns,
            values,
        })
    }
}

/// Borrowed view of one row.
#[derive(Debug, Clone, Copy)]
pub struct RowView<'a> {
    columns: &'a [ColumnInfo],
    values: &'a [Value],
}

impl<'a> RowView<'a> {
    pub fn columns(&self) -> &'a [ColumnInfo] {
        self.columns
    }

    /// Case-insensitive column position.
    pub fn position(&self, column: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name == column)
            .or_else(|| {
                self.columns
                    .iter()
                    .position(|c| c.name.eq_ignore_ascii_case(column))
            })
    }

    pub fn get(&self, column: &str) -> Option<&'a Value> {
        self.position(column).and_then(|i| self.values.get(i))
    }

    pub fn get_at(&self, index: usize) -> Option<&'a Value> {
        self.values.get(index)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Result of a write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateOutcome {
    pub rows_affected: u64,
    /// Keys generated by the statement, when requested.
    pub generated_keys: ResultSet,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_grows_with_nulls() {
        let mut cmd = PreparedCommand::new("select ?, ?, ?");
        cmd.bind(2, Value::Int(3));
        assert_eq!(cmd.params, vec![Value::Null, Value::Null, Value::Int(3)]);
        cmd.bind(0, Value::from("a"));
        assert_eq!(cmd.params[0], Value::from("a"));
    }

    #[test]
    fn test_row_view_case_insensitive() {
        let rs = ResultSet::new(
            vec![
                ColumnInfo::new("ID", None),
                ColumnInfo::new("user_name", None),
            ],
            vec![vec![Value::Int(7), Value::from("ann")]],
        );
        let row = rs.row(0).unwrap();
        assert_eq!(row.get("id"), Some(&Value::Int(7)));
        assert_eq!(row.get("USER_NAME"), Some(&Value::from("ann")));
        assert_eq!(row.get("missing"), None);
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let c = Credentials::new(Some("root".into()), Some("secret".into()));
        let s = format!("{c:?}");
        assert!(s.contains("root"));
        assert!(!s.contains("secret"));
    }
}
