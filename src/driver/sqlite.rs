//! SQLite driver on top of `sqlx`.
//!
//! Each [`SqliteDriverConnection`] owns one `sqlx::SqliteConnection`. The
//! async calls are driven to completion on a tokio runtime shared by every
//! connection the driver opens, so callers stay synchronous. Calling into
//! the driver from inside an async task is not supported.

use crate::driver::{
    ColumnInfo, Connection, Credentials, Driver, GENERATED_KEY_COLUMN, IsolationLevel,
    PreparedCommand, ResultSet, UpdateOutcome,
};
use crate::error::{MapperError, MapperResult};
use crate::value::Value;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{Column, ConnectOptions, Connection as _, Row, Sqlite, TypeInfo, ValueRef};
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;
use tracing::{debug, warn};

/// Worker threads of the runtime backing the driver.
const DRIVER_WORKER_THREADS: usize = 2;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

/// Driver for `sqlite:` URLs.
#[derive(Debug, Clone)]
pub struct SqliteDriver {
    runtime: Arc<Runtime>,
}

impl SqliteDriver {
    /// Create a driver with its own runtime.
    pub fn new() -> MapperResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(DRIVER_WORKER_THREADS)
            .thread_name("sqlmapper-sqlite")
            .enable_all()
            .build()
            .map_err(|e| MapperError::internal(format!("Failed to start driver runtime: {e}")))?;
        Ok(Self::with_runtime(Arc::new(runtime)))
    }

    /// Create a driver that shares an existing runtime.
    pub fn with_runtime(runtime: Arc<Runtime>) -> Self {
        Self { runtime }
    }
}

impl Driver for SqliteDriver {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn accepts(&self, url: &str) -> bool {
        url.to_ascii_lowercase().starts_with("sqlite:")
    }

    fn connect(&self, url: &str, _credentials: &Credentials) -> MapperResult<Box<dyn Connection>> {
        if !self.accepts(url) {
            return Err(MapperError::connection(
                format!("Unsupported connection URL: {url}"),
                "Use a sqlite: URL, e.g. sqlite:data.db",
            ));
        }
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let conn = self.runtime.block_on(options.connect())?;
        let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        debug!(connection = id, "Opened SQLite connection");
        Ok(Box::new(SqliteDriverConnection {
            id,
            conn: Some(conn),
            runtime: self.runtime.clone(),
            auto_commit: true,
            in_transaction: false,
        }))
    }
}

/// One physical SQLite connection.
pub struct SqliteDriverConnection {
    id: u64,
    conn: Option<SqliteConnection>,
    runtime: Arc<Runtime>,
    auto_commit: bool,
    in_transaction: bool,
}

impl SqliteDriverConnection {
    fn live(&mut self) -> MapperResult<&mut SqliteConnection> {
        self.conn.as_mut().ok_or_else(|| {
            MapperError::connection("Connection is closed", "Acquire a new connection")
        })
    }

    fn run_raw(&mut self, sql: &str) -> MapperResult<()> {
        let runtime = self.runtime.clone();
        let conn = self.live()?;
        runtime.block_on(sqlx::query(sql).execute(&mut *conn))?;
        Ok(())
    }

    fn begin_if_needed(&mut self) -> MapperResult<()> {
        if !self.auto_commit && !self.in_transaction {
            self.run_raw("BEGIN")?;
            self.in_transaction = true;
        }
        Ok(())
    }
}

/// Only inserts move `last_insert_rowid`; for anything else it is stale.
fn assigns_rowids(sql: &str) -> bool {
    let verb = sql
        .trim_start()
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or_default();
    verb.eq_ignore_ascii_case("insert") || verb.eq_ignore_ascii_case("replace")
}

/// Drive `fut` to completion, bounded by `timeout` when set.
fn block_on_bounded<T, F>(runtime: &Runtime, timeout: Option<Duration>, fut: F) -> MapperResult<T>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    let start = Instant::now();
    match timeout {
        Some(limit) => runtime
            .block_on(async { tokio::time::timeout(limit, fut).await })
            .map_err(|_| MapperError::timeout("statement", start.elapsed().as_millis() as u64))?
            .map_err(MapperError::from),
        None => runtime.block_on(fut).map_err(MapperError::from),
    }
}

fn bind_value<'q>(query: SqliteQuery<'q>, value: &'q Value) -> SqliteQuery<'q> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(v) => query.bind(*v),
        Value::Int(v) => query.bind(*v),
        Value::Float(v) => query.bind(*v),
        Value::Text(v) => query.bind(v.as_str()),
        Value::Bytes(v) => query.bind(v.as_slice()),
        Value::Timestamp(v) => query.bind(*v),
    }
}

fn build_query(command: &PreparedCommand) -> SqliteQuery<'_> {
    command
        .params
        .iter()
        .fold(sqlx::query(&command.sql), bind_value)
}

/// Decode by the value's storage class rather than the declared column type.
fn decode_value(row: &SqliteRow, idx: usize) -> MapperResult<Value> {
    let raw = row.try_get_raw(idx)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let storage = raw.type_info().name().to_ascii_uppercase();
    let value = match storage.as_str() {
        "INTEGER" | "BIGINT" | "INT" | "BOOLEAN" => Value::Int(row.try_get::<i64, _>(idx)?),
        "REAL" | "FLOAT" | "DOUBLE" | "NUMERIC" => Value::Float(row.try_get::<f64, _>(idx)?),
        "BLOB" => Value::Bytes(row.try_get::<Vec<u8>, _>(idx)?),
        _ => Value::Text(row.try_get::<String, _>(idx)?),
    };
    Ok(value)
}

fn to_result_set(rows: Vec<SqliteRow>) -> MapperResult<ResultSet> {
    let columns = rows
        .first()
        .map(|row| {
            row.columns()
                .iter()
                .map(|c| {
                    let declared = c.type_info().name();
                    let declared = (!declared.eq_ignore_ascii_case("NULL"))
                        .then(|| declared.to_string());
                    ColumnInfo::new(c.name(), declared)
                })
                .collect()
        })
        .unwrap_or_default();
    let values = rows
        .iter()
        .map(|row| (0..row.len()).map(|idx| decode_value(row, idx)).collect())
        .collect::<MapperResult<Vec<Vec<Value>>>>()?;
    Ok(ResultSet::new(columns, values))
}

impl Connection for SqliteDriverConnection {
    fn id(&self) -> u64 {
        self.id
    }

    fn query(&mut self, command: &PreparedCommand) -> MapperResult<ResultSet> {
        self.begin_if_needed()?;
        let runtime = self.runtime.clone();
        let conn = self.live()?;
        let rows = block_on_bounded(
            &runtime,
            command.timeout,
            build_query(command).fetch_all(&mut *conn),
        )?;
        to_result_set(rows)
    }

    fn execute(&mut self, command: &PreparedCommand) -> MapperResult<UpdateOutcome> {
        self.begin_if_needed()?;
        let runtime = self.runtime.clone();
        let conn = self.live()?;
        let result = block_on_bounded(
            &runtime,
            command.timeout,
            build_query(command).execute(&mut *conn),
        )?;
        let rows_affected = result.rows_affected();
        let generated_keys = if command.return_generated_keys
            && rows_affected > 0
            && assigns_rowids(&command.sql)
        {
            // A multi-row INSERT assigns consecutive rowids ending at the last one.
            let last = result.last_insert_rowid();
            let first = last - rows_affected as i64 + 1;
            ResultSet::single_column(GENERATED_KEY_COLUMN, (first..=last).map(Value::Int))
        } else {
            ResultSet::default()
        };
        Ok(UpdateOutcome {
            rows_affected,
            generated_keys,
        })
    }

    fn auto_commit(&self) -> MapperResult<bool> {
        Ok(self.auto_commit)
    }

    fn set_auto_commit(&mut self, auto_commit: bool) -> MapperResult<()> {
        if auto_commit && !self.auto_commit && self.in_transaction {
            self.commit()?;
        }
        self.auto_commit = auto_commit;
        Ok(())
    }

    fn set_isolation(&mut self, level: IsolationLevel) -> MapperResult<()> {
        let pragma = match level {
            IsolationLevel::ReadUncommitted => "PRAGMA read_uncommitted = 1",
            _ => "PRAGMA read_uncommitted = 0",
        };
        self.run_raw(pragma)
    }

    fn commit(&mut self) -> MapperResult<()> {
        if self.in_transaction {
            self.run_raw("COMMIT")?;
            self.in_transaction = false;
        }
        Ok(())
    }

    fn rollback(&mut self) -> MapperResult<()> {
        if self.in_transaction {
            self.in_transaction = false;
            self.run_raw("ROLLBACK")?;
        }
        Ok(())
    }

    fn ping(&mut self, query: Option<&str>) -> MapperResult<()> {
        let runtime = self.runtime.clone();
        let conn = self.live()?;
        match query {
            Some(sql) => {
                runtime.block_on(sqlx::query(sql).fetch_all(&mut *conn))?;
            }
            None => runtime.block_on(conn.ping())?,
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.conn.is_none()
    }

    fn close(&mut self) -> MapperResult<()> {
        if let Some(conn) = self.conn.take() {
            self.in_transaction = false;
            if let Err(e) = self.runtime.block_on(conn.close()) {
                warn!(connection = self.id, error = %e, "Error closing SQLite connection");
                return Err(e.into());
            }
            debug!(connection = self.id, "Closed SQLite connection");
        }
        Ok(())
    }
}
