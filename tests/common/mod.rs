//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use sqlmapper::config::Settings;
use sqlmapper::datasource::{PoolSettings, PooledDataSource, UnpooledDataSource};
use sqlmapper::driver::{Connection, Credentials, Driver, PreparedCommand, SqliteDriver};
use sqlmapper::error::MapperResult;
use sqlmapper::plugin::{Execution, Interceptor, Invocation};
use sqlmapper::session::{Configuration, Environment};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempPath;

#[derive(Debug, Clone, Default)]
pub struct User {
    pub id: Option<i64>,
    pub user_name: Option<String>,
    pub age: i64,
}

sqlmapper::entity!(User {
    id: Option<i64>,
    user_name: Option<String>,
    age: i64,
});

impl User {
    pub fn new(user_name: &str, age: i64) -> Self {
        Self {
            id: None,
            user_name: Some(user_name.to_string()),
            age,
        }
    }
}

/// Counts commands that reach the database.
#[derive(Debug, Default)]
pub struct ExecutionCounter {
    executions: AtomicUsize,
}

impl ExecutionCounter {
    pub fn count(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }
}

impl Interceptor for ExecutionCounter {
    fn on_execute(&self, invocation: Invocation<'_, Execution>) -> MapperResult<Execution> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        invocation.proceed()
    }
}

/// A SQLite file with a `users` table and three rows.
pub struct TestDb {
    pub path: TempPath,
    pub driver: Arc<SqliteDriver>,
}

impl TestDb {
    pub fn new() -> Self {
        let path = tempfile::NamedTempFile::new().unwrap().into_temp_path();
        let driver = Arc::new(SqliteDriver::new().unwrap());
        let db = Self { path, driver };
        let mut conn = db.driver.connect(&db.url(), &Credentials::default()).unwrap();
        for sql in [
            "CREATE TABLE users (id INTEGER PRIMARY KEY AUTOINCREMENT, user_name TEXT, age INTEGER NOT NULL DEFAULT 0)",
            "INSERT INTO users (user_name, age) VALUES ('ann', 31), ('bob', 42), ('cy', 27)",
        ] {
            conn.execute(&PreparedCommand::new(sql)).unwrap();
        }
        conn.close().unwrap();
        db
    }

    pub fn url(&self) -> String {
        format!("sqlite:{}", self.path.display())
    }

    pub fn unpooled(&self) -> UnpooledDataSource {
        UnpooledDataSource::new(self.driver.clone(), self.url())
    }

    pub fn pool(&self, settings: PoolSettings) -> Arc<PooledDataSource> {
        Arc::new(PooledDataSource::new(self.unpooled(), settings))
    }

    /// Count rows with a fresh connection, outside any session.
    pub fn count_users(&self) -> i64 {
        let mut conn = self.driver.connect(&self.url(), &Credentials::default()).unwrap();
        let rs = conn
            .query(&PreparedCommand::new("SELECT count(*) AS n FROM users"))
            .unwrap();
        let n = match rs.row(0).and_then(|r| r.get_at(0).cloned()) {
            Some(sqlmapper::Value::Int(n)) => n,
            other => panic!("unexpected count {other:?}"),
        };
        conn.close().unwrap();
        n
    }

    /// Configuration over a pool of this database with an execution counter installed.
    pub fn configuration(&self, settings: Settings) -> (Configuration, Arc<ExecutionCounter>) {
        let pool = self.pool(PoolSettings::default());
        let counter = Arc::new(ExecutionCounter::default());
        let mut configuration =
            Configuration::new(Environment::new("test", pool)).with_settings(settings);
        configuration.add_interceptor(counter.clone());
        (configuration, counter)
    }
}
