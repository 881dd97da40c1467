//! Session executor with a local cache.

use crate::cache::CacheKey;
use crate::config::LocalCacheScope;
use crate::error::{MapperError, MapperResult};
use crate::executor::keygen::KeyContext;
use crate::executor::result_handler::ResultHandler;
use crate::executor::statement::StatementHandler;
use crate::executor::Executor;
use crate::mapping::{BoundSql, MappedStatement, ParameterMode, ResultObject, RowBounds};
use crate::reflection::Param;
use crate::session::Configuration;
use crate::transaction::Transaction;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
enum LocalEntry {
    /// A query for this key is running on this session.
    InFlight,
    Rows(Arc<Vec<ResultObject>>),
}

/// Runs statements on one transaction and caches reads for the session.
///
/// The local cache is cleared by every write, every commit and rollback,
/// and, with [`LocalCacheScope::Statement`], after every top-level query.
pub struct BaseExecutor {
    configuration: Arc<Configuration>,
    transaction: Box<dyn Transaction>,
    local_cache: HashMap<CacheKey, LocalEntry>,
    query_stack: usize,
    closed: bool,
}

impl BaseExecutor {
    pub fn new(configuration: Arc<Configuration>, transaction: Box<dyn Transaction>) -> Self {
        Self {
            configuration,
            transaction,
            local_cache: HashMap::new(),
            query_stack: 0,
            closed: false,
        }
    }

    pub fn configuration(&self) -> &Arc<Configuration> {
        &self.configuration
    }

    /// Entries currently held by the local cache.
    pub fn local_cache_size(&self) -> usize {
        self.local_cache.len()
    }

    fn ensure_open(&self, operation: &str) -> MapperResult<()> {
        if self.closed {
            return Err(MapperError::executor_closed(operation));
        }
        Ok(())
    }

    fn lookup_or_query(
        &mut self,
        statement: &MappedStatement,
        param: &Param,
        row_bounds: RowBounds,
        handler: Option<&mut dyn ResultHandler>,
        key: CacheKey,
        bound_sql: BoundSql,
    ) -> MapperResult<Vec<ResultObject>> {
        if handler.is_none() {
            match self.local_cache.get(&key) {
                Some(LocalEntry::Rows(rows)) => {
                    debug!(statement = %statement.id(), "Local cache hit");
                    return Ok(rows.as_ref().clone());
                }
                Some(LocalEntry::InFlight) => {
                    return Err(MapperError::usage(format!(
                        "Statement '{}' queried itself recursively with the same cache key",
                        statement.id()
                    )));
                }
                None => {}
            }
        }
        self.query_from_database(statement, param, row_bounds, handler, key, bound_sql)
    }

    fn query_from_database(
        &mut self,
        statement: &MappedStatement,
        param: &Param,
        row_bounds: RowBounds,
        handler: Option<&mut dyn ResultHandler>,
        key: CacheKey,
        bound_sql: BoundSql,
    ) -> MapperResult<Vec<ResultObject>> {
        let caching = handler.is_none();
        if caching {
            self.local_cache.insert(key.clone(), LocalEntry::InFlight);
        }
        let result = self.do_query(statement, param, row_bounds, handler, bound_sql);
        if caching {
            self.local_cache.remove(&key);
        }
        let rows = result?;
        if caching {
            self.local_cache
                .insert(key, LocalEntry::Rows(Arc::new(rows.clone())));
        }
        Ok(rows)
    }

    fn do_query(
        &mut self,
        statement: &MappedStatement,
        param: &Param,
        row_bounds: RowBounds,
        handler: Option<&mut dyn ResultHandler>,
        bound_sql: BoundSql,
    ) -> MapperResult<Vec<ResultObject>> {
        let timeout = self.transaction.timeout();
        let connection = self.transaction.connection()?;
        let statement_handler =
            StatementHandler::new(&self.configuration, statement, bound_sql, row_bounds);
        let mut command = statement_handler.prepare(&mut *connection, timeout)?;
        statement_handler.parameterize(&mut command, param)?;
        statement_handler.query(connection, &mut command, handler)
    }

    fn do_update(&mut self, statement: &MappedStatement, param: &mut Param) -> MapperResult<u64> {
        let timeout = self.transaction.timeout();
        let connection = self.transaction.connection()?;
        let configuration: &Configuration = &self.configuration;

        statement.key_generator().process_before(
            &mut KeyContext::new(configuration, &mut *connection),
            statement,
            param,
        )?;
        let bound_sql = statement.bound_sql(param)?;
        let statement_handler =
            StatementHandler::new(configuration, statement, bound_sql, RowBounds::default());
        let mut command = statement_handler.prepare(&mut *connection, timeout)?;
        statement_handler.parameterize(&mut command, param)?;
        statement_handler.update(connection, &mut command, param)
    }
}

impl Executor for BaseExecutor {
    fn query(
        &mut self,
        statement: &MappedStatement,
        param: &Param,
        row_bounds: RowBounds,
        handler: Option<&mut dyn ResultHandler>,
    ) -> MapperResult<Vec<ResultObject>> {
        self.ensure_open("query")?;
        let bound_sql = statement.bound_sql(param)?;
        let key = self.create_cache_key(statement, param, row_bounds, &bound_sql)?;
        self.query_with_key(statement, param, row_bounds, handler, key, bound_sql)
    }

    fn query_with_key(
        &mut self,
        statement: &MappedStatement,
        param: &Param,
        row_bounds: RowBounds,
        handler: Option<&mut dyn ResultHandler>,
        key: CacheKey,
        bound_sql: BoundSql,
    ) -> MapperResult<Vec<ResultObject>> {
        self.ensure_open("query")?;
        if self.query_stack == 0 && statement.flush_cache_required() {
            self.clear_local_cache();
        }
        self.query_stack += 1;
        let result = self.lookup_or_query(statement, param, row_bounds, handler, key, bound_sql);
        self.query_stack -= 1;
        if self.query_stack == 0
            && self.configuration.settings().local_cache_scope == LocalCacheScope::Statement
        {
            self.clear_local_cache();
        }
        result
    }

    fn update(&mut self, statement: &MappedStatement, param: &mut Param) -> MapperResult<u64> {
        self.ensure_open("update")?;
        self.clear_local_cache();
        self.do_update(statement, param)
    }

    fn commit(&mut self, required: bool) -> MapperResult<()> {
        self.ensure_open("commit")?;
        self.clear_local_cache();
        if required {
            self.transaction.commit()?;
        }
        Ok(())
    }

    fn rollback(&mut self, required: bool) -> MapperResult<()> {
        self.ensure_open("rollback")?;
        self.clear_local_cache();
        if required {
            self.transaction.rollback()?;
        }
        Ok(())
    }

    fn close(&mut self, force_rollback: bool) -> MapperResult<()> {
        if self.closed {
            return Err(MapperError::usage("Executor was already closed"));
        }
        let rolled_back = self.rollback(force_rollback);
        if let Err(e) = &rolled_back {
            warn!(error = %e, "Rollback failed while closing executor");
        }
        let released = self.transaction.close();
        self.closed = true;
        self.local_cache.clear();
        rolled_back.and(released)
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn clear_local_cache(&mut self) {
        if !self.closed {
            self.local_cache.clear();
        }
    }

    fn create_cache_key(
        &self,
        statement: &MappedStatement,
        param: &Param,
        row_bounds: RowBounds,
        bound_sql: &BoundSql,
    ) -> MapperResult<CacheKey> {
        self.ensure_open("create_cache_key")?;
        let registry = self.configuration.type_registry();
        let mut key = CacheKey::new();
        key.update(statement.id());
        key.update(row_bounds.offset as i64);
        key.update(row_bounds.limit as i64);
        key.update(bound_sql.sql());
        for mapping in bound_sql.parameter_mappings() {
            if mapping.mode == ParameterMode::Out {
                continue;
            }
            key.update(bound_sql.parameter_value(mapping, param, registry)?);
        }
        key.update(self.configuration.environment().id.as_str());
        Ok(key)
    }

    fn is_cached(&self, key: &CacheKey) -> bool {
        matches!(self.local_cache.get(key), Some(LocalEntry::Rows(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::RawSqlSource;
    use crate::config::Settings;
    use crate::datasource::UnpooledDataSource;
    use crate::driver::{
        Connection, PreparedCommand, ResultSet, SqliteDriver, UpdateOutcome,
    };
    use crate::mapping::{CommandKind, ResultType};
    use crate::reflection::{ParamMap, ParameterType};
    use crate::transaction::Environment;
    use crate::value::{ScalarType, Value};
    use parking_lot::Mutex;

    #[derive(Debug, Default)]
    struct Calls {
        queries: usize,
        updates: usize,
        commits: usize,
        rollbacks: usize,
        closes: usize,
    }

    struct CountingConnection {
        calls: Arc<Mutex<Calls>>,
    }

    impl Connection for CountingConnection {
        fn id(&self) -> u64 {
            1
        }

        fn query(&mut self, command: &PreparedCommand) -> MapperResult<ResultSet> {
            let mut calls = self.calls.lock();
            calls.queries += 1;
            let echoed = command.params.first().cloned().unwrap_or(Value::Null);
            Ok(ResultSet::single_column("v", [echoed]))
        }

        fn execute(&mut self, _command: &PreparedCommand) -> MapperResult<UpdateOutcome> {
            self.calls.lock().updates += 1;
            Ok(UpdateOutcome {
                rows_affected: 1,
                ..Default::default()
            })
        }

        fn auto_commit(&self) -> MapperResult<bool> {
            Ok(false)
        }

        fn set_auto_commit(&mut self, _auto_commit: bool) -> MapperResult<()> {
            Ok(())
        }

        fn commit(&mut self) -> MapperResult<()> {
            Ok(())
        }

        fn rollback(&mut self) -> MapperResult<()> {
            Ok(())
        }

        fn ping(&mut self, _query: Option<&str>) -> MapperResult<()> {
            Ok(())
        }

        fn is_closed(&self) -> bool {
            false
        }

        fn close(&mut self) -> MapperResult<()> {
            Ok(())
        }
    }

    struct CountingTransaction {
        connection: CountingConnection,
        calls: Arc<Mutex<Calls>>,
    }

    impl Transaction for CountingTransaction {
        fn connection(&mut self) -> MapperResult<&mut dyn Connection> {
            let connection: &mut dyn Connection = &mut self.connection;
            Ok(connection)
        }

        fn commit(&mut self) -> MapperResult<()> {
            self.calls.lock().commits += 1;
            Ok(())
        }

        fn rollback(&mut self) -> MapperResult<()> {
            self.calls.lock().rollbacks += 1;
            Ok(())
        }

        fn close(&mut self) -> MapperResult<()> {
            self.calls.lock().closes += 1;
            Ok(())
        }
    }

    struct Fixture {
        executor: BaseExecutor,
        calls: Arc<Mutex<Calls>>,
        select: MappedStatement,
        update: MappedStatement,
    }

    fn fixture(scope: LocalCacheScope) -> Fixture {
        let driver = Arc::new(SqliteDriver::new().unwrap());
        let data_source = Arc::new(UnpooledDataSource::new(driver, "sqlite::memory:"));
        let settings = Settings {
            local_cache_scope: scope,
            ..Settings::default()
        };
        let configuration =
            Arc::new(Configuration::new(Environment::new("test", data_source)).with_settings(settings));
        let registry = configuration.type_registry().clone();

        let select = MappedStatement::builder(
            "ns.echo",
            CommandKind::Select,
            Arc::new(
                RawSqlSource::new(registry.clone(), "select #{v}", ParameterType::Map).unwrap(),
            ),
        )
        .result_type(ResultType::Scalar(ScalarType::Any))
        .build();
        let update = MappedStatement::builder(
            "ns.touch",
            CommandKind::Update,
            Arc::new(RawSqlSource::new(registry, "update t set v = 1", ParameterType::Map).unwrap()),
        )
        .build();

        let calls = Arc::new(Mutex::new(Calls::default()));
        let transaction = CountingTransaction {
            connection: CountingConnection {
                calls: calls.clone(),
            },
            calls: calls.clone(),
        };
        Fixture {
            executor: BaseExecutor::new(configuration, Box::new(transaction)),
            calls,
            select,
            update,
        }
    }

    fn param(v: i64) -> Param {
        Param::Map(ParamMap::new().with("v", Param::scalar(v)))
    }

    #[test]
    fn test_session_scope_serves_repeat_from_cache() {
        let mut f = fixture(LocalCacheScope::Session);
        let first = f.executor.query(&f.select, &param(1), RowBounds::default(), None).unwrap();
        let second = f.executor.query(&f.select, &param(1), RowBounds::default(), None).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert_eq!(f.calls.lock().queries, 1);

        f.executor.query(&f.select, &param(2), RowBounds::default(), None).unwrap();
        assert_eq!(f.calls.lock().queries, 2);
    }

    #[test]
    fn test_statement_scope_requeries() {
        let mut f = fixture(LocalCacheScope::Statement);
        f.executor.query(&f.select, &param(1), RowBounds::default(), None).unwrap();
        f.executor.query(&f.select, &param(1), RowBounds::default(), None).unwrap();
        assert_eq!(f.calls.lock().queries, 2);
        assert_eq!(f.executor.local_cache_size(), 0);
    }

    #[test]
    fn test_write_invalidates_local_cache() {
        let mut f = fixture(LocalCacheScope::Session);
        f.executor.query(&f.select, &param(1), RowBounds::default(), None).unwrap();
        let mut p = Param::Null;
        assert_eq!(f.executor.update(&f.update, &mut p).unwrap(), 1);
        f.executor.query(&f.select, &param(1), RowBounds::default(), None).unwrap();
        assert_eq!(f.calls.lock().queries, 2);
        assert_eq!(f.calls.lock().updates, 1);
    }

    #[test]
    fn test_cache_key_components() {
        let f = fixture(LocalCacheScope::Session);
        let p1 = param(1);
        let bound = f.select.bound_sql(&p1).unwrap();
        let a = f.executor.create_cache_key(&f.select, &p1, RowBounds::default(), &bound).unwrap();
        let b = f.executor.create_cache_key(&f.select, &p1, RowBounds::default(), &bound).unwrap();
        assert_eq!(a, b);
        let c = f.executor.create_cache_key(&f.select, &param(2), RowBounds::default(), &bound).unwrap();
        assert_ne!(a, c);
        let d = f.executor.create_cache_key(&f.select, &p1, RowBounds::new(1, 5), &bound).unwrap();
        assert_ne!(a, d);
        // id, offset, limit, sql, one parameter, environment
        assert_eq!(a.update_count(), 6);
    }

    #[test]
    fn test_commit_and_rollback_clear_and_delegate() {
        let mut f = fixture(LocalCacheScope::Session);
        f.executor.query(&f.select, &param(1), RowBounds::default(), None).unwrap();
        f.executor.commit(false).unwrap();
        assert_eq!(f.executor.local_cache_size(), 0);
        assert_eq!(f.calls.lock().commits, 0);
        f.executor.commit(true).unwrap();
        f.executor.rollback(true).unwrap();
        assert_eq!(f.calls.lock().commits, 1);
        assert_eq!(f.calls.lock().rollbacks, 1);
    }

    #[test]
    fn test_closed_executor_rejects_use() {
        let mut f = fixture(LocalCacheScope::Session);
        f.executor.close(true).unwrap();
        assert!(f.executor.is_closed());
        assert_eq!(f.calls.lock().rollbacks, 1);
        assert_eq!(f.calls.lock().closes, 1);

        let err = f
            .executor
            .query(&f.select, &param(1), RowBounds::default(), None)
            .unwrap_err();
        assert!(matches!(err, MapperError::ExecutorClosed { .. }));
        assert!(matches!(f.executor.close(false), Err(MapperError::Usage { .. })));
        assert_eq!(f.calls.lock().closes, 1);
    }

    #[test]
    fn test_flush_required_select_clears_first() {
        let mut f = fixture(LocalCacheScope::Session);
        let flushing = MappedStatement::builder(
            "ns.echo",
            CommandKind::Select,
            f.select.sql_source().clone(),
        )
        .result_type(ResultType::Scalar(ScalarType::Any))
        .flush_cache_required(true)
        .build();
        f.executor.query(&f.select, &param(1), RowBounds::default(), None).unwrap();
        f.executor.query(&flushing, &param(1), RowBounds::default(), None).unwrap();
        f.executor.query(&f.select, &param(1), RowBounds::default(), None).unwrap();
        assert_eq!(f.calls.lock().queries, 2);
    }
}
