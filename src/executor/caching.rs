//! Second-level cache decorator.

use crate::cache::{Cache, CacheKey, CacheValue, TransactionalCacheManager};
use crate::error::{MapperError, MapperResult};
use crate::executor::Executor;
use crate::executor::result_handler::ResultHandler;
use crate::mapping::{BoundSql, MappedStatement, ResultObject, RowBounds};
use crate::reflection::Param;
use std::sync::Arc;
use tracing::debug;

/// Serves reads from the statement's namespace cache.
///
/// Writes to shared caches go through a [`TransactionalCacheManager`]: a
/// session sees its own pending entries, other sessions see them only after
/// commit, and nobody sees them after rollback.
pub struct CachingExecutor {
    delegate: Box<dyn Executor>,
    tcm: TransactionalCacheManager,
}

impl CachingExecutor {
    pub fn new(delegate: Box<dyn Executor>) -> Self {
        Self {
            delegate,
            tcm: TransactionalCacheManager::new(),
        }
    }

    fn flush_cache_if_required(&mut self, statement: &MappedStatement) {
        if let Some(cache) = statement.cache() {
            if statement.flush_cache_required() {
                debug!(statement = %statement.id(), cache = %cache.id(), "Scheduling cache clear");
                self.tcm.clear(cache);
            }
        }
    }

    fn cached_query(
        &mut self,
        cache: &Arc<dyn Cache>,
        statement: &MappedStatement,
        param: &Param,
        row_bounds: RowBounds,
        key: CacheKey,
        bound_sql: BoundSql,
    ) -> MapperResult<Vec<ResultObject>> {
        if let Some(CacheValue::Rows(rows)) = self.tcm.get_object(cache, &key) {
            debug!(statement = %statement.id(), cache = %cache.id(), "Second-level cache hit");
            return Ok(rows.as_ref().clone());
        }
        let rows = self.delegate.query_with_key(
            statement,
            param,
            row_bounds,
            None,
            key.clone(),
            bound_sql,
        )?;
        self.tcm
            .put_object(cache, key, CacheValue::Rows(Arc::new(rows.clone())));
        Ok(rows)
    }
}

impl Executor for CachingExecutor {
    fn query(
        &mut self,
        statement: &MappedStatement,
        param: &Param,
        row_bounds: RowBounds,
        handler: Option<&mut dyn ResultHandler>,
    ) -> MapperResult<Vec<ResultObject>> {
        let bound_sql = statement.bound_sql(param)?;
        let key = self
            .delegate
            .create_cache_key(statement, param, row_bounds, &bound_sql)?;
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
        if self.delegate.is_closed() {
            return Err(MapperError::executor_closed("query"));
        }
        if let Some(cache) = statement.cache().cloned() {
            self.flush_cache_if_required(statement);
            if statement.use_cache() && handler.is_none() {
                return self.cached_query(&cache, statement, param, row_bounds, key, bound_sql);
            }
        }
        self.delegate
            .query_with_key(statement, param, row_bounds, handler, key, bound_sql)
    }

    fn update(&mut self, statement: &MappedStatement, param: &mut Param) -> MapperResult<u64> {
        if self.delegate.is_closed() {
            return Err(MapperError::executor_closed("update"));
        }
        self.flush_cache_if_required(statement);
        self.delegate.update(statement, param)
    }

    fn commit(&mut self, required: bool) -> MapperResult<()> {
        self.delegate.commit(required)?;
        self.tcm.commit();
        Ok(())
    }

    fn rollback(&mut self, required: bool) -> MapperResult<()> {
        let result = self.delegate.rollback(required);
        if required {
            self.tcm.rollback();
        }
        result
    }

    fn close(&mut self, force_rollback: bool) -> MapperResult<()> {
        if !self.delegate.is_closed() {
            if force_rollback {
                self.tcm.rollback();
            } else {
                self.tcm.commit();
            }
        }
        self.delegate.close(force_rollback)
    }

    fn is_closed(&self) -> bool {
        self.delegate.is_closed()
    }

    fn clear_local_cache(&mut self) {
        self.delegate.clear_local_cache();
    }

    fn create_cache_key(
        &self,
        statement: &MappedStatement,
        param: &Param,
        row_bounds: RowBounds,
        bound_sql: &BoundSql,
    ) -> MapperResult<CacheKey> {
        self.delegate
            .create_cache_key(statement, param, row_bounds, bound_sql)
    }

    fn is_cached(&self, key: &CacheKey) -> bool {
        self.delegate.is_cached(key)
    }
}
