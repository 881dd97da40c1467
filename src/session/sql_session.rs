//! The caller-facing unit of work.

use crate::binding::MethodResult;
use crate::error::{MapperError, MapperResult};
use crate::executor::{Executor, ResultHandler};
use crate::mapping::{CommandKind, FromResult, ResultObject, RowBounds};
use crate::reflection::Param;
use crate::session::Configuration;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// One unit of work: an executor over one transaction.
///
/// Writes mark the session dirty; a non-auto-commit session only commits or
/// rolls back its transaction when dirty, unless forced. Dropping an open
/// session closes it, rolling back uncommitted writes.
pub struct SqlSession {
    configuration: Arc<Configuration>,
    executor: Box<dyn Executor>,
    auto_commit: bool,
    dirty: bool,
    closed: bool,
}

impl SqlSession {
    pub fn new(
        configuration: Arc<Configuration>,
        executor: Box<dyn Executor>,
        auto_commit: bool,
    ) -> Self {
        Self {
            configuration,
            executor,
            auto_commit,
            dirty: false,
            closed: false,
        }
    }

    pub fn configuration(&self) -> &Arc<Configuration> {
        &self.configuration
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// At most one row, converted to `T`.
    pub fn select_one<T: FromResult>(
        &mut self,
        statement_id: &str,
        param: &Param,
    ) -> MapperResult<Option<T>> {
        let mut rows = self.select_objects(statement_id, param, RowBounds::default(), None)?;
        match rows.len() {
            0 => Ok(None),
            1 => rows.pop().map(T::from_result).transpose(),
            n => Err(MapperError::cardinality(format!(
                "Expected one result (or null) to be returned by selectOne(), but found: {n}"
            ))),
        }
    }

    pub fn select_list<T: FromResult>(
        &mut self,
        statement_id: &str,
        param: &Param,
    ) -> MapperResult<Vec<T>> {
        self.select_list_bounded(statement_id, param, RowBounds::default())
    }

    pub fn select_list_bounded<T: FromResult>(
        &mut self,
        statement_id: &str,
        param: &Param,
        row_bounds: RowBounds,
    ) -> MapperResult<Vec<T>> {
        self.select_objects(statement_id, param, row_bounds, None)?
            .into_iter()
            .map(T::from_result)
            .collect()
    }

    /// Stream rows into `handler` instead of collecting them. Bypasses both
    /// cache levels.
    pub fn select_with_handler(
        &mut self,
        statement_id: &str,
        param: &Param,
        row_bounds: RowBounds,
        handler: &mut dyn ResultHandler,
    ) -> MapperResult<()> {
        self.select_objects(statement_id, param, row_bounds, Some(handler))?;
        Ok(())
    }

    fn select_objects(
        &mut self,
        statement_id: &str,
        param: &Param,
        row_bounds: RowBounds,
        handler: Option<&mut dyn ResultHandler>,
    ) -> MapperResult<Vec<ResultObject>> {
        let statement = self.configuration.get_statement(statement_id)?;
        self.executor.query(&statement, param, row_bounds, handler)
    }

    pub fn insert(&mut self, statement_id: &str, param: &mut Param) -> MapperResult<u64> {
        self.update(statement_id, param)
    }

    pub fn update(&mut self, statement_id: &str, param: &mut Param) -> MapperResult<u64> {
        let statement = self.configuration.get_statement(statement_id)?;
        self.dirty = true;
        self.executor.update(&statement, param)
    }

    pub fn delete(&mut self, statement_id: &str, param: &mut Param) -> MapperResult<u64> {
        self.update(statement_id, param)
    }

    /// Run a registered mapper method.
    pub fn invoke(
        &mut self,
        namespace: &str,
        method: &str,
        param: &mut Param,
    ) -> MapperResult<MethodResult> {
        let (statement_id, command) = {
            let method = self.configuration.mapper_method(namespace, method)?;
            (method.statement_id().to_string(), method.command())
        };
        match command {
            CommandKind::Select => Ok(MethodResult::Rows(self.select_list(&statement_id, param)?)),
            CommandKind::Insert | CommandKind::Update | CommandKind::Delete => {
                Ok(MethodResult::Affected(self.update(&statement_id, param)?))
            }
            CommandKind::Unknown => Err(MapperError::configuration(format!(
                "Unknown execution method for: {statement_id}"
            ))),
        }
    }

    fn commit_or_rollback_required(&self, force: bool) -> bool {
        (!self.auto_commit && self.dirty) || force
    }

    pub fn commit(&mut self) -> MapperResult<()> {
        self.commit_with(false)
    }

    /// Commit even if the session made no writes.
    pub fn commit_force(&mut self) -> MapperResult<()> {
        self.commit_with(true)
    }

    fn commit_with(&mut self, force: bool) -> MapperResult<()> {
        let required = self.commit_or_rollback_required(force);
        self.executor.commit(required)?;
        self.dirty = false;
        Ok(())
    }

    pub fn rollback(&mut self) -> MapperResult<()> {
        self.rollback_with(false)
    }

    pub fn rollback_force(&mut self) -> MapperResult<()> {
        self.rollback_with(true)
    }

    fn rollback_with(&mut self, force: bool) -> MapperResult<()> {
        let required = self.commit_or_rollback_required(force);
        self.executor.rollback(required)?;
        self.dirty = false;
        Ok(())
    }

    pub fn clear_cache(&mut self) {
        self.executor.clear_local_cache();
    }

    /// Release the transaction, rolling back uncommitted writes.
    pub fn close(&mut self) -> MapperResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let force_rollback = self.commit_or_rollback_required(false);
        debug!(dirty = self.dirty, force_rollback, "Closing session");
        self.dirty = false;
        self.executor.close(force_rollback)
    }
}

impl Drop for SqlSession {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "Failed to close session");
        }
    }
}

impl fmt::Debug for SqlSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlSession")
            .field("auto_commit", &self.auto_commit)
            .field("dirty", &self.dirty)
            .field("closed", &self.closed)
            .finish()
    }
}
