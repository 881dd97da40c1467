//! Command preparation and execution.

use crate::driver::{Connection, PreparedCommand};
use crate::error::MapperResult;
use crate::executor::keygen::KeyContext;
use crate::executor::parameter::ParameterHandler;
use crate::executor::result_handler::ResultHandler;
use crate::executor::result_set::ResultSetHandler;
use crate::mapping::{BoundSql, CommandKind, MappedStatement, ResultObject, RowBounds};
use crate::plugin::{Execution, InterceptionPoint};
use crate::reflection::Param;
use crate::session::Configuration;
use std::time::{Duration, Instant};
use tracing::debug;

/// Runs one mapped statement on a connection: prepare, bind, execute, map.
pub struct StatementHandler<'a> {
    configuration: &'a Configuration,
    statement: &'a MappedStatement,
    bound_sql: BoundSql,
    row_bounds: RowBounds,
}

impl<'a> StatementHandler<'a> {
    pub fn new(
        configuration: &'a Configuration,
        statement: &'a MappedStatement,
        bound_sql: BoundSql,
        row_bounds: RowBounds,
    ) -> Self {
        Self {
            configuration,
            statement,
            bound_sql,
            row_bounds,
        }
    }

    pub fn bound_sql(&self) -> &BoundSql {
        &self.bound_sql
    }

    /// Create the command and apply timeout, fetch size and key retrieval.
    ///
    /// The timeout is the statement's own (or the configured default),
    /// capped by whatever remains of the transaction's timeout.
    pub fn prepare(
        &self,
        connection: &mut dyn Connection,
        transaction_timeout: Option<Duration>,
    ) -> MapperResult<PreparedCommand> {
        let settings = self.configuration.settings();
        let statement_timeout = self
            .statement
            .timeout()
            .or(settings.default_statement_timeout);
        let timeout = match (statement_timeout, transaction_timeout) {
            (Some(s), Some(t)) => Some(s.min(t)),
            (s, t) => s.or(t),
        };
        let fetch_size = self.statement.fetch_size().or(settings.default_fetch_size);
        let return_generated_keys = self.statement.command() == CommandKind::Insert
            && self.statement.key_generator().requests_generated_keys();

        debug!(statement = %self.statement.id(), sql = %self.bound_sql.sql(), "Preparing");
        let mut command = connection.prepare(self.bound_sql.sql())?;
        self.configuration.interceptors().run(
            InterceptionPoint::Prepare,
            self.statement.id(),
            &mut command,
            |cmd| {
                cmd.timeout = timeout;
                cmd.fetch_size = fetch_size;
                cmd.return_generated_keys = return_generated_keys;
                Ok(())
            },
        )?;
        Ok(command)
    }

    pub fn parameterize(&self, command: &mut PreparedCommand, param: &Param) -> MapperResult<()> {
        ParameterHandler::new(self.configuration.type_registry(), &self.bound_sql, param)
            .set_parameters(command)
    }

    pub fn query(
        &self,
        connection: &mut dyn Connection,
        command: &mut PreparedCommand,
        handler: Option<&mut dyn ResultHandler>,
    ) -> MapperResult<Vec<ResultObject>> {
        let start = Instant::now();
        let result_set = self
            .configuration
            .interceptors()
            .run(InterceptionPoint::Execute, self.statement.id(), command, |cmd| {
                connection.query(cmd).map(Execution::Query)
            })?
            .into_result_set()?;
        debug!(
            statement = %self.statement.id(),
            rows = result_set.rows.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Query executed"
        );
        ResultSetHandler::new(self.configuration.type_registry(), self.statement, self.row_bounds)
            .handle_result_set(&result_set, handler)
    }

    /// Execute a write and run the key generator's post-hook.
    pub fn update(
        &self,
        connection: &mut dyn Connection,
        command: &mut PreparedCommand,
        param: &mut Param,
    ) -> MapperResult<u64> {
        let start = Instant::now();
        let outcome = self
            .configuration
            .interceptors()
            .run(InterceptionPoint::Execute, self.statement.id(), command, |cmd| {
                connection.execute(cmd).map(Execution::Update)
            })?
            .into_update_outcome()?;
        debug!(
            statement = %self.statement.id(),
            rows_affected = outcome.rows_affected,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Update executed"
        );
        let mut context = KeyContext::new(self.configuration, connection);
        self.statement
            .key_generator()
            .process_after(&mut context, self.statement, &outcome, param)?;
        Ok(outcome.rows_affected)
    }
}
