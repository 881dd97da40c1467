//! Statement execution.
//!
//! An [`Executor`] owns one unit of work. [`BaseExecutor`] runs statements
//! on its transaction's connection and keeps the session's local cache;
//! [`CachingExecutor`] decorates it with the shared, namespace-scoped
//! second-level cache.
//!
//! # Architecture
//!
//! - `base`: [`BaseExecutor`], local cache and recursion guard
//! - `caching`: [`CachingExecutor`], transactional second-level caching
//! - `statement`: [`StatementHandler`], prepare / bind / execute
//! - `parameter`: [`ParameterHandler`], positional binding
//! - `result_set`: [`ResultSetHandler`], row-to-object mapping
//! - `keygen`: key generation strategies
//! - `result_handler`: row-by-row result sinks

pub mod base;
pub mod caching;
pub mod keygen;
pub mod parameter;
pub mod result_handler;
pub mod result_set;
pub mod statement;

pub use base::BaseExecutor;
pub use caching::CachingExecutor;
pub use keygen::{
    GeneratedKeysGenerator, KeyContext, KeyGenerator, NoKeyGenerator, SelectKeyGenerator,
};
pub use parameter::ParameterHandler;
pub use result_handler::{ResultContext, ResultHandler};
pub use result_set::{ResultSetHandler, ResultSetWrapper};
pub use statement::StatementHandler;

use crate::cache::CacheKey;
use crate::error::MapperResult;
use crate::mapping::{BoundSql, MappedStatement, ResultObject, RowBounds};
use crate::reflection::Param;

/// One unit of work's statement runner.
///
/// Not safe for concurrent use; a session owns its executor exclusively.
pub trait Executor: Send {
    /// Run a select, deriving the bound SQL and cache key.
    fn query(
        &mut self,
        statement: &MappedStatement,
        param: &Param,
        row_bounds: RowBounds,
        handler: Option<&mut dyn ResultHandler>,
    ) -> MapperResult<Vec<ResultObject>>;

    /// Run a select with a precomputed cache key and bound SQL.
    fn query_with_key(
        &mut self,
        statement: &MappedStatement,
        param: &Param,
        row_bounds: RowBounds,
        handler: Option<&mut dyn ResultHandler>,
        key: CacheKey,
        bound_sql: BoundSql,
    ) -> MapperResult<Vec<ResultObject>>;

    /// Run an insert, update or delete. Key generators may write keys back
    /// onto `param`.
    fn update(&mut self, statement: &MappedStatement, param: &mut Param) -> MapperResult<u64>;

    fn commit(&mut self, required: bool) -> MapperResult<()>;

    fn rollback(&mut self, required: bool) -> MapperResult<()>;

    /// Roll back (when forced) and release the transaction.
    fn close(&mut self, force_rollback: bool) -> MapperResult<()>;

    fn is_closed(&self) -> bool;

    fn clear_local_cache(&mut self);

    fn create_cache_key(
        &self,
        statement: &MappedStatement,
        param: &Param,
        row_bounds: RowBounds,
        bound_sql: &BoundSql,
    ) -> MapperResult<CacheKey>;

    /// Whether the local cache holds rows for `key`.
    fn is_cached(&self, key: &CacheKey) -> bool;
}
