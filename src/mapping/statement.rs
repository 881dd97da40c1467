//! Statement definitions.

use crate::builder::SqlSource;
use crate::cache::Cache;
use crate::error::MapperResult;
use crate::executor::keygen::{KeyGenerator, NoKeyGenerator};
use crate::mapping::{BoundSql, ResultMap, ResultType};
use crate::reflection::{Param, ParameterType};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CommandKind {
    Select,
    Insert,
    Update,
    Delete,
    Unknown,
}

impl CommandKind {
    pub fn is_select(&self) -> bool {
        matches!(self, Self::Select)
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Select => "SELECT",
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// Immutable description of one named SQL operation.
#[derive(Clone)]
pub struct MappedStatement {
    id: String,
    command: CommandKind,
    sql_source: Arc<dyn SqlSource>,
    parameter_type: ParameterType,
    result_maps: Vec<Arc<ResultMap>>,
    use_cache: bool,
    flush_cache_required: bool,
    cache: Option<Arc<dyn Cache>>,
    key_generator: Arc<dyn KeyGenerator>,
    key_properties: Vec<String>,
    key_columns: Vec<String>,
    timeout: Option<Duration>,
    fetch_size: Option<u32>,
}

impl MappedStatement {
    /// Start a builder. Selects default to using the cache without flushing;
    /// writes default to flushing without caching.
    pub fn builder(
        id: impl Into<String>,
        command: CommandKind,
        sql_source: Arc<dyn SqlSource>,
    ) -> MappedStatementBuilder {
        let is_select = command.is_select();
        MappedStatementBuilder {
            statement: MappedStatement {
                id: id.into(),
                command,
                sql_source,
                parameter_type: ParameterType::Unknown,
                result_maps: Vec::new(),
                use_cache: is_select,
                flush_cache_required: !is_select,
                cache: None,
                key_generator: Arc::new(NoKeyGenerator),
                key_properties: Vec::new(),
                key_columns: Vec::new(),
                timeout: None,
                fetch_size: None,
            },
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Everything before the last `.` of the id.
    pub fn namespace(&self) -> &str {
        self.id.rsplit_once('.').map(|(ns, _)| ns).unwrap_or("")
    }

    pub fn command(&self) -> CommandKind {
        self.command
    }

    pub fn sql_source(&self) -> &Arc<dyn SqlSource> {
        &self.sql_source
    }

    pub fn parameter_type(&self) -> ParameterType {
        self.parameter_type
    }

    pub fn result_maps(&self) -> &[Arc<ResultMap>] {
        &self.result_maps
    }

    pub fn use_cache(&self) -> bool {
        self.use_cache
    }

    pub fn flush_cache_required(&self) -> bool {
        self.flush_cache_required
    }

    pub fn cache(&self) -> Option<&Arc<dyn Cache>> {
        self.cache.as_ref()
    }

    pub fn key_generator(&self) -> &Arc<dyn KeyGenerator> {
        &self.key_generator
    }

    pub fn key_properties(&self) -> &[String] {
        &self.key_properties
    }

    pub fn key_columns(&self) -> &[String] {
        &self.key_columns
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn fetch_size(&self) -> Option<u32> {
        self.fetch_size
    }

    /// Bind `param` against the statement's SQL source.
    pub fn bound_sql(&self, param: &Param) -> MapperResult<BoundSql> {
        self.sql_source.bound_sql(param)
    }
}

impl fmt::Debug for MappedStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappedStatement")
            .field("id", &self.id)
            .field("command", &self.command)
            .field("use_cache", &self.use_cache)
            .field("flush_cache_required", &self.flush_cache_required)
            .field("cache", &self.cache.as_ref().map(|c| c.id().to_string()))
            .field("key_generator", &self.key_generator)
            .finish_non_exhaustive()
    }
}

pub struct MappedStatementBuilder {
    statement: MappedStatement,
}

impl MappedStatementBuilder {
    pub fn parameter_type(mut self, parameter_type: ParameterType) -> Self {
        self.statement.parameter_type = parameter_type;
        self
    }

    pub fn result_map(mut self, result_map: Arc<ResultMap>) -> Self {
        self.statement.result_maps.push(result_map);
        self
    }

    /// Inline result map with auto-mapping, named `<id>-Inline`.
    pub fn result_type(mut self, result_type: ResultType) -> Self {
        let id = format!("{}-Inline", self.statement.id);
        self.statement
            .result_maps
            .push(Arc::new(ResultMap::new(id, result_type)));
        self
    }

    pub fn use_cache(mut self, use_cache: bool) -> Self {
        self.statement.use_cache = use_cache;
        self
    }

    pub fn flush_cache_required(mut self, flush: bool) -> Self {
        self.statement.flush_cache_required = flush;
        self
    }

    pub fn cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.statement.cache = Some(cache);
        self
    }

    pub fn key_generator(mut self, key_generator: Arc<dyn KeyGenerator>) -> Self {
        self.statement.key_generator = key_generator;
        self
    }

    /// Comma-separated key property names.
    pub fn key_properties(mut self, properties: &str) -> Self {
        self.statement.key_properties = split_names(properties);
        self
    }

    /// Comma-separated key column names.
    pub fn key_columns(mut self, columns: &str) -> Self {
        self.statement.key_columns = split_names(columns);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.statement.timeout = Some(timeout);
        self
    }

    pub fn fetch_size(mut self, fetch_size: u32) -> Self {
        self.statement.fetch_size = Some(fetch_size);
        self
    }

    pub fn build(self) -> MappedStatement {
        self.statement
    }
}

fn split_names(names: &str) -> Vec<String> {
    names
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::StaticSqlSource;

    fn source() -> Arc<dyn SqlSource> {
        Arc::new(StaticSqlSource::new("select 1", Vec::new()))
    }

    #[test]
    fn test_select_defaults() {
        let ms = MappedStatement::builder("app.UserMapper.find", CommandKind::Select, source()).build();
        assert!(ms.use_cache());
        assert!(!ms.flush_cache_required());
        assert_eq!(ms.namespace(), "app.UserMapper");
    }

    #[test]
    fn test_write_defaults() {
        let ms = MappedStatement::builder("insert", CommandKind::Insert, source())
            .key_properties("id, code")
            .build();
        assert!(!ms.use_cache());
        assert!(ms.flush_cache_required());
        assert_eq!(ms.key_properties(), ["id".to_string(), "code".to_string()]);
        assert_eq!(ms.namespace(), "");
    }

    #[test]
    fn test_inline_result_map() {
        let ms = MappedStatement::builder("ns.count", CommandKind::Select, source())
            .result_type(ResultType::Scalar(crate::value::ScalarType::Int))
            .build();
        assert_eq!(ms.result_maps()[0].id, "ns.count-Inline");
    }
}
