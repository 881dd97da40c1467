//! The engine-wide configuration value.

use crate::binding::{MapperMethod, MapperRegistry};
use crate::builder::{RawSqlSource, SqlSource};
use crate::cache::Cache;
use crate::config::Settings;
use crate::error::{MapperError, MapperResult};
use crate::executor::{BaseExecutor, CachingExecutor, Executor, GeneratedKeysGenerator};
use crate::mapping::{CommandKind, MappedStatement, MappedStatementBuilder, ResultMap};
use crate::plugin::{Interceptor, InterceptorChain};
use crate::reflection::ParameterType;
use crate::transaction::{Environment, Transaction};
use crate::types::TypeConverterRegistry;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Statements, caches, result maps, converters, interceptors and mappers.
///
/// Built once at startup, then shared behind an `Arc` by every session.
/// Nothing here changes after the first session opens.
pub struct Configuration {
    environment: Environment,
    settings: Settings,
    type_registry: Arc<TypeConverterRegistry>,
    statements: HashMap<String, Arc<MappedStatement>>,
    caches: HashMap<String, Arc<dyn Cache>>,
    result_maps: HashMap<String, Arc<ResultMap>>,
    interceptors: InterceptorChain,
    mappers: MapperRegistry,
}

impl Configuration {
    pub fn new(environment: Environment) -> Self {
        Self {
            environment,
            settings: Settings::default(),
            type_registry: Arc::new(TypeConverterRegistry::new()),
            statements: HashMap::new(),
            caches: HashMap::new(),
            result_maps: HashMap::new(),
            interceptors: InterceptorChain::new(),
            mappers: MapperRegistry::new(),
        }
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn type_registry(&self) -> &Arc<TypeConverterRegistry> {
        &self.type_registry
    }

    /// Register converters before any SQL source is built from this
    /// configuration; sources keep the registry they were built with.
    pub fn type_registry_mut(&mut self) -> &mut TypeConverterRegistry {
        Arc::make_mut(&mut self.type_registry)
    }

    /// Parse a `#{...}` template once into a reusable source.
    pub fn raw_sql_source(
        &self,
        sql: &str,
        parameter_type: ParameterType,
    ) -> MapperResult<Arc<dyn SqlSource>> {
        Ok(Arc::new(RawSqlSource::new(
            self.type_registry.clone(),
            sql,
            parameter_type,
        )?))
    }

    /// Start a statement with the configuration's defaults applied: the
    /// namespace cache when one is registered, and generated keys for
    /// inserts when `use_generated_keys` is set.
    pub fn statement_builder(
        &self,
        id: &str,
        command: CommandKind,
        sql_source: Arc<dyn SqlSource>,
    ) -> MappedStatementBuilder {
        let mut builder = MappedStatement::builder(id, command, sql_source);
        if let Some((namespace, _)) = id.rsplit_once('.') {
            if let Some(cache) = self.caches.get(namespace) {
                builder = builder.cache(cache.clone());
            }
        }
        if command == CommandKind::Insert && self.settings.use_generated_keys {
            builder = builder.key_generator(Arc::new(GeneratedKeysGenerator));
        }
        builder
    }

    pub fn add_statement(&mut self, statement: MappedStatement) -> MapperResult<()> {
        let id = statement.id().to_string();
        if self.statements.contains_key(&id) {
            return Err(MapperError::configuration(format!(
                "Mapped Statements collection already contains value for {id}"
            )));
        }
        debug!(statement = %id, command = %statement.command(), "Registered statement");
        self.statements.insert(id, Arc::new(statement));
        Ok(())
    }

    pub fn has_statement(&self, id: &str) -> bool {
        self.statements.contains_key(id)
    }

    pub fn get_statement(&self, id: &str) -> MapperResult<Arc<MappedStatement>> {
        self.statements.get(id).cloned().ok_or_else(|| {
            MapperError::configuration(format!(
                "Mapped Statements collection does not contain value for {id}"
            ))
        })
    }

    pub fn statement_ids(&self) -> impl Iterator<Item = &str> {
        self.statements.keys().map(String::as_str)
    }

    /// Register a namespace's shared cache under its id.
    pub fn add_cache(&mut self, cache: Arc<dyn Cache>) -> MapperResult<()> {
        let id = cache.id().to_string();
        if self.caches.contains_key(&id) {
            return Err(MapperError::configuration(format!(
                "Caches collection already contains value for {id}"
            )));
        }
        self.caches.insert(id, cache);
        Ok(())
    }

    pub fn cache(&self, namespace: &str) -> Option<&Arc<dyn Cache>> {
        self.caches.get(namespace)
    }

    pub fn add_result_map(&mut self, result_map: ResultMap) -> MapperResult<Arc<ResultMap>> {
        if self.result_maps.contains_key(&result_map.id) {
            return Err(MapperError::configuration(format!(
                "Result Maps collection already contains value for {}",
                result_map.id
            )));
        }
        let result_map = Arc::new(result_map);
        self.result_maps
            .insert(result_map.id.clone(), result_map.clone());
        Ok(result_map)
    }

    pub fn result_map(&self, id: &str) -> MapperResult<Arc<ResultMap>> {
        self.result_maps.get(id).cloned().ok_or_else(|| {
            MapperError::configuration(format!(
                "Result Maps collection does not contain value for {id}"
            ))
        })
    }

    pub fn add_interceptor(&mut self, interceptor: Arc<dyn Interceptor>) {
        self.interceptors.add(interceptor);
    }

    pub fn interceptors(&self) -> &InterceptorChain {
        &self.interceptors
    }

    /// Bind `namespace` methods to statements `namespace.method`, all of
    /// which must already be registered.
    pub fn add_mapper<'m>(
        &mut self,
        namespace: &str,
        methods: impl IntoIterator<Item = &'m str>,
    ) -> MapperResult<()> {
        let statements = &self.statements;
        self.mappers
            .add_mapper(namespace, methods, |id| statements.get(id).cloned())
    }

    pub fn has_mapper(&self, namespace: &str) -> bool {
        self.mappers.has_mapper(namespace)
    }

    pub fn mapper_method(&self, namespace: &str, method: &str) -> MapperResult<&MapperMethod> {
        self.mappers.resolve(namespace, method)
    }

    /// Executor for one unit of work, wrapped with the second-level cache
    /// when caching is enabled.
    pub fn new_executor(self: &Arc<Self>, transaction: Box<dyn Transaction>) -> Box<dyn Executor> {
        let executor = BaseExecutor::new(self.clone(), transaction);
        if self.settings.cache_enabled {
            Box::new(CachingExecutor::new(Box::new(executor)))
        } else {
            Box::new(executor)
        }
    }
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("environment", &self.environment.id)
            .field("settings", &self.settings)
            .field("statements", &self.statements.len())
            .field("caches", &self.caches.len())
            .field("result_maps", &self.result_maps.len())
            .field("interceptors", &self.interceptors.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheBuilder;
    use crate::datasource::UnpooledDataSource;
    use crate::driver::SqliteDriver;

    fn configuration() -> Configuration {
        let driver = Arc::new(SqliteDriver::new().unwrap());
        let data_source = Arc::new(UnpooledDataSource::new(driver, "sqlite::memory:"));
        Configuration::new(Environment::new("dev", data_source))
    }

    #[test]
    fn test_duplicate_statement_rejected() {
        let mut config = configuration();
        let source = config.raw_sql_source("select 1", ParameterType::Unknown).unwrap();
        config
            .add_statement(config.statement_builder("a.b", CommandKind::Select, source.clone()).build())
            .unwrap();
        let err = config
            .add_statement(config.statement_builder("a.b", CommandKind::Select, source).build())
            .unwrap_err();
        assert!(err.to_string().contains("already contains value for a.b"));
    }

    #[test]
    fn test_unknown_statement() {
        let config = configuration();
        let err = config.get_statement("missing.id").unwrap_err();
        assert!(matches!(err, MapperError::Configuration { .. }));
        assert!(err.to_string().contains("does not contain value for missing.id"));
    }

    #[test]
    fn test_builder_applies_namespace_cache_and_keys() {
        let mut config = configuration();
        config.settings_mut().use_generated_keys = true;
        config.add_cache(CacheBuilder::new("users").build()).unwrap();
        let source = config.raw_sql_source("insert into users values (1)", ParameterType::Unknown).unwrap();

        let insert = config
            .statement_builder("users.insert", CommandKind::Insert, source.clone())
            .build();
        assert_eq!(insert.cache().map(|c| c.id()), Some("users"));
        assert!(insert.key_generator().requests_generated_keys());

        let other = config
            .statement_builder("orders.insert", CommandKind::Insert, source)
            .build();
        assert!(other.cache().is_none());
    }

    #[test]
    fn test_executor_wrapping_follows_cache_setting() {
        let mut config = configuration();
        config.settings_mut().cache_enabled = false;
        let config = Arc::new(config);
        let tx = config.environment().transaction_factory.new_transaction(
            config.environment().data_source.clone(),
            None,
            true,
        );
        let executor = config.new_executor(tx);
        assert!(!executor.is_closed());
    }

    #[test]
    fn test_mapper_requires_statements() {
        let mut config = configuration();
        let source = config.raw_sql_source("select 1", ParameterType::Unknown).unwrap();
        config
            .add_statement(config.statement_builder("users.find", CommandKind::Select, source).build())
            .unwrap();
        config.add_mapper("users", ["find"]).unwrap();
        assert_eq!(
            config.mapper_method("users", "find").unwrap().statement_id(),
            "users.find"
        );
        assert!(config.add_mapper("orders", ["find"]).is_err());
    }
}
