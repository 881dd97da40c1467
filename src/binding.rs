//! Mapper registry.
//!
//! Maps `(namespace, method)` pairs to statement ids. A typed data-access
//! interface is a thin hand-written struct that forwards each method to
//! [`SqlSession::invoke`](crate::session::SqlSession::invoke):
//!
//! ```ignore
//! struct UserMapper<'s>(&'s mut SqlSession);
//!
//! impl UserMapper<'_> {
//!     fn find(&mut self, id: i64) -> MapperResult<Vec<ResultObject>> {
//!         let mut param = Param::scalar(id);
//!         self.0.invoke("users", "find", &mut param)?.into_rows()
//!     }
//! }
//! ```

use crate::error::{MapperError, MapperResult};
use crate::mapping::{CommandKind, MappedStatement, ResultObject};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// One registered method and the statement it runs.
#[derive(Debug, Clone)]
pub struct MapperMethod {
    statement_id: String,
    command: CommandKind,
}

impl MapperMethod {
    pub fn statement_id(&self) -> &str {
        &self.statement_id
    }

    pub fn command(&self) -> CommandKind {
        self.command
    }
}

/// What a mapper method returned.
#[derive(Debug, Clone)]
pub enum MethodResult {
    Rows(Vec<ResultObject>),
    Affected(u64),
}

impl MethodResult {
    pub fn into_rows(self) -> MapperResult<Vec<ResultObject>> {
        match self {
            Self::Rows(rows) => Ok(rows),
            Self::Affected(_) => Err(MapperError::usage("Mapper method returned an update count")),
        }
    }

    pub fn affected(&self) -> Option<u64> {
        match self {
            Self::Affected(count) => Some(*count),
            Self::Rows(_) => None,
        }
    }
}

/// Registered namespaces and their methods.
#[derive(Debug, Clone, Default)]
pub struct MapperRegistry {
    mappers: HashMap<String, HashMap<String, MapperMethod>>,
}

impl MapperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_mapper(&self, namespace: &str) -> bool {
        self.mappers.contains_key(namespace)
    }

    /// Register `namespace` with its methods. Every method must resolve
    /// through `lookup` to a statement named `namespace.method`.
    pub fn add_mapper<'m, F>(
        &mut self,
        namespace: &str,
        methods: impl IntoIterator<Item = &'m str>,
        lookup: F,
    ) -> MapperResult<()>
    where
        F: Fn(&str) -> Option<Arc<MappedStatement>>,
    {
        if self.mappers.contains_key(namespace) {
            return Err(MapperError::configuration(format!(
                "Type {namespace} is already known to the MapperRegistry."
            )));
        }
        let mut bound = HashMap::new();
        for method in methods {
            let statement_id = format!("{namespace}.{method}");
            let statement = lookup(&statement_id).ok_or_else(|| {
                MapperError::configuration(format!(
                    "Invalid bound statement (not found): {statement_id}"
                ))
            })?;
            bound.insert(
                method.to_string(),
                MapperMethod {
                    command: statement.command(),
                    statement_id,
                },
            );
        }
        debug!(namespace, methods = bound.len(), "Registered mapper");
        self.mappers.insert(namespace.to_string(), bound);
        Ok(())
    }

    pub fn resolve(&self, namespace: &str, method: &str) -> MapperResult<&MapperMethod> {
        let methods = self.mappers.get(namespace).ok_or_else(|| {
            MapperError::configuration(format!(
                "Type {namespace} is not known to the MapperRegistry."
            ))
        })?;
        methods.get(method).ok_or_else(|| {
            MapperError::configuration(format!(
                "Invalid bound statement (not found): {namespace}.{method}"
            ))
        })
    }

    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.mappers.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::StaticSqlSource;

    fn statements() -> HashMap<String, Arc<MappedStatement>> {
        let source = Arc::new(StaticSqlSource::new("select 1", Vec::new()));
        let mut map = HashMap::new();
        map.insert(
            "users.find".to_string(),
            Arc::new(MappedStatement::builder("users.find", CommandKind::Select, source.clone()).build()),
        );
        map.insert(
            "users.rename".to_string(),
            Arc::new(MappedStatement::builder("users.rename", CommandKind::Update, source).build()),
        );
        map
    }

    #[test]
    fn test_resolve_registered_method() {
        let statements = statements();
        let mut registry = MapperRegistry::new();
        registry
            .add_mapper("users", ["find", "rename"], |id| statements.get(id).cloned())
            .unwrap();
        let method = registry.resolve("users", "rename").unwrap();
        assert_eq!(method.statement_id(), "users.rename");
        assert_eq!(method.command(), CommandKind::Update);
        assert!(registry.has_mapper("users"));
    }

    #[test]
    fn test_unbound_method_rejected_at_registration() {
        let statements = statements();
        let mut registry = MapperRegistry::new();
        let err = registry
            .add_mapper("users", ["find", "purge"], |id| statements.get(id).cloned())
            .unwrap_err();
        assert!(err.to_string().contains("users.purge"));
        assert!(!registry.has_mapper("users"));
    }

    #[test]
    fn test_duplicate_namespace() {
        let statements = statements();
        let mut registry = MapperRegistry::new();
        registry
            .add_mapper("users", ["find"], |id| statements.get(id).cloned())
            .unwrap();
        let err = registry
            .add_mapper("users", ["find"], |id| statements.get(id).cloned())
            .unwrap_err();
        assert!(err.to_string().contains("already known"));
    }

    #[test]
    fn test_unknown_namespace() {
        let registry = MapperRegistry::new();
        let err = registry.resolve("orders", "find").unwrap_err();
        assert!(err.to_string().contains("not known"));
    }
}
