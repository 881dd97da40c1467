//! Session factory.

use crate::driver::IsolationLevel;
use crate::session::{Configuration, SqlSession};
use std::sync::Arc;
use tracing::debug;

/// Opens sessions against one configuration.
#[derive(Debug, Clone)]
pub struct SqlSessionFactory {
    configuration: Arc<Configuration>,
}

impl SqlSessionFactory {
    pub fn new(configuration: Configuration) -> Self {
        Self {
            configuration: Arc::new(configuration),
        }
    }

    pub fn configuration(&self) -> &Arc<Configuration> {
        &self.configuration
    }

    /// A session with auto-commit off and the data source's isolation.
    pub fn open_session(&self) -> SqlSession {
        self.open_session_with(false, None)
    }

    pub fn open_session_with(
        &self,
        auto_commit: bool,
        isolation: Option<IsolationLevel>,
    ) -> SqlSession {
        let environment = self.configuration.environment();
        let transaction = environment.transaction_factory.new_transaction(
            environment.data_source.clone(),
            isolation,
            auto_commit,
        );
        debug!(environment = %environment.id, auto_commit, "Opening session");
        let executor = self.configuration.new_executor(transaction);
        SqlSession::new(self.configuration.clone(), executor, auto_commit)
    }
}

impl From<Arc<Configuration>> for SqlSessionFactory {
    fn from(configuration: Arc<Configuration>) -> Self {
        Self { configuration }
    }
}
