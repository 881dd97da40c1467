//! Data source without pooling.

use crate::datasource::DataSource;
use crate::driver::{Connection, Credentials, Driver, IsolationLevel};
use crate::error::MapperResult;
use std::sync::Arc;
use tracing::debug;

/// Opens a fresh physical connection for every request.
#[derive(Debug, Clone)]
pub struct UnpooledDataSource {
    driver: Arc<dyn Driver>,
    url: String,
    credentials: Credentials,
    /// Auto-commit applied to new connections; `None` keeps the driver default.
    auto_commit: Option<bool>,
    isolation: Option<IsolationLevel>,
}

impl UnpooledDataSource {
    pub fn new(driver: Arc<dyn Driver>, url: impl Into<String>) -> Self {
        Self {
            driver,
            url: url.into(),
            credentials: Credentials::default(),
            auto_commit: None,
            isolation: None,
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_auto_commit(mut self, auto_commit: bool) -> Self {
        self.auto_commit = Some(auto_commit);
        self
    }

    pub fn with_isolation(mut self, level: IsolationLevel) -> Self {
        self.isolation = Some(level);
        self
    }

    /// Auto-commit a connection is handed out with.
    pub fn default_auto_commit(&self) -> bool {
        self.auto_commit.unwrap_or(true)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    pub fn set_url(&mut self, url: impl Into<String>) {
        self.url = url.into();
    }

    pub fn set_credentials(&mut self, credentials: Credentials) {
        self.credentials = credentials;
    }

    /// Open and configure one physical connection.
    pub fn open(&self, credentials: &Credentials) -> MapperResult<Box<dyn Connection>> {
        let mut conn = self.driver.connect(&self.url, credentials)?;
        if let Some(auto_commit) = self.auto_commit {
            if conn.auto_commit()? != auto_commit {
                conn.set_auto_commit(auto_commit)?;
            }
        }
        if let Some(level) = self.isolation {
            conn.set_isolation(level)?;
        }
        debug!(
            driver = self.driver.name(),
            connection = conn.id(),
            "Opened unpooled connection"
        );
        Ok(conn)
    }
}

impl DataSource for UnpooledDataSource {
    fn connection(&self) -> MapperResult<Box<dyn Connection>> {
        self.open(&self.credentials)
    }

    fn connection_as(&self, credentials: &Credentials) -> MapperResult<Box<dyn Connection>> {
        self.open(credentials)
    }
}
