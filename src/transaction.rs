//! Transactions over a single connection.
//!
//! A [`Transaction`] owns at most one connection, acquired lazily from a
//! [`DataSource`] on first use and released on [`Transaction::close`].

use crate::datasource::DataSource;
use crate::driver::{Connection, IsolationLevel};
use crate::error::{MapperError, MapperResult};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Unit-of-work boundary around one connection.
pub trait Transaction: Send {
    /// The connection, acquiring it on first call.
    fn connection(&mut self) -> MapperResult<&mut dyn Connection>;

    fn commit(&mut self) -> MapperResult<()>;

    fn rollback(&mut self) -> MapperResult<()>;

    /// Release the connection. Further use acquires a new one.
    fn close(&mut self) -> MapperResult<()>;

    /// Statement timeout imposed by the transaction, if any.
    fn timeout(&self) -> Option<std::time::Duration> {
        None
    }
}

/// Transaction backed by a connection from a data source.
pub struct ConnectionTransaction {
    data_source: Arc<dyn DataSource>,
    auto_commit: bool,
    isolation: Option<IsolationLevel>,
    connection: Option<Box<dyn Connection>>,
}

impl ConnectionTransaction {
    pub fn new(
        data_source: Arc<dyn DataSource>,
        auto_commit: bool,
        isolation: Option<IsolationLevel>,
    ) -> Self {
        Self {
            data_source,
            auto_commit,
            isolation,
            connection: None,
        }
    }

    /// Wrap an existing connection.
    pub fn from_connection(data_source: Arc<dyn DataSource>, connection: Box<dyn Connection>) -> Self {
        let auto_commit = connection.auto_commit().unwrap_or(true);
        Self {
            data_source,
            auto_commit,
            isolation: None,
            connection: Some(connection),
        }
    }

    fn open_connection(&mut self) -> MapperResult<()> {
        let mut conn = self.data_source.connection()?;
        if let Some(level) = self.isolation {
            conn.set_isolation(level)?;
        }
        if conn.auto_commit()? != self.auto_commit {
            debug!(connection = conn.id(), auto_commit = self.auto_commit, "Setting auto-commit");
            conn.set_auto_commit(self.auto_commit)?;
        }
        debug!(connection = conn.id(), "Opened transaction connection");
        self.connection = Some(conn);
        Ok(())
    }

    /// Whether a connection is currently held.
    pub fn is_open(&self) -> bool {
        self.connection.is_some()
    }
}

impl fmt::Debug for ConnectionTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionTransaction")
            .field("auto_commit", &self.auto_commit)
            .field("isolation", &self.isolation)
            .field("connection", &self.connection.as_ref().map(|c| c.id()))
            .finish()
    }
}

impl Transaction for ConnectionTransaction {
    fn connection(&mut self) -> MapperResult<&mut dyn Connection> {
        if self.connection.is_none() {
            self.open_connection()?;
        }
        match self.connection.as_mut() {
            Some(conn) => Ok(conn.as_mut()),
            None => Err(MapperError::internal(
                "Transaction has no connection after opening one",
            )),
        }
    }

    fn commit(&mut self) -> MapperResult<()> {
        if let Some(conn) = self.connection.as_mut() {
            if !conn.auto_commit()? {
                debug!(connection = conn.id(), "Committing connection");
                conn.commit()?;
            }
        }
        Ok(())
    }

    fn rollback(&mut self) -> MapperResult<()> {
        if let Some(conn) = self.connection.as_mut() {
            if !conn.auto_commit()? {
                debug!(connection = conn.id(), "Rolling back connection");
                conn.rollback()?;
            }
        }
        Ok(())
    }

    fn close(&mut self) -> MapperResult<()> {
        if let Some(mut conn) = self.connection.take() {
            // Leave the connection in auto-commit mode for its next user.
            if !conn.auto_commit().unwrap_or(true) {
                conn.set_auto_commit(true)?;
            }
            debug!(connection = conn.id(), "Closing transaction connection");
            conn.close()?;
        }
        Ok(())
    }
}

/// Creates transactions.
pub trait TransactionFactory: Send + Sync + fmt::Debug {
    fn new_transaction(
        &self,
        data_source: Arc<dyn DataSource>,
        isolation: Option<IsolationLevel>,
        auto_commit: bool,
    ) -> Box<dyn Transaction>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectionTransactionFactory;

impl TransactionFactory for ConnectionTransactionFactory {
    fn new_transaction(
        &self,
        data_source: Arc<dyn DataSource>,
        isolation: Option<IsolationLevel>,
        auto_commit: bool,
    ) -> Box<dyn Transaction> {
        Box::new(ConnectionTransaction::new(data_source, auto_commit, isolation))
    }
}

/// Named pairing of a data source and a transaction factory. The id is
/// part of every cache key.
#[derive(Debug, Clone)]
pub struct Environment {
    pub id: String,
    pub transaction_factory: Arc<dyn TransactionFactory>,
    pub data_source: Arc<dyn DataSource>,
}

impl Environment {
    pub fn new(id: impl Into<String>, data_source: Arc<dyn DataSource>) -> Self {
        Self {
            id: id.into(),
            transaction_factory: Arc::new(ConnectionTransactionFactory),
            data_source,
        }
    }

    pub fn with_transaction_factory(mut self, factory: Arc<dyn TransactionFactory>) -> Self {
        self.transaction_factory = factory;
        self
    }
}
