//! Connection sources.
//!
//! - [`UnpooledDataSource`] opens a new physical connection per request.
//! - [`PooledDataSource`] leases connections from a bounded pool and takes
//!   them back when the lease is closed or dropped.

pub mod pooled;
pub mod unpooled;

pub use pooled::{PoolSettings, PoolStatus, PooledConnectionHandle, PooledDataSource};
pub use unpooled::UnpooledDataSource;

use crate::driver::{Connection, Credentials};
use crate::error::MapperResult;
use std::fmt;

/// Anything that hands out connections.
pub trait DataSource: Send + Sync + fmt::Debug {
    /// Connection using the configured credentials.
    fn connection(&self) -> MapperResult<Box<dyn Connection>>;

    /// Connection using explicit credentials.
    fn connection_as(&self, credentials: &Credentials) -> MapperResult<Box<dyn Connection>>;
}
