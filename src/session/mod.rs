//! Sessions and the configuration they share.
//!
//! A [`Configuration`] holds every statement, cache and converter and is
//! built once. A [`SqlSessionFactory`] opens [`SqlSession`]s from it, each
//! owning one executor and one transaction.

pub mod configuration;
pub mod factory;
pub mod sql_session;

pub use crate::config::LocalCacheScope;
pub use crate::transaction::Environment;
pub use configuration::Configuration;
pub use factory::SqlSessionFactory;
pub use sql_session::SqlSession;
