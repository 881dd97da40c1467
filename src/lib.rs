//! sqlmapper library
//!
//! Executes parameterized SQL statements, maps result rows onto typed
//! objects and caches reads at two levels: a per-session local cache and a
//! shared, transaction-aware cache per statement namespace.
//!
//! ```ignore
//! let mut configuration = Configuration::new(Environment::new("dev", data_source));
//! let source = configuration.raw_sql_source("select * from users where id = #{id}", ParameterType::Unknown)?;
//! let find = configuration
//!     .statement_builder("users.find", CommandKind::Select, source)
//!     .result_type(ResultType::entity::<User>())
//!     .build();
//! configuration.add_statement(find)?;
//!
//! let factory = SqlSessionFactory::new(configuration);
//! let mut session = factory.open_session();
//! let user: Option<User> = session.select_one("users.find", &Param::scalar(7))?;
//! ```

pub mod binding;
pub mod builder;
pub mod cache;
pub mod config;
pub mod datasource;
pub mod driver;
pub mod error;
pub mod executor;
pub mod mapping;
pub mod plugin;
pub mod reflection;
pub mod session;
pub mod transaction;
pub mod types;
pub mod value;

pub use config::{Config, Settings};
pub use error::{MapperError, MapperResult};
pub use session::{Configuration, SqlSession, SqlSessionFactory};
pub use value::Value;
