//! Error types for the statement mapper.
//!
//! All failures surface as [`MapperError`]. Variants follow the engine's
//! failure taxonomy: configuration problems detected while building or
//! binding a statement, connectivity failures from the pool or driver,
//! errors reported by the database itself, cardinality violations, and
//! usage errors such as operating on a closed executor.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MapperError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Reflection error: {message}")]
    Reflection { message: String },

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// e.g., "2067" for a SQLite unique constraint violation
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Timeout: {operation} exceeded {elapsed_ms}ms")]
    Timeout { operation: String, elapsed_ms: u64 },

    #[error("Cardinality error: {message}")]
    Cardinality { message: String },

    #[error("Executor was closed (operation: {operation})")]
    ExecutorClosed { operation: String },

    #[error("Usage error: {message}")]
    Usage { message: String },

    #[error("Cannot convert {value} to {target}")]
    TypeConversion { value: String, target: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Coarse classification used by diagnostics and callers deciding how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Connectivity,
    Database,
    Cardinality,
    Usage,
    Internal,
}

impl MapperError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a reflection error (missing accessor, unknown parameter).
    pub fn reflection(message: impl Into<String>) -> Self {
        Self::Reflection {
            message: message.into(),
        }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a database error with optional SQL state.
    pub fn database(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Database {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_ms,
        }
    }

    /// Create a cardinality error.
    pub fn cardinality(message: impl Into<String>) -> Self {
        Self::Cardinality {
            message: message.into(),
        }
    }

    /// Create an error for an operation attempted on a closed executor.
    pub fn executor_closed(operation: impl Into<String>) -> Self {
        Self::ExecutorClosed {
            operation: operation.into(),
        }
    }

    /// Create a usage error.
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage {
            message: message.into(),
        }
    }

    /// Create a type conversion error.
    pub fn type_conversion(value: impl std::fmt::Debug, target: impl Into<String>) -> Self {
        Self::TypeConversion {
            value: format!("{value:?}"),
            target: target.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Missing setter on a target object.
    pub fn no_setter(property: &str, type_name: &str) -> Self {
        Self::reflection(format!(
            "There is no setter for property named '{property}' in '{type_name}'"
        ))
    }

    /// Missing getter on a source object.
    pub fn no_getter(property: &str, type_name: &str) -> Self {
        Self::reflection(format!(
            "There is no getter for property named '{property}' in '{type_name}'"
        ))
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Database { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }

    /// Classify this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration { .. } | Self::Reflection { .. } => ErrorCategory::Configuration,
            Self::Connection { .. } => ErrorCategory::Connectivity,
            Self::Database { .. } | Self::TypeConversion { .. } | Self::Timeout { .. } => {
                ErrorCategory::Database
            }
            Self::Cardinality { .. } => ErrorCategory::Cardinality,
            Self::ExecutorClosed { .. } | Self::Usage { .. } => ErrorCategory::Usage,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Check if this error is retryable.
    ///
    /// Only connectivity failures qualify; the engine itself never retries
    /// outside the pool's bounded acquire loop.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }
}

/// Convert sqlx errors to MapperError.
impl From<sqlx::Error> for MapperError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => MapperError::connection(
                msg.to_string(),
                "Check the connection string format and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                MapperError::database(
                    db_err.message(),
                    code,
                    "Check the SQL syntax and referenced objects",
                )
            }
            sqlx::Error::RowNotFound => MapperError::database(
                "No rows returned",
                None,
                "Verify the query conditions match existing data",
            ),
            sqlx::Error::Io(io_err) => MapperError::connection(
                format!("I/O error: {}", io_err),
                "Check the database file and its permissions",
            ),
            sqlx::Error::Protocol(msg) => MapperError::connection(
                format!("Protocol error: {}", msg),
                "Check database driver compatibility",
            ),
            sqlx::Error::ColumnNotFound(col) => {
                MapperError::database(format!("Column not found: {}", col), None, "Check the column list")
            }
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => MapperError::internal(format!(
                "Column index {} out of bounds (len: {})",
                index, len
            )),
            sqlx::Error::ColumnDecode { index, source } => {
                MapperError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => {
                MapperError::internal(format!("Decode error: {}", source))
            }
            sqlx::Error::WorkerCrashed => MapperError::connection(
                "Database worker crashed",
                "Reopen the connection",
            ),
            _ => MapperError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for mapper operations.
pub type MapperResult<T> = Result<T, MapperError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MapperError::connection("Failed to connect", "Check credentials");
        assert!(err.to_string().contains("Connection failed"));
    }

    #[test]
    fn test_error_suggestion() {
        let err = MapperError::database("Syntax error", Some("1".to_string()), "Check SQL syntax");
        assert_eq!(err.suggestion(), Some("Check SQL syntax"));
        assert_eq!(MapperError::internal("x").suggestion(), None);
    }

    #[test]
    fn test_error_retryable() {
        assert!(MapperError::connection("err", "sugg").is_retryable());
        assert!(!MapperError::cardinality("two rows").is_retryable());
        assert!(!MapperError::executor_closed("query").is_retryable());
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            MapperError::configuration("bad").category(),
            ErrorCategory::Configuration
        );
        assert_eq!(
            MapperError::no_setter("id", "User").category(),
            ErrorCategory::Configuration
        );
        assert_eq!(
            MapperError::executor_closed("commit").category(),
            ErrorCategory::Usage
        );
        assert_eq!(
            MapperError::connection("pool", "wait").category(),
            ErrorCategory::Connectivity
        );
    }

    #[test]
    fn test_accessor_messages() {
        let err = MapperError::no_setter("userName", "User");
        assert!(err.to_string().contains("no setter for property named 'userName'"));
        let err = MapperError::no_getter("id", "Activity");
        assert!(err.to_string().contains("in 'Activity'"));
    }
}
