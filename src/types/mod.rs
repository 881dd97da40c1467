//! Type coercion registry.
//!
//! Converters move values between parameter objects and prepared commands,
//! and between result rows and object properties. The registry resolves a
//! converter from a declared [`ScalarType`] plus an optional database type
//! tag ([`DbTypeTag`]), falling back to the type's default converter.

pub mod converters;
pub mod registry;

pub use converters::{ObjectConverter, ScalarConverter, TypeConverter};
pub use registry::TypeConverterRegistry;

use serde::Serialize;
use std::fmt;

/// Database-side type annotation (`jdbcType=...` in placeholders).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DbTypeTag {
    Bit,
    Boolean,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Float,
    Real,
    Double,
    Numeric,
    Decimal,
    Char,
    Varchar,
    LongVarchar,
    Clob,
    Blob,
    Binary,
    Varbinary,
    Date,
    Time,
    Timestamp,
    Null,
    Other,
}

impl DbTypeTag {
    /// Parse a tag name, case-insensitively.
    pub fn from_name(name: &str) -> Option<Self> {
        let tag = match name.trim().to_ascii_uppercase().as_str() {
            "BIT" => Self::Bit,
            "BOOLEAN" => Self::Boolean,
            "TINYINT" => Self::TinyInt,
            "SMALLINT" => Self::SmallInt,
            "INTEGER" | "INT" => Self::Integer,
            "BIGINT" => Self::BigInt,
            "FLOAT" => Self::Float,
            "REAL" => Self::Real,
            "DOUBLE" => Self::Double,
            "NUMERIC" => Self::Numeric,
            "DECIMAL" => Self::Decimal,
            "CHAR" => Self::Char,
            "VARCHAR" => Self::Varchar,
            "LONGVARCHAR" => Self::LongVarchar,
            "CLOB" => Self::Clob,
            "BLOB" => Self::Blob,
            "BINARY" => Self::Binary,
            "VARBINARY" => Self::Varbinary,
            "DATE" => Self::Date,
            "TIME" => Self::Time,
            "TIMESTAMP" | "DATETIME" => Self::Timestamp,
            "NULL" => Self::Null,
            "OTHER" => Self::Other,
            _ => return None,
        };
        Some(tag)
    }

    /// Tags that force a textual representation on the database side.
    pub fn is_textual(&self) -> bool {
        matches!(
            self,
            Self::Char | Self::Varchar | Self::LongVarchar | Self::Clob
        )
    }
}

impl fmt::Display for DbTypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format!("{self:?}").to_ascii_uppercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_from_name() {
        assert_eq!(DbTypeTag::from_name("varchar"), Some(DbTypeTag::Varchar));
        assert_eq!(DbTypeTag::from_name(" NUMERIC "), Some(DbTypeTag::Numeric));
        assert_eq!(DbTypeTag::from_name("JSONB"), None);
    }

    #[test]
    fn test_tag_display() {
        assert_eq!(DbTypeTag::BigInt.to_string(), "BIGINT");
    }
}
