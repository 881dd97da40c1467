//! Statement and result model.
//!
//! - `statement`: [`MappedStatement`], the immutable description of one
//!   named SQL operation
//! - `bound_sql`: [`BoundSql`], final SQL text plus ordered parameter mappings
//! - `result_map`: [`ResultMap`], how rows become objects
//! - `result`: [`ResultObject`] and the [`FromResult`] conversion trait

pub mod bound_sql;
pub mod result;
pub mod result_map;
pub mod statement;

pub use bound_sql::{BoundSql, ParameterMapping, ParameterMode};
pub use result::{FromResult, ResultObject};
pub use result_map::{ResultMap, ResultMapping, ResultType};
pub use statement::{CommandKind, MappedStatement, MappedStatementBuilder};

/// Largest number of rows a query materializes by default.
pub const NO_ROW_LIMIT: usize = i32::MAX as usize;

/// Offset/limit window applied while mapping rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowBounds {
    pub offset: usize,
    pub limit: usize,
}

impl RowBounds {
    pub const fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }

    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

impl Default for RowBounds {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: NO_ROW_LIMIT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_row_bounds() {
        let bounds = RowBounds::default();
        assert_eq!(bounds.offset, 0);
        assert_eq!(bounds.limit, i32::MAX as usize);
        assert!(bounds.is_default());
        assert!(!RowBounds::new(1, 10).is_default());
    }
}
