//! SQL source and bound statement building.
//!
//! A statement template contains `#{property, attr=value}` placeholders.
//! Building replaces every placeholder with a positional `?` and records a
//! [`ParameterMapping`](crate::mapping::ParameterMapping) naming the
//! property, its declared type and the converter that binds it.
//!
//! - [`RawSqlSource`] parses a static template once
//! - [`DynamicSqlSource`] assembles SQL from a [`SqlNode`] tree per call,
//!   then parses it
//! - [`StaticSqlSource`] is the parsed form both produce

pub mod expression;
pub mod node;
pub mod sql_source;
pub mod token;

pub use expression::ParameterExpression;
pub use node::{
    BindSqlNode, DynamicContext, IfSqlNode, MixedSqlNode, SqlNode, StaticTextSqlNode,
};
pub use sql_source::{
    DynamicSqlSource, RawSqlSource, SqlSource, SqlSourceBuilder, StaticSqlSource,
};
pub use token::GenericTokenParser;
