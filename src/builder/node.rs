//! Dynamic SQL node contract.
//!
//! Templating languages build a tree of [`SqlNode`]s; applying the tree to
//! a [`DynamicContext`] appends SQL fragments and may bind extra values
//! that placeholders can reference by name.

use crate::error::MapperResult;
use crate::reflection::{Param, ParamMap};
use crate::value::Value;

/// Name under which the whole parameter object is bound.
pub const PARAMETER_OBJECT_KEY: &str = "_parameter";

/// Accumulates SQL text and bindings while a node tree is applied.
#[derive(Debug)]
pub struct DynamicContext<'a> {
    parameter: &'a Param,
    bindings: ParamMap,
    sql: Vec<String>,
}

impl<'a> DynamicContext<'a> {
    pub fn new(parameter: &'a Param) -> Self {
        let mut bindings = ParamMap::new();
        bindings.insert(PARAMETER_OBJECT_KEY, parameter.clone());
        Self {
            parameter,
            bindings,
            sql: Vec::new(),
        }
    }

    pub fn parameter(&self) -> &'a Param {
        self.parameter
    }

    pub fn bind(&mut self, name: impl Into<String>, value: impl Into<Param>) {
        self.bindings.insert(name, value);
    }

    pub fn bindings(&self) -> &ParamMap {
        &self.bindings
    }

    pub fn append_sql(&mut self, sql: &str) {
        let trimmed = sql.trim();
        if !trimmed.is_empty() {
            self.sql.push(trimmed.to_string());
        }
    }

    pub fn sql(&self) -> String {
        self.sql.join(" ")
    }

    /// Consume the context, returning the assembled SQL and bindings.
    pub fn finish(self) -> (String, ParamMap) {
        (self.sql.join(" "), self.bindings)
    }
}

/// One fragment of a dynamic statement.
pub trait SqlNode: Send + Sync {
    /// Apply to the context; returns whether anything was contributed.
    fn apply(&self, context: &mut DynamicContext<'_>) -> MapperResult<bool>;
}

/// Literal text.
#[derive(Debug, Clone)]
pub struct StaticTextSqlNode {
    text: String,
}

impl StaticTextSqlNode {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl SqlNode for StaticTextSqlNode {
    fn apply(&self, context: &mut DynamicContext<'_>) -> MapperResult<bool> {
        context.append_sql(&self.text);
        Ok(true)
    }
}

/// Children applied in order.
pub struct MixedSqlNode {
    contents: Vec<Box<dyn SqlNode>>,
}

impl MixedSqlNode {
    pub fn new(contents: Vec<Box<dyn SqlNode>>) -> Self {
        Self { contents }
    }
}

impl SqlNode for MixedSqlNode {
    fn apply(&self, context: &mut DynamicContext<'_>) -> MapperResult<bool> {
        for node in &self.contents {
            node.apply(context)?;
        }
        Ok(true)
    }
}

type Predicate = Box<dyn Fn(&Param) -> bool + Send + Sync>;

/// Applies its contents only when the predicate holds for the parameter.
pub struct IfSqlNode {
    test: Predicate,
    contents: Box<dyn SqlNode>,
}

impl IfSqlNode {
    pub fn new(
        test: impl Fn(&Param) -> bool + Send + Sync + 'static,
        contents: Box<dyn SqlNode>,
    ) -> Self {
        Self {
            test: Box::new(test),
            contents,
        }
    }
}

impl SqlNode for IfSqlNode {
    fn apply(&self, context: &mut DynamicContext<'_>) -> MapperResult<bool> {
        if (self.test)(context.parameter()) {
            self.contents.apply(context)?;
            return Ok(true);
        }
        Ok(false)
    }
}

type Binder = Box<dyn Fn(&Param) -> MapperResult<Value> + Send + Sync>;

/// Computes a value from the parameter and binds it under a name.
pub struct BindSqlNode {
    name: String,
    value: Binder,
}

impl BindSqlNode {
    pub fn new(
        name: impl Into<String>,
        value: impl Fn(&Param) -> MapperResult<Value> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            value: Box::new(value),
        }
    }
}

impl SqlNode for BindSqlNode {
    fn apply(&self, context: &mut DynamicContext<'_>) -> MapperResult<bool> {
        let value = (self.value)(context.parameter())?;
        context.bind(self.name.clone(), Param::Scalar(value));
        Ok(true)
    }
}
