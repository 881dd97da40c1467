//! Result shapes.

use crate::reflection::{EntityDescriptor, EntityType};
use crate::types::DbTypeTag;
use crate::types::converters::TypeConverter;
use crate::value::ScalarType;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// What each row is mapped into.
#[derive(Debug, Clone, Copy)]
pub enum ResultType {
    /// A single column read through the type's converter.
    Scalar(ScalarType),
    Entity(&'static EntityDescriptor),
    /// Every column into a label-to-value map.
    Map,
}

impl ResultType {
    pub fn entity<T: EntityType>() -> Self {
        Self::Entity(T::entity_descriptor())
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Scalar(ty) => ty.name(),
            Self::Entity(descriptor) => descriptor.type_name,
            Self::Map => "map",
        }
    }
}

/// Explicit column-to-property mapping.
#[derive(Clone)]
pub struct ResultMapping {
    pub property: String,
    pub column: String,
    pub scalar_type: ScalarType,
    pub tag: Option<DbTypeTag>,
    /// Converter override; resolved from the registry when absent.
    pub converter: Option<Arc<dyn TypeConverter>>,
}

impl ResultMapping {
    pub fn new(property: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            column: column.into(),
            scalar_type: ScalarType::Any,
            tag: None,
            converter: None,
        }
    }

    pub fn with_type(mut self, scalar_type: ScalarType) -> Self {
        self.scalar_type = scalar_type;
        self
    }

    pub fn with_tag(mut self, tag: DbTypeTag) -> Self {
        self.tag = Some(tag);
        self
    }

    pub fn with_converter(mut self, converter: Arc<dyn TypeConverter>) -> Self {
        self.converter = Some(converter);
        self
    }
}

impl fmt::Debug for ResultMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultMapping")
            .field("property", &self.property)
            .field("column", &self.column)
            .field("type", &self.scalar_type)
            .field("converter", &self.converter.as_ref().map(|c| c.name().to_string()))
            .finish()
    }
}

/// How the rows of a statement become objects.
#[derive(Debug, Clone)]
pub struct ResultMap {
    pub id: String,
    pub result_type: ResultType,
    pub mappings: Vec<ResultMapping>,
    /// Map columns without an explicit mapping onto same-named properties.
    pub auto_mapping: bool,
    mapped_columns: HashSet<String>,
}

impl ResultMap {
    pub fn new(id: impl Into<String>, result_type: ResultType) -> Self {
        Self {
            id: id.into(),
            result_type,
            mappings: Vec::new(),
            auto_mapping: true,
            mapped_columns: HashSet::new(),
        }
    }

    pub fn entity<T: EntityType>(id: impl Into<String>) -> Self {
        Self::new(id, ResultType::entity::<T>())
    }

    pub fn with_mapping(mut self, mapping: ResultMapping) -> Self {
        self.mapped_columns.insert(mapping.column.to_ascii_uppercase());
        self.mappings.push(mapping);
        self
    }

    pub fn with_auto_mapping(mut self, auto_mapping: bool) -> Self {
        self.auto_mapping = auto_mapping;
        self
    }

    /// Whether `column` has an explicit mapping (case-insensitive).
    pub fn is_mapped_column(&self, column: &str) -> bool {
        self.mapped_columns.contains(&column.to_ascii_uppercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapped_columns_case_insensitive() {
        let map = ResultMap::new("r", ResultType::Map)
            .with_mapping(ResultMapping::new("name", "user_name"));
        assert!(map.is_mapped_column("USER_NAME"));
        assert!(!map.is_mapped_column("id"));
        assert!(map.auto_mapping);
    }
}
