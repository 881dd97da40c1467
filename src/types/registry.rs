//! Converter registry.

use crate::types::DbTypeTag;
use crate::types::converters::{ObjectConverter, ScalarConverter, TypeConverter};
use crate::value::ScalarType;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

type TagMap = HashMap<Option<DbTypeTag>, Arc<dyn TypeConverter>>;

/// Lookup table from `(type, tag)` to converter.
#[derive(Clone)]
pub struct TypeConverterRegistry {
    by_type: HashMap<ScalarType, TagMap>,
    by_tag: HashMap<DbTypeTag, Arc<dyn TypeConverter>>,
    unknown: Arc<dyn TypeConverter>,
}

impl TypeConverterRegistry {
    /// Registry with the built-in converters.
    pub fn new() -> Self {
        let mut registry = Self {
            by_type: HashMap::new(),
            by_tag: HashMap::new(),
            unknown: Arc::new(ObjectConverter),
        };

        let builtins: [(ScalarType, &'static str, &[DbTypeTag]); 6] = [
            (ScalarType::Bool, "boolean", &[DbTypeTag::Boolean, DbTypeTag::Bit]),
            (
                ScalarType::Int,
                "long",
                &[
                    DbTypeTag::Integer,
                    DbTypeTag::BigInt,
                    DbTypeTag::SmallInt,
                    DbTypeTag::TinyInt,
                ],
            ),
            (
                ScalarType::Float,
                "double",
                &[
                    DbTypeTag::Double,
                    DbTypeTag::Float,
                    DbTypeTag::Real,
                    DbTypeTag::Numeric,
                    DbTypeTag::Decimal,
                ],
            ),
            (
                ScalarType::Text,
                "string",
                &[
                    DbTypeTag::Varchar,
                    DbTypeTag::Char,
                    DbTypeTag::LongVarchar,
                    DbTypeTag::Clob,
                ],
            ),
            (
                ScalarType::Bytes,
                "bytes",
                &[DbTypeTag::Blob, DbTypeTag::Binary, DbTypeTag::Varbinary],
            ),
            (
                ScalarType::Timestamp,
                "date",
                &[DbTypeTag::Timestamp, DbTypeTag::Date, DbTypeTag::Time],
            ),
        ];

        for (ty, name, tags) in builtins {
            let converter: Arc<dyn TypeConverter> = Arc::new(ScalarConverter::new(name, ty));
            registry.register(ty, None, converter.clone());
            for tag in tags {
                registry.register_for_tag(*tag, converter.clone());
            }
        }
        registry
    }

    /// Register a converter for a type, optionally restricted to one tag.
    pub fn register(
        &mut self,
        ty: ScalarType,
        tag: Option<DbTypeTag>,
        converter: Arc<dyn TypeConverter>,
    ) {
        self.by_type.entry(ty).or_default().insert(tag, converter);
    }

    /// Register the converter used for values of unknown type carrying `tag`.
    pub fn register_for_tag(&mut self, tag: DbTypeTag, converter: Arc<dyn TypeConverter>) {
        self.by_tag.insert(tag, converter);
    }

    /// Whether a value of `ty` can be bound as a whole.
    pub fn has_converter(&self, ty: ScalarType) -> bool {
        ty != ScalarType::Any && self.by_type.contains_key(&ty)
    }

    /// Resolve the converter for `(ty, tag)`.
    ///
    /// Exact tag first, then the type's untagged default, then the only
    /// converter registered for the type. Unknown types resolve through the
    /// tag table and finally the pass-through converter.
    pub fn get_converter(&self, ty: ScalarType, tag: Option<DbTypeTag>) -> Option<Arc<dyn TypeConverter>> {
        if ty == ScalarType::Any {
            return Some(
                tag.and_then(|t| self.by_tag.get(&t).cloned())
                    .unwrap_or_else(|| self.unknown.clone()),
            );
        }
        let by_tag = self.by_type.get(&ty)?;
        by_tag
            .get(&tag)
            .or_else(|| by_tag.get(&None))
            .or_else(|| {
                if by_tag.len() == 1 {
                    by_tag.values().next()
                } else {
                    None
                }
            })
            .cloned()
    }

    /// Find a registered converter by its name, e.g. `long`.
    pub fn find_by_name(&self, name: &str) -> Option<Arc<dyn TypeConverter>> {
        if self.unknown.name() == name {
            return Some(self.unknown.clone());
        }
        self.by_type
            .values()
            .flat_map(|tags| tags.values())
            .chain(self.by_tag.values())
            .find(|c| c.name() == name)
            .cloned()
    }

    /// The pass-through converter.
    pub fn unknown_converter(&self) -> Arc<dyn TypeConverter> {
        self.unknown.clone()
    }
}

impl Default for TypeConverterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TypeConverterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeConverterRegistry")
            .field("types", &self.by_type.len())
            .field("tags", &self.by_tag.len())
            .finish_non_exhaustive()
    }
}
