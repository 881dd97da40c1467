//! Entity accessor tables.
//!
//! An entity is a plain struct whose fields are readable and writable by
//! name. The [`entity!`](crate::entity) macro generates the accessor table
//! and the [`Entity`] implementation:
//!
//! ```ignore
//! #[derive(Debug, Clone, Default)]
//! pub struct User {
//!     pub id: Option<i64>,
//!     pub user_name: String,
//! }
//!
//! sqlmapper::entity!(User { id: Option<i64>, user_name: String });
//! ```
//!
//! Property lookups are exact first, then case and underscore insensitive,
//! so `userName`, `USER_NAME` and `user_name` all address the same field.

use crate::error::{MapperError, MapperResult};
use crate::value::{ScalarType, Value};
use std::any::Any;
use std::fmt;

/// One readable/writable property of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyDescriptor {
    pub name: &'static str,
    pub scalar_type: ScalarType,
    /// False for primitive fields, which ignore null on automatic mapping.
    pub nullable: bool,
}

/// Accessor table for one entity type, built once and stored in a static.
pub struct EntityDescriptor {
    pub type_name: &'static str,
    pub properties: &'static [PropertyDescriptor],
    pub factory: fn() -> Box<dyn Entity>,
}

impl EntityDescriptor {
    /// Find a property by exact name, falling back to a case and
    /// underscore insensitive match.
    pub fn find_property(&self, name: &str) -> Option<&'static PropertyDescriptor> {
        let properties: &'static [PropertyDescriptor] = self.properties;
        if let Some(p) = properties.iter().find(|p| p.name == name) {
            return Some(p);
        }
        let wanted = normalize_property_name(name);
        properties
            .iter()
            .find(|p| normalize_property_name(p.name) == wanted)
    }

    pub fn has_getter(&self, name: &str) -> bool {
        self.find_property(name).is_some()
    }

    pub fn has_setter(&self, name: &str) -> bool {
        self.find_property(name).is_some()
    }

    /// Declared type of a property, or an error naming the missing getter.
    pub fn property_type(&self, name: &str) -> MapperResult<ScalarType> {
        self.find_property(name)
            .map(|p| p.scalar_type)
            .ok_or_else(|| MapperError::no_getter(name, self.type_name))
    }

    /// Construct a default instance.
    pub fn instantiate(&self) -> Box<dyn Entity> {
        (self.factory)()
    }
}

impl fmt::Debug for EntityDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityDescriptor")
            .field("type_name", &self.type_name)
            .field("properties", &self.properties.len())
            .finish_non_exhaustive()
    }
}

/// Lowercase and strip underscores: `user_name`, `userName` and
/// `USERNAME` all normalize to `username`.
pub fn normalize_property_name(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Object-safe view of an entity.
pub trait Entity: Any + Send + Sync + fmt::Debug {
    fn descriptor(&self) -> &'static EntityDescriptor;

    fn get_property(&self, name: &str) -> MapperResult<Value>;

    fn set_property(&mut self, name: &str, value: Value) -> MapperResult<()>;

    fn clone_entity(&self) -> Box<dyn Entity>;

    fn as_any(&self) -> &dyn Any;

    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

/// Static side of an entity: construction and the accessor table.
pub trait EntityType: Entity + Default + Clone {
    fn entity_descriptor() -> &'static EntityDescriptor;
}

/// Factory used by generated descriptors.
pub fn new_entity<T: EntityType>() -> Box<dyn Entity> {
    Box::new(T::default())
}

impl Clone for Box<dyn Entity> {
    fn clone(&self) -> Self {
        self.clone_entity()
    }
}

impl dyn Entity {
    /// Recover the concrete type.
    pub fn downcast<T: EntityType>(self: Box<Self>) -> MapperResult<T> {
        let type_name = self.descriptor().type_name;
        self.into_any()
            .downcast::<T>()
            .map(|boxed| *boxed)
            .map_err(|_| {
                MapperError::type_conversion(
                    type_name,
                    T::entity_descriptor().type_name.to_string(),
                )
            })
    }

    pub fn downcast_ref<T: EntityType>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    /// Render every property as a JSON object.
    pub fn to_json(&self) -> serde_json::Value {
        let mut object = serde_json::Map::new();
        for property in self.descriptor().properties {
            let value = self.get_property(property.name).unwrap_or(Value::Null);
            object.insert(
                property.name.to_string(),
                serde_json::to_value(value).unwrap_or(serde_json::Value::Null),
            );
        }
        serde_json::Value::Object(object)
    }
}

/// Generate the accessor table and [`Entity`] implementation for a struct.
///
/// Every listed field type must implement [`FieldValue`](crate::value::FieldValue).
/// The struct must implement `Debug`, `Clone` and `Default`.
#[macro_export]
macro_rules! entity {
    ($ty:ident { $($field:ident : $kind:ty),+ $(,)? }) => {
        impl $crate::reflection::EntityType for $ty {
            fn entity_descriptor() -> &'static $crate::reflection::EntityDescriptor {
                static PROPERTIES: &[$crate::reflection::PropertyDescriptor] = &[
                    $(
                        $crate::reflection::PropertyDescriptor {
                            name: stringify!($field),
                            scalar_type: <$kind as $crate::value::FieldValue>::SCALAR,
                            nullable: <$kind as $crate::value::FieldValue>::NULLABLE,
                        },
                    )+
                ];
                static DESCRIPTOR: $crate::reflection::EntityDescriptor =
                    $crate::reflection::EntityDescriptor {
                        type_name: stringify!($ty),
                        properties: PROPERTIES,
                        factory: $crate::reflection::new_entity::<$ty>,
                    };
                &DESCRIPTOR
            }
        }

        impl $crate::reflection::Entity for $ty {
            fn descriptor(&self) -> &'static $crate::reflection::EntityDescriptor {
                <Self as $crate::reflection::EntityType>::entity_descriptor()
            }

            fn get_property(&self, name: &str) -> $crate::error::MapperResult<$crate::value::Value> {
                if let Some(property) = self.descriptor().find_property(name) {
                    $(
                        if property.name == stringify!($field) {
                            return Ok(<$kind as $crate::value::FieldValue>::to_value(&self.$field));
                        }
                    )+
                }
                Err($crate::error::MapperError::no_getter(name, stringify!($ty)))
            }

            fn set_property(
                &mut self,
                name: &str,
                value: $crate::value::Value,
            ) -> $crate::error::MapperResult<()> {
                if let Some(property) = self.descriptor().find_property(name) {
                    $(
                        if property.name == stringify!($field) {
                            self.$field = <$kind as $crate::value::FieldValue>::from_value(value)?;
                            return Ok(());
                        }
                    )+
                }
                Err($crate::error::MapperError::no_setter(name, stringify!($ty)))
            }

            fn clone_entity(&self) -> Box<dyn $crate::reflection::Entity> {
                Box::new(self.clone())
            }

            fn as_any(&self) -> &dyn std::any::Any {
                self
            }

            fn into_any(self: Box<Self>) -> Box<dyn std::any::Any> {
                self
            }
        }

        impl $crate::mapping::FromResult for $ty {
            fn from_result(
                object: $crate::mapping::ResultObject,
            ) -> $crate::error::MapperResult<Self> {
                object.into_entity::<$ty>()
            }
        }
    };
}
