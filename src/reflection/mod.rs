//! Property introspection.
//!
//! Objects are never inspected at runtime. Each entity type carries an
//! accessor table ([`EntityDescriptor`]) generated once by the [`entity!`]
//! macro and stored in a `static`. Parameter objects are modelled by
//! [`Param`], which resolves dotted and indexed property paths
//! (`user.tags[2]`) over maps, lists and entities.
//!
//! [`entity!`]: crate::entity

pub mod entity;
pub mod param;
pub mod path;

pub use entity::{
    Entity, EntityDescriptor, EntityType, PropertyDescriptor, new_entity, normalize_property_name,
};
pub use param::{Param, ParamMap, ParameterType};
pub use path::PropertyTokenizer;
