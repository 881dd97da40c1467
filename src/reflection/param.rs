//! Parameter objects.
//!
//! A statement receives one [`Param`]: nothing, a single scalar, an entity,
//! a named map, or a list. Multiple call arguments are packed into a
//! [`ParamMap`] that exposes each argument under its own name (or numeric
//! position) and under a `paramN` alias. Aliases share storage, so a key
//! written back through one name is visible through the other.

use crate::error::{MapperError, MapperResult};
use crate::reflection::entity::{Entity, EntityDescriptor, EntityType};
use crate::reflection::path::PropertyTokenizer;
use crate::value::{ScalarType, Value};
use std::borrow::Cow;

/// Prefix of the generic per-position alias (`param1`, `param2`, ...).
pub const GENERIC_NAME_PREFIX: &str = "param";

/// Names under which a bare list parameter can be addressed.
const LIST_NAMES: &[&str] = &["list", "collection", "array"];

#[derive(Debug, Clone, Default)]
pub enum Param {
    #[default]
    Null,
    Scalar(Value),
    Entity(Box<dyn Entity>),
    Map(ParamMap),
    List(Vec<Param>),
}

impl Param {
    pub fn scalar(value: impl Into<Value>) -> Self {
        Self::Scalar(value.into())
    }

    pub fn entity<E: Entity>(entity: E) -> Self {
        Self::Entity(Box::new(entity))
    }

    pub fn list(items: impl IntoIterator<Item = Param>) -> Self {
        Self::List(items.into_iter().collect())
    }

    /// Pack method-call arguments: none becomes `Null`, a single argument is
    /// passed through, several become a positional [`ParamMap`].
    pub fn from_args(mut args: Vec<Param>) -> Self {
        match args.len() {
            0 => Self::Null,
            1 => args.pop().unwrap_or_default(),
            _ => Self::Map(ParamMap::positional(args)),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null | Self::Scalar(Value::Null))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Scalar(v) => v.type_name(),
            Self::Entity(e) => e.descriptor().type_name,
            Self::Map(_) => "map",
            Self::List(_) => "list",
        }
    }

    /// Borrow the concrete entity, if this parameter holds one of type `T`.
    pub fn as_entity<T: EntityType>(&self) -> Option<&T> {
        match self {
            Self::Entity(e) => e.downcast_ref::<T>(),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&ParamMap> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Read the scalar at `path`.
    pub fn get_value(&self, path: &str) -> MapperResult<Value> {
        match self.lookup(path)?.as_ref() {
            Param::Null => Ok(Value::Null),
            Param::Scalar(v) => Ok(v.clone()),
            other => Err(MapperError::reflection(format!(
                "Property '{path}' resolves to a {} and cannot be bound as a value",
                other.type_name()
            ))),
        }
    }

    pub fn has_getter(&self, path: &str) -> bool {
        self.lookup(path).is_ok()
    }

    /// Resolve `path` to the parameter it names.
    pub fn lookup(&self, path: &str) -> MapperResult<Cow<'_, Param>> {
        let token = PropertyTokenizer::new(path);
        let head: Cow<'_, Param> = match self {
            Param::Null => return Ok(Cow::Owned(Param::Null)),
            Param::Entity(e) => {
                if token.index().is_some() || token.children().is_some() {
                    return Err(MapperError::no_getter(path, e.descriptor().type_name));
                }
                return e.get_property(token.name()).map(|v| Cow::Owned(Param::Scalar(v)));
            }
            Param::Map(map) => Cow::Borrowed(map.require(token.name())?),
            Param::List(_) if LIST_NAMES.contains(&token.name()) => Cow::Borrowed(self),
            Param::List(_) | Param::Scalar(_) => {
                return Err(MapperError::no_getter(path, self.type_name()));
            }
        };
        let element = match token.index() {
            None => head,
            Some(_) => match head {
                Cow::Borrowed(Param::List(items)) => {
                    let item = token
                        .position()
                        .and_then(|i| items.get(i))
                        .ok_or_else(|| {
                            MapperError::reflection(format!(
                                "Index out of range in '{path}' (size {})",
                                items.len()
                            ))
                        })?;
                    Cow::Borrowed(item)
                }
                Cow::Borrowed(Param::Map(map)) => {
                    Cow::Borrowed(map.require(token.index().unwrap_or_default())?)
                }
                other => {
                    return Err(MapperError::reflection(format!(
                        "'{}' in '{path}' is a {} and cannot be indexed",
                        token.name(),
                        other.type_name()
                    )));
                }
            },
        };
        match token.children() {
            None => Ok(element),
            Some(rest) => match element {
                Cow::Borrowed(inner) => inner.lookup(rest),
                Cow::Owned(inner) => inner.lookup(rest).map(|c| Cow::Owned(c.into_owned())),
            },
        }
    }

    /// Write a scalar at `path`. Maps accept any new key; entities require a setter.
    pub fn set_value(&mut self, path: &str, value: Value) -> MapperResult<()> {
        let token = PropertyTokenizer::new(path);
        match self {
            Param::Entity(e) => {
                if token.index().is_some() || token.children().is_some() {
                    return Err(MapperError::no_setter(path, e.descriptor().type_name));
                }
                e.set_property(token.name(), value)
            }
            Param::Map(map) => {
                if token.index().is_none() && token.children().is_none() {
                    map.insert(token.name(), Param::Scalar(value));
                    return Ok(());
                }
                let slot = map.require_mut(token.name())?;
                set_in_slot(slot, &token, path, value)
            }
            Param::List(_) => {
                if LIST_NAMES.contains(&token.name()) && token.index().is_some() {
                    set_in_slot(self, &token, path, value)
                } else {
                    Err(MapperError::no_setter(path, "list"))
                }
            }
            Param::Null | Param::Scalar(_) => {
                Err(MapperError::no_setter(path, self.type_name()))
            }
        }
    }

    pub fn has_setter(&self, path: &str) -> bool {
        let token = PropertyTokenizer::new(path);
        match self {
            Param::Entity(e) => {
                token.index().is_none()
                    && token.children().is_none()
                    && e.descriptor().has_setter(token.name())
            }
            Param::Map(_) => match (token.index(), token.children()) {
                (None, None) => true,
                _ => match self.lookup(token.indexed_name()) {
                    Ok(Cow::Borrowed(inner)) => match token.children() {
                        Some(rest) => inner.has_setter(rest),
                        None => true,
                    },
                    _ => false,
                },
            },
            Param::List(_) => LIST_NAMES.contains(&token.name()) && token.index().is_some(),
            Param::Null | Param::Scalar(_) => false,
        }
    }
}

fn set_in_slot(
    slot: &mut Param,
    token: &PropertyTokenizer<'_>,
    path: &str,
    value: Value,
) -> MapperResult<()> {
    let target = match token.index() {
        None => slot,
        Some(index) => match slot {
            Param::List(items) => {
                let len = items.len();
                token
                    .position()
                    .and_then(|i| items.get_mut(i))
                    .ok_or_else(|| {
                        MapperError::reflection(format!(
                            "Index out of range in '{path}' (size {len})"
                        ))
                    })?
            }
            Param::Map(map) => {
                if token.children().is_none() {
                    map.insert(index, Param::Scalar(value));
                    return Ok(());
                }
                map.require_mut(index)?
            }
            other => return Err(MapperError::no_setter(path, other.type_name())),
        },
    };
    match token.children() {
        Some(rest) => target.set_value(rest, value),
        None => {
            *target = Param::Scalar(value);
            Ok(())
        }
    }
}

impl From<Value> for Param {
    fn from(value: Value) -> Self {
        Param::Scalar(value)
    }
}

impl From<ParamMap> for Param {
    fn from(map: ParamMap) -> Self {
        Param::Map(map)
    }
}

impl From<()> for Param {
    fn from(_: ()) -> Self {
        Param::Null
    }
}

macro_rules! param_from_scalar {
    ($($ty:ty),+) => {
        $(
            impl From<$ty> for Param {
                fn from(v: $ty) -> Self {
                    Param::Scalar(Value::from(v))
                }
            }
        )+
    };
}

param_from_scalar!(i64, i32, f64, bool, String, &str, Vec<u8>, chrono::NaiveDateTime);

/// Named parameters with shared-storage aliases.
#[derive(Debug, Clone, Default)]
pub struct ParamMap {
    entries: Vec<(String, Param)>,
    aliases: Vec<(String, usize)>,
}

impl ParamMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expose each argument by numeric position (`0`, `1`, ...) and as `paramN`.
    pub fn positional(args: Vec<Param>) -> Self {
        let mut map = Self::new();
        for (i, arg) in args.into_iter().enumerate() {
            map.entries.push((i.to_string(), arg));
            map.aliases
                .push((format!("{GENERIC_NAME_PREFIX}{}", i + 1), i));
        }
        map
    }

    /// Expose each argument by its name and as `paramN`.
    pub fn named<N: Into<String>>(args: impl IntoIterator<Item = (N, Param)>) -> Self {
        let mut map = Self::new();
        for (i, (name, arg)) in args.into_iter().enumerate() {
            let name = name.into();
            let generic = format!("{GENERIC_NAME_PREFIX}{}", i + 1);
            map.entries.push((name.clone(), arg));
            if generic != name {
                map.aliases.push((generic, i));
            }
        }
        map
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Param>) -> Self {
        self.insert(name, value);
        self
    }

    /// Insert or replace. Replacing through an alias updates the shared slot.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Param>) {
        let name = name.into();
        let value = value.into();
        match self.slot_of(&name) {
            Some(idx) => self.entries[idx].1 = value,
            None => self.entries.push((name, value)),
        }
    }

    fn slot_of(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(n, _)| n == name)
            .or_else(|| {
                self.aliases
                    .iter()
                    .find(|(alias, _)| alias == name)
                    .map(|(_, idx)| *idx)
            })
    }

    pub fn get(&self, name: &str) -> Option<&Param> {
        self.slot_of(name).map(|idx| &self.entries[idx].1)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Param> {
        self.slot_of(name).map(|idx| &mut self.entries[idx].1)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.slot_of(name).is_some()
    }

    /// Lookup that reports the available names when missing.
    pub fn require(&self, name: &str) -> MapperResult<&Param> {
        match self.slot_of(name) {
            Some(idx) => Ok(&self.entries[idx].1),
            None => Err(self.missing(name)),
        }
    }

    fn require_mut(&mut self, name: &str) -> MapperResult<&mut Param> {
        match self.slot_of(name) {
            Some(idx) => Ok(&mut self.entries[idx].1),
            None => Err(self.missing(name)),
        }
    }

    fn missing(&self, name: &str) -> MapperError {
        MapperError::reflection(format!(
            "Parameter '{name}' not found. Available parameters are [{}]",
            self.keys().join(", ")
        ))
    }

    /// Every addressable name, primary names first.
    pub fn keys(&self) -> Vec<&str> {
        self.entries
            .iter()
            .map(|(n, _)| n.as_str())
            .chain(self.aliases.iter().map(|(a, _)| a.as_str()))
            .collect()
    }

    /// Primary names only, in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    /// Number of distinct values (aliases not counted).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Param)> {
        self.entries.iter().map(|(n, p)| (n.as_str(), p))
    }
}

/// What is statically known about a statement's parameter object, used to
/// resolve the declared type of each placeholder property.
#[derive(Debug, Clone, Copy, Default)]
pub enum ParameterType {
    #[default]
    Unknown,
    Scalar(ScalarType),
    Entity(&'static EntityDescriptor),
    Map,
}

impl ParameterType {
    /// Infer from a runtime parameter object.
    pub fn of(param: &Param) -> Self {
        match param {
            Param::Null => Self::Unknown,
            Param::Scalar(v) if v.is_null() => Self::Unknown,
            Param::Scalar(v) => Self::Scalar(v.scalar_type()),
            Param::Entity(e) => Self::Entity(e.descriptor()),
            Param::Map(_) | Param::List(_) => Self::Map,
        }
    }

    pub fn entity<T: EntityType>() -> Self {
        Self::Entity(T::entity_descriptor())
    }

    /// Declared type of `path`; a scalar parameter type applies to every path.
    pub fn property_type(&self, path: &str) -> MapperResult<ScalarType> {
        match self {
            Self::Unknown | Self::Map => Ok(ScalarType::Any),
            Self::Scalar(ty) => Ok(*ty),
            Self::Entity(descriptor) => {
                let token = PropertyTokenizer::new(path);
                if token.children().is_some() || token.index().is_some() {
                    return Err(MapperError::no_getter(path, descriptor.type_name));
                }
                descriptor.property_type(token.name())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Default)]
    struct Tag {
        id: Option<i64>,
        label: String,
    }

    crate::entity!(Tag {
        id: Option<i64>,
        label: String,
    });

    #[test]
    fn test_positional_aliases_share_storage() {
        let mut map = ParamMap::positional(vec![Param::scalar(1i64), Param::scalar("x")]);
        assert_eq!(map.get("0").unwrap().type_name(), "int");
        assert_eq!(map.get("param2").unwrap().type_name(), "text");

        map.insert("param1", Param::scalar(5i64));
        let p = Param::Map(map);
        assert_eq!(p.get_value("0").unwrap(), Value::Int(5));
    }

    #[test]
    fn test_missing_parameter_lists_names() {
        let p = Param::Map(ParamMap::named([("id", Param::scalar(1i64))]));
        let err = p.get_value("name").unwrap_err().to_string();
        assert!(err.contains("Parameter 'name' not found"));
        assert!(err.contains("id, param1"));
    }

    #[test]
    fn test_nested_path_resolution() {
        let tags = Param::list(vec![
            Param::entity(Tag {
                id: Some(1),
                label: "a".into(),
            }),
            Param::entity(Tag {
                id: Some(2),
                label: "b".into(),
            }),
        ]);
        let p = Param::Map(ParamMap::new().with("tags", tags));
        assert_eq!(p.get_value("tags[1].label").unwrap(), Value::from("b"));
        assert!(p.get_value("tags[5].label").is_err());
    }

    #[test]
    fn test_set_value_through_alias() {
        let mut p = Param::Map(ParamMap::named([(
            "tag",
            Param::entity(Tag::default()),
        )]));
        assert!(p.has_setter("param1.id"));
        p.set_value("param1.id", Value::Int(42)).unwrap();
        let tag = p.as_map().unwrap().get("tag").unwrap().as_entity::<Tag>().unwrap();
        assert_eq!(tag.id, Some(42));
    }

    #[test]
    fn test_scalar_has_no_setter() {
        let mut p = Param::scalar(3i64);
        assert!(!p.has_setter("id"));
        assert!(p.set_value("id", Value::Int(1)).is_err());
    }

    #[test]
    fn test_from_args() {
        assert!(matches!(Param::from_args(vec![]), Param::Null));
        assert!(matches!(
            Param::from_args(vec![Param::scalar(1i64)]),
            Param::Scalar(Value::Int(1))
        ));
        assert!(matches!(
            Param::from_args(vec![Param::Null, Param::Null]),
            Param::Map(_)
        ));
    }

    #[test]
    fn test_parameter_type_lookup() {
        let ty = ParameterType::entity::<Tag>();
        assert_eq!(ty.property_type("label").unwrap(), ScalarType::Text);
        assert!(ty.property_type("missing").is_err());
        assert_eq!(
            ParameterType::Scalar(ScalarType::Int).property_type("whatever").unwrap(),
            ScalarType::Int
        );
    }
}
