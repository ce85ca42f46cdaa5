//! Entity trait for ORM-style struct mapping.
//!
//! The [`Entity`] trait is the contract between application structs and the
//! data store. Metadata is supplied by an external registration step (hand
//! written or generated); the runtime never reflects over struct layout.
//! Attribute access is reflection-free: every attribute carries a typed
//! getter/setter pair ([`Accessor`]) resolved when the metadata tables are
//! built.

use crate::attribute::AttributeInfo;
use crate::error::{Error, Result, ValidationError};
use crate::relationship::RelationshipInfo;
use crate::row::Row;
use crate::value::Value;

/// A typed getter/setter pair for one attribute of an entity type.
///
/// The accessor table is parallel to [`Entity::attributes`]: the accessor at
/// index `i` reads and writes the attribute described at index `i`.
pub struct Accessor<E> {
    /// Read the attribute value from an instance.
    pub get: fn(&E) -> Value,
    /// Write an attribute value into an instance.
    ///
    /// Fails when the value cannot be represented in the target field.
    pub set: fn(&mut E, Value) -> Result<()>,
}

impl<E> Accessor<E> {
    pub const fn new(get: fn(&E) -> Value, set: fn(&mut E, Value) -> Result<()>) -> Self {
        Self { get, set }
    }
}

impl<E> Clone for Accessor<E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for Accessor<E> {}

impl<E> std::fmt::Debug for Accessor<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Accessor")
    }
}

/// Trait for types that map to database tables.
///
/// # Example
///
/// ```ignore
/// struct Person {
///     id: Option<i64>,
///     name: String,
///     age: i32,
/// }
///
/// impl Entity for Person {
///     const TABLE_NAME: &'static str = "person";
///     const PRIMARY_KEY: &'static [&'static str] = &["id"];
///
///     fn attributes() -> &'static [AttributeInfo] { /* ... */ }
///     fn accessors() -> &'static [Accessor<Self>] { /* ... */ }
///     fn from_row(row: &Row) -> Result<Self> { /* ... */ }
/// }
/// ```
pub trait Entity: Sized + Send + Sync + 'static {
    /// The name of the backing table.
    const TABLE_NAME: &'static str;

    /// The primary key attribute name(s).
    const PRIMARY_KEY: &'static [&'static str];

    /// Relation attribute metadata for this entity type.
    ///
    /// Entity types with no relations can rely on the default empty slice.
    const RELATIONSHIPS: &'static [RelationshipInfo] = &[];

    /// Whether instances are immutable value objects (never updated in place).
    const STATELESS: bool = false;

    /// Attribute metadata for all columns, in declaration order.
    fn attributes() -> &'static [AttributeInfo];

    /// Typed accessors, parallel to [`Entity::attributes`].
    fn accessors() -> &'static [Accessor<Self>];

    /// Construct an instance from a result row (the builder/factory seam).
    fn from_row(row: &Row) -> Result<Self>;

    /// Read all attribute values in declaration order.
    fn to_row(&self) -> Vec<(&'static str, Value)> {
        Self::attributes()
            .iter()
            .zip(Self::accessors())
            .map(|(attr, acc)| (attr.name, (acc.get)(self)))
            .collect()
    }

    /// Read a single attribute by name.
    fn read_attribute(&self, name: &str) -> Result<Value> {
        let idx = Self::attributes()
            .iter()
            .position(|a| a.name == name)
            .ok_or_else(|| {
                Error::Validation(ValidationError::unknown_attribute(Self::TABLE_NAME, name))
            })?;
        Ok((Self::accessors()[idx].get)(self))
    }

    /// Write a single attribute by name.
    fn write_attribute(&mut self, name: &str, value: Value) -> Result<()> {
        let idx = Self::attributes()
            .iter()
            .position(|a| a.name == name)
            .ok_or_else(|| {
                Error::Validation(ValidationError::unknown_attribute(Self::TABLE_NAME, name))
            })?;
        (Self::accessors()[idx].set)(self, value)
    }

    /// Read the primary key value(s), in `PRIMARY_KEY` order.
    fn primary_key_value(&self) -> Vec<Value> {
        Self::PRIMARY_KEY
            .iter()
            .filter_map(|name| self.read_attribute(name).ok())
            .collect()
    }

    /// Check if this is a new instance (all key values null).
    fn is_new(&self) -> bool {
        let keys = self.primary_key_value();
        keys.is_empty() || keys.iter().all(Value::is_null)
    }
}
