//! Runtime metadata registry.
//!
//! An [`EntityModel`] collects [`EntityType`] descriptors for every entity
//! type in a schema, validates them as a closed set, then becomes immutable.
//! The store resolves attribute and relation references through the sealed
//! model instead of touching `Entity` associated items directly, which keeps
//! name errors detectable before any SQL is generated.

use crate::attribute::AttributeInfo;
use crate::entity::Entity;
use crate::error::{Error, Result, ValidationError};
use crate::relationship::RelationshipInfo;
use std::any::TypeId;
use std::collections::HashMap;

/// Runtime descriptor for one registered entity type.
#[derive(Debug, Clone)]
pub struct EntityType {
    /// Rust type identity, used by the state tracker and cache.
    type_id: TypeId,
    /// Human-readable Rust type name (diagnostics only).
    type_name: &'static str,
    /// Backing table name.
    table_name: &'static str,
    /// Attribute metadata in declaration order.
    attributes: &'static [AttributeInfo],
    /// Primary key attribute names.
    primary_key: &'static [&'static str],
    /// Relation attributes declared on this type.
    relationships: &'static [RelationshipInfo],
    /// Whether instances are immutable value objects.
    stateless: bool,
}

impl EntityType {
    /// Build a descriptor from an [`Entity`] implementation.
    pub fn of<E: Entity>() -> Self {
        Self {
            type_id: TypeId::of::<E>(),
            type_name: std::any::type_name::<E>(),
            table_name: E::TABLE_NAME,
            attributes: E::attributes(),
            primary_key: E::PRIMARY_KEY,
            relationships: E::RELATIONSHIPS,
            stateless: E::STATELESS,
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn table_name(&self) -> &'static str {
        self.table_name
    }

    pub fn attributes(&self) -> &'static [AttributeInfo] {
        self.attributes
    }

    pub fn primary_key(&self) -> &'static [&'static str] {
        self.primary_key
    }

    pub fn relationships(&self) -> &'static [RelationshipInfo] {
        self.relationships
    }

    pub fn is_stateless(&self) -> bool {
        self.stateless
    }

    /// Find an attribute by logical name.
    pub fn attribute(&self, name: &str) -> Option<&'static AttributeInfo> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Find a relation attribute by name.
    pub fn relationship(&self, name: &str) -> Option<&'static RelationshipInfo> {
        self.relationships.iter().find(|r| r.name == name)
    }

    /// Attributes forming the primary key, in key order.
    pub fn key_attributes(&self) -> impl Iterator<Item = &'static AttributeInfo> + '_ {
        self.primary_key
            .iter()
            .filter_map(|name| self.attribute(name))
    }

    /// The optimistic-concurrency version attribute, if declared.
    pub fn version_attribute(&self) -> Option<&'static AttributeInfo> {
        self.attributes.iter().find(|a| a.version)
    }

    /// Whether any key attribute is backend-generated.
    pub fn has_generated_key(&self) -> bool {
        self.key_attributes().any(|a| a.generated)
    }
}

/// Builder for an [`EntityModel`].
///
/// Collects type registrations, then [`seal`](ModelBuilder::seal)s into an
/// immutable model after cross-type validation.
#[derive(Debug, Default)]
pub struct ModelBuilder {
    name: String,
    types: Vec<EntityType>,
}

impl ModelBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            types: Vec::new(),
        }
    }

    /// Register an entity type.
    ///
    /// Fails when a type with the same table name (or the same Rust type)
    /// has already been registered.
    pub fn register<E: Entity>(mut self) -> Result<Self> {
        let descriptor = EntityType::of::<E>();
        if self.types.iter().any(|t| {
            t.type_id == descriptor.type_id || t.table_name == descriptor.table_name
        }) {
            return Err(Error::Validation(ValidationError::duplicate_type(
                descriptor.table_name,
            )));
        }
        self.types.push(descriptor);
        Ok(self)
    }

    /// Validate the registered set and produce an immutable model.
    ///
    /// Checks per type:
    /// - at least one primary key attribute, each naming a real attribute
    /// - attribute names unique within the type
    /// - at most one version attribute
    ///
    /// and across types:
    /// - every relation's `related_table` resolves to a registered type
    /// - every declared foreign key references a registered table
    pub fn seal(self) -> Result<EntityModel> {
        for t in &self.types {
            if t.primary_key.is_empty() {
                return Err(illegal(format!(
                    "entity '{}' declares no primary key",
                    t.table_name
                )));
            }
            for key in t.primary_key {
                if t.attribute(key).is_none() {
                    return Err(illegal(format!(
                        "entity '{}': primary key '{}' is not an attribute",
                        t.table_name, key
                    )));
                }
            }
            for (i, a) in t.attributes.iter().enumerate() {
                if t.attributes[..i].iter().any(|b| b.name == a.name) {
                    return Err(illegal(format!(
                        "entity '{}': duplicate attribute '{}'",
                        t.table_name, a.name
                    )));
                }
            }
            if t.attributes.iter().filter(|a| a.version).count() > 1 {
                return Err(illegal(format!(
                    "entity '{}' declares more than one version attribute",
                    t.table_name
                )));
            }
            for r in t.relationships {
                if !self.types.iter().any(|o| o.table_name == r.related_table) {
                    return Err(illegal(format!(
                        "entity '{}': relation '{}' targets unregistered table '{}'",
                        t.table_name, r.name, r.related_table
                    )));
                }
            }
            for a in t.attributes {
                if let Some(referenced) = a.referenced_table() {
                    if !self.types.iter().any(|o| o.table_name == referenced) {
                        return Err(illegal(format!(
                            "entity '{}': attribute '{}' references unregistered table '{}'",
                            t.table_name, a.name, referenced
                        )));
                    }
                }
            }
        }

        let by_table = self
            .types
            .iter()
            .enumerate()
            .map(|(i, t)| (t.table_name, i))
            .collect();
        let by_type_id = self
            .types
            .iter()
            .enumerate()
            .map(|(i, t)| (t.type_id, i))
            .collect();
        tracing::debug!(model = %self.name, types = self.types.len(), "sealed entity model");
        Ok(EntityModel {
            name: self.name,
            types: self.types,
            by_table,
            by_type_id,
        })
    }
}

fn illegal(message: String) -> Error {
    Error::Validation(ValidationError::illegal_state(message))
}

/// A sealed, immutable collection of entity type descriptors.
///
/// Obtained from [`ModelBuilder::seal`]; there is no way to add or remove
/// types afterwards.
#[derive(Debug)]
pub struct EntityModel {
    name: String,
    types: Vec<EntityType>,
    by_table: HashMap<&'static str, usize>,
    by_type_id: HashMap<TypeId, usize>,
}

impl EntityModel {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All registered types, in registration order.
    pub fn types(&self) -> &[EntityType] {
        &self.types
    }

    /// Look up a type descriptor by table name.
    pub fn type_by_table(&self, table: &str) -> Option<&EntityType> {
        self.by_table.get(table).map(|&i| &self.types[i])
    }

    /// Look up the descriptor for an entity type.
    pub fn type_of<E: Entity>(&self) -> Option<&EntityType> {
        self.by_type_id.get(&TypeId::of::<E>()).map(|&i| &self.types[i])
    }

    /// Check that an entity type is part of this model.
    pub fn require<E: Entity>(&self) -> Result<&EntityType> {
        self.type_of::<E>().ok_or_else(|| {
            Error::Validation(ValidationError::illegal_state(format!(
                "entity '{}' is not registered in model '{}'",
                E::TABLE_NAME,
                self.name
            )))
        })
    }

    /// Resolve a `(table, attribute)` reference.
    ///
    /// Fails with an unknown-attribute validation error when either part
    /// does not resolve.
    pub fn resolve(&self, table: &str, attribute: &str) -> Result<&'static AttributeInfo> {
        let t = self.type_by_table(table).ok_or_else(|| {
            Error::Validation(ValidationError::unknown_attribute(table, attribute))
        })?;
        t.attribute(attribute).ok_or_else(|| {
            Error::Validation(ValidationError::unknown_attribute(table, attribute))
        })
    }
}
