//! Relationship metadata and resolve-on-access wrappers.
//!
//! Relation attributes are described by [`RelationshipInfo`] tables on each
//! entity type. The value side is modelled explicitly: [`Related`] and
//! [`RelatedMany`] hold resolve-on-access state (unresolved until first
//! load, then cached for the instance's lifetime). A `OnceLock` makes the
//! transition single-flight under concurrent access.

use crate::attribute::ReferentialAction;
use crate::entity::Entity;
use crate::value::Value;
use std::fmt;
use std::sync::OnceLock;

/// Kind of relationship between two entity types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipKind {
    /// One row on each side.
    OneToOne,
    /// This side owns a collection of related rows.
    OneToMany,
    /// This side holds the foreign key to a single related row.
    ManyToOne,
    /// Both sides hold collections, joined through a junction table.
    ManyToMany,
}

/// Descriptor for the junction table backing a many-to-many relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JunctionTable {
    /// The junction table name (e.g. `"person_group"`).
    pub table_name: &'static str,
    /// Column pointing at the owning side (e.g. `"person_id"`).
    pub owner_column: &'static str,
    /// Column pointing at the related side (e.g. `"group_id"`).
    pub related_column: &'static str,
}

impl JunctionTable {
    pub const fn new(
        table_name: &'static str,
        owner_column: &'static str,
        related_column: &'static str,
    ) -> Self {
        Self {
            table_name,
            owner_column,
            related_column,
        }
    }
}

/// Metadata about a relation attribute.
#[derive(Debug, Clone, Copy)]
pub struct RelationshipInfo {
    /// Name of the relation attribute.
    pub name: &'static str,
    /// The related entity type's table name.
    pub related_table: &'static str,
    /// Kind of relationship.
    pub kind: RelationshipKind,
    /// Foreign key column on the owning side (ManyToOne/OneToOne) or on the
    /// related table (OneToMany).
    pub key_column: &'static str,
    /// Junction table descriptor for ManyToMany.
    pub junction: Option<JunctionTable>,
    /// What happens to related rows when the owner is deleted.
    pub cascade: ReferentialAction,
}

impl RelationshipInfo {
    pub const fn new(
        name: &'static str,
        related_table: &'static str,
        kind: RelationshipKind,
        key_column: &'static str,
    ) -> Self {
        Self {
            name,
            related_table,
            kind,
            key_column,
            junction: None,
            cascade: ReferentialAction::NoAction,
        }
    }

    /// Attach a junction-table descriptor (ManyToMany only).
    pub const fn junction(mut self, junction: JunctionTable) -> Self {
        self.junction = Some(junction);
        self
    }

    /// Set the cascade policy applied on owner delete.
    pub const fn cascade(mut self, action: ReferentialAction) -> Self {
        self.cascade = action;
        self
    }
}

/// Find a relationship by attribute name on an entity type.
pub fn find_relationship<E: Entity>(name: &str) -> Option<&'static RelationshipInfo> {
    E::RELATIONSHIPS.iter().find(|r| r.name == name)
}

/// A related single entity (many-to-one or one-to-one).
///
/// States:
/// - **Empty**: no relationship (`fk` is None)
/// - **Unresolved**: has an FK value but not fetched yet
/// - **Resolved**: the entity has been fetched and cached
pub struct Related<T: Entity> {
    fk_value: Option<Value>,
    resolved: OnceLock<Option<T>>,
}

impl<T: Entity> Related<T> {
    /// Create an empty relationship (null FK, never resolvable).
    pub const fn empty() -> Self {
        Self {
            fk_value: None,
            resolved: OnceLock::new(),
        }
    }

    /// Create from a foreign key value (not yet resolved).
    pub fn from_fk(fk: impl Into<Value>) -> Self {
        Self {
            fk_value: Some(fk.into()),
            resolved: OnceLock::new(),
        }
    }

    /// Create with an already-resolved entity.
    pub fn resolved(obj: T) -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(Some(obj));
        Self {
            fk_value: None,
            resolved: cell,
        }
    }

    /// Get the resolved entity (None if unresolved or resolved-to-null).
    pub fn get(&self) -> Option<&T> {
        self.resolved.get().and_then(|o| o.as_ref())
    }

    /// Check if the relationship has been resolved (including resolved-null).
    pub fn is_resolved(&self) -> bool {
        self.resolved.get().is_some()
    }

    /// Check if the relationship is empty (null FK).
    pub fn is_empty(&self) -> bool {
        self.fk_value.is_none() && self.resolved.get().is_none()
    }

    /// Get the foreign key value, if present.
    pub fn fk(&self) -> Option<&Value> {
        self.fk_value.as_ref()
    }

    /// Store the resolution result. First writer wins; later attempts get
    /// their value back unchanged.
    pub fn resolve_with(&self, obj: Option<T>) -> Result<(), Option<T>> {
        self.resolved.set(obj)
    }
}

impl<T: Entity> Default for Related<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: Entity + Clone> Clone for Related<T> {
    fn clone(&self) -> Self {
        let cloned = Self {
            fk_value: self.fk_value.clone(),
            resolved: OnceLock::new(),
        };
        if let Some(value) = self.resolved.get() {
            let _ = cloned.resolved.set(value.clone());
        }
        cloned
    }
}

impl<T: Entity + fmt::Debug> fmt::Debug for Related<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.is_resolved() {
            "resolved"
        } else if self.fk_value.is_none() {
            "empty"
        } else {
            "unresolved"
        };
        f.debug_struct("Related")
            .field("state", &state)
            .field("fk", &self.fk_value)
            .finish()
    }
}

/// A collection of related entities (one-to-many or many-to-many).
///
/// Unresolved until the store loads it; once resolved, the collection is
/// cached on the instance until a refresh replaces the whole wrapper.
pub struct RelatedMany<T: Entity> {
    resolved: OnceLock<Vec<T>>,
}

impl<T: Entity> RelatedMany<T> {
    /// Create an unresolved collection.
    pub const fn new() -> Self {
        Self {
            resolved: OnceLock::new(),
        }
    }

    /// Create with already-resolved entities.
    pub fn resolved(objects: Vec<T>) -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(objects);
        Self { resolved: cell }
    }

    /// Check if the collection has been resolved.
    pub fn is_resolved(&self) -> bool {
        self.resolved.get().is_some()
    }

    /// Get the resolved entities (None if unresolved).
    pub fn get(&self) -> Option<&[T]> {
        self.resolved.get().map(Vec::as_slice)
    }

    /// Number of resolved entities (0 if unresolved).
    pub fn len(&self) -> usize {
        self.resolved.get().map_or(0, Vec::len)
    }

    /// Check if empty (unresolved counts as empty).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate over resolved entities.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.resolved.get().into_iter().flatten()
    }

    /// Store the resolution result. First writer wins.
    pub fn resolve_with(&self, objects: Vec<T>) -> Result<(), Vec<T>> {
        self.resolved.set(objects)
    }
}

impl<T: Entity> Default for RelatedMany<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity + Clone> Clone for RelatedMany<T> {
    fn clone(&self) -> Self {
        let cloned = Self::new();
        if let Some(value) = self.resolved.get() {
            let _ = cloned.resolved.set(value.clone());
        }
        cloned
    }
}

impl<T: Entity + fmt::Debug> fmt::Debug for RelatedMany<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelatedMany")
            .field("resolved", &self.is_resolved())
            .field("len", &self.len())
            .finish()
    }
}
