//! Entity state tracking and dirty detection.
//!
//! The tracker keeps a per-entity lifecycle state plus a snapshot of
//! attribute values taken when the entity was last synchronized with the
//! database. Dirty detection compares current accessor values against the
//! snapshot, so only genuinely modified attributes reach UPDATE statements.

use quarry_core::{Entity, Value};
use std::any::TypeId;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

/// Identity of a tracked entity instance: its type plus primary key values.
///
/// The key values are kept verbatim so equality is exact; two distinct keys
/// never alias, whatever their hashes do.
#[derive(Debug, Clone)]
pub struct ObjectKey {
    type_id: TypeId,
    pk: Vec<Value>,
}

impl ObjectKey {
    /// Build a key from primary key values.
    pub fn from_pk<E: 'static>(pk_values: &[Value]) -> Self {
        Self {
            type_id: TypeId::of::<E>(),
            pk: pk_values.to_vec(),
        }
    }

    /// Build a key for an entity instance.
    pub fn of<E: Entity>(entity: &E) -> Self {
        Self {
            type_id: TypeId::of::<E>(),
            pk: entity.primary_key_value(),
        }
    }

    pub fn pk_values(&self) -> &[Value] {
        &self.pk
    }
}

impl PartialEq for ObjectKey {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
            && self.pk.len() == other.pk.len()
            && self.pk.iter().zip(&other.pk).all(|(a, b)| value_eq(a, b))
    }
}

impl Eq for ObjectKey {}

impl Hash for ObjectKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
        for v in &self.pk {
            hash_value(v, state);
        }
    }
}

/// Value equality with Double compared bitwise, keeping `Eq` lawful for keys
/// containing NaN or signed zero.
fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Double(x), Value::Double(y)) => x.to_bits() == y.to_bits(),
        _ => a == b,
    }
}

fn hash_value<H: Hasher>(v: &Value, state: &mut H) {
    match v {
        Value::Null => 0u8.hash(state),
        Value::Bool(b) => {
            1u8.hash(state);
            b.hash(state);
        }
        Value::Int(i) => {
            2u8.hash(state);
            i.hash(state);
        }
        Value::BigInt(i) => {
            3u8.hash(state);
            i.hash(state);
        }
        Value::Double(f) => {
            4u8.hash(state);
            f.to_bits().hash(state);
        }
        Value::Text(s) => {
            5u8.hash(state);
            s.hash(state);
        }
        Value::Bytes(b) => {
            6u8.hash(state);
            b.hash(state);
        }
        Value::Timestamp(ts) => {
            7u8.hash(state);
            ts.hash(state);
        }
    }
}

/// Lifecycle state of a tracked entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityState {
    /// Never persisted
    New,
    /// Loaded or persisted, no known modifications
    Managed,
    /// Managed with at least one attribute change recorded
    Modified,
    /// Deleted from the database
    Removed,
}

/// Tracks entity states and attribute snapshots for dirty detection.
#[derive(Debug, Default)]
pub struct StateTracker {
    snapshots: HashMap<ObjectKey, Vec<Value>>,
    states: HashMap<ObjectKey, EntityState>,
}

impl StateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking an entity as managed, snapshotting current values.
    #[tracing::instrument(level = "trace", skip(self, entity))]
    pub fn track<E: Entity>(&mut self, key: ObjectKey, entity: &E) {
        let snapshot: Vec<Value> = entity.to_row().into_iter().map(|(_, v)| v).collect();
        self.snapshots.insert(key.clone(), snapshot);
        self.states.insert(key, EntityState::Managed);
    }

    /// Record the entity as not yet persisted.
    pub fn mark_new(&mut self, key: ObjectKey) {
        self.states.insert(key, EntityState::New);
    }

    /// Record an explicit modification without snapshot comparison.
    pub fn mark_modified(&mut self, key: ObjectKey) {
        self.states.insert(key, EntityState::Modified);
    }

    /// Record the entity as deleted; its snapshot is discarded.
    pub fn mark_removed(&mut self, key: ObjectKey) {
        self.snapshots.remove(&key);
        self.states.insert(key, EntityState::Removed);
    }

    /// Current lifecycle state, if tracked.
    pub fn state(&self, key: &ObjectKey) -> Option<EntityState> {
        self.states.get(key).copied()
    }

    /// Check whether the entity differs from its snapshot.
    ///
    /// Untracked entities are treated as dirty.
    pub fn is_dirty<E: Entity>(&self, key: &ObjectKey, entity: &E) -> bool {
        if self.state(key) == Some(EntityState::Modified) {
            return true;
        }
        let Some(snapshot) = self.snapshots.get(key) else {
            return true;
        };
        entity
            .to_row()
            .iter()
            .zip(snapshot)
            .any(|((_, current), original)| current != original)
    }

    /// Names of attributes whose values differ from the snapshot.
    ///
    /// Untracked entities report every attribute as changed.
    pub fn changed_attributes<E: Entity>(
        &self,
        key: &ObjectKey,
        entity: &E,
    ) -> Vec<&'static str> {
        let Some(snapshot) = self.snapshots.get(key) else {
            return E::attributes().iter().map(|a| a.name).collect();
        };
        entity
            .to_row()
            .iter()
            .zip(snapshot)
            .filter(|((_, current), original)| current != *original)
            .map(|((name, _), _)| *name)
            .collect()
    }

    /// Re-baseline the snapshot after a successful write.
    pub fn refresh<E: Entity>(&mut self, key: ObjectKey, entity: &E) {
        self.track(key, entity);
    }

    /// Stop tracking an entity entirely.
    pub fn forget(&mut self, key: &ObjectKey) {
        self.snapshots.remove(key);
        self.states.remove(key);
    }

    /// Drop all tracked state.
    pub fn clear(&mut self) {
        self.snapshots.clear();
        self.states.clear();
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
