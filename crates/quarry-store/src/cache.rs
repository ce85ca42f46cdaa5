//! Weak entity cache.
//!
//! The cache maps object keys to weak references of shared entity handles.
//! It never keeps an entity alive on its own: once every caller drops its
//! `Arc`, the entry dies and lookups miss. Writes go through the store, which
//! updates the cache after every successful insert, update, and load.

use crate::tracker::ObjectKey;
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

trait CacheSlot: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn is_alive(&self) -> bool;
}

impl<E: Send + Sync + 'static> CacheSlot for Weak<RwLock<E>> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn is_alive(&self) -> bool {
        self.strong_count() > 0
    }
}

/// A type-erased map from object keys to weakly referenced entities.
pub struct EntityCache {
    enabled: bool,
    entries: Mutex<HashMap<ObjectKey, Box<dyn CacheSlot>>>,
}

impl std::fmt::Debug for EntityCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityCache")
            .field("enabled", &self.enabled)
            .field("len", &self.len())
            .finish()
    }
}

impl EntityCache {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Look up a live entity handle.
    pub fn get<E: Send + Sync + 'static>(&self, key: &ObjectKey) -> Option<Arc<RwLock<E>>> {
        if !self.enabled {
            return None;
        }
        let entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        entries
            .get(key)?
            .as_any()
            .downcast_ref::<Weak<RwLock<E>>>()?
            .upgrade()
    }

    /// Register an entity handle under its key.
    pub fn put<E: Send + Sync + 'static>(&self, key: ObjectKey, entity: &Arc<RwLock<E>>) {
        if !self.enabled {
            return;
        }
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        entries.insert(key, Box::new(Arc::downgrade(entity)));
    }

    /// Remove a single entry, alive or dead.
    pub fn invalidate(&self, key: &ObjectKey) {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
    }

    /// Remove every entry.
    pub fn invalidate_all(&self) {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        entries.clear();
    }

    /// Drop entries whose entities have been deallocated.
    pub fn prune(&self) {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        entries.retain(|_, slot| slot.is_alive());
    }

    /// Number of entries with at least one live reference.
    pub fn len(&self) -> usize {
        let entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        entries.values().filter(|slot| slot.is_alive()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_core::Value;

    #[derive(Debug, PartialEq)]
    struct Doc {
        id: i64,
        title: String,
    }

    // Keys are minted from bare values, no entity mapping needed.
    fn key(id: i64) -> ObjectKey {
        ObjectKey::from_pk::<Doc>(&[Value::BigInt(id)])
    }

    #[test]
    fn hit_returns_same_handle() {
        let cache = EntityCache::new(true);
        let doc = Arc::new(RwLock::new(Doc {
            id: 1,
            title: "first".to_string(),
        }));
        cache.put(key(1), &doc);

        let hit: Arc<RwLock<Doc>> = cache.get(&key(1)).unwrap();
        assert!(Arc::ptr_eq(&hit, &doc));
    }

    #[test]
    fn dropped_entity_misses() {
        let cache = EntityCache::new(true);
        let doc = Arc::new(RwLock::new(Doc {
            id: 2,
            title: "gone".to_string(),
        }));
        cache.put(key(2), &doc);
        drop(doc);

        assert!(cache.get::<Doc>(&key(2)).is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn prune_drops_dead_entries() {
        let cache = EntityCache::new(true);
        let live = Arc::new(RwLock::new(Doc {
            id: 1,
            title: "live".to_string(),
        }));
        let dead = Arc::new(RwLock::new(Doc {
            id: 2,
            title: "dead".to_string(),
        }));
        cache.put(key(1), &live);
        cache.put(key(2), &dead);
        drop(dead);

        cache.prune();
        assert!(cache.get::<Doc>(&key(1)).is_some());
        assert!(cache.get::<Doc>(&key(2)).is_none());
    }

    #[test]
    fn invalidate_removes_entry() {
        let cache = EntityCache::new(true);
        let doc = Arc::new(RwLock::new(Doc {
            id: 3,
            title: "stale".to_string(),
        }));
        cache.put(key(3), &doc);
        cache.invalidate(&key(3));
        assert!(cache.get::<Doc>(&key(3)).is_none());
    }

    #[test]
    fn disabled_cache_never_stores() {
        let cache = EntityCache::new(false);
        let doc = Arc::new(RwLock::new(Doc {
            id: 4,
            title: "ignored".to_string(),
        }));
        cache.put(key(4), &doc);
        assert!(cache.get::<Doc>(&key(4)).is_none());
    }
}
