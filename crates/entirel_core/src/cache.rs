//! Entity read cache.
//!
//! The cache is an explicit service handed to the storage engine. It only
//! ever holds default revisions; writers invalidate the affected keys after
//! every save and delete, and readers fall through to storage on a miss.

use crate::entity::Entity;
use crate::types::EntityId;
use parking_lot::RwLock;
use std::collections::HashMap;

/// A keyed store of loaded entities.
pub trait EntityCache: Send + Sync {
    /// Returns a cached entity.
    fn get(&self, key: &str) -> Option<Entity>;

    /// Stores an entity.
    fn set(&self, key: &str, entity: Entity);

    /// Removes the given keys.
    fn invalidate(&self, keys: &[String]);

    /// Removes every entry.
    fn invalidate_all(&self);
}

/// Cache key of an entity's default revision.
#[must_use]
pub fn cache_key(entity_type_id: &str, id: &EntityId) -> String {
    format!("values:{entity_type_id}:{id}")
}

/// In-process cache backed by a hash map.
#[derive(Debug, Default)]
pub struct MemoryEntityCache {
    entries: RwLock<HashMap<String, Entity>>,
}

impl MemoryEntityCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Returns true if `key` is cached.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }
}

impl EntityCache for MemoryEntityCache {
    fn get(&self, key: &str) -> Option<Entity> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, key: &str, entity: Entity) {
        self.entries.write().insert(key.to_string(), entity);
    }

    fn invalidate(&self, keys: &[String]) {
        let mut entries = self.entries.write();
        for key in keys {
            entries.remove(key);
        }
    }

    fn invalidate_all(&self) {
        self.entries.write().clear();
    }
}

/// A cache that stores nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCache;

impl EntityCache for NullCache {
    fn get(&self, _key: &str) -> Option<Entity> {
        None
    }

    fn set(&self, _key: &str, _entity: Entity) {}

    fn invalidate(&self, _keys: &[String]) {}

    fn invalidate_all(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{EntityDefinition, EntityType};
    use std::sync::Arc;

    fn entity() -> Entity {
        let definition = EntityDefinition::new(EntityType::content("node")).unwrap();
        Entity::new(Arc::new(definition))
    }

    #[test]
    fn keys_name_type_and_id() {
        assert_eq!(cache_key("node", &EntityId::from(3_i64)), "values:node:3");
    }

    #[test]
    fn memory_cache_invalidates_selected_keys() {
        let cache = MemoryEntityCache::new();
        cache.set("a", entity());
        cache.set("b", entity());
        cache.invalidate(&["a".to_string()]);
        assert!(cache.get("a").is_none());
        assert!(cache.contains("b"));

        cache.invalidate_all();
        assert!(cache.is_empty());
    }

    #[test]
    fn null_cache_never_hits() {
        let cache = NullCache;
        cache.set("a", entity());
        assert!(cache.get("a").is_none());
    }
}
