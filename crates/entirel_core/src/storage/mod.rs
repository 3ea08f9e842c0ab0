//! Content entity storage engine.
//!
//! [`EntityStorage`] is the boundary other subsystems use: it loads, saves
//! and deletes entities of one entity type across the shared tables of
//! its [`TableMapping`] and the dedicated tables of its fields, and runs
//! the schema lifecycle hooks for field storage changes.
//!
//! Every write runs in one transaction on the shared [`Connection`]; the
//! `*_in` variants join a caller's transaction as a nested scope so that
//! batch operations can compose several writes.

mod delete;
mod field_schema;
mod load;
mod save;

use crate::cache::{cache_key, EntityCache, MemoryEntityCache};
use crate::config::Config;
use crate::connection::Connection;
use crate::definition::{DefinitionRegistry, EntityDefinition};
use crate::entity::Entity;
use crate::error::{CoreError, CoreResult};
use crate::mapping::{TableMapping, TableNaming};
use crate::record::EntityRecordCodec;
use crate::types::EntityId;
use entirel_codec::{CborCodec, SerializeCodec};
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Storage handler for the entities of one entity type.
pub struct EntityStorage {
    entity_type_id: String,
    connection: Connection,
    registry: Arc<DefinitionRegistry>,
    cache: Arc<dyn EntityCache>,
    serializer: Arc<dyn SerializeCodec>,
    config: Config,
}

/// Definition and mapping captured for the duration of one operation.
pub(crate) struct Snapshot {
    pub(crate) definition: Arc<EntityDefinition>,
    pub(crate) mapping: Arc<TableMapping>,
}

impl Snapshot {
    pub(crate) fn codec<'a>(&'a self, serializer: &'a dyn SerializeCodec) -> EntityRecordCodec<'a> {
        EntityRecordCodec::new(&self.definition, &self.mapping, serializer)
    }

    /// Physical column of a key field.
    pub(crate) fn key_column(&self, field: &str) -> CoreResult<String> {
        self.mapping
            .key_column(field)
            .map(str::to_string)
            .ok_or_else(|| CoreError::unknown_field(self.definition.entity_type_id(), field))
    }

    pub(crate) fn id_column(&self) -> CoreResult<String> {
        self.key_column(&self.definition.entity_type().keys.id)
    }

    pub(crate) fn revision_column(&self) -> CoreResult<String> {
        let key = self.definition.entity_type().keys.revision.as_deref();
        let key = key.ok_or_else(|| {
            CoreError::invalid_operation(format!(
                "entity type '{}' has no revision key",
                self.definition.entity_type_id()
            ))
        })?;
        self.key_column(key)
    }
}

impl EntityStorage {
    /// Creates a storage handler for a registered entity type.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownEntityType`] if the type is not
    /// registered.
    pub fn new(
        entity_type_id: impl Into<String>,
        connection: Connection,
        registry: Arc<DefinitionRegistry>,
    ) -> CoreResult<Self> {
        let entity_type_id = entity_type_id.into();
        registry.definition(&entity_type_id)?;
        let mut config = Config::default();
        registry.resolver().naming().apply_to(&mut config);
        Ok(Self {
            entity_type_id,
            connection,
            registry,
            cache: Arc::new(MemoryEntityCache::new()),
            serializer: Arc::new(CborCodec),
            config,
        })
    }

    /// Uses the given read cache.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn EntityCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Uses the given codec for serialized columns.
    #[must_use]
    pub fn with_serializer(mut self, serializer: Arc<dyn SerializeCodec>) -> Self {
        self.serializer = serializer;
        self
    }

    /// Uses the cache and purge settings of `config`.
    ///
    /// Table naming belongs to the shared [`DefinitionRegistry`], which
    /// resolves every mapping; build it with [`DefinitionRegistry::new`] to
    /// change names. The naming fields of `config` are replaced by the
    /// registry's, with a warning when they differ.
    #[must_use]
    pub fn with_config(mut self, mut config: Config) -> Self {
        let naming = self.registry.resolver().naming();
        if TableNaming::from(&config) != *naming {
            warn!(
                entity_type = %self.entity_type_id,
                "table naming comes from the definition registry; ignoring handler naming settings"
            );
            naming.apply_to(&mut config);
        }
        self.config = config;
        self
    }

    /// The settings in effect for this handler.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The entity type identifier.
    #[must_use]
    pub fn entity_type_id(&self) -> &str {
        &self.entity_type_id
    }

    /// The shared connection.
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// The metadata provider.
    #[must_use]
    pub fn registry(&self) -> &Arc<DefinitionRegistry> {
        &self.registry
    }

    /// The current entity definition.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity type was unregistered.
    pub fn definition(&self) -> CoreResult<Arc<EntityDefinition>> {
        self.registry.definition(&self.entity_type_id)
    }

    /// The current table mapping.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the mapping cannot be resolved.
    pub fn table_mapping(&self) -> CoreResult<Arc<TableMapping>> {
        self.registry.table_mapping(&self.entity_type_id)
    }

    pub(crate) fn snapshot(&self) -> CoreResult<Snapshot> {
        Ok(Snapshot {
            definition: self.definition()?,
            mapping: self.table_mapping()?,
        })
    }

    pub(crate) fn serializer(&self) -> &dyn SerializeCodec {
        self.serializer.as_ref()
    }

    /// Creates a new, unsaved entity.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MissingBundle`] if the entity type has a bundle
    /// key and no bundle is given, and [`CoreError::InvalidFieldValue`] if
    /// the bundle does not fit the bundle field.
    pub fn create(&self, bundle: Option<&str>) -> CoreResult<Entity> {
        let definition = self.definition()?;
        let bundle_key = definition.entity_type().keys.bundle.clone();
        let mut entity = Entity::new(definition);
        match (bundle_key, bundle) {
            (Some(key), Some(bundle)) => {
                entity.set(&key, bundle)?;
            }
            (Some(_), None) => {
                return Err(CoreError::MissingBundle {
                    entity_type: self.entity_type_id.clone(),
                })
            }
            (None, _) => {}
        }
        Ok(entity)
    }

    fn invalidate_cache<'a, I>(&self, ids: I)
    where
        I: IntoIterator<Item = &'a EntityId>,
    {
        let keys: Vec<String> = ids
            .into_iter()
            .map(|id| cache_key(&self.entity_type_id, id))
            .collect();
        if !keys.is_empty() {
            self.connection.bump_write_generation();
            self.cache.invalidate(&keys);
        }
    }

    fn invalidate_whole_cache(&self) {
        self.connection.bump_write_generation();
        self.cache.invalidate_all();
    }

    fn check_entity_type(&self, entity: &Entity) -> CoreResult<()> {
        if entity.entity_type_id() != self.entity_type_id {
            return Err(CoreError::invalid_operation(format!(
                "entity of type '{}' handed to storage of '{}'",
                entity.entity_type_id(),
                self.entity_type_id
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for EntityStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityStorage")
            .field("entity_type_id", &self.entity_type_id)
            .field("serializer", &self.serializer.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{EntityType, FieldStorageDefinition};

    fn storage() -> EntityStorage {
        let registry = Arc::new(DefinitionRegistry::default());
        registry
            .register(
                EntityDefinition::with_fields(
                    EntityType::content("node"),
                    [FieldStorageDefinition::string("node", "title", 64)],
                )
                .unwrap(),
            )
            .unwrap();
        EntityStorage::new("node", Connection::in_memory(), registry).unwrap()
    }

    #[test]
    fn unknown_entity_type_is_rejected() {
        let registry = Arc::new(DefinitionRegistry::default());
        let err = EntityStorage::new("nope", Connection::in_memory(), registry).unwrap_err();
        assert!(matches!(err, CoreError::UnknownEntityType { .. }));
    }

    #[test]
    fn naming_settings_follow_the_registry() {
        let naming = Config::default().max_table_name_length(20);
        let registry = Arc::new(DefinitionRegistry::new(&naming));
        registry
            .register(
                EntityDefinition::with_fields(
                    EntityType::content("node"),
                    [FieldStorageDefinition::string("node", "title", 64)],
                )
                .unwrap(),
            )
            .unwrap();
        let storage = EntityStorage::new("node", Connection::in_memory(), registry).unwrap();
        assert_eq!(storage.config().max_table_name_length, 20);

        let storage = storage.with_config(
            Config::default()
                .max_table_name_length(12)
                .persistent_cache(false)
                .purge_batch_size(5),
        );
        assert_eq!(storage.config().max_table_name_length, 20);
        assert!(!storage.config().persistent_cache);
        assert_eq!(storage.config().purge_batch_size, 5);
        assert_eq!(
            TableNaming::from(storage.config()),
            *storage.registry().resolver().naming()
        );
    }

    #[test]
    fn create_requires_bundle_for_bundled_types() {
        let storage = storage();
        let err = storage.create(None).unwrap_err();
        assert!(matches!(err, CoreError::MissingBundle { .. }));
        assert!(err.is_configuration_error());

        let entity = storage.create(Some("page")).unwrap();
        assert_eq!(entity.bundle(), Some("page"));
        assert!(entity.is_new());
    }
}
