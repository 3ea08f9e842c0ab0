//! Entity definitions and the metadata registry.

use crate::config::Config;
use crate::definition::entity_type::EntityType;
use crate::definition::field::FieldStorageDefinition;
use crate::error::{CoreError, CoreResult};
use crate::mapping::{TableMapping, TableMappingResolver};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// An entity type together with its field storage definitions.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityDefinition {
    entity_type: EntityType,
    fields: Vec<FieldStorageDefinition>,
    deleted_fields: Vec<FieldStorageDefinition>,
}

impl EntityDefinition {
    /// Creates a definition holding the type's key and revision metadata
    /// fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity type is invalid.
    pub fn new(entity_type: EntityType) -> CoreResult<Self> {
        entity_type.validate()?;
        let fields = entity_type.key_field_definitions();
        Ok(Self {
            entity_type,
            fields,
            deleted_fields: Vec::new(),
        })
    }

    /// Creates a definition with additional fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity type or any field is invalid.
    pub fn with_fields<I>(entity_type: EntityType, fields: I) -> CoreResult<Self>
    where
        I: IntoIterator<Item = FieldStorageDefinition>,
    {
        let mut definition = Self::new(entity_type)?;
        for field in fields {
            definition.add_field(field)?;
        }
        Ok(definition)
    }

    /// Adds a field, builder style.
    ///
    /// # Errors
    ///
    /// See [`EntityDefinition::add_field`].
    pub fn with_field(mut self, field: FieldStorageDefinition) -> CoreResult<Self> {
        self.add_field(field)?;
        Ok(self)
    }

    /// Adds a field.
    ///
    /// # Errors
    ///
    /// Returns an error if the field is invalid, belongs to another entity
    /// type or its name is taken.
    pub fn add_field(&mut self, field: FieldStorageDefinition) -> CoreResult<()> {
        self.check_field(&field)?;
        if self.field(&field.name).is_some() {
            return Err(CoreError::invalid_definition(format!(
                "field '{}' already exists on '{}'",
                field.name, self.entity_type.id
            )));
        }
        self.fields.push(field);
        Ok(())
    }

    /// Replaces a field with a new version and returns the old one.
    ///
    /// # Errors
    ///
    /// Returns an error if the field is unknown or the new version is invalid.
    pub fn replace_field(
        &mut self,
        field: FieldStorageDefinition,
    ) -> CoreResult<FieldStorageDefinition> {
        self.check_field(&field)?;
        let slot = self
            .fields
            .iter_mut()
            .find(|f| f.name == field.name)
            .ok_or_else(|| CoreError::unknown_field(&self.entity_type.id, &field.name))?;
        Ok(std::mem::replace(slot, field))
    }

    /// Moves a field to the deleted list and returns the deleted version.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown fields and key fields.
    pub fn remove_field(&mut self, name: &str) -> CoreResult<FieldStorageDefinition> {
        if self.entity_type.is_key_field(name) {
            return Err(CoreError::invalid_operation(format!(
                "key field '{name}' cannot be removed"
            )));
        }
        let pos = self
            .fields
            .iter()
            .position(|f| f.name == name)
            .ok_or_else(|| CoreError::unknown_field(&self.entity_type.id, name))?;
        let mut field = self.fields.remove(pos);
        field.deleted = true;
        self.deleted_fields.push(field.clone());
        Ok(field)
    }

    /// Drops a deleted field for good.
    pub fn forget_deleted(&mut self, uuid: Uuid) -> Option<FieldStorageDefinition> {
        let pos = self.deleted_fields.iter().position(|f| f.uuid == uuid)?;
        Some(self.deleted_fields.remove(pos))
    }

    fn check_field(&self, field: &FieldStorageDefinition) -> CoreResult<()> {
        field.validate()?;
        if field.entity_type_id != self.entity_type.id {
            return Err(CoreError::invalid_definition(format!(
                "field '{}' belongs to '{}', not '{}'",
                field.name, field.entity_type_id, self.entity_type.id
            )));
        }
        if self.entity_type.is_key_field(&field.name)
            && (!field.is_shared() || field.columns.len() != 1)
        {
            return Err(CoreError::invalid_definition(format!(
                "key field '{}' must be shared and single-column",
                field.name
            )));
        }
        Ok(())
    }

    /// The entity type.
    #[must_use]
    pub fn entity_type(&self) -> &EntityType {
        &self.entity_type
    }

    /// The entity type identifier.
    #[must_use]
    pub fn entity_type_id(&self) -> &str {
        &self.entity_type.id
    }

    /// Looks up a live field.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldStorageDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// All live fields in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[FieldStorageDefinition] {
        &self.fields
    }

    /// Live fields stored in the entity type's tables.
    pub fn shared_fields(&self) -> impl Iterator<Item = &FieldStorageDefinition> {
        self.fields.iter().filter(|f| f.is_shared())
    }

    /// Live fields stored in their own tables.
    pub fn dedicated_fields(&self) -> impl Iterator<Item = &FieldStorageDefinition> {
        self.fields.iter().filter(|f| f.has_dedicated_table())
    }

    /// Deleted fields awaiting purge.
    #[must_use]
    pub fn deleted_fields(&self) -> &[FieldStorageDefinition] {
        &self.deleted_fields
    }

    /// Looks up a deleted field by storage uuid.
    #[must_use]
    pub fn deleted_field(&self, uuid: Uuid) -> Option<&FieldStorageDefinition> {
        self.deleted_fields.iter().find(|f| f.uuid == uuid)
    }
}

/// Supplies entity definitions and memoized table mappings.
///
/// Definitions are read-mostly. Every change swaps in a new definition and
/// a freshly resolved mapping under the same write, so readers never see a
/// mapping that disagrees with its definition.
#[derive(Debug)]
pub struct DefinitionRegistry {
    resolver: TableMappingResolver,
    definitions: RwLock<HashMap<String, Arc<EntityDefinition>>>,
    mappings: RwLock<HashMap<String, Arc<TableMapping>>>,
}

impl Default for DefinitionRegistry {
    fn default() -> Self {
        Self::new(&Config::default())
    }
}

impl DefinitionRegistry {
    /// Creates an empty registry using the naming rules of `config`.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            resolver: TableMappingResolver::new(config.into()),
            definitions: RwLock::new(HashMap::new()),
            mappings: RwLock::new(HashMap::new()),
        }
    }

    /// The resolver used for mappings.
    #[must_use]
    pub fn resolver(&self) -> &TableMappingResolver {
        &self.resolver
    }

    /// Registers or replaces a definition.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the mapping cannot be resolved.
    pub fn register(&self, definition: EntityDefinition) -> CoreResult<Arc<EntityDefinition>> {
        let mapping = self.resolver.resolve(&definition)?;
        let id = definition.entity_type_id().to_string();
        let definition = Arc::new(definition);
        let mut definitions = self.definitions.write();
        definitions.insert(id.clone(), Arc::clone(&definition));
        self.mappings.write().insert(id.clone(), Arc::new(mapping));
        debug!(entity_type = %id, "registered entity definition");
        Ok(definition)
    }

    /// Returns the definition of an entity type.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownEntityType`] if it is not registered.
    pub fn definition(&self, entity_type_id: &str) -> CoreResult<Arc<EntityDefinition>> {
        self.definitions
            .read()
            .get(entity_type_id)
            .cloned()
            .ok_or_else(|| CoreError::unknown_entity_type(entity_type_id))
    }

    /// Applies `change` to a copy of the definition and publishes the
    /// result together with its new mapping.
    ///
    /// # Errors
    ///
    /// Returns the error of `change` or of mapping resolution; the
    /// registered definition is then left untouched.
    pub fn update<F>(&self, entity_type_id: &str, change: F) -> CoreResult<Arc<EntityDefinition>>
    where
        F: FnOnce(&mut EntityDefinition) -> CoreResult<()>,
    {
        let mut definitions = self.definitions.write();
        let current = definitions
            .get(entity_type_id)
            .ok_or_else(|| CoreError::unknown_entity_type(entity_type_id))?;
        let mut next = EntityDefinition::clone(current);
        change(&mut next)?;
        let mapping = self.resolver.resolve(&next)?;
        let next = Arc::new(next);
        definitions.insert(entity_type_id.to_string(), Arc::clone(&next));
        self.mappings
            .write()
            .insert(entity_type_id.to_string(), Arc::new(mapping));
        debug!(entity_type = entity_type_id, "updated entity definition");
        Ok(next)
    }

    /// Returns the memoized table mapping, resolving it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown types or configuration errors.
    pub fn table_mapping(&self, entity_type_id: &str) -> CoreResult<Arc<TableMapping>> {
        if let Some(mapping) = self.mappings.read().get(entity_type_id) {
            return Ok(Arc::clone(mapping));
        }
        let definition = self.definition(entity_type_id)?;
        let mapping = Arc::new(self.resolver.resolve(&definition)?);
        self.mappings
            .write()
            .insert(entity_type_id.to_string(), Arc::clone(&mapping));
        Ok(mapping)
    }

    /// Forgets the memoized mapping of an entity type.
    pub fn invalidate_mapping(&self, entity_type_id: &str) {
        self.mappings.write().remove(entity_type_id);
    }

    /// Registered entity type identifiers, sorted.
    #[must_use]
    pub fn entity_type_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.definitions.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}
