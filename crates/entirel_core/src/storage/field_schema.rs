//! Schema installation and field storage lifecycle hooks.
//!
//! The shared tables are created once per entity type. Dedicated field
//! tables follow their field storage definition through create, update,
//! soft delete and purge. A deleted field keeps its rows in archived
//! tables until [`EntityStorage::purge_field_data`] has removed them and
//! [`EntityStorage::finalize_purge`] drops the tables.

use super::EntityStorage;
use crate::definition::{EntityDefinition, FieldStorageDefinition};
use crate::error::{CoreError, CoreResult};
use crate::schema::{
    DedicatedFieldSchemaGenerator, DedicatedTableSchemas, SharedTableSchemaGenerator,
};
use entirel_storage::{Condition, RelationalBackend, Row, Select, TableSchema, Value as CellValue};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

impl EntityStorage {
    /// Creates the shared tables and the dedicated tables of every field.
    ///
    /// Tables that already exist are left alone.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for unmappable definitions, or the
    /// backend error after rollback.
    pub fn install_schema(&self) -> CoreResult<()> {
        let snapshot = self.snapshot()?;
        let definition = &snapshot.definition;
        let mapping = &snapshot.mapping;
        let mut schemas = SharedTableSchemaGenerator::new(definition, mapping).schemas()?;
        let generator = DedicatedFieldSchemaGenerator::new(definition, mapping);
        for field in definition.dedicated_fields() {
            let dedicated = generator.schema_for(field)?;
            schemas.extend([dedicated.data, dedicated.revision]);
        }
        self.connection.transaction(|txn| {
            let backend = txn.backend();
            for schema in &schemas {
                if !backend.table_exists(&schema.name) {
                    backend.create_table(schema)?;
                    debug!(table = %schema.name, "created table");
                }
            }
            Ok(())
        })
    }

    /// Drops every table of the entity type, including archived tables of
    /// deleted fields.
    ///
    /// # Errors
    ///
    /// Returns the backend error after rollback.
    pub fn uninstall_schema(&self) -> CoreResult<()> {
        let snapshot = self.snapshot()?;
        let mut tables: Vec<String> = snapshot
            .mapping
            .table_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        for field in snapshot
            .definition
            .dedicated_fields()
            .chain(snapshot.definition.deleted_fields())
        {
            tables.push(snapshot.mapping.dedicated_data_table_name(field));
            tables.push(snapshot.mapping.dedicated_revision_table_name(field));
        }
        self.connection.transaction(|txn| {
            let backend = txn.backend();
            for table in &tables {
                if backend.table_exists(table) {
                    backend.drop_table(table)?;
                    debug!(table = %table, "dropped table");
                }
            }
            Ok(())
        })?;
        self.invalidate_whole_cache();
        Ok(())
    }

    /// Reacts to a new field storage definition.
    ///
    /// Dedicated fields get their tables; fields with custom storage are
    /// only registered.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] for shared fields, a
    /// configuration error for invalid definitions, or the backend error.
    pub fn on_field_storage_create(&self, field: FieldStorageDefinition) -> CoreResult<()> {
        if field.is_shared() {
            return Err(shared_field_change(&field));
        }
        if field.has_custom_storage() {
            self.registry
                .update(&self.entity_type_id, |definition| definition.add_field(field))?;
            return Ok(());
        }

        let snapshot = self.snapshot()?;
        let mut next = EntityDefinition::clone(&snapshot.definition);
        next.add_field(field.clone())?;
        let mapping = self.registry.resolver().resolve(&next)?;
        let schemas = DedicatedFieldSchemaGenerator::new(&next, &mapping).schema_for(&field)?;

        self.connection.transaction(|txn| {
            txn.nested(|txn| create_tables(txn.backend(), &schemas))
        })?;
        self.registry
            .update(&self.entity_type_id, |definition| definition.add_field(field))?;
        Ok(())
    }

    /// Reacts to a changed field storage definition.
    ///
    /// Without data the tables are recreated from the new definition. With
    /// data only index changes are applied, dropping and adding exactly the
    /// indexes that differ.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::SchemaUpdateForbidden`] if data exists and the
    /// column layout changes, [`CoreError::InvalidOperation`] for shared
    /// fields or a renamed field, or the backend error.
    pub fn on_field_storage_update(
        &self,
        original: &FieldStorageDefinition,
        field: FieldStorageDefinition,
    ) -> CoreResult<()> {
        if original.name != field.name {
            return Err(CoreError::invalid_operation(format!(
                "field '{}' cannot be renamed to '{}'",
                original.name, field.name
            )));
        }
        if original.is_shared() || field.is_shared() {
            return Err(shared_field_change(&field));
        }
        if original.has_custom_storage() || field.has_custom_storage() {
            if original.has_dedicated_table() || field.has_dedicated_table() {
                return Err(CoreError::invalid_operation(format!(
                    "field '{}' cannot switch between custom and relational storage",
                    field.name
                )));
            }
            self.registry
                .update(&self.entity_type_id, |definition| {
                    definition.replace_field(field).map(|_| ())
                })?;
            return Ok(());
        }

        let snapshot = self.snapshot()?;
        let generator = DedicatedFieldSchemaGenerator::new(&snapshot.definition, &snapshot.mapping);
        let old = generator.schema_for(original)?;
        let new = generator.schema_for(&field)?;

        if self.has_field_data(original)? {
            let same = old.data.same_storage(&new.data) && old.revision.same_storage(&new.revision);
            if !same {
                return Err(CoreError::schema_update_forbidden(
                    &field.name,
                    "column layout changes while data exists",
                ));
            }
            self.connection.transaction(|txn| {
                txn.nested(|txn| {
                    let backend = txn.backend();
                    let pairs = [(&old.data, &new.data), (&old.revision, &new.revision)];
                    for (before, after) in pairs {
                        update_indexes(backend, before, after)?;
                    }
                    Ok(())
                })
            })?;
        } else {
            self.replace_tables(&field, &old, &new)?;
        }

        self.registry.update(&self.entity_type_id, |definition| {
            definition.replace_field(field).map(|_| ())
        })?;
        self.invalidate_whole_cache();
        Ok(())
    }

    /// Drops and recreates empty dedicated tables.
    ///
    /// Without transactional DDL the previous tables are recreated when
    /// the replacement fails; if that fails too, both errors are returned.
    fn replace_tables(
        &self,
        field: &FieldStorageDefinition,
        old: &DedicatedTableSchemas,
        new: &DedicatedTableSchemas,
    ) -> CoreResult<()> {
        let transactional = self.connection.read(|b| b.supports_transactional_ddl());
        let result = self.connection.transaction(|txn| {
            txn.nested(|txn| {
                let backend = txn.backend();
                drop_tables(backend, old)?;
                create_tables(backend, new)
            })
        });
        let Err(cause) = result else {
            return Ok(());
        };
        if transactional {
            return Err(cause);
        }

        warn!(
            table = %old.data.name,
            error = %cause,
            "restoring dedicated tables after failed update"
        );
        let restored = self.connection.with_backend(|backend| {
            drop_tables(backend, new)?;
            create_tables(backend, old)
        });
        match restored {
            Ok(()) => Err(cause),
            Err(restore) => {
                error!(
                    table = %old.data.name,
                    revision_table = %old.revision.name,
                    error = %restore,
                    "failed to restore dedicated tables"
                );
                Err(CoreError::SchemaRestoreFailed {
                    field: field.name.clone(),
                    cause: Box::new(cause),
                    restore: Box::new(restore),
                })
            }
        }
    }

    /// Reacts to a deleted field storage definition.
    ///
    /// Dedicated tables holding data are flagged deleted and renamed to
    /// their archived names for later purging; empty tables are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownField`] for unknown fields,
    /// [`CoreError::InvalidOperation`] for shared fields, or the backend
    /// error.
    pub fn on_field_storage_delete(&self, field_name: &str) -> CoreResult<()> {
        let snapshot = self.snapshot()?;
        let field = snapshot
            .definition
            .field(field_name)
            .ok_or_else(|| CoreError::unknown_field(&self.entity_type_id, field_name))?
            .clone();
        if field.is_shared() {
            return Err(shared_field_change(&field));
        }
        if field.has_custom_storage() {
            self.registry.update(&self.entity_type_id, |definition| {
                let removed = definition.remove_field(field_name)?;
                definition.forget_deleted(removed.uuid);
                Ok(())
            })?;
            return Ok(());
        }

        let has_data = self.has_field_data(&field)?;
        let mapping = &snapshot.mapping;
        let mut archived = field.clone();
        archived.deleted = true;
        let live = [
            mapping.dedicated_data_table_name(&field),
            mapping.dedicated_revision_table_name(&field),
        ];
        let renamed = [
            mapping.dedicated_data_table_name(&archived),
            mapping.dedicated_revision_table_name(&archived),
        ];

        self.connection.transaction(|txn| {
            txn.nested(|txn| {
                let backend = txn.backend();
                for (from, to) in live.iter().zip(&renamed) {
                    if !backend.table_exists(from) {
                        continue;
                    }
                    if has_data {
                        let deleted = Row::from([("deleted".to_string(), CellValue::Integer(1))]);
                        backend.update(from, &[], &deleted)?;
                        backend.rename_table(from, to)?;
                        debug!(from = %from, to = %to, "archived dedicated table");
                    } else {
                        backend.drop_table(from)?;
                        debug!(table = %from, "dropped dedicated table");
                    }
                }
                Ok(())
            })
        })?;

        self.registry.update(&self.entity_type_id, |definition| {
            let removed = definition.remove_field(field_name)?;
            if !has_data {
                definition.forget_deleted(removed.uuid);
            }
            Ok(())
        })?;
        self.invalidate_whole_cache();
        Ok(())
    }

    /// Number of entities with stored values for a dedicated field, across
    /// all revisions. Deleted fields are counted in their archived tables.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub fn count_field_data(&self, field: &FieldStorageDefinition) -> CoreResult<usize> {
        if !field.has_dedicated_table() {
            return Ok(0);
        }
        let mapping = self.table_mapping()?;
        let table = mapping.dedicated_revision_table_name(field);
        let deleted = i64::from(field.deleted);
        self.connection.read(|backend| {
            if !backend.table_exists(&table) {
                return Ok(0);
            }
            Ok(distinct_entity_ids(backend, &table, deleted, None)?.len())
        })
    }

    /// Returns true if a dedicated field has stored values.
    ///
    /// # Errors
    ///
    /// See [`EntityStorage::count_field_data`].
    pub fn has_field_data(&self, field: &FieldStorageDefinition) -> CoreResult<bool> {
        Ok(self.count_field_data(field)? > 0)
    }

    /// Removes the archived values of up to `batch_size` entities across
    /// deleted fields and returns how many entities were purged.
    ///
    /// # Errors
    ///
    /// Returns the backend error after rollback.
    pub fn purge_field_data(&self, batch_size: usize) -> CoreResult<usize> {
        let snapshot = self.snapshot()?;
        let mapping = &snapshot.mapping;
        let purged = self.connection.transaction(|txn| {
            txn.nested(|txn| {
                let backend = txn.backend();
                let mut purged = 0;
                for field in snapshot.definition.deleted_fields() {
                    let remaining = batch_size - purged;
                    if remaining == 0 {
                        break;
                    }
                    let data_table = mapping.dedicated_data_table_name(field);
                    let revision_table = mapping.dedicated_revision_table_name(field);
                    if !backend.table_exists(&revision_table) {
                        continue;
                    }
                    let ids = distinct_entity_ids(&*backend, &revision_table, 1, Some(remaining))?;
                    if ids.is_empty() {
                        continue;
                    }
                    for table in [&data_table, &revision_table] {
                        if backend.table_exists(table) {
                            backend.delete(table, &[Condition::is_in("entity_id", ids.clone())])?;
                        }
                    }
                    info!(field = %field.name, entities = ids.len(), "purged deleted field data");
                    purged += ids.len();
                }
                Ok(purged)
            })
        })?;
        Ok(purged)
    }

    /// Drops the archived tables of a fully purged field and forgets its
    /// definition.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] if the field is not deleted
    /// or still has data, or the backend error.
    pub fn finalize_purge(&self, field_uuid: Uuid) -> CoreResult<()> {
        let snapshot = self.snapshot()?;
        let field = snapshot
            .definition
            .deleted_field(field_uuid)
            .ok_or_else(|| {
                CoreError::invalid_operation(format!("no deleted field with storage {field_uuid}"))
            })?;
        if self.has_field_data(field)? {
            return Err(CoreError::invalid_operation(format!(
                "deleted field '{}' still has data",
                field.name
            )));
        }
        let tables = [
            snapshot.mapping.dedicated_data_table_name(field),
            snapshot.mapping.dedicated_revision_table_name(field),
        ];
        self.connection.transaction(|txn| {
            let backend = txn.backend();
            for table in &tables {
                if backend.table_exists(table) {
                    backend.drop_table(table)?;
                }
            }
            Ok(())
        })?;
        self.registry.update(&self.entity_type_id, |definition| {
            definition.forget_deleted(field_uuid);
            Ok(())
        })?;
        info!(field = %field.name, "finalized purge of deleted field");
        Ok(())
    }

    /// Purges every deleted field in batches of the configured size and
    /// finalizes each one. Returns the number of entities purged.
    ///
    /// # Errors
    ///
    /// See [`EntityStorage::purge_field_data`] and
    /// [`EntityStorage::finalize_purge`].
    pub fn purge_deleted_fields(&self) -> CoreResult<usize> {
        let batch_size = self.config.purge_batch_size.max(1);
        let mut total = 0;
        loop {
            let purged = self.purge_field_data(batch_size)?;
            total += purged;
            if purged == 0 {
                break;
            }
        }
        let deleted: Vec<Uuid> = self
            .definition()?
            .deleted_fields()
            .iter()
            .map(|f| f.uuid)
            .collect();
        for uuid in deleted {
            self.finalize_purge(uuid)?;
        }
        Ok(total)
    }

    /// Moves rows of a renamed bundle to the new name and returns the
    /// number of rows changed.
    ///
    /// # Errors
    ///
    /// Returns the backend error after rollback.
    pub fn on_bundle_rename(&self, from: &str, to: &str) -> CoreResult<usize> {
        let snapshot = self.snapshot()?;
        let mut targets: Vec<(String, String)> = Vec::new();
        if let Some(bundle_key) = &snapshot.definition.entity_type().keys.bundle {
            if let Some(column) = snapshot.mapping.key_column(bundle_key) {
                for table in snapshot.mapping.field_table_names(bundle_key) {
                    targets.push((table.to_string(), column.to_string()));
                }
            }
        }
        for field in snapshot.definition.dedicated_fields() {
            for table in [
                snapshot.mapping.dedicated_data_table_name(field),
                snapshot.mapping.dedicated_revision_table_name(field),
            ] {
                targets.push((table, "bundle".to_string()));
            }
        }

        let changed = self.connection.transaction(|txn| {
            txn.nested(|txn| {
                let backend = txn.backend();
                let mut changed = 0;
                for (table, column) in &targets {
                    changed += backend.update(
                        table,
                        &[Condition::eq(column, from)],
                        &Row::from([(column.clone(), CellValue::from(to))]),
                    )?;
                }
                Ok(changed)
            })
        })?;
        self.invalidate_whole_cache();
        debug!(
            entity_type = %self.entity_type_id,
            from,
            to,
            rows = changed,
            "renamed bundle"
        );
        Ok(changed)
    }
}

fn shared_field_change(field: &FieldStorageDefinition) -> CoreError {
    CoreError::invalid_operation(format!(
        "field '{}' is stored in the shared tables; its storage cannot change at runtime",
        field.name
    ))
}

fn create_tables(
    backend: &mut dyn RelationalBackend,
    schemas: &DedicatedTableSchemas,
) -> CoreResult<()> {
    for schema in schemas.both() {
        backend.create_table(schema)?;
        debug!(table = %schema.name, "created dedicated table");
    }
    Ok(())
}

fn drop_tables(
    backend: &mut dyn RelationalBackend,
    schemas: &DedicatedTableSchemas,
) -> CoreResult<()> {
    for schema in schemas.both() {
        if backend.table_exists(&schema.name) {
            backend.drop_table(&schema.name)?;
            debug!(table = %schema.name, "dropped dedicated table");
        }
    }
    Ok(())
}

/// Drops indexes that disappeared or changed, then adds the new ones.
fn update_indexes(
    backend: &mut dyn RelationalBackend,
    before: &TableSchema,
    after: &TableSchema,
) -> CoreResult<()> {
    for (name, columns) in &before.indexes {
        if after.indexes.get(name) != Some(columns) && backend.index_exists(&before.name, name) {
            backend.drop_index(&before.name, name)?;
            debug!(table = %before.name, index = %name, "dropped index");
        }
    }
    for (name, columns) in &after.indexes {
        if before.indexes.get(name) != Some(columns) {
            backend.add_index(&after.name, name, columns)?;
            debug!(table = %after.name, index = %name, "added index");
        }
    }
    Ok(())
}

fn distinct_entity_ids(
    backend: &dyn RelationalBackend,
    table: &str,
    deleted: i64,
    limit: Option<usize>,
) -> CoreResult<Vec<CellValue>> {
    let mut query = Select::from(table)
        .columns(["entity_id"])
        .filter(Condition::eq("deleted", deleted))
        .order_by("entity_id")
        .distinct();
    if let Some(limit) = limit {
        query = query.limit(limit);
    }
    Ok(backend
        .select(&query)?
        .into_iter()
        .filter_map(|mut row| row.remove("entity_id"))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Connection;
    use crate::definition::{Cardinality, DefinitionRegistry, EntityType, PropertyColumn};
    use crate::entity::FieldValue;
    use entirel_storage::ColumnType;
    use std::sync::Arc;

    fn storage() -> EntityStorage {
        let registry = Arc::new(DefinitionRegistry::default());
        let node = EntityType::content("node").revisionable(true);
        registry.register(EntityDefinition::new(node).unwrap()).unwrap();
        let storage = EntityStorage::new("node", Connection::in_memory(), registry).unwrap();
        storage.install_schema().unwrap();
        storage
    }

    fn tags() -> FieldStorageDefinition {
        FieldStorageDefinition::string("node", "tags", 32)
            .cardinality(Cardinality::Unlimited)
            .revisionable(true)
            .dedicated()
    }

    fn table_exists(storage: &EntityStorage, table: &str) -> bool {
        storage.connection().read(|b| b.table_exists(table))
    }

    fn save_tagged(storage: &EntityStorage, bundle: &str) {
        let mut entity = storage.create(Some(bundle)).unwrap();
        entity.set("tags", FieldValue::list(["x", "y"])).unwrap();
        storage.save(&mut entity).unwrap();
    }

    #[test]
    fn install_is_idempotent() {
        let storage = storage();
        storage.install_schema().unwrap();
        assert!(table_exists(&storage, "node"));
        assert!(table_exists(&storage, "node_revision"));
    }

    #[test]
    fn created_field_gets_both_tables() {
        let storage = storage();
        storage.on_field_storage_create(tags()).unwrap();
        assert!(table_exists(&storage, "node__tags"));
        assert!(table_exists(&storage, "node_revision__tags"));
        assert!(storage.definition().unwrap().field("tags").is_some());
    }

    #[test]
    fn shared_fields_cannot_be_created_at_runtime() {
        let storage = storage();
        let err = storage
            .on_field_storage_create(FieldStorageDefinition::string("node", "title", 64))
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidOperation { .. }));
    }

    #[test]
    fn custom_storage_only_registers() {
        let storage = storage();
        let field = FieldStorageDefinition::new("node", "computed", "string").custom_storage();
        storage.on_field_storage_create(field).unwrap();
        assert!(storage.definition().unwrap().field("computed").is_some());
        assert!(!table_exists(&storage, "node__computed"));
    }

    #[test]
    fn column_change_with_data_is_forbidden() {
        let storage = storage();
        storage.on_field_storage_create(tags()).unwrap();
        save_tagged(&storage, "page");

        let original = storage.definition().unwrap().field("tags").unwrap().clone();
        let mut changed = original.clone();
        changed.columns.push(PropertyColumn::new("weight", ColumnType::Integer));
        let err = storage.on_field_storage_update(&original, changed).unwrap_err();
        assert!(matches!(err, CoreError::SchemaUpdateForbidden { .. }));
    }

    #[test]
    fn index_change_with_data_only_touches_that_index() {
        let storage = storage();
        storage.on_field_storage_create(tags()).unwrap();
        save_tagged(&storage, "page");

        let original = storage.definition().unwrap().field("tags").unwrap().clone();
        let changed = original.clone().index("value", ["value"]);
        storage.on_field_storage_update(&original, changed).unwrap();

        storage.connection().read(|b| {
            assert!(b.index_exists("node__tags", "tags_value"));
            assert!(b.index_exists("node__tags", "bundle"));
            assert_eq!(b.count("node__tags", &[]).unwrap(), 2);
        });
    }

    #[test]
    fn column_change_without_data_recreates_tables() {
        let storage = storage();
        storage.on_field_storage_create(tags()).unwrap();
        let original = storage.definition().unwrap().field("tags").unwrap().clone();
        let mut changed = original.clone();
        changed.columns.push(PropertyColumn::new("weight", ColumnType::Integer));
        changed.main_property = Some("value".to_string());
        storage.on_field_storage_update(&original, changed).unwrap();

        let schema = storage
            .connection()
            .read(|b| b.table_schema("node__tags").unwrap());
        assert!(schema.has_column("tags_weight"));
    }

    #[test]
    fn deleted_field_with_data_is_archived_then_purged() {
        let storage = storage();
        storage.on_field_storage_create(tags()).unwrap();
        save_tagged(&storage, "page");
        save_tagged(&storage, "page");
        storage.on_field_storage_delete("tags").unwrap();

        let definition = storage.definition().unwrap();
        assert!(definition.field("tags").is_none());
        let deleted = definition.deleted_fields()[0].clone();
        assert_eq!(storage.count_field_data(&deleted).unwrap(), 2);
        assert!(!table_exists(&storage, "node__tags"));

        let err = storage.finalize_purge(deleted.uuid).unwrap_err();
        assert!(matches!(err, CoreError::InvalidOperation { .. }));

        assert_eq!(storage.purge_field_data(1).unwrap(), 1);
        assert_eq!(storage.purge_field_data(10).unwrap(), 1);
        assert_eq!(storage.purge_field_data(10).unwrap(), 0);
        storage.finalize_purge(deleted.uuid).unwrap();
        assert!(storage.definition().unwrap().deleted_fields().is_empty());
    }

    #[test]
    fn deleted_field_without_data_is_dropped() {
        let storage = storage();
        storage.on_field_storage_create(tags()).unwrap();
        storage.on_field_storage_delete("tags").unwrap();
        assert!(!table_exists(&storage, "node__tags"));
        assert!(storage.definition().unwrap().deleted_fields().is_empty());
    }

    #[test]
    fn bundle_rename_moves_shared_and_dedicated_rows() {
        let storage = storage();
        storage.on_field_storage_create(tags()).unwrap();
        save_tagged(&storage, "page");
        save_tagged(&storage, "article");

        // One base row plus two items in each dedicated table.
        assert_eq!(storage.on_bundle_rename("page", "landing").unwrap(), 5);
        let entity = storage.load(1_i64).unwrap().unwrap();
        assert_eq!(entity.bundle(), Some("landing"));
        let other = storage.load(2_i64).unwrap().unwrap();
        assert_eq!(other.bundle(), Some("article"));
    }
}
