//! Inserting and updating entities.
//!
//! Writes happen in dependency order: base table, revision table, data
//! table, revision data table, then dedicated field tables. Later writes
//! read the identifiers minted by earlier ones.

use super::{EntityStorage, Snapshot};
use crate::connection::Transaction;
use crate::definition::IdType;
use crate::entity::Entity;
use crate::error::{CoreError, CoreResult};
use crate::mapping::TableRole;
use crate::record::{EntityRecordCodec, EntityRecords};
use crate::types::{EntityId, RevisionId, SaveResult};
use entirel_storage::{Condition, RelationalBackend, Row, Value as CellValue};
use tracing::debug;
use uuid::Uuid;

impl EntityStorage {
    /// Saves an entity in its own transaction.
    ///
    /// New entities are inserted. Existing entities update their default
    /// revision, or only write revision rows when the object represents a
    /// non-default revision. On success the entity carries its assigned id
    /// and revision id; on failure it is left untouched.
    ///
    /// # Errors
    ///
    /// Returns a configuration error before any query runs, or the backend
    /// error after the transaction was rolled back.
    pub fn save(&self, entity: &mut Entity) -> CoreResult<SaveResult> {
        let mut working = entity.clone();
        let result = self
            .connection
            .transaction(|txn| self.save_in(txn, &mut working))?;
        *entity = working;
        Ok(result)
    }

    /// Saves an entity inside a caller's transaction, as a nested scope.
    ///
    /// # Errors
    ///
    /// See [`EntityStorage::save`]. The entity may carry assigned ids even
    /// when the outer transaction is later rolled back.
    pub fn save_in(
        &self,
        txn: &mut Transaction<'_>,
        entity: &mut Entity,
    ) -> CoreResult<SaveResult> {
        let snapshot = self.snapshot()?;
        self.check_saveable(&snapshot, entity)?;
        let result = txn.nested(|txn| self.write(txn.backend(), &snapshot, entity))?;
        entity.mark_saved();
        self.invalidate_cache(entity.id().as_ref());
        debug!(
            entity_type = %self.entity_type_id,
            id = ?entity.id(),
            revision_id = ?entity.revision_id(),
            result = ?result,
            "saved entity"
        );
        Ok(result)
    }

    fn check_saveable(&self, snapshot: &Snapshot, entity: &Entity) -> CoreResult<()> {
        self.check_entity_type(entity)?;
        let entity_type = snapshot.definition.entity_type();
        if entity_type.keys.bundle.is_some() && entity.bundle().is_none() {
            return Err(CoreError::MissingBundle {
                entity_type: entity_type.id.clone(),
            });
        }
        if !entity.is_default_revision() && (entity.is_new() || !entity_type.revisionable) {
            return Err(CoreError::invalid_operation(
                "only revisions of existing revisionable entities can be non-default",
            ));
        }
        if entity.is_new() && entity_type.id_type == IdType::String && entity.id().is_none() {
            return Err(CoreError::invalid_operation(format!(
                "entities of type '{}' need a caller-supplied id",
                entity_type.id
            )));
        }
        if !entity.is_new() && entity.id().is_none() {
            return Err(CoreError::invalid_operation("existing entity has no id"));
        }
        Ok(())
    }

    fn write(
        &self,
        backend: &mut dyn RelationalBackend,
        snapshot: &Snapshot,
        entity: &mut Entity,
    ) -> CoreResult<SaveResult> {
        let codec = snapshot.codec(self.serializer());
        let entity_type = snapshot.definition.entity_type();
        let base = super::load::base_table(snapshot)?;
        let id_column = snapshot.id_column()?;

        let result = if entity.is_new() {
            if let Some(uuid_key) = &entity_type.keys.uuid {
                if entity.uuid().is_none() {
                    entity.set(uuid_key, Uuid::new_v4().to_string())?;
                }
            }
            let row = codec.table_row(entity, TableRole::Base, entity.language())?;
            let assigned = backend.insert(base, row)?;
            if entity.id().is_none() {
                let id = assigned.ok_or_else(|| {
                    CoreError::invalid_operation(format!("table '{base}' assigned no id"))
                })?;
                entity.set_id(id);
            }
            if entity_type.revisionable {
                let revision_id = self.insert_revision(backend, snapshot, &codec, entity)?;
                let revision_column = snapshot.revision_column()?;
                backend.update(
                    base,
                    &[id_condition(&id_column, entity)?],
                    &Row::from([(revision_column, CellValue::Integer(revision_id.as_i64()))]),
                )?;
            }
            SaveResult::Inserted
        } else {
            if entity_type.revisionable {
                if entity.is_new_revision() {
                    self.insert_revision(backend, snapshot, &codec, entity)?;
                } else {
                    self.update_revision(backend, snapshot, &codec, entity)?;
                }
            }
            if entity.is_default_revision() {
                let mut row = codec.table_row(entity, TableRole::Base, entity.language())?;
                row.remove(&id_column);
                backend.update(base, &[id_condition(&id_column, entity)?], &row)?;
                SaveResult::Updated
            } else {
                SaveResult::NotDefaultRevision
            }
        };

        let records = codec.to_records(entity)?;
        self.write_translations(backend, snapshot, entity, &records)?;
        self.write_dedicated(backend, snapshot, entity, &records)?;
        Ok(result)
    }

    /// Inserts a revision row and back-fills the minted revision id.
    fn insert_revision(
        &self,
        backend: &mut dyn RelationalBackend,
        snapshot: &Snapshot,
        codec: &EntityRecordCodec<'_>,
        entity: &mut Entity,
    ) -> CoreResult<RevisionId> {
        let table = super::load::revision_table(snapshot)?;
        entity.set_revision_id(None);
        let row = codec.table_row(entity, TableRole::Revision, entity.language())?;
        let revision_id = backend
            .insert(table, row)?
            .map(RevisionId::new)
            .ok_or_else(|| {
                CoreError::invalid_operation(format!("table '{table}' assigned no revision id"))
            })?;
        entity.set_revision_id(Some(revision_id));
        Ok(revision_id)
    }

    fn update_revision(
        &self,
        backend: &mut dyn RelationalBackend,
        snapshot: &Snapshot,
        codec: &EntityRecordCodec<'_>,
        entity: &Entity,
    ) -> CoreResult<()> {
        let table = super::load::revision_table(snapshot)?;
        let revision_column = snapshot.revision_column()?;
        let condition = revision_condition(&revision_column, entity)?;
        let mut row = codec.table_row(entity, TableRole::Revision, entity.language())?;
        row.remove(&revision_column);
        backend.update(table, &[condition], &row)?;
        Ok(())
    }

    /// Rewrites data and revision data rows by delete-then-insert, so that
    /// removed translations disappear.
    fn write_translations(
        &self,
        backend: &mut dyn RelationalBackend,
        snapshot: &Snapshot,
        entity: &Entity,
        records: &EntityRecords,
    ) -> CoreResult<()> {
        let mapping = &snapshot.mapping;
        if let Some(table) = mapping.table_name(TableRole::Data) {
            if entity.is_default_revision() {
                let id_column = snapshot.id_column()?;
                backend.delete(table, &[id_condition(&id_column, entity)?])?;
                insert_all(backend, table, records.rows(table))?;
            }
        }
        if let Some(table) = mapping.table_name(TableRole::RevisionData) {
            let revision_column = snapshot.revision_column()?;
            backend.delete(table, &[revision_condition(&revision_column, entity)?])?;
            insert_all(backend, table, records.rows(table))?;
        }
        Ok(())
    }

    /// Rewrites dedicated field rows: the data table only for the default
    /// revision, the revision table always.
    fn write_dedicated(
        &self,
        backend: &mut dyn RelationalBackend,
        snapshot: &Snapshot,
        entity: &Entity,
        records: &EntityRecords,
    ) -> CoreResult<()> {
        let id = entity
            .id()
            .ok_or_else(|| CoreError::invalid_operation("entity has no id"))?;
        let revision = match entity.revision_id() {
            Some(r) if snapshot.definition.entity_type().revisionable => {
                CellValue::Integer(r.as_i64())
            }
            _ => id.to_cell(),
        };
        for field in snapshot.definition.dedicated_fields() {
            let data_table = snapshot.mapping.dedicated_data_table_name(field);
            let revision_table = snapshot.mapping.dedicated_revision_table_name(field);
            let rows = records.rows(&data_table);
            if entity.is_default_revision() {
                backend.delete(&data_table, &[Condition::eq("entity_id", id.to_cell())])?;
                insert_all(backend, &data_table, rows)?;
            }
            backend.delete(
                &revision_table,
                &[
                    Condition::eq("entity_id", id.to_cell()),
                    Condition::eq("revision_id", revision.clone()),
                ],
            )?;
            insert_all(backend, &revision_table, rows)?;
        }
        Ok(())
    }
}

fn insert_all(backend: &mut dyn RelationalBackend, table: &str, rows: &[Row]) -> CoreResult<()> {
    for row in rows {
        backend.insert(table, row.clone())?;
    }
    Ok(())
}

fn id_condition(column: &str, entity: &Entity) -> CoreResult<Condition> {
    let id: EntityId = entity
        .id()
        .ok_or_else(|| CoreError::invalid_operation("entity has no id"))?;
    Ok(Condition::eq(column, id.to_cell()))
}

fn revision_condition(column: &str, entity: &Entity) -> CoreResult<Condition> {
    let revision_id = entity
        .revision_id()
        .ok_or_else(|| CoreError::invalid_operation("entity has no revision id"))?;
    Ok(Condition::eq(column, revision_id.as_i64()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Connection;
    use crate::definition::{
        DefinitionRegistry, EntityDefinition, EntityType, FieldStorageDefinition,
    };
    use std::sync::Arc;

    fn storage(entity_type: EntityType) -> EntityStorage {
        let registry = Arc::new(DefinitionRegistry::default());
        let id = entity_type.id.clone();
        registry
            .register(
                EntityDefinition::with_fields(
                    entity_type,
                    [FieldStorageDefinition::string(&id, "title", 64).revisionable(true)],
                )
                .unwrap(),
            )
            .unwrap();
        let storage = EntityStorage::new(id, Connection::in_memory(), registry).unwrap();
        storage.install_schema().unwrap();
        storage
    }

    #[test]
    fn insert_assigns_id_uuid_and_revision() {
        let storage = storage(EntityType::content("node").revisionable(true));
        let mut entity = storage.create(Some("page")).unwrap();
        entity.set("title", "One").unwrap();

        assert_eq!(storage.save(&mut entity).unwrap(), SaveResult::Inserted);
        assert_eq!(entity.id(), Some(EntityId::Integer(1)));
        assert_eq!(entity.revision_id(), Some(RevisionId::new(1)));
        assert!(entity.uuid().is_some());
        assert!(!entity.is_new());
    }

    #[test]
    fn explicit_id_is_preserved() {
        let storage = storage(EntityType::content("node"));
        let mut entity = storage.create(Some("page")).unwrap();
        entity.set_id(42_i64);
        storage.save(&mut entity).unwrap();
        assert_eq!(entity.id(), Some(EntityId::Integer(42)));
        assert!(storage.load(42_i64).unwrap().is_some());
    }

    #[test]
    fn string_ids_must_be_supplied() {
        let storage = storage(EntityType::content("config").string_ids());
        let mut entity = storage.create(Some("system")).unwrap();
        let err = storage.save(&mut entity).unwrap_err();
        assert!(matches!(err, CoreError::InvalidOperation { .. }));

        entity.set_id("site");
        storage.save(&mut entity).unwrap();
        assert!(storage.load("site").unwrap().is_some());
    }

    #[test]
    fn missing_bundle_fails_before_any_query() {
        let storage = storage(EntityType::content("node"));
        let definition = storage.definition().unwrap();
        let mut entity = Entity::new(definition);
        let err = storage.save(&mut entity).unwrap_err();
        assert!(matches!(err, CoreError::MissingBundle { .. }));
        assert_eq!(storage.count_entities().unwrap(), 0);
    }

    #[test]
    fn failed_save_leaves_entity_untouched() {
        let storage = storage(EntityType::content("node"));
        let mut first = storage.create(Some("page")).unwrap();
        first.set_id(7_i64);
        storage.save(&mut first).unwrap();

        let mut duplicate = storage.create(Some("page")).unwrap();
        duplicate.set_id(7_i64);
        let before = duplicate.clone();
        assert!(storage.save(&mut duplicate).is_err());
        assert_eq!(duplicate, before);
        assert!(duplicate.is_new());
    }
}
