//! Deleting entities and individual revisions.

use super::{EntityStorage, Snapshot};
use crate::connection::Transaction;
use crate::entity::Entity;
use crate::error::{CoreError, CoreResult};
use crate::mapping::TableRole;
use crate::types::{EntityId, RevisionId};
use entirel_storage::{Condition, RelationalBackend, Select, Value as CellValue};
use tracing::debug;

impl EntityStorage {
    /// Deletes entities with all their revisions, translations and field
    /// values, in one transaction.
    ///
    /// An empty slice is a no-op. Entities without an id are skipped.
    ///
    /// # Errors
    ///
    /// Returns the backend error after the transaction was rolled back.
    pub fn delete(&self, entities: &[Entity]) -> CoreResult<()> {
        if entities.is_empty() {
            return Ok(());
        }
        self.connection
            .transaction(|txn| self.delete_in(txn, entities))
    }

    /// Deletes entities inside a caller's transaction.
    ///
    /// # Errors
    ///
    /// See [`EntityStorage::delete`].
    pub fn delete_in(&self, txn: &mut Transaction<'_>, entities: &[Entity]) -> CoreResult<()> {
        for entity in entities {
            self.check_entity_type(entity)?;
        }
        let ids: Vec<EntityId> = entities.iter().filter_map(Entity::id).collect();
        if ids.is_empty() {
            return Ok(());
        }
        let snapshot = self.snapshot()?;
        txn.nested(|txn| delete_rows(txn.backend(), &snapshot, &ids))?;
        self.invalidate_cache(&ids);
        debug!(entity_type = %self.entity_type_id, count = ids.len(), "deleted entities");
        Ok(())
    }

    /// Deletes one non-default revision.
    ///
    /// A revision that does not exist is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DefaultRevisionDeletionForbidden`] for the
    /// default revision, [`CoreError::InvalidOperation`] for entity types
    /// without revisions, or the backend error.
    pub fn delete_revision(&self, revision_id: RevisionId) -> CoreResult<()> {
        let snapshot = self.snapshot()?;
        let revision_table = super::load::revision_table(&snapshot)?.to_string();
        let id = self.connection.transaction(|txn| {
            let Some(id) = revision_owner(txn.reader(), &snapshot, &revision_table, revision_id)?
            else {
                return Ok(None);
            };
            if is_default_revision(txn.reader(), &snapshot, &id, revision_id)? {
                return Err(CoreError::DefaultRevisionDeletionForbidden {
                    revision_id: revision_id.as_i64(),
                });
            }
            txn.nested(|txn| {
                delete_revision_rows(txn.backend(), &snapshot, &revision_table, &id, revision_id)
            })?;
            Ok(Some(id))
        })?;
        if let Some(id) = id {
            self.invalidate_cache([&id]);
            debug!(
                entity_type = %self.entity_type_id,
                id = %id,
                revision_id = %revision_id,
                "deleted revision"
            );
        }
        Ok(())
    }
}

fn delete_rows(
    backend: &mut dyn RelationalBackend,
    snapshot: &Snapshot,
    ids: &[EntityId],
) -> CoreResult<()> {
    let id_column = snapshot.id_column()?;
    let cells: Vec<CellValue> = ids.iter().map(EntityId::to_cell).collect();
    for role in [
        TableRole::Base,
        TableRole::Revision,
        TableRole::Data,
        TableRole::RevisionData,
    ] {
        if let Some(table) = snapshot.mapping.table_name(role) {
            backend.delete(table, &[Condition::is_in(&id_column, cells.clone())])?;
        }
    }
    for field in snapshot.definition.dedicated_fields() {
        for table in [
            snapshot.mapping.dedicated_data_table_name(field),
            snapshot.mapping.dedicated_revision_table_name(field),
        ] {
            backend.delete(&table, &[Condition::is_in("entity_id", cells.clone())])?;
        }
    }
    Ok(())
}

fn revision_owner(
    backend: &dyn RelationalBackend,
    snapshot: &Snapshot,
    revision_table: &str,
    revision_id: RevisionId,
) -> CoreResult<Option<EntityId>> {
    let id_column = snapshot.id_column()?;
    let rows = backend.select(
        &Select::from(revision_table)
            .columns([id_column.clone()])
            .filter(Condition::eq(snapshot.revision_column()?, revision_id.as_i64())),
    )?;
    Ok(rows
        .first()
        .and_then(|row| row.get(&id_column))
        .and_then(EntityId::from_cell))
}

fn is_default_revision(
    backend: &dyn RelationalBackend,
    snapshot: &Snapshot,
    id: &EntityId,
    revision_id: RevisionId,
) -> CoreResult<bool> {
    let revision_column = snapshot.revision_column()?;
    let rows = backend.select(
        &Select::from(super::load::base_table(snapshot)?)
            .columns([revision_column.clone()])
            .filter(Condition::eq(snapshot.id_column()?, id.to_cell())),
    )?;
    Ok(rows
        .first()
        .and_then(|row| row.get(&revision_column))
        .and_then(CellValue::as_integer)
        == Some(revision_id.as_i64()))
}

fn delete_revision_rows(
    backend: &mut dyn RelationalBackend,
    snapshot: &Snapshot,
    revision_table: &str,
    id: &EntityId,
    revision_id: RevisionId,
) -> CoreResult<()> {
    let revision_column = snapshot.revision_column()?;
    let by_revision = Condition::eq(&revision_column, revision_id.as_i64());
    backend.delete(revision_table, &[by_revision.clone()])?;
    if let Some(table) = snapshot.mapping.table_name(TableRole::RevisionData) {
        backend.delete(table, &[by_revision])?;
    }
    for field in snapshot.definition.dedicated_fields() {
        backend.delete(
            &snapshot.mapping.dedicated_revision_table_name(field),
            &[
                Condition::eq("entity_id", id.to_cell()),
                Condition::eq("revision_id", revision_id.as_i64()),
            ],
        )?;
    }
    Ok(())
}
