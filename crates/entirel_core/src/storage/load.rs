//! Loading entities and revisions.

use super::{EntityStorage, Snapshot};
use crate::cache::cache_key;
use crate::connection::Transaction;
use crate::entity::Entity;
use crate::error::{CoreError, CoreResult};
use crate::mapping::TableRole;
use crate::record::EntityRecordCodec;
use crate::types::{EntityId, RevisionId};
use entirel_storage::{Condition, Join, RelationalBackend, Row, Select, Value as CellValue};
use std::collections::BTreeMap;
use tracing::debug;

/// Alias under which the revision table is joined to the base table.
const REVISION_ALIAS: &str = "revision";

/// Which revision of each entity a load targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Default,
    Revision,
}

impl EntityStorage {
    /// Loads the default revision of one entity.
    ///
    /// # Errors
    ///
    /// Returns an error on backend or decoding failure.
    pub fn load(&self, id: impl Into<EntityId>) -> CoreResult<Option<Entity>> {
        let id = id.into();
        Ok(self.load_multiple(std::slice::from_ref(&id))?.remove(&id))
    }

    /// Loads the default revisions of several entities.
    ///
    /// Missing ids are absent from the result.
    ///
    /// # Errors
    ///
    /// Returns an error on backend or decoding failure.
    pub fn load_multiple(&self, ids: &[EntityId]) -> CoreResult<BTreeMap<EntityId, Entity>> {
        let mut found = BTreeMap::new();
        let mut misses = Vec::new();
        for id in ids.iter().filter(|id| !id.is_empty()) {
            let cached = self
                .config
                .persistent_cache
                .then(|| self.cache.get(&cache_key(&self.entity_type_id, id)))
                .flatten();
            match cached {
                Some(entity) => {
                    found.insert(id.clone(), entity);
                }
                None => misses.push(id.clone()),
            }
        }
        if misses.is_empty() {
            return Ok(found);
        }

        let snapshot = self.snapshot()?;
        let generation = self.connection.write_generation();
        let loaded = self
            .connection
            .read(|backend| self.load_from(backend, &snapshot, &misses))?;
        debug!(
            entity_type = %self.entity_type_id,
            requested = misses.len(),
            loaded = loaded.len(),
            "loaded entities"
        );
        if self.config.persistent_cache && !loaded.is_empty() {
            let keys: Vec<String> = loaded
                .keys()
                .map(|id| cache_key(&self.entity_type_id, id))
                .collect();
            for (key, entity) in keys.iter().zip(loaded.values()) {
                self.cache.set(key, entity.clone());
            }
            // A write committed after the read; what was stored may be stale.
            if self.connection.write_generation() != generation {
                self.cache.invalidate(&keys);
            }
        }
        found.extend(loaded);
        Ok(found)
    }

    /// Loads default revisions inside an open transaction, bypassing the
    /// cache.
    ///
    /// # Errors
    ///
    /// Returns an error on backend or decoding failure.
    pub fn load_in(
        &self,
        txn: &Transaction<'_>,
        ids: &[EntityId],
    ) -> CoreResult<BTreeMap<EntityId, Entity>> {
        let snapshot = self.snapshot()?;
        self.load_from(txn.reader(), &snapshot, ids)
    }

    /// Loads one revision.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] for entity types without
    /// revisions, or an error on backend or decoding failure.
    pub fn load_revision(&self, revision_id: RevisionId) -> CoreResult<Option<Entity>> {
        Ok(self
            .load_multiple_revisions(&[revision_id])?
            .remove(&revision_id))
    }

    /// Loads several revisions.
    ///
    /// Missing revision ids are absent from the result.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] for entity types without
    /// revisions, or an error on backend or decoding failure.
    pub fn load_multiple_revisions(
        &self,
        revision_ids: &[RevisionId],
    ) -> CoreResult<BTreeMap<RevisionId, Entity>> {
        let snapshot = self.snapshot()?;
        let loaded = self
            .connection
            .read(|backend| self.load_revisions_from(backend, &snapshot, revision_ids))?;
        debug!(
            entity_type = %self.entity_type_id,
            requested = revision_ids.len(),
            loaded = loaded.len(),
            "loaded revisions"
        );
        Ok(loaded)
    }

    /// Alias of [`EntityStorage::load_multiple_revisions`].
    ///
    /// # Errors
    ///
    /// See [`EntityStorage::load_multiple_revisions`].
    pub fn load_by_revision_ids(
        &self,
        revision_ids: &[RevisionId],
    ) -> CoreResult<BTreeMap<RevisionId, Entity>> {
        self.load_multiple_revisions(revision_ids)
    }

    /// All revision ids of an entity, ascending.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] for entity types without
    /// revisions, or a backend error.
    pub fn revision_ids(&self, id: impl Into<EntityId>) -> CoreResult<Vec<RevisionId>> {
        let id = id.into();
        let snapshot = self.snapshot()?;
        let table = revision_table(&snapshot)?;
        let id_column = snapshot.id_column()?;
        let revision_column = snapshot.revision_column()?;
        let query = Select::from(table)
            .filter(Condition::eq(id_column, id.to_cell()))
            .order_by(&revision_column)
            .columns([&revision_column]);
        let rows = self.connection.read(|backend| backend.select(&query))?;
        Ok(rows
            .iter()
            .filter_map(|row| row.get(&revision_column).and_then(CellValue::as_integer))
            .map(RevisionId::new)
            .collect())
    }

    /// The highest revision id of an entity, default or not.
    ///
    /// # Errors
    ///
    /// See [`EntityStorage::revision_ids`].
    pub fn latest_revision_id(&self, id: impl Into<EntityId>) -> CoreResult<Option<RevisionId>> {
        Ok(self.revision_ids(id)?.last().copied())
    }

    /// Number of stored entities.
    ///
    /// # Errors
    ///
    /// Returns a backend error.
    pub fn count_entities(&self) -> CoreResult<usize> {
        let snapshot = self.snapshot()?;
        let base = base_table(&snapshot)?;
        Ok(self.connection.read(|backend| backend.count(base, &[]))?)
    }

    pub(crate) fn load_from(
        &self,
        backend: &dyn RelationalBackend,
        snapshot: &Snapshot,
        ids: &[EntityId],
    ) -> CoreResult<BTreeMap<EntityId, Entity>> {
        let ids: Vec<CellValue> = ids
            .iter()
            .filter(|id| !id.is_empty())
            .map(EntityId::to_cell)
            .collect();
        if ids.is_empty() {
            return Ok(BTreeMap::new());
        }
        let codec = snapshot.codec(self.serializer());
        let revisionable = snapshot.definition.entity_type().revisionable;
        let id_column = snapshot.id_column()?;

        let mut query = Select::from(base_table(snapshot)?)
            .filter(Condition::is_in(&id_column, ids))
            .order_by(&id_column);
        if revisionable {
            let revision_column = snapshot.revision_column()?;
            query = query.join(Join::inner(
                revision_table(snapshot)?,
                REVISION_ALIAS,
                &revision_column,
                &revision_column,
            ));
        }

        let mut entities = Vec::new();
        for row in backend.select(&query)? {
            let (base, revision) = split_joined(row);
            let revision = revisionable.then_some(&revision);
            entities.push(codec.decode_base(&base, revision, true)?);
        }
        self.attach(backend, snapshot, &codec, &mut entities, Target::Default)?;
        Ok(entities
            .into_iter()
            .filter_map(|e| e.id().map(|id| (id, e)))
            .collect())
    }

    pub(crate) fn load_revisions_from(
        &self,
        backend: &dyn RelationalBackend,
        snapshot: &Snapshot,
        revision_ids: &[RevisionId],
    ) -> CoreResult<BTreeMap<RevisionId, Entity>> {
        let revision_table = revision_table(snapshot)?;
        if revision_ids.is_empty() {
            return Ok(BTreeMap::new());
        }
        let codec = snapshot.codec(self.serializer());
        let id_column = snapshot.id_column()?;
        let revision_column = snapshot.revision_column()?;

        let revisions = backend.select(
            &Select::from(revision_table)
                .filter(Condition::is_in(
                    &revision_column,
                    revision_ids.iter().map(|r| r.as_i64()),
                ))
                .order_by(&revision_column),
        )?;
        let owners: Vec<CellValue> = revisions
            .iter()
            .filter_map(|r| r.get(&id_column).cloned())
            .collect();
        let bases: BTreeMap<Option<EntityId>, Row> = backend
            .select(
                &Select::from(base_table(snapshot)?)
                    .filter(Condition::is_in(&id_column, owners)),
            )?
            .into_iter()
            .map(|row| (row.get(&id_column).and_then(EntityId::from_cell), row))
            .collect();

        let mut entities = Vec::new();
        for revision in &revisions {
            let owner = revision.get(&id_column).and_then(EntityId::from_cell);
            let Some(base) = bases.get(&owner) else {
                continue;
            };
            let is_default = base.get(&revision_column) == revision.get(&revision_column);
            entities.push(codec.decode_base(base, Some(revision), is_default)?);
        }
        self.attach(backend, snapshot, &codec, &mut entities, Target::Revision)?;
        Ok(entities
            .into_iter()
            .filter_map(|e| e.revision_id().map(|r| (r, e)))
            .collect())
    }

    /// Attaches translation rows and dedicated field items to decoded
    /// entities.
    fn attach(
        &self,
        backend: &dyn RelationalBackend,
        snapshot: &Snapshot,
        codec: &EntityRecordCodec<'_>,
        entities: &mut [Entity],
        target: Target,
    ) -> CoreResult<()> {
        if entities.is_empty() {
            return Ok(());
        }
        let mapping = &snapshot.mapping;
        let id_column = snapshot.id_column()?;
        let ids: Vec<CellValue> = entities
            .iter()
            .filter_map(Entity::id)
            .map(|id| id.to_cell())
            .collect();
        let revisions: Vec<CellValue> = entities
            .iter()
            .filter_map(Entity::revision_id)
            .map(|r| CellValue::Integer(r.as_i64()))
            .collect();

        // Revision data first: it decides which languages a revision has.
        if let Some(table) = mapping.table_name(TableRole::RevisionData) {
            let revision_column = snapshot.revision_column()?;
            let rows = backend.select(
                &Select::from(table)
                    .filter(Condition::is_in(&revision_column, revisions.clone()))
                    .order_by(&revision_column),
            )?;
            let grouped = group_by(rows, &revision_column);
            for entity in entities.iter_mut() {
                let key = entity.revision_id().map(|r| CellValue::Integer(r.as_i64()));
                let rows = key.and_then(|k| grouped.get(&CellKey(k)));
                codec.attach_translations(
                    entity,
                    TableRole::RevisionData,
                    rows.map_or(&[][..], Vec::as_slice),
                )?;
            }
        }

        if let Some(table) = mapping.table_name(TableRole::Data) {
            let has_revision_data = mapping.table(TableRole::RevisionData).is_some();
            let langcode_column = snapshot
                .definition
                .entity_type()
                .keys
                .langcode
                .as_deref()
                .and_then(|k| mapping.key_column(k))
                .unwrap_or_default()
                .to_string();
            let rows = backend.select(
                &Select::from(table)
                    .filter(Condition::is_in(&id_column, ids.clone()))
                    .order_by(&id_column),
            )?;
            let grouped = group_by(rows, &id_column);
            for entity in entities.iter_mut() {
                let key = entity.id().map(|id| CellKey(id.to_cell()));
                let mut rows = key
                    .and_then(|k| grouped.get(&k))
                    .cloned()
                    .unwrap_or_default();
                if has_revision_data {
                    rows.retain(|row| {
                        row.get(&langcode_column)
                            .and_then(CellValue::as_text)
                            .is_some_and(|l| entity.has_translation(l))
                    });
                }
                codec.attach_translations(entity, TableRole::Data, &rows)?;
            }
        }

        let definition = &snapshot.definition;
        for field in definition.dedicated_fields() {
            let (table, key_column, keys) = match target {
                Target::Default => (
                    mapping.dedicated_data_table_name(field),
                    "entity_id",
                    ids.clone(),
                ),
                Target::Revision => (
                    mapping.dedicated_revision_table_name(field),
                    "revision_id",
                    revisions.clone(),
                ),
            };
            let rows = backend.select(
                &Select::from(table)
                    .filter(Condition::is_in(key_column, keys))
                    .filter(Condition::eq("deleted", 0_i64))
                    .order_by(key_column)
                    .order_by("langcode")
                    .order_by("delta"),
            )?;
            let grouped = group_by(rows, key_column);
            for entity in entities.iter_mut() {
                let key = match target {
                    Target::Default => entity.id().map(|id| id.to_cell()),
                    Target::Revision => entity
                        .revision_id()
                        .map(|r| CellValue::Integer(r.as_i64())),
                };
                let rows = key.and_then(|k| grouped.get(&CellKey(k)));
                codec.attach_dedicated(entity, field, rows.map_or(&[][..], Vec::as_slice))?;
            }
        }
        Ok(())
    }
}

pub(crate) fn base_table(snapshot: &Snapshot) -> CoreResult<&str> {
    snapshot
        .mapping
        .table_name(TableRole::Base)
        .ok_or_else(|| CoreError::invalid_operation("mapping has no base table"))
}

pub(crate) fn revision_table(snapshot: &Snapshot) -> CoreResult<&str> {
    snapshot
        .mapping
        .table_name(TableRole::Revision)
        .ok_or_else(|| {
            CoreError::invalid_operation(format!(
                "entity type '{}' is not revisionable",
                snapshot.definition.entity_type_id()
            ))
        })
}

/// Splits a joined row into its base and revision halves.
fn split_joined(row: Row) -> (Row, Row) {
    let prefix = format!("{REVISION_ALIAS}.");
    let mut base = Row::new();
    let mut revision = Row::new();
    for (column, value) in row {
        match column.strip_prefix(&prefix) {
            Some(rest) => {
                revision.insert(rest.to_string(), value);
            }
            None => {
                base.insert(column, value);
            }
        }
    }
    (base, revision)
}

/// Orders cells so rows can be grouped by a key column.
#[derive(Debug, Clone)]
struct CellKey(CellValue);

impl PartialEq for CellKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for CellKey {}

impl PartialOrd for CellKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CellKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.compare(&other.0)
    }
}

fn group_by(rows: Vec<Row>, column: &str) -> BTreeMap<CellKey, Vec<Row>> {
    let mut grouped: BTreeMap<CellKey, Vec<Row>> = BTreeMap::new();
    for row in rows {
        let key = CellKey(row.get(column).cloned().unwrap_or(CellValue::Null));
        grouped.entry(key).or_default().push(row);
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joined_rows_split_on_alias() {
        let row = Row::from([
            ("id".to_string(), CellValue::Integer(1)),
            ("revision.title".to_string(), CellValue::from("x")),
        ]);
        let (base, revision) = split_joined(row);
        assert_eq!(base.len(), 1);
        assert_eq!(revision["title"], CellValue::from("x"));
    }

    #[test]
    fn grouping_keeps_row_order() {
        let rows = vec![
            Row::from([("k".to_string(), CellValue::Integer(2)), ("n".to_string(), 1_i64.into())]),
            Row::from([("k".to_string(), CellValue::Integer(1)), ("n".to_string(), 2_i64.into())]),
            Row::from([("k".to_string(), CellValue::Integer(2)), ("n".to_string(), 3_i64.into())]),
        ];
        let grouped = group_by(rows, "k");
        let twos = &grouped[&CellKey(CellValue::Integer(2))];
        assert_eq!(twos[1]["n"], CellValue::Integer(3));
        assert_eq!(grouped.len(), 2);
    }
}
