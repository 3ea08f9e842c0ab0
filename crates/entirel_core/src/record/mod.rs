//! Conversion between entities and table rows.
//!
//! Encoding produces one row per table key tuple: the base and revision
//! tables get one row per entity, the data and revision data tables one
//! row per language, and dedicated tables one row per item. Decoding
//! reverses this and tolerates stale data: language rows that disagree
//! with the entity's default language are skipped, and dedicated items
//! beyond a field's cardinality are dropped.

mod cell;

pub(crate) use cell::{from_cell, to_cell};

use crate::definition::{EntityDefinition, FieldStorageDefinition};
use crate::entity::{Entity, FieldItem};
use crate::error::{CoreError, CoreResult};
use crate::mapping::{TableMapping, TableRole};
use crate::types::LANGCODE_DEFAULT;
use entirel_codec::{SerializeCodec, Value as PropertyValue};
use entirel_storage::{Row, Value as CellValue};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

/// Rows of one entity, keyed by table name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityRecords {
    /// Rows per table.
    pub tables: BTreeMap<String, Vec<Row>>,
}

impl EntityRecords {
    /// Rows of a table, empty if absent.
    #[must_use]
    pub fn rows(&self, table: &str) -> &[Row] {
        self.tables.get(table).map_or(&[], Vec::as_slice)
    }

    fn push(&mut self, table: &str, row: Row) {
        self.tables.entry(table.to_string()).or_default().push(row);
    }
}

/// Converts entities of one type to rows and back.
#[derive(Clone, Copy)]
pub struct EntityRecordCodec<'a> {
    definition: &'a Arc<EntityDefinition>,
    mapping: &'a TableMapping,
    serializer: &'a dyn SerializeCodec,
}

impl<'a> EntityRecordCodec<'a> {
    /// Creates a codec.
    #[must_use]
    pub fn new(
        definition: &'a Arc<EntityDefinition>,
        mapping: &'a TableMapping,
        serializer: &'a dyn SerializeCodec,
    ) -> Self {
        Self {
            definition,
            mapping,
            serializer,
        }
    }

    fn field(&self, name: &str) -> CoreResult<&'a FieldStorageDefinition> {
        self.definition
            .field(name)
            .ok_or_else(|| CoreError::unknown_field(self.definition.entity_type_id(), name))
    }

    /// Encodes every shared and dedicated row of an entity.
    ///
    /// # Errors
    ///
    /// Returns an error if a value cannot be encoded, or if the entity has
    /// dedicated values but no id yet.
    pub fn to_records(&self, entity: &Entity) -> CoreResult<EntityRecords> {
        let mut records = EntityRecords::default();
        for table in self.mapping.tables() {
            match table.role {
                TableRole::Base | TableRole::Revision => {
                    let row = self.table_row(entity, table.role, entity.language())?;
                    records.push(&table.name, row);
                }
                TableRole::Data | TableRole::RevisionData => {
                    for langcode in entity.translation_languages() {
                        let row = self.table_row(entity, table.role, langcode)?;
                        records.push(&table.name, row);
                    }
                }
            }
        }
        for field in self.definition.dedicated_fields() {
            let rows = self.dedicated_rows(entity, field)?;
            for name in [
                self.mapping.dedicated_data_table_name(field),
                self.mapping.dedicated_revision_table_name(field),
            ] {
                records.tables.insert(name, rows.clone());
            }
        }
        Ok(records)
    }

    /// Encodes the row of one shared table in one language.
    ///
    /// Unassigned id and revision id keys encode as NULL so the backend
    /// can mint them.
    ///
    /// # Errors
    ///
    /// Returns an error if the layout has no table for `role` or a value
    /// cannot be encoded.
    pub fn table_row(&self, entity: &Entity, role: TableRole, langcode: &str) -> CoreResult<Row> {
        let table = self.mapping.table(role).ok_or_else(|| {
            CoreError::invalid_operation(format!(
                "entity type '{}' has no {role} table",
                self.definition.entity_type_id()
            ))
        })?;
        let keys = &self.definition.entity_type().keys;
        let is_default = langcode == entity.language();
        let mut row = Row::new();

        for name in &table.fields {
            let columns = self.mapping.field_columns(name).unwrap_or_default();
            let key_cell = if *name == keys.id {
                Some(entity.id().map_or(CellValue::Null, |id| id.to_cell()))
            } else if keys.revision.as_ref() == Some(name) {
                Some(
                    entity
                        .revision_id()
                        .map_or(CellValue::Null, |r| CellValue::Integer(r.as_i64())),
                )
            } else if keys.langcode.as_ref() == Some(name) {
                Some(CellValue::from(langcode))
            } else {
                None
            };
            if let Some(cell) = key_cell {
                for (_, column) in columns {
                    row.insert(column.clone(), cell.clone());
                }
                continue;
            }

            let field = self.field(name)?;
            let items = if field.translatable && !is_default {
                entity.items_for(name, langcode)
            } else {
                entity.get(name)
            };
            let item = items.first();
            for (property, column) in columns {
                let value = item
                    .and_then(|i| i.get(property))
                    .unwrap_or(&PropertyValue::Null);
                row.insert(column.clone(), self.encode(field, property, value)?);
            }
        }
        for extra in &table.extra_columns {
            row.insert(extra.clone(), CellValue::from(is_default));
        }
        Ok(row)
    }

    /// Encodes the item rows of a dedicated field.
    ///
    /// Non-translatable fields are written in the default language only.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity has no id yet or a value cannot be
    /// encoded.
    pub fn dedicated_rows(
        &self,
        entity: &Entity,
        field: &FieldStorageDefinition,
    ) -> CoreResult<Vec<Row>> {
        let id = entity.id().ok_or_else(|| {
            CoreError::invalid_operation("dedicated field rows need an entity id")
        })?;
        let revision_id = if self.definition.entity_type().revisionable {
            entity
                .revision_id()
                .map_or(CellValue::Null, |r| CellValue::Integer(r.as_i64()))
        } else {
            id.to_cell()
        };
        let bundle = entity
            .bundle()
            .unwrap_or_else(|| self.definition.entity_type_id());
        let languages = if field.translatable {
            entity.translation_languages()
        } else {
            vec![entity.language()]
        };

        let mut rows = Vec::new();
        for langcode in languages {
            let items = if langcode == entity.language() {
                entity.get(&field.name)
            } else {
                entity.items_for(&field.name, langcode)
            };
            for (delta, item) in items.iter().enumerate() {
                let mut row = Row::from([
                    ("bundle".to_string(), CellValue::from(bundle)),
                    ("deleted".to_string(), CellValue::Integer(0)),
                    ("entity_id".to_string(), id.to_cell()),
                    ("revision_id".to_string(), revision_id.clone()),
                    ("langcode".to_string(), CellValue::from(langcode)),
                    ("delta".to_string(), CellValue::from(delta as i64)),
                ]);
                for property in &field.columns {
                    let value = item.get(&property.name).unwrap_or(&PropertyValue::Null);
                    row.insert(
                        self.mapping.dedicated_column_name(field, &property.name),
                        to_cell(property, value, self.serializer)?,
                    );
                }
                rows.push(row);
            }
        }
        Ok(rows)
    }

    fn encode(
        &self,
        field: &FieldStorageDefinition,
        property: &str,
        value: &PropertyValue,
    ) -> CoreResult<CellValue> {
        match field.property_column(property) {
            Some(column) => to_cell(column, value, self.serializer),
            None => Ok(CellValue::Null),
        }
    }

    /// Decodes an entity from all of its rows.
    ///
    /// `records` is expected to hold the rows of a single revision, as
    /// produced by [`EntityRecordCodec::to_records`].
    ///
    /// # Errors
    ///
    /// Returns an error if the base row is missing or a value cannot be
    /// decoded.
    pub fn from_records(
        &self,
        records: &EntityRecords,
        default_revision: bool,
    ) -> CoreResult<Entity> {
        let row_of = |role: TableRole| {
            self.mapping
                .table_name(role)
                .and_then(|name| records.rows(name).first())
        };
        let base = row_of(TableRole::Base)
            .ok_or_else(|| CoreError::invalid_operation("records hold no base row"))?;
        let mut entity = self.decode_base(base, row_of(TableRole::Revision), default_revision)?;

        let data = self
            .mapping
            .table_name(TableRole::Data)
            .map_or(&[][..], |name| records.rows(name));
        let revision_data = self
            .mapping
            .table_name(TableRole::RevisionData)
            .map_or(&[][..], |name| records.rows(name));
        self.attach_translations(&mut entity, TableRole::Data, data)?;
        self.attach_translations(&mut entity, TableRole::RevisionData, revision_data)?;

        for field in self.definition.dedicated_fields() {
            let table = if default_revision {
                self.mapping.dedicated_data_table_name(field)
            } else {
                self.mapping.dedicated_revision_table_name(field)
            };
            self.attach_dedicated(&mut entity, field, records.rows(&table))?;
        }
        Ok(entity)
    }

    /// Decodes the key and single-row fields from the base row and, for
    /// revisionable types, the revision row.
    ///
    /// Revision row values win over base row values.
    ///
    /// # Errors
    ///
    /// Returns an error if a value cannot be decoded.
    pub fn decode_base(
        &self,
        base: &Row,
        revision: Option<&Row>,
        default_revision: bool,
    ) -> CoreResult<Entity> {
        let mut entity = Entity::loaded(Arc::clone(self.definition), default_revision);
        let langcode_key = self.definition.entity_type().keys.langcode.as_deref();

        for (role, row) in [(TableRole::Base, Some(base)), (TableRole::Revision, revision)] {
            let (Some(table), Some(row)) = (self.mapping.table(role), row) else {
                continue;
            };
            for name in &table.fields {
                if Some(name.as_str()) == langcode_key {
                    let column = self.mapping.key_column(name).unwrap_or(name.as_str());
                    if let Some(langcode) = row.get(column).and_then(CellValue::as_text) {
                        entity.set_language(langcode)?;
                    }
                    continue;
                }
                let field = self.field(name)?;
                let items = self.decode_shared_item(field, row)?.into_iter().collect();
                entity.put_items(name, LANGCODE_DEFAULT, items);
            }
        }
        Ok(entity)
    }

    fn decode_shared_item(
        &self,
        field: &FieldStorageDefinition,
        row: &Row,
    ) -> CoreResult<Option<FieldItem>> {
        let mut item = FieldItem::new();
        for (property, column) in self.mapping.field_columns(&field.name).unwrap_or_default() {
            let (Some(spec), Some(cell)) = (field.property_column(property), row.get(column))
            else {
                continue;
            };
            let value = from_cell(spec, cell, self.serializer)?;
            if !value.is_null() {
                item.insert(property.clone(), value);
            }
        }
        Ok((!item.is_empty()).then_some(item))
    }

    /// Merges data or revision data rows of one entity into it.
    ///
    /// The row flagged as default language fills [`LANGCODE_DEFAULT`];
    /// other rows add a translation and fill its translatable fields.
    ///
    /// # Errors
    ///
    /// Returns an error if a value cannot be decoded.
    pub fn attach_translations(
        &self,
        entity: &mut Entity,
        role: TableRole,
        rows: &[Row],
    ) -> CoreResult<()> {
        let Some(table) = self.mapping.table(role) else {
            return Ok(());
        };
        let entity_type = self.definition.entity_type();
        let keys = &entity_type.keys;
        let langcode_column = keys
            .langcode
            .as_deref()
            .and_then(|k| self.mapping.key_column(k));

        for row in rows {
            let langcode = langcode_column
                .and_then(|c| row.get(c))
                .and_then(CellValue::as_text)
                .unwrap_or_default()
                .to_string();
            let flagged_default = row
                .get(&keys.default_langcode)
                .and_then(CellValue::as_integer)
                .is_some_and(|n| n != 0);
            if flagged_default != (langcode == entity.language()) {
                warn!(
                    entity_type = %entity_type.id,
                    table = %table.name,
                    langcode = %langcode,
                    "skipping stale language row"
                );
                continue;
            }
            let langkey = if flagged_default {
                LANGCODE_DEFAULT.to_string()
            } else {
                entity.insert_translation(&langcode);
                langcode
            };

            for name in &table.fields {
                if entity_type.is_key_field(name) {
                    continue;
                }
                let field = self.field(name)?;
                if !flagged_default && !field.translatable {
                    continue;
                }
                let items = self.decode_shared_item(field, row)?.into_iter().collect();
                entity.put_items(name, &langkey, items);
            }
        }
        Ok(())
    }

    /// Merges the item rows of a dedicated field into an entity.
    ///
    /// Rows must be ordered by language and delta.
    ///
    /// # Errors
    ///
    /// Returns an error if a value cannot be decoded.
    pub fn attach_dedicated(
        &self,
        entity: &mut Entity,
        field: &FieldStorageDefinition,
        rows: &[Row],
    ) -> CoreResult<()> {
        let limit = field.cardinality.limit();
        let mut items: BTreeMap<String, Vec<FieldItem>> = BTreeMap::new();

        for row in rows {
            let langcode = row
                .get("langcode")
                .and_then(CellValue::as_text)
                .unwrap_or_default();
            let langkey = if langcode == entity.language() {
                LANGCODE_DEFAULT
            } else if field.translatable && entity.has_translation(langcode) {
                langcode
            } else {
                warn!(
                    entity_type = %self.definition.entity_type_id(),
                    field = %field.name,
                    langcode = %langcode,
                    "skipping stale language row"
                );
                continue;
            };
            let list = items.entry(langkey.to_string()).or_default();
            if limit.is_some_and(|limit| list.len() >= limit) {
                warn!(
                    entity_type = %self.definition.entity_type_id(),
                    field = %field.name,
                    langcode = %langcode,
                    "dropping item beyond field cardinality"
                );
                continue;
            }

            let mut item = FieldItem::new();
            for property in &field.columns {
                let column = self.mapping.dedicated_column_name(field, &property.name);
                let Some(cell) = row.get(&column) else {
                    continue;
                };
                let value = from_cell(property, cell, self.serializer)?;
                if !value.is_null() {
                    item.insert(property.name.clone(), value);
                }
            }
            list.push(item);
        }

        for (langkey, list) in items {
            entity.put_items(&field.name, &langkey, list);
        }
        Ok(())
    }
}
