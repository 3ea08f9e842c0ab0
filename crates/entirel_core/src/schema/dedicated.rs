//! Schemas of dedicated field tables.

use crate::definition::{EntityDefinition, FieldStorageDefinition, IdType};
use crate::error::{CoreError, CoreResult};
use crate::mapping::TableMapping;
use entirel_storage::{ColumnSpec, ColumnType, TableSchema};

/// Columns every dedicated table carries before the field's own columns.
pub const DEDICATED_FIXED_COLUMNS: [&str; 6] = [
    "bundle",
    "deleted",
    "entity_id",
    "revision_id",
    "langcode",
    "delta",
];

/// The pair of tables owned by a dedicated field.
#[derive(Debug, Clone, PartialEq)]
pub struct DedicatedTableSchemas {
    /// Current values, one row per item of the default revision.
    pub data: TableSchema,
    /// Values of every revision.
    pub revision: TableSchema,
}

impl DedicatedTableSchemas {
    /// Both schemas, data table first.
    #[must_use]
    pub fn both(&self) -> [&TableSchema; 2] {
        [&self.data, &self.revision]
    }
}

/// Derives dedicated table DDL for the fields of one entity type.
#[derive(Debug, Clone, Copy)]
pub struct DedicatedFieldSchemaGenerator<'a> {
    definition: &'a EntityDefinition,
    mapping: &'a TableMapping,
}

impl<'a> DedicatedFieldSchemaGenerator<'a> {
    /// Creates a generator.
    #[must_use]
    pub fn new(definition: &'a EntityDefinition, mapping: &'a TableMapping) -> Self {
        Self {
            definition,
            mapping,
        }
    }

    /// Builds the data and revision table schemas of a field.
    ///
    /// Deleted fields get their archived table names.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ReservedColumnName`] if a property maps onto a
    /// fixed column and [`CoreError::ColumnNameCollision`] if two
    /// properties map onto the same column.
    pub fn schema_for(&self, field: &FieldStorageDefinition) -> CoreResult<DedicatedTableSchemas> {
        let data_name = self.mapping.dedicated_data_table_name(field);
        let revision_name = self.mapping.dedicated_revision_table_name(field);
        Ok(DedicatedTableSchemas {
            data: self.table_schema(&data_name, field, false)?,
            revision: self.table_schema(&revision_name, field, true)?,
        })
    }

    fn id_column_type(&self) -> ColumnType {
        match self.definition.entity_type().id_type {
            IdType::Integer => ColumnType::Integer,
            IdType::String => ColumnType::Varchar(128),
        }
    }

    fn table_schema(
        &self,
        name: &str,
        field: &FieldStorageDefinition,
        revision: bool,
    ) -> CoreResult<TableSchema> {
        let id_type = self.id_column_type();
        // Non-revisionable types store the entity id as revision id.
        let revision_type = if self.definition.entity_type().revisionable {
            ColumnType::Integer
        } else {
            id_type
        };
        let mut revision_id = ColumnSpec::new("revision_id", revision_type);
        if revision {
            revision_id = revision_id.not_null();
        }

        let mut schema = TableSchema::new(name)
            .column(
                ColumnSpec::new("bundle", ColumnType::Varchar(128))
                    .not_null()
                    .default_value(""),
            )
            .column(
                ColumnSpec::new("deleted", ColumnType::Boolean)
                    .not_null()
                    .default_value(0_i64),
            )
            .column(ColumnSpec::new("entity_id", id_type).not_null())
            .column(revision_id)
            .column(
                ColumnSpec::new("langcode", ColumnType::Varchar(32))
                    .not_null()
                    .default_value(""),
            )
            .column(ColumnSpec::new("delta", ColumnType::Integer).not_null());

        for property in &field.columns {
            let column = self.mapping.dedicated_column_name(field, &property.name);
            if DEDICATED_FIXED_COLUMNS.contains(&column.as_str()) {
                return Err(CoreError::ReservedColumnName {
                    entity_type: self.definition.entity_type_id().to_string(),
                    field: field.name.clone(),
                    column,
                });
            }
            if schema.has_column(&column) {
                return Err(CoreError::ColumnNameCollision {
                    table: name.to_string(),
                    column,
                });
            }
            let column_type = match property.column_type {
                ColumnType::Serial => ColumnType::Integer,
                other => other,
            };
            let mut spec = ColumnSpec::new(column, column_type);
            if property.not_null {
                spec = spec.not_null();
            }
            schema = schema.column(spec);
        }

        schema = if revision {
            schema.primary_key(["entity_id", "revision_id", "deleted", "delta", "langcode"])
        } else {
            schema.primary_key(["entity_id", "deleted", "delta", "langcode"])
        };
        schema = schema
            .index("bundle", ["bundle"])
            .index("revision_id", ["revision_id"]);

        for (index, properties) in &field.indexes {
            let columns: Vec<String> = properties
                .iter()
                .map(|p| self.mapping.dedicated_column_name(field, p))
                .collect();
            schema = schema.index(format!("{}_{index}", field.name), columns);
        }
        Ok(schema)
    }
}
