//! Schemas of the entity type's own tables.

use crate::definition::EntityDefinition;
use crate::error::{CoreError, CoreResult};
use crate::mapping::{MappedTable, TableMapping, TableRole};
use entirel_storage::{ColumnSpec, ColumnType, TableSchema};

/// Derives base, revision, data and revision data table DDL.
#[derive(Debug, Clone, Copy)]
pub struct SharedTableSchemaGenerator<'a> {
    definition: &'a EntityDefinition,
    mapping: &'a TableMapping,
}

impl<'a> SharedTableSchemaGenerator<'a> {
    /// Creates a generator.
    #[must_use]
    pub fn new(definition: &'a EntityDefinition, mapping: &'a TableMapping) -> Self {
        Self {
            definition,
            mapping,
        }
    }

    /// Schemas of every shared table, in mapping order.
    ///
    /// # Errors
    ///
    /// Returns an error if the mapping references an unknown field.
    pub fn schemas(&self) -> CoreResult<Vec<TableSchema>> {
        self.mapping
            .tables()
            .iter()
            .map(|t| self.table_schema(t))
            .collect()
    }

    fn key(&self, field: Option<&str>) -> Option<String> {
        field
            .and_then(|f| self.mapping.key_column(f))
            .map(str::to_string)
    }

    fn table_schema(&self, table: &MappedTable) -> CoreResult<TableSchema> {
        let entity_type = self.definition.entity_type();
        let keys = &entity_type.keys;
        let id = self.key(Some(&keys.id));
        let revision = self.key(keys.revision.as_deref());
        let langcode = self.key(keys.langcode.as_deref());
        let uuid = self.key(keys.uuid.as_deref());

        let primary_key: Vec<String> = match table.role {
            TableRole::Base => id.iter().cloned().collect(),
            TableRole::Revision => revision.iter().cloned().collect(),
            TableRole::Data => id.iter().chain(langcode.iter()).cloned().collect(),
            TableRole::RevisionData => revision.iter().chain(langcode.iter()).cloned().collect(),
        };
        // The serial lives where the identifier is minted.
        let serial_owner = match table.role {
            TableRole::Base => Some(keys.id.as_str()),
            TableRole::Revision => keys.revision.as_deref(),
            TableRole::Data | TableRole::RevisionData => None,
        };

        let mut schema = TableSchema::new(&table.name);
        for field_name in &table.fields {
            let field = self.definition.field(field_name).ok_or_else(|| {
                CoreError::unknown_field(self.definition.entity_type_id(), field_name)
            })?;
            for (property, column) in self.mapping.field_columns(field_name).unwrap_or_default() {
                let Some(spec) = field.property_column(property) else {
                    continue;
                };
                let column_type = match spec.column_type {
                    ColumnType::Serial if serial_owner != Some(field_name.as_str()) => {
                        ColumnType::Integer
                    }
                    other => other,
                };
                let mut column_spec = ColumnSpec::new(column, column_type);
                if spec.not_null || primary_key.contains(column) {
                    column_spec = column_spec.not_null();
                }
                schema = schema.column(column_spec);
            }
        }
        for extra in &table.extra_columns {
            schema = schema.column(
                ColumnSpec::new(extra, ColumnType::Boolean)
                    .not_null()
                    .default_value(1_i64),
            );
        }
        schema = schema.primary_key(primary_key);

        let et = &entity_type.id;
        let present = |column: Option<String>| column.filter(|c| schema.has_column(c));
        let (id, revision, langcode, uuid) =
            (present(id), present(revision), present(langcode), present(uuid));
        match table.role {
            TableRole::Base => {
                if let Some(uuid) = uuid {
                    schema = schema.unique_key(format!("{et}_field__{uuid}__value"), [uuid]);
                }
                if let Some(revision) = revision {
                    schema = schema.index(format!("{et}__{revision}"), [revision]);
                }
            }
            TableRole::Revision => {
                if let Some(id) = id {
                    schema = schema.index(format!("{et}__{id}"), [id]);
                }
            }
            TableRole::Data | TableRole::RevisionData => {
                if let Some(revision) = revision.filter(|_| table.role == TableRole::Data) {
                    schema = schema.index(format!("{et}__{revision}"), [revision]);
                }
                if let (Some(id), Some(langcode)) = (id, langcode) {
                    let flag = keys.default_langcode.clone();
                    schema = schema.index(
                        format!("{et}__{id}__{flag}__{langcode}"),
                        [id, flag, langcode],
                    );
                }
            }
        }
        Ok(schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{EntityType, FieldStorageDefinition};
    use crate::mapping::TableMappingResolver;

    fn schemas(revisionable: bool, translatable: bool) -> Vec<TableSchema> {
        let def = EntityDefinition::with_fields(
            EntityType::content("article")
                .revisionable(revisionable)
                .translatable(translatable),
            [FieldStorageDefinition::string("article", "title", 255)
                .revisionable(true)
                .translatable(true)],
        )
        .unwrap();
        let mapping = TableMappingResolver::default().resolve(&def).unwrap();
        SharedTableSchemaGenerator::new(&def, &mapping)
            .schemas()
            .unwrap()
    }

    #[test]
    fn serial_only_where_ids_are_minted() {
        let s = schemas(true, true);
        assert_eq!(s[0].serial_column().unwrap().name, "id");
        assert_eq!(s[1].serial_column().unwrap().name, "revision_id");
        assert!(s[2].serial_column().is_none());
        assert!(s[3].serial_column().is_none());
    }

    #[test]
    fn base_revision_id_is_nullable() {
        let s = schemas(true, false);
        assert!(!s[0].column_spec("revision_id").unwrap().not_null);
        assert!(s[1].column_spec("revision_id").unwrap().not_null);
    }

    #[test]
    fn primary_keys_per_role() {
        let s = schemas(true, true);
        assert_eq!(s[0].primary_key, ["id"]);
        assert_eq!(s[1].primary_key, ["revision_id"]);
        assert_eq!(s[2].primary_key, ["id", "langcode"]);
        assert_eq!(s[3].primary_key, ["revision_id", "langcode"]);
    }

    #[test]
    fn uuid_is_unique_in_base_table() {
        let s = schemas(false, false);
        assert_eq!(
            s[0].unique_keys["article_field__uuid__value"],
            vec!["uuid"]
        );
    }

    #[test]
    fn data_tables_carry_default_langcode() {
        let s = schemas(false, true);
        let flag = s[1].column_spec("default_langcode").unwrap();
        assert_eq!(flag.column_type, ColumnType::Boolean);
        assert!(s[1]
            .indexes
            .contains_key("article__id__default_langcode__langcode"));
    }
}
