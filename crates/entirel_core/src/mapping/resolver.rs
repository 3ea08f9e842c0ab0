//! Resolution of entity definitions into table mappings.

use crate::definition::{EntityDefinition, TableLayout};
use crate::error::{CoreError, CoreResult};
use crate::mapping::naming::{shared_column_name, TableNaming, RESERVED_DEDICATED_PROPERTIES};
use crate::mapping::{MappedTable, TableMapping, TableRole};
use std::collections::{BTreeMap, HashMap};

/// Computes [`TableMapping`]s from entity definitions.
#[derive(Debug, Clone, Default)]
pub struct TableMappingResolver {
    naming: TableNaming,
}

impl TableMappingResolver {
    /// Creates a resolver with the given naming rules.
    #[must_use]
    pub fn new(naming: TableNaming) -> Self {
        Self { naming }
    }

    /// The naming rules applied to dedicated tables.
    #[must_use]
    pub fn naming(&self) -> &TableNaming {
        &self.naming
    }

    /// Resolves the layout, tables and columns of an entity type.
    ///
    /// Key fields come first in every table, in the order id, revision id,
    /// bundle, uuid, language code; other fields follow in declaration
    /// order.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ReservedColumnName`] if a field maps onto a
    /// computed column or a dedicated field declares a property in
    /// [`RESERVED_DEDICATED_PROPERTIES`], and
    /// [`CoreError::ColumnNameCollision`] if two fields map onto the same
    /// column of one table.
    pub fn resolve(&self, definition: &EntityDefinition) -> CoreResult<TableMapping> {
        let entity_type = definition.entity_type();
        let layout = entity_type.layout();
        let keys = &entity_type.keys;

        let shared: Vec<_> = definition.shared_fields().collect();
        let is_shared = |name: &str| shared.iter().any(|f| f.name == name);
        let revisionable: HashMap<&str, bool> = shared
            .iter()
            .map(|f| (f.name.as_str(), f.revisionable))
            .collect();
        let is_revisionable = |name: &str| revisionable.get(name).copied().unwrap_or(false);

        let key_fields: Vec<&str> = entity_type
            .key_fields()
            .into_iter()
            .filter(|k| is_shared(*k))
            .collect();
        let is_key = |name: &str| key_fields.contains(&name);
        let all: Vec<&str> = key_fields
            .iter()
            .copied()
            .chain(
                shared
                    .iter()
                    .map(|f| f.name.as_str())
                    .filter(|n| !is_key(*n)),
            )
            .collect();
        let metadata: Vec<&str> = entity_type
            .revision_metadata_fields()
            .into_iter()
            .filter(|m| all.contains(m) && is_revisionable(*m))
            .collect();
        let is_metadata = |name: &str| metadata.contains(&name);

        let id = keys.id.as_str();
        let revision = keys.revision.as_deref();
        let langcode = keys.langcode.as_deref();
        let uuid = keys.uuid.as_deref();
        let is = |key: Option<&str>, name: &str| key == Some(name);
        let pick = |pred: &dyn Fn(&str) -> bool| -> Vec<String> {
            all.iter()
                .copied()
                .filter(|n| pred(*n))
                .map(str::to_string)
                .collect()
        };
        let default_langcode = vec![keys.default_langcode.clone()];

        let table = |role: TableRole, name: Option<String>, fields, extra_columns| MappedTable {
            name: name.unwrap_or_default(),
            role,
            fields,
            extra_columns,
        };

        let tables = match layout {
            TableLayout::Plain => vec![table(
                TableRole::Base,
                Some(entity_type.base_table_name()),
                pick(&|_| true),
                Vec::new(),
            )],
            TableLayout::Revisionable => vec![
                table(
                    TableRole::Base,
                    Some(entity_type.base_table_name()),
                    pick(&|n| !is_metadata(n)),
                    Vec::new(),
                ),
                table(
                    TableRole::Revision,
                    entity_type.revision_table_name(),
                    pick(&|n| n == id || is(revision, n) || is_revisionable(n)),
                    Vec::new(),
                ),
            ],
            TableLayout::Translatable => vec![
                table(
                    TableRole::Base,
                    Some(entity_type.base_table_name()),
                    pick(&is_key),
                    Vec::new(),
                ),
                table(
                    TableRole::Data,
                    entity_type.data_table_name(),
                    pick(&|n| !is(uuid, n)),
                    default_langcode,
                ),
            ],
            TableLayout::RevisionableTranslatable => vec![
                table(
                    TableRole::Base,
                    Some(entity_type.base_table_name()),
                    pick(&|n| is_key(n) && !is(langcode, n)),
                    Vec::new(),
                ),
                table(
                    TableRole::Revision,
                    entity_type.revision_table_name(),
                    pick(&|n| n == id || is(revision, n) || is(langcode, n) || is_metadata(n)),
                    Vec::new(),
                ),
                table(
                    TableRole::Data,
                    entity_type.data_table_name(),
                    pick(&|n| {
                        if is_key(n) {
                            !is(uuid, n)
                        } else {
                            !is_revisionable(n) && !is_metadata(n)
                        }
                    }),
                    default_langcode.clone(),
                ),
                table(
                    TableRole::RevisionData,
                    entity_type.revision_data_table_name(),
                    pick(&|n| {
                        n == id
                            || is(revision, n)
                            || is(langcode, n)
                            || (!is_key(n) && is_revisionable(n) && !is_metadata(n))
                    }),
                    default_langcode,
                ),
            ],
        };

        let mut columns = BTreeMap::new();
        for field in &shared {
            let pairs: Vec<(String, String)> = field
                .columns
                .iter()
                .map(|c| (c.name.clone(), shared_column_name(field, &c.name)))
                .collect();
            if let Some((_, column)) = pairs.iter().find(|(_, c)| *c == keys.default_langcode) {
                return Err(CoreError::ReservedColumnName {
                    entity_type: entity_type.id.clone(),
                    field: field.name.clone(),
                    column: column.clone(),
                });
            }
            columns.insert(field.name.clone(), pairs);
        }

        for field in definition.dedicated_fields() {
            let reserved = field
                .columns
                .iter()
                .find(|c| RESERVED_DEDICATED_PROPERTIES.contains(&c.name.as_str()));
            if let Some(property) = reserved {
                return Err(CoreError::ReservedColumnName {
                    entity_type: entity_type.id.clone(),
                    field: field.name.clone(),
                    column: property.name.clone(),
                });
            }
        }

        for table in &tables {
            let mut seen: Vec<&str> = table.extra_columns.iter().map(String::as_str).collect();
            for field in &table.fields {
                for (_, column) in columns.get(field).into_iter().flatten() {
                    if seen.contains(&column.as_str()) {
                        return Err(CoreError::ColumnNameCollision {
                            table: table.name.clone(),
                            column: column.clone(),
                        });
                    }
                    seen.push(column.as_str());
                }
            }
        }

        Ok(TableMapping {
            entity_type_id: entity_type.id.clone(),
            layout,
            tables,
            columns,
            dedicated: definition
                .dedicated_fields()
                .map(|f| f.name.clone())
                .collect(),
            naming: self.naming.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{Cardinality, EntityType, FieldStorageDefinition, PropertyColumn};
    use entirel_storage::ColumnType;

    fn definition(revisionable: bool, translatable: bool) -> EntityDefinition {
        let t = EntityType::content("article")
            .revisionable(revisionable)
            .translatable(translatable);
        EntityDefinition::with_fields(
            t,
            [
                FieldStorageDefinition::string("article", "title", 255)
                    .revisionable(true)
                    .translatable(true),
                FieldStorageDefinition::integer("article", "priority"),
                FieldStorageDefinition::string("article", "tags", 32)
                    .cardinality(Cardinality::Limited(3))
                    .dedicated(),
            ],
        )
        .unwrap()
    }

    fn resolve(revisionable: bool, translatable: bool) -> TableMapping {
        TableMappingResolver::default()
            .resolve(&definition(revisionable, translatable))
            .unwrap()
    }

    fn fields<'a>(mapping: &'a TableMapping, role: TableRole) -> Vec<&'a str> {
        mapping
            .table(role)
            .unwrap()
            .fields
            .iter()
            .map(String::as_str)
            .collect()
    }

    #[test]
    fn plain_layout_has_one_table() {
        let m = resolve(false, false);
        assert_eq!(m.layout(), TableLayout::Plain);
        assert_eq!(m.table_names(), vec!["article"]);
        assert_eq!(
            fields(&m, TableRole::Base),
            vec!["id", "bundle", "uuid", "langcode", "title", "priority"]
        );
    }

    #[test]
    fn revisionable_layout_splits_metadata() {
        let m = resolve(true, false);
        assert_eq!(m.table_names(), vec!["article", "article_revision"]);
        assert_eq!(
            fields(&m, TableRole::Base),
            vec!["id", "revision_id", "bundle", "uuid", "langcode", "title", "priority"]
        );
        assert_eq!(
            fields(&m, TableRole::Revision),
            vec![
                "id",
                "revision_id",
                "langcode",
                "revision_created",
                "revision_user",
                "revision_log_message",
                "title"
            ]
        );
    }

    #[test]
    fn translatable_layout_moves_fields_to_data_table() {
        let m = resolve(false, true);
        assert_eq!(
            fields(&m, TableRole::Base),
            vec!["id", "bundle", "uuid", "langcode"]
        );
        assert_eq!(
            fields(&m, TableRole::Data),
            vec!["id", "bundle", "langcode", "title", "priority"]
        );
        assert_eq!(
            m.table(TableRole::Data).unwrap().extra_columns,
            vec!["default_langcode"]
        );
    }

    #[test]
    fn revisionable_translatable_layout_has_four_tables() {
        let m = resolve(true, true);
        assert_eq!(
            m.table_names(),
            vec![
                "article",
                "article_revision",
                "article_field_data",
                "article_field_revision"
            ]
        );
        assert_eq!(
            fields(&m, TableRole::Base),
            vec!["id", "revision_id", "bundle", "uuid"]
        );
        assert_eq!(
            fields(&m, TableRole::Revision),
            vec![
                "id",
                "revision_id",
                "langcode",
                "revision_created",
                "revision_user",
                "revision_log_message"
            ]
        );
        assert_eq!(
            fields(&m, TableRole::Data),
            vec!["id", "revision_id", "bundle", "langcode", "priority"]
        );
        assert_eq!(
            fields(&m, TableRole::RevisionData),
            vec!["id", "revision_id", "langcode", "title"]
        );
    }

    #[test]
    fn every_shared_field_is_mapped() {
        for (r, t) in [(false, false), (true, false), (false, true), (true, true)] {
            let def = definition(r, t);
            let m = TableMappingResolver::default().resolve(&def).unwrap();
            for field in def.shared_fields() {
                assert!(
                    !m.field_table_names(&field.name).is_empty(),
                    "{} unmapped in {:?}",
                    field.name,
                    m.layout()
                );
            }
            assert!(m.requires_dedicated_table_storage("tags"));
            assert!(!m.allows_shared_table_storage("tags"));
        }
    }

    #[test]
    fn key_fields_lead_every_table() {
        let m = resolve(true, true);
        for table in m.tables() {
            assert_eq!(table.fields[0], "id");
        }
    }

    #[test]
    fn multi_property_columns_are_suffixed() {
        let def = definition(false, false)
            .with_field(
                FieldStorageDefinition::new("article", "link", "link")
                    .column(PropertyColumn::new("uri", ColumnType::Text))
                    .column(PropertyColumn::new("options", ColumnType::Blob).serialized()),
            )
            .unwrap();
        let m = TableMappingResolver::default().resolve(&def).unwrap();
        assert_eq!(m.column_name("link", "uri"), Some("link__uri"));
        assert_eq!(m.column_name("title", "value"), Some("title"));
        assert!(m.all_columns(TableRole::Base).contains(&"link__options".to_string()));
    }

    #[test]
    fn reserved_column_is_a_configuration_error() {
        let def = definition(false, true)
            .with_field(FieldStorageDefinition::boolean("article", "default_langcode"))
            .unwrap();
        let err = TableMappingResolver::default().resolve(&def).unwrap_err();
        assert!(matches!(err, CoreError::ReservedColumnName { .. }));
        assert!(err.is_configuration_error());
    }

    #[test]
    fn reserved_dedicated_property_is_rejected() {
        for property in RESERVED_DEDICATED_PROPERTIES {
            let field = FieldStorageDefinition::new("article", "weird", "weird")
                .column(PropertyColumn::new(property, ColumnType::Integer))
                .dedicated();
            let def = definition(false, true).with_field(field).unwrap();
            let err = TableMappingResolver::default().resolve(&def).unwrap_err();
            let CoreError::ReservedColumnName { field, column, .. } = err else {
                panic!("expected a reserved column error");
            };
            assert_eq!(field, "weird");
            assert_eq!(column, property);
        }
    }

    #[test]
    fn colliding_columns_are_rejected() {
        let def = definition(false, false)
            .with_field(
                FieldStorageDefinition::new("article", "body", "text")
                    .column(PropertyColumn::new("value", ColumnType::Text))
                    .column(PropertyColumn::new("format", ColumnType::Varchar(32))),
            )
            .unwrap()
            .with_field(FieldStorageDefinition::text("article", "body__value"))
            .unwrap();
        let err = TableMappingResolver::default().resolve(&def).unwrap_err();
        assert!(matches!(err, CoreError::ColumnNameCollision { .. }));
    }

    #[test]
    fn custom_storage_fields_are_not_mapped() {
        let def = definition(false, false)
            .with_field(FieldStorageDefinition::integer("article", "computed").custom_storage())
            .unwrap();
        let m = TableMappingResolver::default().resolve(&def).unwrap();
        assert!(m.field_table_names("computed").is_empty());
        assert!(!m.requires_dedicated_table_storage("computed"));
    }
}
