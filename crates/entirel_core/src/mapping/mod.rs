//! Table mappings: which fields and columns live in which table.

mod naming;
mod resolver;

pub use naming::{
    dedicated_column_name, sha256_hex, shared_column_name, TableNaming,
    RESERVED_DEDICATED_PROPERTIES,
};
pub use resolver::TableMappingResolver;

use crate::definition::{FieldStorageDefinition, TableLayout};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// The part a shared table plays in a layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableRole {
    /// One row per entity.
    Base,
    /// One row per revision.
    Revision,
    /// One row per entity and language.
    Data,
    /// One row per revision and language.
    RevisionData,
}

impl fmt::Display for TableRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TableRole::Base => "base",
            TableRole::Revision => "revision",
            TableRole::Data => "data",
            TableRole::RevisionData => "revision data",
        };
        f.write_str(name)
    }
}

/// One shared table of a mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MappedTable {
    /// Physical table name.
    pub name: String,
    /// Role in the layout.
    pub role: TableRole,
    /// Fields stored in the table, key fields first.
    pub fields: Vec<String>,
    /// Computed columns not backed by a field.
    pub extra_columns: Vec<String>,
}

/// Resolved storage layout of one entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableMapping {
    entity_type_id: String,
    layout: TableLayout,
    tables: Vec<MappedTable>,
    columns: BTreeMap<String, Vec<(String, String)>>,
    dedicated: Vec<String>,
    #[serde(skip)]
    naming: TableNaming,
}

impl TableMapping {
    /// The entity type identifier.
    #[must_use]
    pub fn entity_type_id(&self) -> &str {
        &self.entity_type_id
    }

    /// The layout variant.
    #[must_use]
    pub fn layout(&self) -> TableLayout {
        self.layout
    }

    /// Shared tables in write order: base, revision, data, revision data.
    #[must_use]
    pub fn tables(&self) -> &[MappedTable] {
        &self.tables
    }

    /// The table playing `role`, if the layout has one.
    #[must_use]
    pub fn table(&self, role: TableRole) -> Option<&MappedTable> {
        self.tables.iter().find(|t| t.role == role)
    }

    /// Name of the table playing `role`.
    #[must_use]
    pub fn table_name(&self, role: TableRole) -> Option<&str> {
        self.table(role).map(|t| t.name.as_str())
    }

    /// Names of all shared tables.
    #[must_use]
    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }

    /// `(property, column)` pairs of a shared field.
    #[must_use]
    pub fn field_columns(&self, field: &str) -> Option<&[(String, String)]> {
        self.columns.get(field).map(Vec::as_slice)
    }

    /// Column of one property of a shared field.
    #[must_use]
    pub fn column_name(&self, field: &str, property: &str) -> Option<&str> {
        self.field_columns(field)?
            .iter()
            .find(|(p, _)| p == property)
            .map(|(_, c)| c.as_str())
    }

    /// The single column of a key field.
    #[must_use]
    pub fn key_column(&self, field: &str) -> Option<&str> {
        self.field_columns(field)?.first().map(|(_, c)| c.as_str())
    }

    /// All physical columns of a table: field columns, then extras.
    #[must_use]
    pub fn all_columns(&self, role: TableRole) -> Vec<String> {
        let Some(table) = self.table(role) else {
            return Vec::new();
        };
        table
            .fields
            .iter()
            .filter_map(|f| self.field_columns(f))
            .flatten()
            .map(|(_, c)| c.clone())
            .chain(table.extra_columns.iter().cloned())
            .collect()
    }

    /// Tables holding a shared field.
    #[must_use]
    pub fn field_table_names(&self, field: &str) -> Vec<&str> {
        self.tables
            .iter()
            .filter(|t| t.fields.iter().any(|f| f == field))
            .map(|t| t.name.as_str())
            .collect()
    }

    /// Returns true if the field is stored in the shared tables.
    #[must_use]
    pub fn allows_shared_table_storage(&self, field: &str) -> bool {
        self.columns.contains_key(field)
    }

    /// Returns true if the field is stored in dedicated tables.
    #[must_use]
    pub fn requires_dedicated_table_storage(&self, field: &str) -> bool {
        self.dedicated.iter().any(|f| f == field)
    }

    /// Names of live dedicated fields.
    #[must_use]
    pub fn dedicated_fields(&self) -> &[String] {
        &self.dedicated
    }

    /// Data table of a dedicated field, archived name for deleted fields.
    #[must_use]
    pub fn dedicated_data_table_name(&self, field: &FieldStorageDefinition) -> String {
        if field.deleted {
            self.naming.deleted_data_table(field)
        } else {
            self.naming
                .dedicated_data_table(&self.entity_type_id, &field.name)
        }
    }

    /// Revision table of a dedicated field, archived name for deleted fields.
    #[must_use]
    pub fn dedicated_revision_table_name(&self, field: &FieldStorageDefinition) -> String {
        if field.deleted {
            self.naming.deleted_revision_table(field)
        } else {
            self.naming
                .dedicated_revision_table(&self.entity_type_id, &field.name)
        }
    }

    /// Column of a dedicated field property.
    #[must_use]
    pub fn dedicated_column_name(&self, field: &FieldStorageDefinition, property: &str) -> String {
        dedicated_column_name(field, property)
    }

    /// The naming rules in effect.
    #[must_use]
    pub fn naming(&self) -> &TableNaming {
        &self.naming
    }
}
