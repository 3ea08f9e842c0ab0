//! Test fixtures and storage helpers.
//!
//! Provides entity type definitions covering every table layout and a
//! harness that wires a registry, a connection and an installed storage
//! handler together.

use entirel_core::{
    Cardinality, Connection, DefinitionRegistry, EntityDefinition, EntityStorage, EntityType,
    FieldStorageDefinition, PropertyColumn, TableLayout,
};
use entirel_storage::{ColumnType, Condition, RelationalBackend, Row, Select};
use std::sync::Arc;

/// Every table layout, plain first.
pub const ALL_LAYOUTS: [TableLayout; 4] = [
    TableLayout::Plain,
    TableLayout::Revisionable,
    TableLayout::Translatable,
    TableLayout::RevisionableTranslatable,
];

/// The `article` entity type in the given layout.
///
/// Shared fields: `title` (translatable), `body` (translatable text),
/// `published` (boolean), `options` (serialized). Dedicated fields:
/// `tags` (translatable, at most three items) and `links` (uri and title,
/// unlimited). Every field is revisionable.
pub fn article_definition(layout: TableLayout) -> EntityDefinition {
    let entity_type = EntityType::content("article")
        .revisionable(layout.is_revisionable())
        .translatable(layout.is_translatable());
    EntityDefinition::with_fields(entity_type, article_fields())
        .expect("Invalid article definition")
}

fn article_fields() -> Vec<FieldStorageDefinition> {
    vec![
        FieldStorageDefinition::string("article", "title", 255)
            .revisionable(true)
            .translatable(true),
        FieldStorageDefinition::text("article", "body")
            .revisionable(true)
            .translatable(true),
        FieldStorageDefinition::boolean("article", "published").revisionable(true),
        FieldStorageDefinition::new("article", "options", "map")
            .column(PropertyColumn::new("value", ColumnType::Blob).serialized())
            .revisionable(true),
        tags_field(),
        FieldStorageDefinition::new("article", "links", "link")
            .column(PropertyColumn::new("uri", ColumnType::Varchar(2048)))
            .column(PropertyColumn::new("title", ColumnType::Varchar(255)))
            .main_property("uri")
            .cardinality(Cardinality::Unlimited)
            .revisionable(true)
            .dedicated(),
    ]
}

/// The dedicated `tags` field of `article`.
pub fn tags_field() -> FieldStorageDefinition {
    FieldStorageDefinition::string("article", "tags", 64)
        .cardinality(Cardinality::Limited(3))
        .revisionable(true)
        .translatable(true)
        .dedicated()
}

/// A plain `config` entity type with caller-supplied string ids.
pub fn config_definition() -> EntityDefinition {
    EntityDefinition::with_fields(
        EntityType::content("config").string_ids(),
        [FieldStorageDefinition::text("config", "data")],
    )
    .expect("Invalid config definition")
}

/// A storage handler with its schema installed, plus the pieces it was
/// built from.
pub struct TestStorage {
    /// The storage handler.
    pub storage: EntityStorage,
    /// The metadata provider.
    pub registry: Arc<DefinitionRegistry>,
    /// The shared connection.
    pub connection: Connection,
}

impl TestStorage {
    /// Installs `definition` on a fresh in-memory backend.
    pub fn new(definition: EntityDefinition) -> Self {
        Self::with_connection(definition, Connection::in_memory())
    }

    /// Installs `definition` on the given backend.
    pub fn with_backend(
        definition: EntityDefinition,
        backend: impl RelationalBackend + 'static,
    ) -> Self {
        Self::with_connection(definition, Connection::new(backend))
    }

    /// Installs `definition` on the given connection.
    pub fn with_connection(definition: EntityDefinition, connection: Connection) -> Self {
        let registry = Arc::new(DefinitionRegistry::default());
        let entity_type_id = definition.entity_type_id().to_string();
        registry
            .register(definition)
            .expect("Failed to register definition");
        let storage = EntityStorage::new(entity_type_id, connection.clone(), Arc::clone(&registry))
            .expect("Failed to create storage");
        storage.install_schema().expect("Failed to install schema");
        Self {
            storage,
            registry,
            connection,
        }
    }

    /// The `article` entity type in the given layout.
    pub fn article(layout: TableLayout) -> Self {
        Self::new(article_definition(layout))
    }

    /// All rows of a table.
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.rows_where(table, &[])
    }

    /// Rows of a table matching every condition.
    pub fn rows_where(&self, table: &str, conditions: &[Condition]) -> Vec<Row> {
        let mut query = Select::from(table);
        for condition in conditions {
            query = query.filter(condition.clone());
        }
        self.connection
            .read(|backend| backend.select(&query))
            .expect("Failed to select rows")
    }

    /// Number of rows in a table.
    pub fn count_rows(&self, table: &str) -> usize {
        self.connection
            .read(|backend| backend.count(table, &[]))
            .expect("Failed to count rows")
    }

    /// Returns true if the table exists.
    pub fn table_exists(&self, table: &str) -> bool {
        self.connection.read(|backend| backend.table_exists(table))
    }

    /// Names of all tables, sorted.
    pub fn table_names(&self) -> Vec<String> {
        self.connection.read(|backend| backend.table_names())
    }
}

impl std::ops::Deref for TestStorage {
    type Target = EntityStorage;

    fn deref(&self) -> &Self::Target {
        &self.storage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn article_installs_in_every_layout() {
        for layout in ALL_LAYOUTS {
            let harness = TestStorage::article(layout);
            assert_eq!(harness.table_mapping().unwrap().layout(), layout);
            assert!(harness.table_exists("article"));
            assert!(harness.table_exists("article__tags"));
            assert!(harness.table_exists("article_revision__links"));
        }
    }

    #[test]
    fn config_uses_string_ids() {
        let harness = TestStorage::new(config_definition());
        let schema = harness
            .connection
            .read(|b| b.table_schema("config"))
            .unwrap();
        assert_eq!(
            schema.column_spec("id").unwrap().column_type,
            ColumnType::Varchar(128)
        );
    }
}
