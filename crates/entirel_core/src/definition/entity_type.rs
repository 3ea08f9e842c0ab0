//! Entity type descriptors.

use crate::definition::field::{FieldStorageDefinition, PropertyColumn};
use crate::error::{CoreError, CoreResult};
use entirel_storage::ColumnType;
use serde::{Deserialize, Serialize};

/// The four table topologies an entity type can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableLayout {
    /// One base table.
    Plain,
    /// Base and revision tables.
    Revisionable,
    /// Base and data tables.
    Translatable,
    /// Base, revision, data and revision data tables.
    RevisionableTranslatable,
}

impl TableLayout {
    /// Picks the layout for the two capability flags.
    #[must_use]
    pub const fn from_flags(revisionable: bool, translatable: bool) -> Self {
        match (revisionable, translatable) {
            (false, false) => TableLayout::Plain,
            (true, false) => TableLayout::Revisionable,
            (false, true) => TableLayout::Translatable,
            (true, true) => TableLayout::RevisionableTranslatable,
        }
    }

    /// Whether the layout keeps revisions.
    #[must_use]
    pub const fn is_revisionable(self) -> bool {
        matches!(
            self,
            TableLayout::Revisionable | TableLayout::RevisionableTranslatable
        )
    }

    /// Whether the layout keeps translations.
    #[must_use]
    pub const fn is_translatable(self) -> bool {
        matches!(
            self,
            TableLayout::Translatable | TableLayout::RevisionableTranslatable
        )
    }
}

/// Type of the entity id column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdType {
    /// Serial integer ids.
    #[default]
    Integer,
    /// Caller-supplied string ids.
    String,
}

/// Names of the key fields of an entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityKeys {
    /// Id field.
    pub id: String,
    /// Revision id field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    /// Bundle field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle: Option<String>,
    /// UUID field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    /// Language code field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub langcode: Option<String>,
    /// Computed default-language flag column.
    #[serde(default = "default_langcode_key")]
    pub default_langcode: String,
}

fn default_langcode_key() -> String {
    "default_langcode".to_string()
}

impl Default for EntityKeys {
    fn default() -> Self {
        Self {
            id: "id".to_string(),
            revision: None,
            bundle: None,
            uuid: None,
            langcode: None,
            default_langcode: default_langcode_key(),
        }
    }
}

/// Immutable descriptor of an entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityType {
    /// Entity type identifier.
    pub id: String,
    /// Key field names.
    #[serde(default)]
    pub keys: EntityKeys,
    /// Type of the id column.
    #[serde(default)]
    pub id_type: IdType,
    /// Fields kept only in the revision table.
    #[serde(default)]
    pub revision_metadata_keys: Vec<String>,
    /// Whether entities keep revisions.
    #[serde(default)]
    pub revisionable: bool,
    /// Whether entities keep translations.
    #[serde(default)]
    pub translatable: bool,
    /// Base table name override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_table: Option<String>,
    /// Revision table name override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision_table: Option<String>,
    /// Data table name override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_table: Option<String>,
    /// Revision data table name override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision_data_table: Option<String>,
}

impl EntityType {
    /// Creates a plain entity type with only an `id` key.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            keys: EntityKeys::default(),
            id_type: IdType::Integer,
            revision_metadata_keys: Vec::new(),
            revisionable: false,
            translatable: false,
            base_table: None,
            revision_table: None,
            data_table: None,
            revision_data_table: None,
        }
    }

    /// Creates an entity type with the usual content keys
    /// (`id`, `revision_id`, `bundle`, `uuid`, `langcode`) and revision
    /// metadata fields. Capabilities start disabled.
    pub fn content(id: impl Into<String>) -> Self {
        let mut entity_type = Self::new(id);
        entity_type.keys = EntityKeys {
            id: "id".to_string(),
            revision: Some("revision_id".to_string()),
            bundle: Some("bundle".to_string()),
            uuid: Some("uuid".to_string()),
            langcode: Some("langcode".to_string()),
            default_langcode: default_langcode_key(),
        };
        entity_type.revision_metadata_keys = vec![
            "revision_created".to_string(),
            "revision_user".to_string(),
            "revision_log_message".to_string(),
        ];
        entity_type
    }

    /// Enables or disables revisions.
    #[must_use]
    pub fn revisionable(mut self, value: bool) -> Self {
        self.revisionable = value;
        self
    }

    /// Enables or disables translations.
    #[must_use]
    pub fn translatable(mut self, value: bool) -> Self {
        self.translatable = value;
        self
    }

    /// Uses caller-supplied string ids.
    #[must_use]
    pub fn string_ids(mut self) -> Self {
        self.id_type = IdType::String;
        self
    }

    /// Replaces the key names.
    #[must_use]
    pub fn keys(mut self, keys: EntityKeys) -> Self {
        self.keys = keys;
        self
    }

    /// The table layout.
    #[must_use]
    pub fn layout(&self) -> TableLayout {
        TableLayout::from_flags(self.revisionable, self.translatable)
    }

    /// Base table name.
    #[must_use]
    pub fn base_table_name(&self) -> String {
        self.base_table.clone().unwrap_or_else(|| self.id.clone())
    }

    /// Revision table name, for revisionable types.
    #[must_use]
    pub fn revision_table_name(&self) -> Option<String> {
        self.revisionable.then(|| {
            self.revision_table
                .clone()
                .unwrap_or_else(|| format!("{}_revision", self.id))
        })
    }

    /// Data table name, for translatable types.
    #[must_use]
    pub fn data_table_name(&self) -> Option<String> {
        self.translatable.then(|| {
            self.data_table
                .clone()
                .unwrap_or_else(|| format!("{}_field_data", self.id))
        })
    }

    /// Revision data table name, for revisionable translatable types.
    #[must_use]
    pub fn revision_data_table_name(&self) -> Option<String> {
        (self.revisionable && self.translatable).then(|| {
            self.revision_data_table
                .clone()
                .unwrap_or_else(|| format!("{}_field_revision", self.id))
        })
    }

    /// Key field names in fixed order: id, revision id, bundle, uuid,
    /// language code.
    #[must_use]
    pub fn key_fields(&self) -> Vec<&str> {
        let k = &self.keys;
        std::iter::once(k.id.as_str())
            .chain(k.revision.as_deref().filter(|_| self.revisionable))
            .chain(k.bundle.as_deref())
            .chain(k.uuid.as_deref())
            .chain(k.langcode.as_deref())
            .collect()
    }

    /// Returns true if `field` is one of the key fields.
    #[must_use]
    pub fn is_key_field(&self, field: &str) -> bool {
        self.key_fields().contains(&field)
    }

    /// Revision metadata fields, empty for non-revisionable types.
    #[must_use]
    pub fn revision_metadata_fields(&self) -> Vec<&str> {
        if self.revisionable {
            self.revision_metadata_keys
                .iter()
                .map(String::as_str)
                .collect()
        } else {
            Vec::new()
        }
    }

    /// Standard definitions for the key fields and revision metadata.
    #[must_use]
    pub fn key_field_definitions(&self) -> Vec<FieldStorageDefinition> {
        let k = &self.keys;
        let mut fields = Vec::new();

        let id = match self.id_type {
            IdType::Integer => FieldStorageDefinition::new(&self.id, &k.id, "integer")
                .column(PropertyColumn::new("value", ColumnType::Serial).not_null()),
            IdType::String => FieldStorageDefinition::new(&self.id, &k.id, "string")
                .column(PropertyColumn::new("value", ColumnType::Varchar(128)).not_null()),
        };
        fields.push(id);

        if let Some(revision) = k.revision.as_deref().filter(|_| self.revisionable) {
            fields.push(
                FieldStorageDefinition::new(&self.id, revision, "integer")
                    .column(PropertyColumn::new("value", ColumnType::Serial)),
            );
        }
        if let Some(bundle) = &k.bundle {
            fields.push(
                FieldStorageDefinition::new(&self.id, bundle, "string")
                    .column(PropertyColumn::new("value", ColumnType::Varchar(32)).not_null()),
            );
        }
        if let Some(uuid) = &k.uuid {
            fields.push(
                FieldStorageDefinition::new(&self.id, uuid, "uuid")
                    .column(PropertyColumn::new("value", ColumnType::Varchar(128)).not_null()),
            );
        }
        if let Some(langcode) = &k.langcode {
            fields.push(
                FieldStorageDefinition::new(&self.id, langcode, "language")
                    .column(PropertyColumn::new("value", ColumnType::Varchar(12)).not_null())
                    .revisionable(self.revisionable)
                    .translatable(self.translatable),
            );
        }

        for name in self.revision_metadata_fields() {
            let field = match name {
                "revision_log_message" => FieldStorageDefinition::text(&self.id, name),
                "revision_user" => FieldStorageDefinition::entity_reference(&self.id, name),
                _ => FieldStorageDefinition::integer(&self.id, name),
            };
            fields.push(field.revisionable(true));
        }
        fields
    }

    /// Checks the key configuration against the capabilities.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidDefinition`] if a revisionable type has
    /// no revision key, a translatable type has no language key, or two
    /// keys share a name.
    pub fn validate(&self) -> CoreResult<()> {
        if self.id.is_empty() {
            return Err(CoreError::invalid_definition("empty entity type id"));
        }
        if self.revisionable && self.keys.revision.is_none() {
            return Err(CoreError::invalid_definition(format!(
                "revisionable entity type '{}' has no revision key",
                self.id
            )));
        }
        if self.translatable && self.keys.langcode.is_none() {
            return Err(CoreError::invalid_definition(format!(
                "translatable entity type '{}' has no langcode key",
                self.id
            )));
        }
        let keys = self.key_fields();
        for (i, key) in keys.iter().enumerate() {
            if keys[..i].contains(key) || *key == self.keys.default_langcode {
                return Err(CoreError::invalid_definition(format!(
                    "entity type '{}' reuses key name '{key}'",
                    self.id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_follows_flags() {
        let t = EntityType::content("node");
        assert_eq!(t.layout(), TableLayout::Plain);
        assert_eq!(t.clone().revisionable(true).layout(), TableLayout::Revisionable);
        assert_eq!(t.clone().translatable(true).layout(), TableLayout::Translatable);
        assert_eq!(
            t.revisionable(true).translatable(true).layout(),
            TableLayout::RevisionableTranslatable
        );
    }

    #[test]
    fn default_table_names() {
        let t = EntityType::content("node").revisionable(true).translatable(true);
        assert_eq!(t.base_table_name(), "node");
        assert_eq!(t.revision_table_name().as_deref(), Some("node_revision"));
        assert_eq!(t.data_table_name().as_deref(), Some("node_field_data"));
        assert_eq!(t.revision_data_table_name().as_deref(), Some("node_field_revision"));
    }

    #[test]
    fn plain_type_has_no_secondary_tables() {
        let t = EntityType::content("user");
        assert!(t.revision_table_name().is_none());
        assert!(t.data_table_name().is_none());
    }

    #[test]
    fn key_fields_are_ordered() {
        let t = EntityType::content("node").revisionable(true);
        assert_eq!(
            t.key_fields(),
            vec!["id", "revision_id", "bundle", "uuid", "langcode"]
        );
        assert_eq!(
            EntityType::content("node").key_fields(),
            vec!["id", "bundle", "uuid", "langcode"]
        );
    }

    #[test]
    fn metadata_fields_only_for_revisionable_types() {
        let plain = EntityType::content("node").key_field_definitions();
        assert!(plain.iter().all(|f| f.name != "revision_log_message"));

        let revisionable = EntityType::content("node")
            .revisionable(true)
            .key_field_definitions();
        let log = revisionable
            .iter()
            .find(|f| f.name == "revision_log_message")
            .unwrap();
        assert!(log.revisionable);
    }

    #[test]
    fn string_ids_use_varchar() {
        let fields = EntityType::content("config").string_ids().key_field_definitions();
        assert_eq!(fields[0].columns[0].column_type, ColumnType::Varchar(128));
    }

    #[test]
    fn validate_requires_keys_for_capabilities() {
        assert!(EntityType::new("x").revisionable(true).validate().is_err());
        assert!(EntityType::new("x").translatable(true).validate().is_err());
        assert!(EntityType::content("x")
            .revisionable(true)
            .translatable(true)
            .validate()
            .is_ok());
    }
}
