//! Physical table and column naming.

use crate::config::Config;
use crate::definition::FieldStorageDefinition;
use sha2::{Digest, Sha256};

/// Property names dedicated tables keep unprefixed.
///
/// Each one is also a fixed dedicated column, so a dedicated field that
/// declares one is rejected when its mapping is resolved.
pub const RESERVED_DEDICATED_PROPERTIES: [&str; 2] = ["deleted", "delta"];

/// Naming rules for dedicated tables.
///
/// Names are a pure function of the inputs, so they can be recomputed by
/// any process that shares the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNaming {
    max_length: usize,
    prefix_length: usize,
    hash_length: usize,
    deleted_data_prefix: String,
    deleted_revision_prefix: String,
}

impl Default for TableNaming {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for TableNaming {
    fn from(config: &Config) -> Self {
        Self {
            max_length: config.max_table_name_length,
            prefix_length: config.entity_type_hash_prefix_length,
            hash_length: config.hash_suffix_length,
            deleted_data_prefix: config.deleted_data_table_prefix.clone(),
            deleted_revision_prefix: config.deleted_revision_table_prefix.clone(),
        }
    }
}

impl TableNaming {
    /// Copies these rules into the naming fields of `config`.
    pub fn apply_to(&self, config: &mut Config) {
        config.max_table_name_length = self.max_length;
        config.entity_type_hash_prefix_length = self.prefix_length;
        config.hash_suffix_length = self.hash_length;
        config
            .deleted_data_table_prefix
            .clone_from(&self.deleted_data_prefix);
        config
            .deleted_revision_table_prefix
            .clone_from(&self.deleted_revision_prefix);
    }

    /// Data table of a live dedicated field: `{entity_type}__{field}`.
    ///
    /// Names longer than the limit become
    /// `{entity_type truncated}__{hash}`.
    #[must_use]
    pub fn dedicated_data_table(&self, entity_type_id: &str, field_name: &str) -> String {
        let name = format!("{entity_type_id}__{field_name}");
        if name.len() <= self.max_length {
            return name;
        }
        format!(
            "{}__{}",
            truncate(entity_type_id, self.prefix_length),
            self.hash(&format!("{entity_type_id}-{field_name}"))
        )
    }

    /// Revision table of a live dedicated field:
    /// `{entity_type}_revision__{field}`, or `{entity_type truncated}_r__{hash}`.
    #[must_use]
    pub fn dedicated_revision_table(&self, entity_type_id: &str, field_name: &str) -> String {
        let name = format!("{entity_type_id}_revision__{field_name}");
        if name.len() <= self.max_length {
            return name;
        }
        format!(
            "{}_r__{}",
            truncate(entity_type_id, self.prefix_length),
            self.hash(&format!("{entity_type_id}-{field_name}"))
        )
    }

    /// Archived data table of a deleted field, keyed by its storage uuid.
    #[must_use]
    pub fn deleted_data_table(&self, field: &FieldStorageDefinition) -> String {
        format!(
            "{}{}",
            self.deleted_data_prefix,
            self.hash(&field.uuid.to_string())
        )
    }

    /// Archived revision table of a deleted field, keyed by its storage uuid.
    #[must_use]
    pub fn deleted_revision_table(&self, field: &FieldStorageDefinition) -> String {
        format!(
            "{}{}",
            self.deleted_revision_prefix,
            self.hash(&field.uuid.to_string())
        )
    }

    /// Leading hex characters of the SHA-256 digest of `input`.
    #[must_use]
    pub fn hash(&self, input: &str) -> String {
        let hex = sha256_hex(input);
        hex[..self.hash_length.min(hex.len())].to_string()
    }
}

/// Lowercase hex SHA-256 digest.
#[must_use]
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn truncate(s: &str, chars: usize) -> &str {
    s.char_indices().nth(chars).map_or(s, |(i, _)| &s[..i])
}

/// Column of a shared field property.
///
/// A single-property field without a declared main property is stored as
/// `field`; anything else as `field__property`.
#[must_use]
pub fn shared_column_name(field: &FieldStorageDefinition, property: &str) -> String {
    if field.columns.len() == 1 && field.main_property.is_none() {
        field.name.clone()
    } else {
        format!("{}__{property}", field.name)
    }
}

/// Column of a dedicated field property: `field_property`.
///
/// Names in [`RESERVED_DEDICATED_PROPERTIES`] come back unchanged and so
/// name the fixed column itself.
#[must_use]
pub fn dedicated_column_name(field: &FieldStorageDefinition, property: &str) -> String {
    if RESERVED_DEDICATED_PROPERTIES.contains(&property) {
        property.to_string()
    } else {
        format!("{}_{property}", field.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::PropertyColumn;
    use entirel_storage::ColumnType;

    #[test]
    fn short_names_are_literal() {
        let naming = TableNaming::default();
        assert_eq!(naming.dedicated_data_table("node", "tags"), "node__tags");
        assert_eq!(
            naming.dedicated_revision_table("node", "tags"),
            "node_revision__tags"
        );
    }

    #[test]
    fn long_names_fall_back_to_hash() {
        let naming = TableNaming::default();
        let entity_type = "a_really_long_entity_type_identifier_here";
        let field = "field_with_a_long_name";
        let data = naming.dedicated_data_table(entity_type, field);
        let hash = &sha256_hex(&format!("{entity_type}-{field}"))[..10];
        assert_eq!(data, format!("{}__{hash}", &entity_type[..34]));
        assert_eq!(
            naming.dedicated_revision_table(entity_type, field),
            format!("{}_r__{hash}", &entity_type[..34])
        );
        assert!(data.len() <= 48);
    }

    #[test]
    fn exactly_max_length_is_kept() {
        let naming = TableNaming::default();
        let field = "f".repeat(48 - "node__".len());
        assert_eq!(naming.dedicated_data_table("node", &field).len(), 48);
        assert!(naming.dedicated_data_table("node", &field).starts_with("node__f"));
    }

    #[test]
    fn sha256_matches_known_digest() {
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn deleted_tables_depend_on_storage_uuid() {
        let naming = TableNaming::default();
        let a = FieldStorageDefinition::string("node", "tags", 32);
        let b = FieldStorageDefinition::string("node", "tags", 32);
        assert_ne!(naming.deleted_data_table(&a), naming.deleted_data_table(&b));
        assert!(naming.deleted_data_table(&a).starts_with("field_deleted_data_"));
        assert!(naming
            .deleted_revision_table(&a)
            .starts_with("field_deleted_revision_"));
    }

    #[test]
    fn shared_columns_collapse_single_property() {
        let title = FieldStorageDefinition::string("node", "title", 255);
        assert_eq!(shared_column_name(&title, "value"), "title");

        let owner = FieldStorageDefinition::entity_reference("node", "owner");
        assert_eq!(shared_column_name(&owner, "target_id"), "owner__target_id");

        let link = FieldStorageDefinition::new("node", "link", "link")
            .column(PropertyColumn::new("uri", ColumnType::Text))
            .column(PropertyColumn::new("title", ColumnType::Text));
        assert_eq!(shared_column_name(&link, "uri"), "link__uri");
    }

    #[test]
    fn dedicated_columns_are_prefixed() {
        let tags = FieldStorageDefinition::string("node", "tags", 32);
        assert_eq!(dedicated_column_name(&tags, "value"), "tags_value");
        assert_eq!(dedicated_column_name(&tags, "delta"), "delta");
    }
}
