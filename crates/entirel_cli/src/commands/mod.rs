//! CLI command implementations.

pub mod mapping;
pub mod schema;
pub mod table_name;

use entirel_core::{
    CoreError, DefinitionRegistry, EntityDefinition, EntityType, FieldStorageDefinition,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Errors raised by the file-based commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// The definitions file could not be read.
    #[error("failed to read {path:?}: {source}")]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The definitions file is not valid JSON for definitions.
    #[error("invalid definitions: {0}")]
    Parse(#[from] serde_json::Error),

    /// A definition was rejected by the engine.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The requested entity type is not in the file.
    #[error("unknown entity type: {0}")]
    UnknownEntityType(String),
}

/// One entry of a definitions file.
///
/// Key fields are derived from the entity type, so `fields` only lists
/// the configurable ones.
#[derive(Debug, Deserialize)]
pub struct DefinitionEntry {
    /// The entity type.
    pub entity_type: EntityType,
    /// Non-key field storage definitions.
    #[serde(default)]
    pub fields: Vec<FieldStorageDefinition>,
}

/// Parses a JSON array of definition entries into a registry.
///
/// # Errors
///
/// Returns an error for malformed JSON or invalid definitions.
pub fn parse_definitions(json: &str) -> Result<DefinitionRegistry, CliError> {
    let entries: Vec<DefinitionEntry> = serde_json::from_str(json)?;
    let registry = DefinitionRegistry::default();
    for entry in entries {
        registry.register(EntityDefinition::with_fields(
            entry.entity_type,
            entry.fields,
        )?)?;
    }
    Ok(registry)
}

/// Reads and parses a definitions file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_definitions(path: &Path) -> Result<DefinitionRegistry, CliError> {
    let json = std::fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let registry = parse_definitions(&json)?;
    debug!(
        path = %path.display(),
        entity_types = registry.entity_type_ids().len(),
        "loaded definitions"
    );
    Ok(registry)
}

/// Entity types to report: the requested one, or every registered one.
///
/// # Errors
///
/// Returns [`CliError::UnknownEntityType`] if the requested type is missing.
pub fn selected_entity_types(
    registry: &DefinitionRegistry,
    entity_type: Option<&str>,
) -> Result<Vec<String>, CliError> {
    match entity_type {
        Some(id) => {
            if registry.definition(id).is_err() {
                return Err(CliError::UnknownEntityType(id.to_string()));
            }
            Ok(vec![id.to_string()])
        }
        None => Ok(registry.entity_type_ids()),
    }
}

#[cfg(test)]
pub(crate) const SAMPLE: &str = r#"[
  {
    "entity_type": {
      "id": "article",
      "keys": {
        "id": "id",
        "revision": "revision_id",
        "bundle": "bundle",
        "uuid": "uuid",
        "langcode": "langcode"
      },
      "revision_metadata_keys": ["revision_created"],
      "revisionable": true,
      "translatable": true
    },
    "fields": [
      {
        "name": "title",
        "entity_type_id": "article",
        "field_type": "string",
        "columns": [{ "name": "value", "column_type": { "varchar": 255 } }],
        "revisionable": true,
        "translatable": true
      },
      {
        "name": "tags",
        "entity_type_id": "article",
        "field_type": "string",
        "cardinality": "unlimited",
        "columns": [{ "name": "value", "column_type": { "varchar": 64 } }],
        "revisionable": true,
        "storage": "dedicated"
      }
    ]
  },
  { "entity_type": { "id": "tag" } }
]"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_registers_every_entry() {
        let registry = parse_definitions(SAMPLE).unwrap();
        assert_eq!(registry.entity_type_ids(), vec!["article", "tag"]);
        let article = registry.definition("article").unwrap();
        assert!(article.field("tags").unwrap().has_dedicated_table());
        assert!(article.field("langcode").is_some());
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = parse_definitions("[{").unwrap_err();
        assert!(matches!(err, CliError::Parse(_)));
    }

    #[test]
    fn unknown_entity_type_is_reported() {
        let registry = parse_definitions(SAMPLE).unwrap();
        let err = selected_entity_types(&registry, Some("node")).unwrap_err();
        assert!(matches!(err, CliError::UnknownEntityType(id) if id == "node"));
        assert_eq!(
            selected_entity_types(&registry, Some("tag")).unwrap(),
            vec!["tag"]
        );
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = load_definitions(Path::new("/nonexistent/definitions.json")).unwrap_err();
        assert!(matches!(err, CliError::Read { .. }));
    }
}
