//! Mapping command implementation.

use super::{load_definitions, selected_entity_types, CliError};
use entirel_core::{DefinitionRegistry, EntityDefinition, TableMapping};
use std::fmt::Write as _;
use std::path::Path;

/// Runs the mapping command.
pub fn run(path: &Path, entity_type: Option<&str>, format: &str) -> Result<(), CliError> {
    let registry = load_definitions(path)?;
    println!("{}", render(&registry, entity_type, format)?);
    Ok(())
}

/// Renders the mappings of the selected entity types.
pub fn render(
    registry: &DefinitionRegistry,
    entity_type: Option<&str>,
    format: &str,
) -> Result<String, CliError> {
    let mut mappings = Vec::new();
    for id in selected_entity_types(registry, entity_type)? {
        mappings.push(registry.table_mapping(&id)?);
    }

    match format {
        "json" => {
            let mappings: Vec<&TableMapping> = mappings.iter().map(AsRef::as_ref).collect();
            Ok(serde_json::to_string_pretty(&mappings)?)
        }
        _ => {
            let mut out = String::new();
            for mapping in &mappings {
                let definition = registry.definition(mapping.entity_type_id())?;
                write_text(&mut out, mapping, &definition);
            }
            Ok(out.trim_end().to_string())
        }
    }
}

fn write_text(out: &mut String, mapping: &TableMapping, definition: &EntityDefinition) {
    let _ = writeln!(
        out,
        "=== {} ({:?}) ===",
        mapping.entity_type_id(),
        mapping.layout()
    );
    for table in mapping.tables() {
        let _ = writeln!(out, "{}: {}", table.role, table.name);
        for field in &table.fields {
            for (property, column) in mapping.field_columns(field).unwrap_or_default() {
                let _ = writeln!(out, "  {field}.{property} -> {column}");
            }
        }
        for column in &table.extra_columns {
            let _ = writeln!(out, "  (computed) -> {column}");
        }
    }
    let dedicated: Vec<_> = definition.dedicated_fields().collect();
    if !dedicated.is_empty() {
        let _ = writeln!(out, "Dedicated:");
        for field in dedicated {
            let _ = writeln!(
                out,
                "  {}: {}, {}",
                field.name,
                mapping.dedicated_data_table_name(field),
                mapping.dedicated_revision_table_name(field)
            );
        }
    }
    let _ = writeln!(out);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{parse_definitions, SAMPLE};

    #[test]
    fn text_lists_tables_and_dedicated_fields() {
        let registry = parse_definitions(SAMPLE).unwrap();
        let text = render(&registry, Some("article"), "text").unwrap();

        assert!(text.starts_with("=== article (RevisionableTranslatable) ==="));
        assert!(text.contains("base: article\n"));
        assert!(text.contains("revision data: article_field_revision\n"));
        assert!(text.contains("  title.value -> title\n"));
        assert!(text.contains("  (computed) -> default_langcode"));
        assert!(text.contains("  tags: article__tags, article_revision__tags"));
        assert!(!text.contains("=== tag"));
    }

    #[test]
    fn json_covers_every_entity_type() {
        let registry = parse_definitions(SAMPLE).unwrap();
        let json = render(&registry, None, "json").unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        let mappings = value.as_array().unwrap();
        assert_eq!(mappings.len(), 2);
        assert_eq!(mappings[0]["entity_type_id"], "article");
        assert_eq!(mappings[0]["layout"], "revisionable_translatable");
        assert_eq!(mappings[1]["layout"], "plain");
        assert_eq!(mappings[0]["dedicated"][0], "tags");
    }
}
