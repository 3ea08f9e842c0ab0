//! Schema command implementation.

use super::{load_definitions, selected_entity_types, CliError};
use entirel_core::{DedicatedFieldSchemaGenerator, DefinitionRegistry, SharedTableSchemaGenerator};
use entirel_storage::TableSchema;
use std::fmt::Write as _;
use std::path::Path;

/// Runs the schema command.
pub fn run(path: &Path, entity_type: Option<&str>, format: &str) -> Result<(), CliError> {
    let registry = load_definitions(path)?;
    println!("{}", render(&registry, entity_type, format)?);
    Ok(())
}

/// Shared table schemas followed by the dedicated ones of every selected
/// entity type.
pub fn schemas(
    registry: &DefinitionRegistry,
    entity_type: Option<&str>,
) -> Result<Vec<TableSchema>, CliError> {
    let mut schemas = Vec::new();
    for id in selected_entity_types(registry, entity_type)? {
        let definition = registry.definition(&id)?;
        let mapping = registry.table_mapping(&id)?;
        schemas.extend(SharedTableSchemaGenerator::new(&definition, &mapping).schemas()?);

        let dedicated = DedicatedFieldSchemaGenerator::new(&definition, &mapping);
        for field in definition.dedicated_fields() {
            let tables = dedicated.schema_for(field)?;
            schemas.push(tables.data);
            schemas.push(tables.revision);
        }
    }
    Ok(schemas)
}

/// Renders the schemas as JSON or as DDL-like text.
pub fn render(
    registry: &DefinitionRegistry,
    entity_type: Option<&str>,
    format: &str,
) -> Result<String, CliError> {
    let schemas = schemas(registry, entity_type)?;
    match format {
        "json" => Ok(serde_json::to_string_pretty(&schemas)?),
        _ => Ok(schemas
            .iter()
            .map(ddl)
            .collect::<Vec<_>>()
            .join("\n")),
    }
}

fn ddl(schema: &TableSchema) -> String {
    let mut lines: Vec<String> = schema
        .columns
        .iter()
        .map(|column| {
            let mut line = format!("  {} {}", column.name, column.column_type);
            if column.not_null {
                line.push_str(" NOT NULL");
            }
            if let Some(default) = &column.default {
                let _ = write!(line, " DEFAULT {default}");
            }
            line
        })
        .collect();
    if !schema.primary_key.is_empty() {
        lines.push(format!("  PRIMARY KEY ({})", schema.primary_key.join(", ")));
    }
    for (name, columns) in &schema.unique_keys {
        lines.push(format!("  UNIQUE {name} ({})", columns.join(", ")));
    }

    let mut out = format!("CREATE TABLE {} (\n{}\n);\n", schema.name, lines.join(",\n"));
    for (name, columns) in &schema.indexes {
        let _ = writeln!(
            out,
            "CREATE INDEX {name} ON {} ({});",
            schema.name,
            columns.join(", ")
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{parse_definitions, SAMPLE};

    #[test]
    fn dedicated_tables_follow_shared_ones() {
        let registry = parse_definitions(SAMPLE).unwrap();
        let names: Vec<String> = schemas(&registry, Some("article"))
            .unwrap()
            .into_iter()
            .map(|schema| schema.name)
            .collect();
        assert_eq!(
            names,
            vec![
                "article",
                "article_revision",
                "article_field_data",
                "article_field_revision",
                "article__tags",
                "article_revision__tags",
            ]
        );
    }

    #[test]
    fn ddl_lists_columns_and_keys() {
        let registry = parse_definitions(SAMPLE).unwrap();
        let text = render(&registry, Some("article"), "text").unwrap();

        assert!(text.contains("CREATE TABLE article (\n  id serial NOT NULL,"));
        assert!(text.contains("CREATE TABLE article_revision__tags ("));
        assert!(text.contains("  tags_value varchar(64)"));
        assert!(text.contains(
            "  PRIMARY KEY (entity_id, revision_id, deleted, delta, langcode)"
        ));
    }

    #[test]
    fn json_round_trips_into_table_schemas() {
        let registry = parse_definitions(SAMPLE).unwrap();
        let json = render(&registry, Some("tag"), "json").unwrap();
        let parsed: Vec<TableSchema> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, schemas(&registry, Some("tag")).unwrap());
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].primary_key, vec!["id"]);
    }
}
