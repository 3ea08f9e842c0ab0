//! Table-name command implementation.

use entirel_core::{Config, FieldStorageDefinition, TableNaming};
use uuid::Uuid;

/// Dedicated table names of one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    /// Data table of the live field.
    pub data: String,
    /// Revision table of the live field.
    pub revision: String,
    /// Archived tables, when a storage uuid was given.
    pub deleted: Option<(String, String)>,
}

/// Runs the table-name command.
pub fn run(
    entity_type: &str,
    field: &str,
    max_length: Option<usize>,
    deleted_uuid: Option<Uuid>,
) {
    let names = compute(entity_type, field, max_length, deleted_uuid);
    println!("{}", render(&names));
}

/// Computes the names under the default configuration, optionally with a
/// different length limit.
#[must_use]
pub fn compute(
    entity_type: &str,
    field: &str,
    max_length: Option<usize>,
    deleted_uuid: Option<Uuid>,
) -> TableNames {
    let mut config = Config::default();
    if let Some(max_length) = max_length {
        config = config.max_table_name_length(max_length);
    }
    let naming = TableNaming::from(&config);

    let deleted = deleted_uuid.map(|uuid| {
        let mut archived = FieldStorageDefinition::new(entity_type, field, "deleted");
        archived.uuid = uuid;
        archived.deleted = true;
        (
            naming.deleted_data_table(&archived),
            naming.deleted_revision_table(&archived),
        )
    });

    TableNames {
        data: naming.dedicated_data_table(entity_type, field),
        revision: naming.dedicated_revision_table(entity_type, field),
        deleted,
    }
}

/// Renders the names one per line.
#[must_use]
pub fn render(names: &TableNames) -> String {
    let mut lines = vec![
        format!("data:             {}", names.data),
        format!("revision:         {}", names.revision),
    ];
    if let Some((data, revision)) = &names.deleted {
        lines.push(format!("deleted data:     {data}"));
        lines.push(format!("deleted revision: {revision}"));
    }
    lines.join("\n")
}
