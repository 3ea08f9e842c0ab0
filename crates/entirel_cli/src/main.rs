//! EntiRel CLI
//!
//! Command-line tools for inspecting how entity definitions map to tables.
//!
//! # Commands
//!
//! - `mapping` - Display the table mapping of entity types
//! - `schema` - Print the table schemas of entity types as DDL
//! - `table-name` - Compute dedicated and archived table names of a field

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// EntiRel command-line storage tools.
#[derive(Parser)]
#[command(name = "entirel")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the JSON definitions file
    #[arg(global = true, short, long)]
    definitions: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display the table mapping of entity types
    Mapping {
        /// Only show this entity type
        #[arg(short, long)]
        entity_type: Option<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print shared and dedicated table schemas
    Schema {
        /// Only show this entity type
        #[arg(short, long)]
        entity_type: Option<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Compute the dedicated table names of a field
    TableName {
        /// Entity type identifier
        entity_type: String,

        /// Field name
        field: String,

        /// Longest table name before hashing
        #[arg(long)]
        max_length: Option<usize>,

        /// Also print the archived table names for this storage uuid
        #[arg(long)]
        deleted_uuid: Option<Uuid>,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Mapping {
            entity_type,
            format,
        } => {
            let path = cli
                .definitions
                .ok_or("Definitions file required for mapping")?;
            commands::mapping::run(&path, entity_type.as_deref(), &format)?;
        }
        Commands::Schema {
            entity_type,
            format,
        } => {
            let path = cli
                .definitions
                .ok_or("Definitions file required for schema")?;
            commands::schema::run(&path, entity_type.as_deref(), &format)?;
        }
        Commands::TableName {
            entity_type,
            field,
            max_length,
            deleted_uuid,
        } => {
            commands::table_name::run(&entity_type, &field, max_length, deleted_uuid);
        }
        Commands::Version => {
            println!("EntiRel CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
