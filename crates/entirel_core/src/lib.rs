//! # EntiRel Core
//!
//! Content entity relational storage engine.
//!
//! This crate provides:
//! - Table mapping resolution for the four layouts (plain, revisionable,
//!   translatable, revisionable and translatable)
//! - Dedicated field table schemas, including archived tables of deleted
//!   fields
//! - Conversion between entities and table rows
//! - Transactional load, save, delete and revision operations
//! - Schema lifecycle hooks for field storage changes
//!
//! ## Example
//!
//! ```rust
//! use entirel_core::{
//!     Connection, DefinitionRegistry, EntityDefinition, EntityStorage, EntityType,
//!     FieldStorageDefinition,
//! };
//! use std::sync::Arc;
//!
//! let registry = Arc::new(DefinitionRegistry::default());
//! registry.register(EntityDefinition::with_fields(
//!     EntityType::content("article").revisionable(true).translatable(true),
//!     [FieldStorageDefinition::string("article", "title", 255)
//!         .revisionable(true)
//!         .translatable(true)],
//! )?)?;
//!
//! let storage = EntityStorage::new("article", Connection::in_memory(), registry)?;
//! storage.install_schema()?;
//!
//! let mut article = storage.create(Some("news"))?;
//! article.set_language("en")?;
//! article.set("title", "Hello")?;
//! article.add_translation("fr")?;
//! article.set_translation("fr", "title", "Bonjour")?;
//! storage.save(&mut article)?;
//!
//! let id = article.id().unwrap();
//! let loaded = storage.load(id)?.unwrap();
//! assert_eq!(loaded.translation_value("fr", "title"), Some(&"Bonjour".into()));
//! # Ok::<(), entirel_core::CoreError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod config;
mod connection;
mod definition;
mod entity;
mod error;
mod mapping;
mod record;
mod schema;
mod storage;
mod types;

pub use cache::{cache_key, EntityCache, MemoryEntityCache, NullCache};
pub use config::Config;
pub use connection::{Connection, Transaction};
pub use definition::{
    Cardinality, DefinitionRegistry, EntityDefinition, EntityKeys, EntityType, FieldStorage,
    FieldStorageDefinition, IdType, PropertyColumn, TableLayout,
};
pub use entity::{Entity, FieldItem, FieldValue};
pub use error::{CoreError, CoreResult};
pub use mapping::{
    dedicated_column_name, sha256_hex, shared_column_name, MappedTable, TableMapping,
    TableMappingResolver, TableNaming, TableRole, RESERVED_DEDICATED_PROPERTIES,
};
pub use record::{EntityRecordCodec, EntityRecords};
pub use schema::{
    DedicatedFieldSchemaGenerator, DedicatedTableSchemas, SharedTableSchemaGenerator,
    DEDICATED_FIXED_COLUMNS,
};
pub use storage::EntityStorage;
pub use types::{EntityId, RevisionId, SaveResult, LANGCODE_DEFAULT, LANGCODE_NOT_SPECIFIED};

pub use entirel_codec::{CborCodec, JsonCodec, SerializeCodec, Value as PropertyValue};
pub use entirel_storage::{InMemoryBackend, RelationalBackend, StorageError};
