//! Entity type and field storage metadata.
//!
//! An [`EntityDefinition`] bundles an [`EntityType`] with its field storage
//! definitions. The [`DefinitionRegistry`] hands definitions and their
//! resolved table mappings to the storage engine.

mod entity_type;
mod field;
mod registry;

pub use entity_type::{EntityKeys, EntityType, IdType, TableLayout};
pub use field::{Cardinality, FieldStorage, FieldStorageDefinition, PropertyColumn};
pub use registry::{DefinitionRegistry, EntityDefinition};
