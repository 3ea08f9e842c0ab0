//! DDL generation for shared and dedicated tables.

mod dedicated;
mod shared;

pub use dedicated::{DedicatedFieldSchemaGenerator, DedicatedTableSchemas, DEDICATED_FIXED_COLUMNS};
pub use shared::SharedTableSchemaGenerator;
