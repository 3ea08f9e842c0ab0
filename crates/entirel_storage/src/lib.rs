//! # EntiRel Storage
//!
//! Relational backend trait and implementations for EntiRel.
//!
//! This crate provides the lowest-level storage abstraction for EntiRel.
//! Backends are **typed row stores**: they know tables, columns, keys and
//! indexes, but nothing about entities, fields or languages.
//!
//! ## Design Principles
//!
//! - Backends expose DDL, simple DML and nestable transactions
//! - Rows are flat maps of column name to scalar [`Value`]
//! - Must be `Send` so a connection can be shared behind a lock
//! - EntiRel owns all table layout and naming decisions
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For testing and ephemeral storage
//!
//! ## Example
//!
//! ```rust
//! use entirel_storage::{ColumnSpec, ColumnType, InMemoryBackend, RelationalBackend, TableSchema};
//!
//! let mut backend = InMemoryBackend::new();
//! let schema = TableSchema::new("users")
//!     .column(ColumnSpec::new("uid", ColumnType::Serial).not_null())
//!     .primary_key(["uid"]);
//! backend.create_table(&schema).unwrap();
//! assert!(backend.table_exists("users"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod memory;
mod query;
mod schema;
mod value;

pub use backend::RelationalBackend;
pub use error::{StorageError, StorageResult};
pub use memory::InMemoryBackend;
pub use query::{Condition, Join, Row, Select};
pub use schema::{ColumnSpec, ColumnType, TableSchema};
pub use value::Value;
