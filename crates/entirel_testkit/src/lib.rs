//! # EntiRel Testkit
//!
//! Test utilities for EntiRel.
//!
//! This crate provides:
//! - Entity type fixtures in all four table layouts
//! - A [`TestStorage`] harness over an in-memory backend
//! - A fault-injecting backend for rollback tests
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust
//! use entirel_testkit::prelude::*;
//!
//! let harness = TestStorage::article(TableLayout::RevisionableTranslatable);
//! let mut article = harness.create(Some("news")).unwrap();
//! article.set("title", "Hello").unwrap();
//! harness.save(&mut article).unwrap();
//! assert_eq!(harness.count_rows("article"), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod faults;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::faults::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use entirel_core::TableLayout;
}

pub use faults::*;
pub use fixtures::*;
pub use generators::*;
