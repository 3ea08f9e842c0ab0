//! Identifier and result types shared across the engine.

use entirel_codec::Value as PropertyValue;
use entirel_storage::Value as CellValue;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Language key holding the values of an entity's default language.
pub const LANGCODE_DEFAULT: &str = "x-default";

/// Language code used when no language applies.
pub const LANGCODE_NOT_SPECIFIED: &str = "und";

/// Identifier of an entity.
///
/// Integer ids are assigned by the base table's serial column unless the
/// caller supplies one. String ids are always caller supplied.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    /// Numeric id.
    Integer(i64),
    /// Machine-name id.
    String(String),
}

impl EntityId {
    /// Returns true for ids that mean "let the database assign one".
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            EntityId::Integer(n) => *n == 0,
            EntityId::String(s) => s.is_empty(),
        }
    }

    /// Converts the id to a table cell.
    #[must_use]
    pub fn to_cell(&self) -> CellValue {
        match self {
            EntityId::Integer(n) => CellValue::Integer(*n),
            EntityId::String(s) => CellValue::Text(s.clone()),
        }
    }

    /// Reads an id from a table cell.
    #[must_use]
    pub fn from_cell(cell: &CellValue) -> Option<Self> {
        match cell {
            CellValue::Integer(n) => Some(EntityId::Integer(*n)),
            CellValue::Text(s) => Some(EntityId::String(s.clone())),
            _ => None,
        }
    }

    /// Converts the id to a property value.
    #[must_use]
    pub fn to_property(&self) -> PropertyValue {
        match self {
            EntityId::Integer(n) => PropertyValue::Integer(*n),
            EntityId::String(s) => PropertyValue::Text(s.clone()),
        }
    }

    /// Reads an id from a property value.
    #[must_use]
    pub fn from_property(value: &PropertyValue) -> Option<Self> {
        match value {
            PropertyValue::Integer(n) => Some(EntityId::Integer(*n)),
            PropertyValue::Text(s) => Some(EntityId::String(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Integer(n) => write!(f, "{n}"),
            EntityId::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for EntityId {
    fn from(n: i64) -> Self {
        EntityId::Integer(n)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        EntityId::String(s.to_string())
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        EntityId::String(s)
    }
}

/// Identifier of one revision of a revisionable entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RevisionId(i64);

impl RevisionId {
    /// Creates a revision id.
    #[inline]
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_i64(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for RevisionId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Outcome of a save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveResult {
    /// The entity was new and has been inserted.
    Inserted,
    /// The default revision was updated.
    Updated,
    /// A non-default revision was written; the base table was not touched.
    NotDefaultRevision,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_ids() {
        assert!(EntityId::Integer(0).is_empty());
        assert!(EntityId::from("").is_empty());
        assert!(!EntityId::from(3).is_empty());
    }

    #[test]
    fn cell_conversion_preserves_kind() {
        let id = EntityId::from("main");
        assert_eq!(EntityId::from_cell(&id.to_cell()), Some(id));
        assert_eq!(EntityId::from_cell(&CellValue::Null), None);
    }

    #[test]
    fn integer_ids_order_numerically() {
        assert!(EntityId::from(2) < EntityId::from(10));
    }
}
