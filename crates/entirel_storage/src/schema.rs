//! Table schema descriptions understood by relational backends.

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Column storage type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    /// Auto-incrementing integer. At most one per table.
    Serial,
    /// Signed integer.
    Integer,
    /// Double precision float.
    Float,
    /// Bounded text.
    Varchar(u32),
    /// Unbounded text.
    Text,
    /// Opaque bytes.
    Blob,
    /// Boolean stored as 0 or 1.
    Boolean,
}

impl ColumnType {
    /// Returns true if a non-null `value` may be stored in a column of this type.
    #[must_use]
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (ColumnType::Serial | ColumnType::Integer, Value::Integer(_)) => true,
            (ColumnType::Boolean, Value::Integer(n)) => *n == 0 || *n == 1,
            (ColumnType::Float, Value::Float(_) | Value::Integer(_)) => true,
            (ColumnType::Varchar(max), Value::Text(s)) => s.chars().count() <= *max as usize,
            (ColumnType::Text, Value::Text(_)) => true,
            (ColumnType::Blob, Value::Bytes(_)) => true,
            _ => false,
        }
    }

    /// Returns true for integer-valued types.
    #[must_use]
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            ColumnType::Serial | ColumnType::Integer | ColumnType::Boolean
        )
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Serial => write!(f, "serial"),
            ColumnType::Integer => write!(f, "int"),
            ColumnType::Float => write!(f, "float"),
            ColumnType::Varchar(n) => write!(f, "varchar({n})"),
            ColumnType::Text => write!(f, "text"),
            ColumnType::Blob => write!(f, "blob"),
            ColumnType::Boolean => write!(f, "boolean"),
        }
    }
}

/// A single column of a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Column name.
    pub name: String,
    /// Storage type.
    pub column_type: ColumnType,
    /// Whether NULL is rejected.
    #[serde(default)]
    pub not_null: bool,
    /// Value used when an insert omits the column.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ColumnSpec {
    /// Creates a nullable column without a default.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            not_null: false,
            default: None,
        }
    }

    /// Marks the column NOT NULL.
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    /// Sets the default value.
    #[must_use]
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }
}

/// Full description of a table: columns, keys and indexes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Table name.
    pub name: String,
    /// Columns in declaration order.
    pub columns: Vec<ColumnSpec>,
    /// Primary key columns.
    #[serde(default)]
    pub primary_key: Vec<String>,
    /// Named unique keys.
    #[serde(default)]
    pub unique_keys: BTreeMap<String, Vec<String>>,
    /// Named non-unique indexes.
    #[serde(default)]
    pub indexes: BTreeMap<String, Vec<String>>,
}

impl TableSchema {
    /// Creates an empty schema for `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_key: Vec::new(),
            unique_keys: BTreeMap::new(),
            indexes: BTreeMap::new(),
        }
    }

    /// Appends a column.
    #[must_use]
    pub fn column(mut self, column: ColumnSpec) -> Self {
        self.columns.push(column);
        self
    }

    /// Sets the primary key.
    #[must_use]
    pub fn primary_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Adds a unique key.
    #[must_use]
    pub fn unique_key<I, S>(mut self, name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unique_keys
            .insert(name.into(), columns.into_iter().map(Into::into).collect());
        self
    }

    /// Adds a non-unique index.
    #[must_use]
    pub fn index<I, S>(mut self, name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.indexes
            .insert(name.into(), columns.into_iter().map(Into::into).collect());
        self
    }

    /// Looks up a column by name.
    #[must_use]
    pub fn column_spec(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Returns true if the table declares `name`.
    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.column_spec(name).is_some()
    }

    /// Column names in declaration order.
    #[must_use]
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// The serial column, if the table has one.
    #[must_use]
    pub fn serial_column(&self) -> Option<&ColumnSpec> {
        self.columns
            .iter()
            .find(|c| c.column_type == ColumnType::Serial)
    }

    /// Returns true if both schemas store the same columns and primary key,
    /// ignoring table name and indexes.
    #[must_use]
    pub fn same_storage(&self, other: &TableSchema) -> bool {
        self.columns == other.columns
            && self.primary_key == other.primary_key
            && self.unique_keys == other.unique_keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varchar_rejects_long_text() {
        let t = ColumnType::Varchar(3);
        assert!(t.accepts(&Value::Text("abc".into())));
        assert!(!t.accepts(&Value::Text("abcd".into())));
    }

    #[test]
    fn boolean_accepts_only_zero_and_one() {
        assert!(ColumnType::Boolean.accepts(&Value::Integer(1)));
        assert!(!ColumnType::Boolean.accepts(&Value::Integer(2)));
    }

    #[test]
    fn every_type_accepts_null() {
        for t in [ColumnType::Serial, ColumnType::Text, ColumnType::Blob] {
            assert!(t.accepts(&Value::Null));
        }
    }

    #[test]
    fn same_storage_ignores_indexes() {
        let a = TableSchema::new("a")
            .column(ColumnSpec::new("x", ColumnType::Integer))
            .index("x", ["x"]);
        let b = TableSchema::new("b").column(ColumnSpec::new("x", ColumnType::Integer));
        assert!(a.same_storage(&b));
    }

    #[test]
    fn schema_serializes_to_json_shape() {
        let schema = TableSchema::new("node")
            .column(ColumnSpec::new("nid", ColumnType::Serial).not_null())
            .primary_key(["nid"]);
        assert_eq!(schema.serial_column().map(|c| c.name.as_str()), Some("nid"));
        assert_eq!(schema.column_names(), vec!["nid"]);
    }
}
