//! Row and query types for data manipulation.

use crate::value::Value;
use std::collections::BTreeMap;

/// A row keyed by column name.
///
/// Rows produced by a joined [`Select`] carry the joined table's columns
/// under `alias.column` keys.
pub type Row = BTreeMap<String, Value>;

/// A filter applied to rows.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Column equals the value. NULL never matches.
    Eq(String, Value),
    /// Column equals any of the values.
    In(String, Vec<Value>),
}

impl Condition {
    /// Builds an equality condition.
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::Eq(column.into(), value.into())
    }

    /// Builds a membership condition.
    pub fn is_in<I, V>(column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Condition::In(column.into(), values.into_iter().map(Into::into).collect())
    }

    /// The column the condition reads.
    #[must_use]
    pub fn column(&self) -> &str {
        match self {
            Condition::Eq(c, _) | Condition::In(c, _) => c,
        }
    }

    /// Evaluates the condition against a row.
    #[must_use]
    pub fn matches(&self, row: &Row) -> bool {
        let Some(cell) = row.get(self.column()) else {
            return false;
        };
        if cell.is_null() {
            return false;
        }
        match self {
            Condition::Eq(_, v) => cell == v,
            Condition::In(_, vs) => vs.iter().any(|v| v == cell),
        }
    }
}

/// An inner join of a second table.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    /// Joined table.
    pub table: String,
    /// Prefix for the joined columns in result rows.
    pub alias: String,
    /// Column of the primary table.
    pub left_column: String,
    /// Column of the joined table.
    pub right_column: String,
}

impl Join {
    /// Joins `table` as `alias` on `left = alias.right`.
    pub fn inner(
        table: impl Into<String>,
        alias: impl Into<String>,
        left_column: impl Into<String>,
        right_column: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            alias: alias.into(),
            left_column: left_column.into(),
            right_column: right_column.into(),
        }
    }
}

/// A SELECT against one table with an optional inner join.
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    /// Primary table.
    pub table: String,
    /// Conditions, all of which must match.
    pub conditions: Vec<Condition>,
    /// Optional inner join.
    pub join: Option<Join>,
    /// Sort columns, ascending.
    pub order_by: Vec<String>,
    /// Columns to keep. `None` keeps every column.
    pub columns: Option<Vec<String>>,
    /// Drop duplicate rows after projection.
    pub distinct: bool,
    /// Maximum number of rows.
    pub limit: Option<usize>,
}

impl Select {
    /// Starts a query against `table`.
    pub fn from(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            conditions: Vec::new(),
            join: None,
            order_by: Vec::new(),
            columns: None,
            distinct: false,
            limit: None,
        }
    }

    /// Adds a condition.
    #[must_use]
    pub fn filter(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Sets the join.
    #[must_use]
    pub fn join(mut self, join: Join) -> Self {
        self.join = Some(join);
        self
    }

    /// Appends a sort column.
    #[must_use]
    pub fn order_by(mut self, column: impl Into<String>) -> Self {
        self.order_by.push(column.into());
        self
    }

    /// Restricts the projected columns.
    #[must_use]
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Enables DISTINCT.
    #[must_use]
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Limits the result size.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}
