//! Relational backend trait definition.

use crate::error::StorageResult;
use crate::query::{Condition, Row, Select};
use crate::schema::TableSchema;

/// A relational store addressed by table name.
///
/// The backend knows nothing about entities. It stores typed rows,
/// enforces the constraints declared by [`TableSchema`] and offers
/// nestable transactions.
///
/// # Invariants
///
/// - `insert` fills omitted columns from their defaults and assigns the
///   serial column when it is omitted or NULL
/// - primary and unique keys are enforced on `insert` and `update`
/// - `rollback` restores the state captured by the matching `begin`,
///   including DDL when [`supports_transactional_ddl`] is true
///
/// [`supports_transactional_ddl`]: RelationalBackend::supports_transactional_ddl
pub trait RelationalBackend: Send {
    /// Returns true if the table exists.
    fn table_exists(&self, table: &str) -> bool;

    /// Returns the names of all tables, sorted.
    fn table_names(&self) -> Vec<String>;

    /// Returns the schema of an existing table.
    ///
    /// # Errors
    ///
    /// Returns an error if the table does not exist.
    fn table_schema(&self, table: &str) -> StorageResult<TableSchema>;

    /// Creates a table.
    ///
    /// # Errors
    ///
    /// Returns an error if the table already exists or the schema
    /// references unknown columns in its keys or indexes.
    fn create_table(&mut self, schema: &TableSchema) -> StorageResult<()>;

    /// Drops a table and all its rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the table does not exist.
    fn drop_table(&mut self, table: &str) -> StorageResult<()>;

    /// Renames a table, keeping its rows.
    ///
    /// # Errors
    ///
    /// Returns an error if `from` is missing or `to` already exists.
    fn rename_table(&mut self, from: &str, to: &str) -> StorageResult<()>;

    /// Returns true if the named index exists on the table.
    fn index_exists(&self, table: &str, index: &str) -> bool;

    /// Adds a non-unique index.
    ///
    /// # Errors
    ///
    /// Returns an error if the table or a column is missing, or the index
    /// already exists.
    fn add_index(&mut self, table: &str, index: &str, columns: &[String]) -> StorageResult<()>;

    /// Drops an index.
    ///
    /// # Errors
    ///
    /// Returns an error if the table or index is missing.
    fn drop_index(&mut self, table: &str, index: &str) -> StorageResult<()>;

    /// Whether schema changes are rolled back together with data.
    fn supports_transactional_ddl(&self) -> bool {
        true
    }

    /// Runs a query.
    ///
    /// # Errors
    ///
    /// Returns an error if a table does not exist.
    fn select(&self, query: &Select) -> StorageResult<Vec<Row>>;

    /// Inserts a row and returns the value assigned to the serial column,
    /// if the table has one.
    ///
    /// # Errors
    ///
    /// Returns an error on unknown columns, type mismatches or constraint
    /// violations.
    fn insert(&mut self, table: &str, row: Row) -> StorageResult<Option<i64>>;

    /// Sets `values` on every row matching all `conditions`.
    ///
    /// Returns the number of rows changed.
    ///
    /// # Errors
    ///
    /// Returns an error on unknown columns, type mismatches or constraint
    /// violations.
    fn update(&mut self, table: &str, conditions: &[Condition], values: &Row)
        -> StorageResult<usize>;

    /// Deletes every row matching all `conditions`.
    ///
    /// Returns the number of rows removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the table does not exist.
    fn delete(&mut self, table: &str, conditions: &[Condition]) -> StorageResult<usize>;

    /// Counts rows matching all `conditions`.
    ///
    /// # Errors
    ///
    /// Returns an error if the table does not exist.
    fn count(&self, table: &str, conditions: &[Condition]) -> StorageResult<usize> {
        let mut query = Select::from(table);
        query.conditions = conditions.to_vec();
        Ok(self.select(&query)?.len())
    }

    /// Opens a (possibly nested) transaction scope.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot open a scope.
    fn begin(&mut self) -> StorageResult<()>;

    /// Commits the innermost scope.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::NoActiveTransaction`] outside of a scope.
    fn commit(&mut self) -> StorageResult<()>;

    /// Rolls back the innermost scope.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::NoActiveTransaction`] outside of a scope.
    fn rollback(&mut self) -> StorageResult<()>;

    /// Number of open scopes.
    fn transaction_depth(&self) -> usize;
}
