//! Error types for relational backend operations.

use thiserror::Error;

/// Result type for backend operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur while talking to a relational backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A table with the given name already exists.
    #[error("table '{0}' already exists")]
    TableExists(String),

    /// The table does not exist.
    #[error("table '{0}' not found")]
    TableNotFound(String),

    /// The column does not exist in the table.
    #[error("column '{column}' not found in table '{table}'")]
    ColumnNotFound {
        /// Table that was addressed.
        table: String,
        /// Missing column.
        column: String,
    },

    /// An index with the given name already exists on the table.
    #[error("index '{index}' already exists on table '{table}'")]
    IndexExists {
        /// Table that was addressed.
        table: String,
        /// Duplicate index name.
        index: String,
    },

    /// The index does not exist on the table.
    #[error("index '{index}' not found on table '{table}'")]
    IndexNotFound {
        /// Table that was addressed.
        table: String,
        /// Missing index name.
        index: String,
    },

    /// A NOT NULL, primary key or unique constraint was violated.
    #[error("constraint violation on table '{table}': {message}")]
    ConstraintViolation {
        /// Table that was addressed.
        table: String,
        /// Description of the violation.
        message: String,
    },

    /// A value does not match the declared column type.
    #[error("type mismatch on {table}.{column}: expected {expected}, got {actual}")]
    TypeMismatch {
        /// Table that was addressed.
        table: String,
        /// Column that was written.
        column: String,
        /// Declared column type.
        expected: String,
        /// Type of the offending value.
        actual: String,
    },

    /// Commit or rollback was requested outside of a transaction.
    #[error("no active transaction")]
    NoActiveTransaction,

    /// A failure injected by a test backend.
    #[error("injected failure: {0}")]
    Injected(String),
}

impl StorageError {
    /// Creates a column not found error.
    pub fn column_not_found(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::ColumnNotFound {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Creates a constraint violation error.
    pub fn constraint(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConstraintViolation {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Creates an injected failure error.
    pub fn injected(message: impl Into<String>) -> Self {
        Self::Injected(message.into())
    }
}
