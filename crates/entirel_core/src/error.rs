//! Error types for EntiRel core.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in EntiRel core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Relational backend error.
    #[error("storage error: {0}")]
    Storage(#[from] entirel_storage::StorageError),

    /// Serialized column codec error.
    #[error("codec error: {0}")]
    Codec(#[from] entirel_codec::CodecError),

    /// A field maps onto a column name the engine reserves.
    #[error("field '{field}' of entity type '{entity_type}' uses reserved column name '{column}'")]
    ReservedColumnName {
        /// Entity type identifier.
        entity_type: String,
        /// Offending field.
        field: String,
        /// Reserved column name.
        column: String,
    },

    /// Two fields map onto the same column of one table.
    #[error("column '{column}' of table '{table}' is claimed by more than one field")]
    ColumnNameCollision {
        /// Table name.
        table: String,
        /// Colliding column.
        column: String,
    },

    /// An entity of a bundled type has no bundle.
    #[error("entity of type '{entity_type}' has no bundle")]
    MissingBundle {
        /// Entity type identifier.
        entity_type: String,
    },

    /// The entity type is not registered.
    #[error("unknown entity type: {entity_type}")]
    UnknownEntityType {
        /// Entity type identifier.
        entity_type: String,
    },

    /// The field is not defined on the entity type.
    #[error("unknown field '{field}' on entity type '{entity_type}'")]
    UnknownField {
        /// Entity type identifier.
        entity_type: String,
        /// Field name.
        field: String,
    },

    /// A value was rejected at assignment time.
    #[error("invalid value for field '{field}': {message}")]
    InvalidFieldValue {
        /// Field name.
        field: String,
        /// Description of the problem.
        message: String,
    },

    /// The entity has no translation in the given language.
    #[error("entity has no translation for language '{langcode}'")]
    UnknownTranslation {
        /// Language code.
        langcode: String,
    },

    /// A dedicated field schema change was refused because data exists.
    #[error("cannot update storage of field '{field}': {message}")]
    SchemaUpdateForbidden {
        /// Field name.
        field: String,
        /// Description of the refused change.
        message: String,
    },

    /// A failed dedicated table replacement could not be undone either.
    ///
    /// Only raised by backends without transactional DDL; the tables of the
    /// field may be missing until the schema is repaired.
    #[error("restoring tables of field '{field}' failed ({restore}) after: {cause}")]
    SchemaRestoreFailed {
        /// Field name.
        field: String,
        /// Failure of the original update.
        #[source]
        cause: Box<CoreError>,
        /// Failure of the restore attempt.
        restore: Box<CoreError>,
    },

    /// The targeted revision is the default revision.
    #[error("revision {revision_id} is the default revision and cannot be deleted")]
    DefaultRevisionDeletionForbidden {
        /// Revision identifier.
        revision_id: i64,
    },

    /// The operation is not valid in the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of the problem.
        message: String,
    },

    /// An entity type or field definition is inconsistent.
    #[error("invalid definition: {message}")]
    InvalidDefinition {
        /// Description of the problem.
        message: String,
    },
}

impl CoreError {
    /// Creates an unknown entity type error.
    pub fn unknown_entity_type(entity_type: impl Into<String>) -> Self {
        Self::UnknownEntityType {
            entity_type: entity_type.into(),
        }
    }

    /// Creates an unknown field error.
    pub fn unknown_field(entity_type: impl Into<String>, field: impl Into<String>) -> Self {
        Self::UnknownField {
            entity_type: entity_type.into(),
            field: field.into(),
        }
    }

    /// Creates an invalid field value error.
    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidFieldValue {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates a schema update forbidden error.
    pub fn schema_update_forbidden(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SchemaUpdateForbidden {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates an invalid definition error.
    pub fn invalid_definition(message: impl Into<String>) -> Self {
        Self::InvalidDefinition {
            message: message.into(),
        }
    }

    /// Returns true for errors raised from configuration, before any query.
    #[must_use]
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::ReservedColumnName { .. }
                | Self::ColumnNameCollision { .. }
                | Self::MissingBundle { .. }
                | Self::InvalidDefinition { .. }
        )
    }
}
