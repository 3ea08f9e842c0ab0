//! Field storage definitions.

use crate::error::{CoreError, CoreResult};
use entirel_codec::Value as PropertyValue;
use entirel_storage::ColumnType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// How many items a field holds per language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    /// At most this many items.
    Limited(u32),
    /// Any number of items.
    Unlimited,
}

impl Cardinality {
    /// The item limit, if finite.
    #[must_use]
    pub fn limit(&self) -> Option<usize> {
        match self {
            Cardinality::Limited(n) => Some(*n as usize),
            Cardinality::Unlimited => None,
        }
    }

    /// Returns true if more than one item is allowed.
    #[must_use]
    pub fn is_multiple(&self) -> bool {
        !matches!(self, Cardinality::Limited(1))
    }
}

impl Default for Cardinality {
    fn default() -> Self {
        Cardinality::Limited(1)
    }
}

/// One property (sub-column) of a field item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyColumn {
    /// Property name.
    pub name: String,
    /// Column type.
    pub column_type: ColumnType,
    /// Whether the column rejects NULL.
    #[serde(default)]
    pub not_null: bool,
    /// Whether values pass through the serialization codec.
    #[serde(default)]
    pub serialize: bool,
}

impl PropertyColumn {
    /// Creates a nullable, non-serialized property column.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            not_null: false,
            serialize: false,
        }
    }

    /// Marks the column NOT NULL.
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    /// Stores values through the serialization codec in a blob column.
    #[must_use]
    pub fn serialized(mut self) -> Self {
        self.serialize = true;
        self.column_type = ColumnType::Blob;
        self
    }

    /// Returns true if `value` may be assigned to this property.
    #[must_use]
    pub fn accepts(&self, value: &PropertyValue) -> bool {
        if value.is_null() || self.serialize {
            return true;
        }
        match (self.column_type, value) {
            (ColumnType::Serial | ColumnType::Integer, PropertyValue::Integer(_)) => true,
            (ColumnType::Boolean, PropertyValue::Bool(_)) => true,
            (ColumnType::Boolean, PropertyValue::Integer(n)) => *n == 0 || *n == 1,
            (ColumnType::Float, PropertyValue::Float(_) | PropertyValue::Integer(_)) => true,
            (ColumnType::Varchar(max), PropertyValue::Text(s)) => s.chars().count() <= max as usize,
            (ColumnType::Text, PropertyValue::Text(_)) => true,
            (ColumnType::Blob, PropertyValue::Bytes(_)) => true,
            _ => false,
        }
    }
}

/// Where a field's values live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldStorage {
    /// In the entity type's own tables.
    #[default]
    Shared,
    /// In a pair of tables owned by the field.
    Dedicated,
    /// Outside relational storage.
    Custom,
}

/// Describes how one field of an entity type is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldStorageDefinition {
    /// Field name, unique per entity type.
    pub name: String,
    /// Owning entity type.
    pub entity_type_id: String,
    /// Declared field type, informational.
    pub field_type: String,
    /// Items per language.
    #[serde(default)]
    pub cardinality: Cardinality,
    /// Item properties in declaration order.
    pub columns: Vec<PropertyColumn>,
    /// Primary property, if declared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_property: Option<String>,
    /// Named indexes over property names.
    #[serde(default)]
    pub indexes: BTreeMap<String, Vec<String>>,
    /// Whether values differ per revision.
    #[serde(default)]
    pub revisionable: bool,
    /// Whether values differ per language.
    #[serde(default)]
    pub translatable: bool,
    /// Storage strategy.
    #[serde(default)]
    pub storage: FieldStorage,
    /// Unique storage identifier, stable across renames of tables.
    #[serde(default = "Uuid::new_v4")]
    pub uuid: Uuid,
    /// Set once the storage was deleted and awaits purging.
    #[serde(default)]
    pub deleted: bool,
}

impl FieldStorageDefinition {
    /// Creates a single-valued shared field without properties.
    pub fn new(
        entity_type_id: impl Into<String>,
        name: impl Into<String>,
        field_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            entity_type_id: entity_type_id.into(),
            field_type: field_type.into(),
            cardinality: Cardinality::default(),
            columns: Vec::new(),
            main_property: None,
            indexes: BTreeMap::new(),
            revisionable: false,
            translatable: false,
            storage: FieldStorage::Shared,
            uuid: Uuid::new_v4(),
            deleted: false,
        }
    }

    /// A `string` field with one `value` property.
    pub fn string(entity_type_id: impl Into<String>, name: impl Into<String>, max: u32) -> Self {
        Self::new(entity_type_id, name, "string")
            .column(PropertyColumn::new("value", ColumnType::Varchar(max)))
    }

    /// A `text` field with one unbounded `value` property.
    pub fn text(entity_type_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(entity_type_id, name, "text")
            .column(PropertyColumn::new("value", ColumnType::Text))
    }

    /// An `integer` field with one `value` property.
    pub fn integer(entity_type_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(entity_type_id, name, "integer")
            .column(PropertyColumn::new("value", ColumnType::Integer))
    }

    /// A `boolean` field with one `value` property.
    pub fn boolean(entity_type_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(entity_type_id, name, "boolean")
            .column(PropertyColumn::new("value", ColumnType::Boolean))
    }

    /// An `entity_reference` field keyed by `target_id`.
    pub fn entity_reference(entity_type_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(entity_type_id, name, "entity_reference")
            .column(PropertyColumn::new("target_id", ColumnType::Integer))
            .main_property("target_id")
            .index("target_id", ["target_id"])
    }

    /// Appends a property column.
    #[must_use]
    pub fn column(mut self, column: PropertyColumn) -> Self {
        self.columns.push(column);
        self
    }

    /// Declares the main property.
    #[must_use]
    pub fn main_property(mut self, property: impl Into<String>) -> Self {
        self.main_property = Some(property.into());
        self
    }

    /// Sets the cardinality.
    #[must_use]
    pub fn cardinality(mut self, cardinality: Cardinality) -> Self {
        self.cardinality = cardinality;
        self
    }

    /// Sets revisionability.
    #[must_use]
    pub fn revisionable(mut self, value: bool) -> Self {
        self.revisionable = value;
        self
    }

    /// Sets translatability.
    #[must_use]
    pub fn translatable(mut self, value: bool) -> Self {
        self.translatable = value;
        self
    }

    /// Stores the field in its own tables.
    #[must_use]
    pub fn dedicated(mut self) -> Self {
        self.storage = FieldStorage::Dedicated;
        self
    }

    /// Keeps the field out of relational storage.
    #[must_use]
    pub fn custom_storage(mut self) -> Self {
        self.storage = FieldStorage::Custom;
        self
    }

    /// Adds an index over properties.
    #[must_use]
    pub fn index<I, S>(mut self, name: impl Into<String>, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.indexes
            .insert(name.into(), properties.into_iter().map(Into::into).collect());
        self
    }

    /// Returns true if the field opts out of relational storage.
    #[must_use]
    pub fn has_custom_storage(&self) -> bool {
        self.storage == FieldStorage::Custom
    }

    /// Returns true if the field lives in its own tables.
    #[must_use]
    pub fn has_dedicated_table(&self) -> bool {
        self.storage == FieldStorage::Dedicated
    }

    /// Returns true if the field lives in the entity type's tables.
    #[must_use]
    pub fn is_shared(&self) -> bool {
        self.storage == FieldStorage::Shared
    }

    /// Looks up a property column.
    #[must_use]
    pub fn property_column(&self, name: &str) -> Option<&PropertyColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// The property a scalar assignment targets: the declared main
    /// property, or the only property.
    #[must_use]
    pub fn main_property_name(&self) -> Option<&str> {
        match (&self.main_property, self.columns.as_slice()) {
            (Some(main), _) => Some(main),
            (None, [only]) => Some(&only.name),
            _ => None,
        }
    }

    /// Checks the definition for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidDefinition`] on duplicate or unknown
    /// properties, a shared multi-valued field or a serialized column that
    /// is not a blob.
    pub fn validate(&self) -> CoreResult<()> {
        let invalid = |message: String| {
            Err(CoreError::invalid_definition(format!(
                "field '{}' of '{}': {message}",
                self.name, self.entity_type_id
            )))
        };
        if self.name.is_empty() {
            return invalid("empty field name".to_string());
        }
        if self.columns.is_empty() && !self.has_custom_storage() {
            return invalid("no property columns".to_string());
        }
        for (i, column) in self.columns.iter().enumerate() {
            if self.columns[..i].iter().any(|c| c.name == column.name) {
                return invalid(format!("duplicate property '{}'", column.name));
            }
            if column.serialize && column.column_type != ColumnType::Blob {
                return invalid(format!("serialized property '{}' must be a blob", column.name));
            }
        }
        if let Some(main) = &self.main_property {
            if self.property_column(main).is_none() {
                return invalid(format!("main property '{main}' is not a column"));
            }
        }
        for (index, properties) in &self.indexes {
            if let Some(p) = properties.iter().find(|p| self.property_column(p).is_none()) {
                return invalid(format!("index '{index}' references unknown property '{p}'"));
            }
        }
        if self.is_shared() && self.cardinality.is_multiple() {
            return invalid("multi-valued fields need dedicated storage".to_string());
        }
        Ok(())
    }
}
