//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random entity definitions that
//! keep the naming rules: generated field names never collide with key
//! fields, revision metadata or each other.

use entirel_core::{
    Cardinality, EntityDefinition, EntityType, FieldStorageDefinition, PropertyColumn,
    TableLayout,
};
use entirel_storage::ColumnType;
use proptest::prelude::*;
use std::collections::BTreeSet;

/// Strategy for generating table layouts.
pub fn layout_strategy() -> impl Strategy<Value = TableLayout> {
    prop_oneof![
        Just(TableLayout::Plain),
        Just(TableLayout::Revisionable),
        Just(TableLayout::Translatable),
        Just(TableLayout::RevisionableTranslatable),
    ]
}

/// Strategy for generating entity type identifiers, including ones long
/// enough to force hashed dedicated table names.
pub fn entity_type_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,63}").expect("Invalid regex")
}

/// Strategy for generating field names that cannot collide with key
/// fields or with each other's columns.
pub fn field_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("f_[a-z0-9]{1,40}").expect("Invalid regex")
}

/// Strategy for generating property column types.
pub fn column_type_strategy() -> impl Strategy<Value = ColumnType> {
    prop_oneof![
        Just(ColumnType::Integer),
        Just(ColumnType::Float),
        (1u32..512).prop_map(ColumnType::Varchar),
        Just(ColumnType::Text),
        Just(ColumnType::Boolean),
    ]
}

/// Shape of one generated field before it is bound to an entity type.
#[derive(Debug, Clone)]
pub struct FieldShape {
    /// Field name.
    pub name: String,
    /// Property column types; one entry means a single `value` property.
    pub columns: Vec<ColumnType>,
    /// Whether the field keeps revisions.
    pub revisionable: bool,
    /// Whether the field keeps translations.
    pub translatable: bool,
    /// Item limit for dedicated fields; `None` keeps the field shared.
    pub dedicated: Option<Cardinality>,
}

impl FieldShape {
    /// Builds the storage definition of this shape for `entity_type_id`.
    pub fn build(&self, entity_type_id: &str) -> FieldStorageDefinition {
        let mut field = FieldStorageDefinition::new(entity_type_id, &self.name, "generated")
            .revisionable(self.revisionable)
            .translatable(self.translatable);
        if let [only] = self.columns.as_slice() {
            field = field.column(PropertyColumn::new("value", *only));
        } else {
            for (i, column_type) in self.columns.iter().enumerate() {
                field = field.column(PropertyColumn::new(format!("p{i}"), *column_type));
            }
            field = field.main_property("p0");
        }
        if let Some(cardinality) = self.dedicated {
            field = field.cardinality(cardinality).dedicated();
        }
        field
    }
}

/// Strategy for generating field shapes.
pub fn field_shape_strategy() -> impl Strategy<Value = FieldShape> {
    let cardinality = prop_oneof![
        (1u32..5).prop_map(Cardinality::Limited),
        Just(Cardinality::Unlimited),
    ];
    (
        field_name_strategy(),
        prop::collection::vec(column_type_strategy(), 1..4),
        any::<bool>(),
        any::<bool>(),
        prop::option::weighted(0.3, cardinality),
    )
        .prop_map(
            |(name, columns, revisionable, translatable, dedicated)| FieldShape {
                name,
                columns,
                revisionable,
                translatable,
                dedicated,
            },
        )
}

/// Strategy for generating complete entity definitions.
pub fn entity_definition_strategy() -> impl Strategy<Value = EntityDefinition> {
    (
        prop::string::string_regex("[a-z][a-z0-9]{0,15}").expect("Invalid regex"),
        layout_strategy(),
        prop::collection::vec(field_shape_strategy(), 0..8),
    )
        .prop_map(|(entity_type_id, layout, shapes)| {
            let entity_type = EntityType::content(&entity_type_id)
                .revisionable(layout.is_revisionable())
                .translatable(layout.is_translatable());
            let mut seen = BTreeSet::new();
            let fields: Vec<_> = shapes
                .into_iter()
                .filter(|shape| seen.insert(shape.name.clone()))
                .map(|shape| shape.build(&entity_type_id))
                .collect();
            EntityDefinition::with_fields(entity_type, fields)
                .expect("Generated definition must be valid")
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn generated_definitions_keep_their_layout(definition in entity_definition_strategy()) {
            let layout = definition.entity_type().layout();
            prop_assert_eq!(
                layout.is_revisionable(),
                definition.entity_type().revisionable
            );
        }

        #[test]
        fn shapes_build_valid_fields(shape in field_shape_strategy()) {
            prop_assert!(shape.build("node").validate().is_ok());
        }
    }
}
