//! Values assigned to entity fields.

use crate::definition::FieldStorageDefinition;
use crate::error::{CoreError, CoreResult};
use entirel_codec::Value as PropertyValue;
use std::collections::BTreeMap;

/// One item of a field: property name to value.
pub type FieldItem = BTreeMap<String, PropertyValue>;

/// A value assigned to a field.
///
/// A scalar targets the field's main property of a single item; an item
/// list sets every item explicitly.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Main property of a single item. `Null` clears the field.
    Scalar(PropertyValue),
    /// Full item list.
    Items(Vec<FieldItem>),
}

impl FieldValue {
    /// A value that clears the field.
    #[must_use]
    pub fn empty() -> Self {
        FieldValue::Items(Vec::new())
    }

    /// A single item built from property/value pairs.
    pub fn item<I, K, V>(properties: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<PropertyValue>,
    {
        FieldValue::Items(vec![properties
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect()])
    }

    /// Several items, one main-property value each.
    ///
    /// Each value is bound to the field's main property on assignment.
    pub fn list<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<PropertyValue>,
    {
        FieldValue::Items(
            values
                .into_iter()
                .map(|v| FieldItem::from([(MAIN_PLACEHOLDER.to_string(), v.into())]))
                .collect(),
        )
    }

    /// Resolves the value into items of `field`.
    pub(crate) fn into_items(self, field: &FieldStorageDefinition) -> CoreResult<Vec<FieldItem>> {
        let main = || {
            field.main_property_name().ok_or_else(|| {
                CoreError::invalid_value(
                    &field.name,
                    "field has no main property; assign items instead",
                )
            })
        };
        match self {
            FieldValue::Scalar(PropertyValue::Null) => Ok(Vec::new()),
            FieldValue::Scalar(v) => Ok(vec![FieldItem::from([(main()?.to_string(), v)])]),
            FieldValue::Items(items) => items
                .into_iter()
                .map(|mut item| {
                    if let Some(v) = item.remove(MAIN_PLACEHOLDER) {
                        item.insert(main()?.to_string(), v);
                    }
                    Ok(item)
                })
                .collect(),
        }
    }
}

/// Marks values given by [`FieldValue::list`] until the main property is known.
const MAIN_PLACEHOLDER: &str = "\u{0}main";

impl From<PropertyValue> for FieldValue {
    fn from(v: PropertyValue) -> Self {
        FieldValue::Scalar(v)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Scalar(s.into())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Scalar(s.into())
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        FieldValue::Scalar(n.into())
    }
}

impl From<i32> for FieldValue {
    fn from(n: i32) -> Self {
        FieldValue::Scalar(n.into())
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Scalar(b.into())
    }
}

impl From<f64> for FieldValue {
    fn from(x: f64) -> Self {
        FieldValue::Scalar(x.into())
    }
}

impl From<Vec<FieldItem>> for FieldValue {
    fn from(items: Vec<FieldItem>) -> Self {
        FieldValue::Items(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_targets_main_property() {
        let field = FieldStorageDefinition::entity_reference("node", "owner");
        let items = FieldValue::from(7).into_items(&field).unwrap();
        assert_eq!(items[0]["target_id"], PropertyValue::Integer(7));
    }

    #[test]
    fn null_scalar_clears() {
        let field = FieldStorageDefinition::string("node", "title", 8);
        let items = FieldValue::Scalar(PropertyValue::Null)
            .into_items(&field)
            .unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn list_resolves_against_main_property() {
        let field = FieldStorageDefinition::entity_reference("node", "refs");
        let items = FieldValue::list([1_i64, 2]).into_items(&field).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1]["target_id"], PropertyValue::Integer(2));
    }
}
