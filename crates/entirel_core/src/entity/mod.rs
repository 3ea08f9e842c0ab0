//! In-memory content entities.
//!
//! An entity is a tree of `field -> language -> items -> property -> value`.
//! Values of the default language live under [`LANGCODE_DEFAULT`]; every
//! other language is keyed by its own code. Non-translatable fields only
//! ever hold values under [`LANGCODE_DEFAULT`] and are shared by every
//! translation.
//!
//! Assignments are validated against the field storage definitions, so a
//! stored entity never carries unknown fields, unknown properties or more
//! items than the field allows.

mod value;

pub use value::{FieldItem, FieldValue};

use crate::definition::{EntityDefinition, FieldStorageDefinition};
use crate::error::{CoreError, CoreResult};
use crate::types::{EntityId, RevisionId, LANGCODE_DEFAULT, LANGCODE_NOT_SPECIFIED};
use entirel_codec::Value as PropertyValue;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

type LanguageValues = BTreeMap<String, Vec<FieldItem>>;

/// A content entity of one entity type.
#[derive(Clone)]
pub struct Entity {
    definition: Arc<EntityDefinition>,
    values: BTreeMap<String, LanguageValues>,
    langcode: String,
    translations: BTreeSet<String>,
    is_new: bool,
    new_revision: bool,
    default_revision: bool,
}

impl Entity {
    /// Creates an empty, new entity.
    #[must_use]
    pub fn new(definition: Arc<EntityDefinition>) -> Self {
        let new_revision = definition.entity_type().revisionable;
        Self {
            definition,
            values: BTreeMap::new(),
            langcode: LANGCODE_NOT_SPECIFIED.to_string(),
            translations: BTreeSet::new(),
            is_new: true,
            new_revision,
            default_revision: true,
        }
    }

    /// Creates an empty entity as read from storage.
    pub(crate) fn loaded(definition: Arc<EntityDefinition>, default_revision: bool) -> Self {
        let mut entity = Self::new(definition);
        entity.is_new = false;
        entity.new_revision = false;
        entity.default_revision = default_revision;
        entity
    }

    /// The definition the entity was built against.
    #[must_use]
    pub fn definition(&self) -> &Arc<EntityDefinition> {
        &self.definition
    }

    /// The entity type identifier.
    #[must_use]
    pub fn entity_type_id(&self) -> &str {
        self.definition.entity_type_id()
    }

    fn field_definition(&self, field: &str) -> CoreResult<&FieldStorageDefinition> {
        self.definition
            .field(field)
            .ok_or_else(|| CoreError::unknown_field(self.entity_type_id(), field))
    }

    fn is_langcode_key(&self, field: &str) -> bool {
        self.definition.entity_type().keys.langcode.as_deref() == Some(field)
    }

    /// Assigns a field in the default language.
    ///
    /// Assigning the language code key changes the default language.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownField`] for undefined fields and
    /// [`CoreError::InvalidFieldValue`] if the value does not fit the
    /// field's properties or cardinality.
    pub fn set(&mut self, field: &str, value: impl Into<FieldValue>) -> CoreResult<&mut Self> {
        if self.is_langcode_key(field) {
            let value: FieldValue = value.into();
            let items = value.into_items(self.field_definition(field)?)?;
            let langcode = items
                .first()
                .and_then(|item| item.get("value"))
                .and_then(PropertyValue::as_text)
                .ok_or_else(|| CoreError::invalid_value(field, "language code must be text"))?
                .to_string();
            self.set_language(langcode)?;
            return Ok(self);
        }
        let items = self.validated_items(field, value.into())?;
        self.put_items(field, LANGCODE_DEFAULT, items);
        Ok(self)
    }

    /// Assigns a translatable field in one translation.
    ///
    /// Targeting the default language is the same as [`Entity::set`].
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownTranslation`] if the translation does not
    /// exist and [`CoreError::InvalidFieldValue`] if the field is not
    /// translatable or the value does not fit.
    pub fn set_translation(
        &mut self,
        langcode: &str,
        field: &str,
        value: impl Into<FieldValue>,
    ) -> CoreResult<&mut Self> {
        if langcode == self.langcode || langcode == LANGCODE_DEFAULT {
            return self.set(field, value);
        }
        if !self.translations.contains(langcode) {
            return Err(CoreError::UnknownTranslation {
                langcode: langcode.to_string(),
            });
        }
        if !self.field_definition(field)?.translatable || self.is_langcode_key(field) {
            return Err(CoreError::invalid_value(field, "field is not translatable"));
        }
        let items = self.validated_items(field, value.into())?;
        self.put_items(field, langcode, items);
        Ok(self)
    }

    fn validated_items(&self, field: &str, value: FieldValue) -> CoreResult<Vec<FieldItem>> {
        let definition = self.field_definition(field)?;
        let items = value.into_items(definition)?;
        if let Some(limit) = definition.cardinality.limit() {
            if items.len() > limit {
                return Err(CoreError::invalid_value(
                    field,
                    format!("{} items exceed cardinality {limit}", items.len()),
                ));
            }
        }
        for item in &items {
            for (property, value) in item {
                let column = definition.property_column(property).ok_or_else(|| {
                    CoreError::invalid_value(field, format!("unknown property '{property}'"))
                })?;
                if !column.accepts(value) {
                    return Err(CoreError::invalid_value(
                        field,
                        format!(
                            "property '{property}' does not accept {} value",
                            value.type_name()
                        ),
                    ));
                }
            }
        }
        Ok(items)
    }

    /// Items of a field in the default language.
    #[must_use]
    pub fn get(&self, field: &str) -> &[FieldItem] {
        self.items_for(field, LANGCODE_DEFAULT)
    }

    /// Items of a field in a language.
    ///
    /// Non-translatable fields return the default language items.
    #[must_use]
    pub fn get_translation(&self, langcode: &str, field: &str) -> &[FieldItem] {
        let translatable = self
            .definition
            .field(field)
            .is_some_and(|f| f.translatable);
        if langcode == self.langcode || !translatable {
            self.get(field)
        } else {
            self.items_for(field, langcode)
        }
    }

    /// Main property of the first item of a field, in the default language.
    #[must_use]
    pub fn value(&self, field: &str) -> Option<&PropertyValue> {
        self.main_value(field, self.get(field))
    }

    /// Main property of the first item of a field, in a language.
    #[must_use]
    pub fn translation_value(&self, langcode: &str, field: &str) -> Option<&PropertyValue> {
        self.main_value(field, self.get_translation(langcode, field))
    }

    fn main_value<'a>(&self, field: &str, items: &'a [FieldItem]) -> Option<&'a PropertyValue> {
        let main = self.definition.field(field)?.main_property_name()?;
        items.first()?.get(main).filter(|v| !v.is_null())
    }

    fn key_value(&self, key: Option<&str>) -> Option<&PropertyValue> {
        key.and_then(|k| self.value(k))
    }

    /// The entity id, once assigned.
    #[must_use]
    pub fn id(&self) -> Option<EntityId> {
        let key = &self.definition.entity_type().keys.id;
        self.value(key)
            .and_then(EntityId::from_property)
            .filter(|id| !id.is_empty())
    }

    /// Pre-populates the entity id.
    pub fn set_id(&mut self, id: impl Into<EntityId>) {
        let key = self.definition.entity_type().keys.id.clone();
        let value = id.into().to_property();
        self.put_items(&key, LANGCODE_DEFAULT, vec![main_item(value)]);
    }

    /// The revision id of the loaded or last saved revision.
    #[must_use]
    pub fn revision_id(&self) -> Option<RevisionId> {
        let keys = &self.definition.entity_type().keys;
        if !self.definition.entity_type().revisionable {
            return None;
        }
        self.key_value(keys.revision.as_deref())
            .and_then(PropertyValue::as_integer)
            .map(RevisionId::new)
    }

    pub(crate) fn set_revision_id(&mut self, revision_id: Option<RevisionId>) {
        let Some(key) = self.definition.entity_type().keys.revision.clone() else {
            return;
        };
        let items = revision_id
            .map(|r| vec![main_item(PropertyValue::Integer(r.as_i64()))])
            .unwrap_or_default();
        self.put_items(&key, LANGCODE_DEFAULT, items);
    }

    /// The bundle, for bundled entity types.
    #[must_use]
    pub fn bundle(&self) -> Option<&str> {
        let key = self.definition.entity_type().keys.bundle.as_deref();
        self.key_value(key).and_then(PropertyValue::as_text)
    }

    /// The UUID, once assigned.
    #[must_use]
    pub fn uuid(&self) -> Option<&str> {
        let key = self.definition.entity_type().keys.uuid.as_deref();
        self.key_value(key).and_then(PropertyValue::as_text)
    }

    /// The default language code.
    #[must_use]
    pub fn language(&self) -> &str {
        &self.langcode
    }

    /// Changes the default language.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] if the language is already a
    /// translation of the entity.
    pub fn set_language(&mut self, langcode: impl Into<String>) -> CoreResult<()> {
        let langcode = langcode.into();
        if self.translations.contains(&langcode) {
            return Err(CoreError::invalid_operation(format!(
                "'{langcode}' is already a translation"
            )));
        }
        self.langcode = langcode;
        Ok(())
    }

    /// Adds an empty translation.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] if the entity type is not
    /// translatable or the language is already present.
    pub fn add_translation(&mut self, langcode: impl Into<String>) -> CoreResult<&mut Self> {
        let langcode = langcode.into();
        if !self.definition.entity_type().translatable {
            return Err(CoreError::invalid_operation(format!(
                "entity type '{}' is not translatable",
                self.entity_type_id()
            )));
        }
        if self.has_translation(&langcode) || langcode == LANGCODE_DEFAULT {
            return Err(CoreError::invalid_operation(format!(
                "translation '{langcode}' already exists"
            )));
        }
        self.translations.insert(langcode);
        Ok(self)
    }

    /// Removes a translation and its values.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownTranslation`] if it does not exist.
    pub fn remove_translation(&mut self, langcode: &str) -> CoreResult<()> {
        if !self.translations.remove(langcode) {
            return Err(CoreError::UnknownTranslation {
                langcode: langcode.to_string(),
            });
        }
        for languages in self.values.values_mut() {
            languages.remove(langcode);
        }
        Ok(())
    }

    /// Returns true for the default language and existing translations.
    #[must_use]
    pub fn has_translation(&self, langcode: &str) -> bool {
        langcode == self.langcode || self.translations.contains(langcode)
    }

    /// Every language of the entity, default language first.
    #[must_use]
    pub fn translation_languages(&self) -> Vec<&str> {
        std::iter::once(self.langcode.as_str())
            .chain(self.translations.iter().map(String::as_str))
            .collect()
    }

    /// Returns true until the entity is first saved.
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub(crate) fn mark_saved(&mut self) {
        self.is_new = false;
        self.new_revision = false;
    }

    /// Requests a new revision on the next save.
    pub fn set_new_revision(&mut self, value: bool) {
        self.new_revision = value;
    }

    /// Returns true if the next save creates a revision.
    #[must_use]
    pub fn is_new_revision(&self) -> bool {
        self.new_revision
    }

    /// Marks whether this object represents the default revision.
    pub fn set_default_revision(&mut self, value: bool) {
        self.default_revision = value;
    }

    /// Returns true if this object represents the default revision.
    #[must_use]
    pub fn is_default_revision(&self) -> bool {
        self.default_revision
    }

    /// Items stored under a language key, without fallback.
    pub(crate) fn items_for(&self, field: &str, langkey: &str) -> &[FieldItem] {
        self.values
            .get(field)
            .and_then(|languages| languages.get(langkey))
            .map_or(&[], Vec::as_slice)
    }

    /// Stores items under a language key, without validation.
    pub(crate) fn put_items(&mut self, field: &str, langkey: &str, items: Vec<FieldItem>) {
        let languages = self.values.entry(field.to_string()).or_default();
        if items.is_empty() {
            languages.remove(langkey);
        } else {
            languages.insert(langkey.to_string(), items);
        }
        if languages.is_empty() {
            self.values.remove(field);
        }
    }

    /// Registers a translation read from storage.
    pub(crate) fn insert_translation(&mut self, langcode: &str) {
        if langcode != self.langcode {
            self.translations.insert(langcode.to_string());
        }
    }

    /// Fields with at least one value, sorted.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

fn main_item(value: PropertyValue) -> FieldItem {
    FieldItem::from([("value".to_string(), value)])
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.entity_type_id() == other.entity_type_id()
            && self.values == other.values
            && self.langcode == other.langcode
            && self.translations == other.translations
            && self.default_revision == other.default_revision
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("entity_type", &self.entity_type_id())
            .field("langcode", &self.langcode)
            .field("translations", &self.translations)
            .field("values", &self.values)
            .field("is_new", &self.is_new)
            .field("default_revision", &self.default_revision)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{Cardinality, EntityType};

    fn article() -> Arc<EntityDefinition> {
        let definition = EntityDefinition::with_fields(
            EntityType::content("article").revisionable(true).translatable(true),
            [
                FieldStorageDefinition::string("article", "title", 16)
                    .revisionable(true)
                    .translatable(true),
                FieldStorageDefinition::integer("article", "priority"),
                FieldStorageDefinition::string("article", "tags", 16)
                    .cardinality(Cardinality::Limited(3))
                    .dedicated(),
            ],
        )
        .unwrap();
        Arc::new(definition)
    }

    #[test]
    fn set_validates_field_and_property() {
        let mut entity = Entity::new(article());
        entity.set("title", "Hello").unwrap();
        assert_eq!(entity.value("title"), Some(&PropertyValue::from("Hello")));

        assert!(matches!(
            entity.set("nope", 1),
            Err(CoreError::UnknownField { .. })
        ));
        assert!(matches!(
            entity.set("priority", "high"),
            Err(CoreError::InvalidFieldValue { .. })
        ));
        assert!(entity.set("title", "x".repeat(17)).is_err());
    }

    #[test]
    fn cardinality_is_enforced_on_assignment() {
        let mut entity = Entity::new(article());
        entity.set("tags", FieldValue::list(["a", "b", "c"])).unwrap();
        assert_eq!(entity.get("tags").len(), 3);
        assert!(entity.set("tags", FieldValue::list(["a", "b", "c", "d"])).is_err());
    }

    #[test]
    fn translations_hold_only_translatable_fields() {
        let mut entity = Entity::new(article());
        entity.set_language("en").unwrap();
        entity.set("priority", 5).unwrap();
        entity.add_translation("fr").unwrap();
        entity.set_translation("fr", "title", "Bonjour").unwrap();

        assert!(matches!(
            entity.set_translation("fr", "priority", 6),
            Err(CoreError::InvalidFieldValue { .. })
        ));
        assert!(matches!(
            entity.set_translation("de", "title", "Hallo"),
            Err(CoreError::UnknownTranslation { .. })
        ));
        assert_eq!(
            entity.translation_value("fr", "priority"),
            Some(&PropertyValue::Integer(5))
        );
        assert_eq!(entity.translation_languages(), vec!["en", "fr"]);
    }

    #[test]
    fn removing_a_translation_drops_its_values() {
        let mut entity = Entity::new(article());
        entity.set_language("en").unwrap();
        entity.add_translation("fr").unwrap();
        entity.set_translation("fr", "title", "Bonjour").unwrap();
        entity.remove_translation("fr").unwrap();
        assert!(!entity.has_translation("fr"));
        assert!(entity.items_for("title", "fr").is_empty());
    }

    #[test]
    fn langcode_key_assignment_changes_language() {
        let mut entity = Entity::new(article());
        entity.set("langcode", "de").unwrap();
        assert_eq!(entity.language(), "de");
        assert!(entity.get("langcode").is_empty());
    }

    #[test]
    fn empty_id_reads_as_unassigned() {
        let mut entity = Entity::new(article());
        assert_eq!(entity.id(), None);
        entity.set_id(0_i64);
        assert_eq!(entity.id(), None);
        entity.set_id(4_i64);
        assert_eq!(entity.id(), Some(EntityId::Integer(4)));
    }

    #[test]
    fn plain_types_refuse_translations() {
        let plain = Arc::new(EntityDefinition::new(EntityType::content("user")).unwrap());
        assert!(Entity::new(plain).add_translation("fr").is_err());
    }
}
