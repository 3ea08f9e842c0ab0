//! Dedicated field storage changes on a populated article table set.

use entirel_core::{
    Cardinality, CoreError, FieldStorageDefinition, FieldValue, PropertyColumn, PropertyValue,
    TableLayout,
};
use entirel_storage::{ColumnType, Condition};
use entirel_testkit::prelude::*;

fn subtitle() -> FieldStorageDefinition {
    FieldStorageDefinition::string("article", "subtitle", 128)
        .cardinality(Cardinality::Limited(2))
        .revisionable(true)
        .translatable(true)
        .dedicated()
}

fn save_with_subtitle(harness: &TestStorage, bundle: &str, values: &[&str]) {
    let mut article = harness.create(Some(bundle)).unwrap();
    article.set_language("en").unwrap();
    article.set("title", "Hello").unwrap();
    article
        .set("subtitle", FieldValue::list(values.iter().copied()))
        .unwrap();
    harness.save(&mut article).unwrap();
}

#[test]
fn created_field_stores_and_loads_values() {
    let harness = TestStorage::article(TableLayout::RevisionableTranslatable);
    harness.on_field_storage_create(subtitle()).unwrap();
    assert!(harness.table_exists("article__subtitle"));
    assert!(harness.table_exists("article_revision__subtitle"));

    save_with_subtitle(&harness, "news", &["first", "second"]);
    let loaded = harness.load(1_i64).unwrap().unwrap();
    let values: Vec<_> = loaded
        .get("subtitle")
        .iter()
        .map(|item| item["value"].clone())
        .collect();
    assert_eq!(
        values,
        vec![PropertyValue::from("first"), PropertyValue::from("second")]
    );

    let field = harness.definition().unwrap().field("subtitle").unwrap().clone();
    assert_eq!(harness.count_field_data(&field).unwrap(), 1);
}

#[test]
fn index_changes_apply_with_data() {
    let harness = TestStorage::article(TableLayout::Revisionable);
    harness.on_field_storage_create(subtitle()).unwrap();
    save_with_subtitle(&harness, "news", &["first"]);

    let original = harness.definition().unwrap().field("subtitle").unwrap().clone();
    let indexed = original.clone().index("value", ["value"]);
    harness.on_field_storage_update(&original, indexed.clone()).unwrap();
    harness.connection.read(|backend| {
        assert!(backend.index_exists("article__subtitle", "subtitle_value"));
        assert!(backend.index_exists("article_revision__subtitle", "subtitle_value"));
    });

    harness.on_field_storage_update(&indexed, original).unwrap();
    harness.connection.read(|backend| {
        assert!(!backend.index_exists("article__subtitle", "subtitle_value"));
        assert!(backend.index_exists("article__subtitle", "bundle"));
    });
    assert_eq!(harness.count_rows("article__subtitle"), 1);
}

#[test]
fn column_changes_need_empty_tables() {
    let harness = TestStorage::article(TableLayout::Translatable);
    harness.on_field_storage_create(subtitle()).unwrap();
    let original = harness.definition().unwrap().field("subtitle").unwrap().clone();
    let mut changed = original.clone();
    changed
        .columns
        .push(PropertyColumn::new("format", ColumnType::Varchar(32)));
    changed.main_property = Some("value".to_string());

    save_with_subtitle(&harness, "news", &["first"]);
    let err = harness
        .on_field_storage_update(&original, changed.clone())
        .unwrap_err();
    assert!(matches!(err, CoreError::SchemaUpdateForbidden { .. }));

    let article = harness.load(1_i64).unwrap().unwrap();
    harness.delete(&[article]).unwrap();
    harness.on_field_storage_update(&original, changed).unwrap();
    let schema = harness
        .connection
        .read(|backend| backend.table_schema("article__subtitle"))
        .unwrap();
    assert!(schema.has_column("subtitle_format"));
}

#[test]
fn shared_fields_cannot_change_at_runtime() {
    let harness = TestStorage::article(TableLayout::Plain);
    let title = harness.definition().unwrap().field("title").unwrap().clone();
    let mut longer = title.clone();
    longer.columns[0].column_type = ColumnType::Varchar(512);

    let err = harness.on_field_storage_update(&title, longer).unwrap_err();
    assert!(matches!(err, CoreError::InvalidOperation { .. }));
    let err = harness.on_field_storage_delete("title").unwrap_err();
    assert!(matches!(err, CoreError::InvalidOperation { .. }));
    let err = harness.on_field_storage_delete("missing").unwrap_err();
    assert!(matches!(err, CoreError::UnknownField { .. }));
}

#[test]
fn deleted_field_is_archived_then_purged() {
    let harness = TestStorage::article(TableLayout::RevisionableTranslatable);
    harness.on_field_storage_create(subtitle()).unwrap();
    for _ in 0..3 {
        save_with_subtitle(&harness, "news", &["one", "two"]);
    }

    harness.on_field_storage_delete("subtitle").unwrap();
    let definition = harness.definition().unwrap();
    assert!(definition.field("subtitle").is_none());
    let deleted = definition.deleted_fields()[0].clone();
    assert!(deleted.deleted);

    let mapping = harness.table_mapping().unwrap();
    let archived = mapping.dedicated_data_table_name(&deleted);
    assert!(archived.starts_with("field_deleted_data_"));
    assert!(!harness.table_exists("article__subtitle"));
    assert_eq!(harness.count_rows(&archived), 6);
    assert!(harness
        .rows_where(&archived, &[Condition::eq("deleted", 0_i64)])
        .is_empty());
    assert_eq!(harness.count_field_data(&deleted).unwrap(), 3);

    // Entities load without the deleted field.
    let loaded = harness.load(1_i64).unwrap().unwrap();
    assert!(loaded.get("subtitle").is_empty());
    assert_eq!(
        loaded.value("title").and_then(PropertyValue::as_text),
        Some("Hello")
    );

    assert_eq!(harness.purge_field_data(2).unwrap(), 2);
    assert_eq!(harness.count_field_data(&deleted).unwrap(), 1);
    assert_eq!(harness.purge_deleted_fields().unwrap(), 1);
    assert!(!harness.table_exists(&archived));
    assert!(harness.definition().unwrap().deleted_fields().is_empty());
}

#[test]
fn finalize_requires_a_purged_deleted_field() {
    let harness = TestStorage::article(TableLayout::Plain);
    harness.on_field_storage_create(subtitle()).unwrap();
    save_with_subtitle(&harness, "news", &["one"]);

    let live = harness.definition().unwrap().field("subtitle").unwrap().uuid;
    let err = harness.finalize_purge(live).unwrap_err();
    assert!(matches!(err, CoreError::InvalidOperation { .. }));

    harness.on_field_storage_delete("subtitle").unwrap();
    let err = harness.finalize_purge(live).unwrap_err();
    assert!(matches!(err, CoreError::InvalidOperation { .. }));

    while harness.purge_field_data(1).unwrap() > 0 {}
    harness.finalize_purge(live).unwrap();
    assert!(harness.definition().unwrap().deleted_field(live).is_none());
}

#[test]
fn empty_field_is_dropped_on_delete() {
    let harness = TestStorage::article(TableLayout::Translatable);
    let before = harness.table_names().len();
    harness.on_field_storage_create(subtitle()).unwrap();
    assert_eq!(harness.table_names().len(), before + 2);

    harness.on_field_storage_delete("subtitle").unwrap();
    assert_eq!(harness.table_names().len(), before);
    assert!(harness.definition().unwrap().deleted_fields().is_empty());
}

#[test]
fn bundle_rename_reaches_every_table() {
    for layout in ALL_LAYOUTS {
        let harness = TestStorage::article(layout);
        let mut renamed = harness.create(Some("news")).unwrap();
        renamed.set("tags", FieldValue::list(["a"])).unwrap();
        harness.save(&mut renamed).unwrap();
        let mut other = harness.create(Some("blog")).unwrap();
        other.set("tags", FieldValue::list(["b"])).unwrap();
        harness.save(&mut other).unwrap();

        assert!(harness.on_bundle_rename("news", "story").unwrap() >= 3);
        let loaded = harness.load(renamed.id().unwrap()).unwrap().unwrap();
        assert_eq!(loaded.bundle(), Some("story"), "layout {layout:?}");
        let loaded = harness.load(other.id().unwrap()).unwrap().unwrap();
        assert_eq!(loaded.bundle(), Some("blog"));

        for table in ["article__tags", "article_revision__tags"] {
            let stale = harness.rows_where(table, &[Condition::eq("bundle", "news")]);
            assert!(stale.is_empty(), "{table} in layout {layout:?}");
            let moved = harness.rows_where(table, &[Condition::eq("bundle", "story")]);
            assert_eq!(moved.len(), 1);
        }
    }
}
