//! In-memory relational backend for testing and ephemeral stores.

use crate::backend::RelationalBackend;
use crate::error::{StorageError, StorageResult};
use crate::query::{Condition, Row, Select};
use crate::schema::{ColumnSpec, ColumnType, TableSchema};
use crate::value::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::debug;

static NULL: Value = Value::Null;

#[derive(Debug, Clone)]
struct MemTable {
    schema: TableSchema,
    rows: Vec<Row>,
    next_serial: i64,
}

impl MemTable {
    fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            rows: Vec::new(),
            next_serial: 1,
        }
    }
}

/// An in-memory relational backend.
///
/// Every transaction scope snapshots the full table set, so nested
/// rollbacks are exact. Schema changes are transactional unless the
/// backend was built with [`InMemoryBackend::without_transactional_ddl`],
/// in which case a rollback only restores the rows of tables whose schema
/// is unchanged.
///
/// # Example
///
/// ```rust
/// use entirel_storage::{
///     ColumnSpec, ColumnType, InMemoryBackend, RelationalBackend, Row, Select, TableSchema,
/// };
///
/// let mut backend = InMemoryBackend::new();
/// let schema = TableSchema::new("node")
///     .column(ColumnSpec::new("nid", ColumnType::Serial).not_null())
///     .column(ColumnSpec::new("title", ColumnType::Varchar(255)))
///     .primary_key(["nid"]);
/// backend.create_table(&schema).unwrap();
///
/// let mut row = Row::new();
/// row.insert("title".into(), "Hello".into());
/// assert_eq!(backend.insert("node", row).unwrap(), Some(1));
/// assert_eq!(backend.select(&Select::from("node")).unwrap().len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    tables: BTreeMap<String, MemTable>,
    snapshots: Vec<BTreeMap<String, MemTable>>,
    non_transactional_ddl: bool,
}

impl InMemoryBackend {
    /// Creates an empty backend with transactional DDL.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty backend whose schema changes survive rollback.
    #[must_use]
    pub fn without_transactional_ddl() -> Self {
        Self {
            non_transactional_ddl: true,
            ..Self::default()
        }
    }

    fn table(&self, name: &str) -> StorageResult<&MemTable> {
        self.tables
            .get(name)
            .ok_or_else(|| StorageError::TableNotFound(name.to_string()))
    }

    fn table_mut(&mut self, name: &str) -> StorageResult<&mut MemTable> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| StorageError::TableNotFound(name.to_string()))
    }

    fn restore(&mut self, snapshot: BTreeMap<String, MemTable>) {
        if !self.non_transactional_ddl {
            self.tables = snapshot;
            return;
        }
        for (name, table) in &mut self.tables {
            if let Some(old) = snapshot.get(name) {
                if old.schema == table.schema {
                    table.rows.clone_from(&old.rows);
                    table.next_serial = old.next_serial;
                }
            }
        }
    }
}

fn cell<'a>(row: &'a Row, column: &str) -> &'a Value {
    row.get(column).unwrap_or(&NULL)
}

fn check_value(table: &str, column: &ColumnSpec, value: &Value) -> StorageResult<()> {
    if value.is_null() {
        if column.not_null {
            return Err(StorageError::constraint(
                table,
                format!("column '{}' may not be NULL", column.name),
            ));
        }
        return Ok(());
    }
    if !column.column_type.accepts(value) {
        return Err(StorageError::TypeMismatch {
            table: table.to_string(),
            column: column.name.clone(),
            expected: column.column_type.to_string(),
            actual: value.type_name().to_string(),
        });
    }
    Ok(())
}

fn check_keys(
    schema: &TableSchema,
    rows: &[Row],
    candidate: &Row,
    skip: Option<usize>,
) -> StorageResult<()> {
    let keys = std::iter::once(("PRIMARY", &schema.primary_key)).chain(
        schema
            .unique_keys
            .iter()
            .map(|(name, cols)| (name.as_str(), cols)),
    );
    for (key_name, columns) in keys {
        if columns.is_empty() || columns.iter().any(|c| cell(candidate, c).is_null()) {
            continue;
        }
        let duplicate = rows.iter().enumerate().any(|(i, row)| {
            Some(i) != skip && columns.iter().all(|c| cell(row, c) == cell(candidate, c))
        });
        if duplicate {
            let entry: Vec<String> = columns
                .iter()
                .map(|c| cell(candidate, c).to_string())
                .collect();
            return Err(StorageError::constraint(
                &schema.name,
                format!("duplicate entry ({}) for key '{key_name}'", entry.join(", ")),
            ));
        }
    }
    Ok(())
}

fn check_columns_exist<'a, I>(schema: &TableSchema, columns: I) -> StorageResult<()>
where
    I: IntoIterator<Item = &'a String>,
{
    for column in columns {
        if !schema.has_column(column) {
            return Err(StorageError::column_not_found(&schema.name, column));
        }
    }
    Ok(())
}

impl RelationalBackend for InMemoryBackend {
    fn table_exists(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    fn table_names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    fn table_schema(&self, table: &str) -> StorageResult<TableSchema> {
        Ok(self.table(table)?.schema.clone())
    }

    fn create_table(&mut self, schema: &TableSchema) -> StorageResult<()> {
        if self.tables.contains_key(&schema.name) {
            return Err(StorageError::TableExists(schema.name.clone()));
        }
        check_columns_exist(schema, &schema.primary_key)?;
        for columns in schema.unique_keys.values().chain(schema.indexes.values()) {
            check_columns_exist(schema, columns)?;
        }
        let serials = schema
            .columns
            .iter()
            .filter(|c| c.column_type == ColumnType::Serial)
            .count();
        if serials > 1 {
            return Err(StorageError::constraint(
                &schema.name,
                "a table may declare at most one serial column",
            ));
        }
        debug!(table = %schema.name, columns = schema.columns.len(), "creating table");
        self.tables
            .insert(schema.name.clone(), MemTable::new(schema.clone()));
        Ok(())
    }

    fn drop_table(&mut self, table: &str) -> StorageResult<()> {
        debug!(table, "dropping table");
        self.tables
            .remove(table)
            .map(|_| ())
            .ok_or_else(|| StorageError::TableNotFound(table.to_string()))
    }

    fn rename_table(&mut self, from: &str, to: &str) -> StorageResult<()> {
        if self.tables.contains_key(to) {
            return Err(StorageError::TableExists(to.to_string()));
        }
        let mut table = self
            .tables
            .remove(from)
            .ok_or_else(|| StorageError::TableNotFound(from.to_string()))?;
        debug!(from, to, "renaming table");
        table.schema.name = to.to_string();
        self.tables.insert(to.to_string(), table);
        Ok(())
    }

    fn index_exists(&self, table: &str, index: &str) -> bool {
        self.tables
            .get(table)
            .is_some_and(|t| t.schema.indexes.contains_key(index))
    }

    fn add_index(&mut self, table: &str, index: &str, columns: &[String]) -> StorageResult<()> {
        let t = self.table_mut(table)?;
        if t.schema.indexes.contains_key(index) {
            return Err(StorageError::IndexExists {
                table: table.to_string(),
                index: index.to_string(),
            });
        }
        check_columns_exist(&t.schema, columns)?;
        t.schema.indexes.insert(index.to_string(), columns.to_vec());
        Ok(())
    }

    fn drop_index(&mut self, table: &str, index: &str) -> StorageResult<()> {
        let t = self.table_mut(table)?;
        t.schema
            .indexes
            .remove(index)
            .map(|_| ())
            .ok_or_else(|| StorageError::IndexNotFound {
                table: table.to_string(),
                index: index.to_string(),
            })
    }

    fn supports_transactional_ddl(&self) -> bool {
        !self.non_transactional_ddl
    }

    fn select(&self, query: &Select) -> StorageResult<Vec<Row>> {
        let primary = self.table(&query.table)?;
        let joined = match &query.join {
            Some(join) => {
                let right = self.table(&join.table)?;
                check_columns_exist(&primary.schema, [&join.left_column])?;
                check_columns_exist(&right.schema, [&join.right_column])?;
                Some((join, right))
            }
            None => None,
        };

        let known = |column: &str| -> bool {
            if primary.schema.has_column(column) {
                return true;
            }
            joined.is_some_and(|(join, right)| {
                column
                    .strip_prefix(&join.alias)
                    .and_then(|rest| rest.strip_prefix('.'))
                    .is_some_and(|c| right.schema.has_column(c))
            })
        };
        let referenced = query
            .conditions
            .iter()
            .map(Condition::column)
            .chain(query.order_by.iter().map(String::as_str))
            .chain(query.columns.iter().flatten().map(String::as_str));
        for column in referenced {
            if !known(column) {
                return Err(StorageError::column_not_found(&query.table, column));
            }
        }

        let mut rows: Vec<Row> = Vec::new();
        for row in &primary.rows {
            match joined {
                None => rows.push(row.clone()),
                Some((join, right)) => {
                    let left = cell(row, &join.left_column);
                    if left.is_null() {
                        continue;
                    }
                    for other in right.rows.iter().filter(|r| cell(r, &join.right_column) == left) {
                        let mut merged = row.clone();
                        for (k, v) in other {
                            merged.insert(format!("{}.{k}", join.alias), v.clone());
                        }
                        rows.push(merged);
                    }
                }
            }
        }
        rows.retain(|row| query.conditions.iter().all(|c| c.matches(row)));

        if !query.order_by.is_empty() {
            rows.sort_by(|a, b| {
                query
                    .order_by
                    .iter()
                    .map(|c| cell(a, c).compare(cell(b, c)))
                    .find(|o| *o != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            });
        }

        if let Some(columns) = &query.columns {
            rows = rows
                .into_iter()
                .map(|row| {
                    columns
                        .iter()
                        .map(|c| (c.clone(), cell(&row, c).clone()))
                        .collect()
                })
                .collect();
        }

        if query.distinct {
            let mut unique: Vec<Row> = Vec::with_capacity(rows.len());
            for row in rows {
                if !unique.contains(&row) {
                    unique.push(row);
                }
            }
            rows = unique;
        }

        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    fn insert(&mut self, table: &str, mut row: Row) -> StorageResult<Option<i64>> {
        let t = self.table_mut(table)?;
        check_columns_exist(&t.schema, row.keys())?;

        let mut full = Row::new();
        let mut assigned = None;
        for column in &t.schema.columns {
            let mut value = match row.remove(&column.name) {
                Some(v) => v,
                None => column.default.clone().unwrap_or(Value::Null),
            };
            if column.column_type == ColumnType::Serial {
                if value.is_null() {
                    value = Value::Integer(t.next_serial);
                }
                assigned = value.as_integer();
            }
            check_value(table, column, &value)?;
            full.insert(column.name.clone(), value);
        }
        check_keys(&t.schema, &t.rows, &full, None)?;

        if let Some(n) = assigned {
            t.next_serial = t.next_serial.max(n + 1);
        }
        t.rows.push(full);
        Ok(assigned)
    }

    fn update(
        &mut self,
        table: &str,
        conditions: &[Condition],
        values: &Row,
    ) -> StorageResult<usize> {
        let t = self.table_mut(table)?;
        check_columns_exist(&t.schema, values.keys())?;
        for (name, value) in values {
            if let Some(column) = t.schema.column_spec(name) {
                check_value(table, column, value)?;
            }
        }

        let targets: Vec<usize> = t
            .rows
            .iter()
            .enumerate()
            .filter(|(_, row)| conditions.iter().all(|c| c.matches(row)))
            .map(|(i, _)| i)
            .collect();
        for &i in &targets {
            let mut updated = t.rows[i].clone();
            for (name, value) in values {
                updated.insert(name.clone(), value.clone());
            }
            check_keys(&t.schema, &t.rows, &updated, Some(i))?;
            if let Some(serial) = t.schema.serial_column() {
                if let Some(n) = cell(&updated, &serial.name).as_integer() {
                    t.next_serial = t.next_serial.max(n + 1);
                }
            }
            t.rows[i] = updated;
        }
        Ok(targets.len())
    }

    fn delete(&mut self, table: &str, conditions: &[Condition]) -> StorageResult<usize> {
        let t = self.table_mut(table)?;
        let before = t.rows.len();
        t.rows
            .retain(|row| !conditions.iter().all(|c| c.matches(row)));
        Ok(before - t.rows.len())
    }

    fn begin(&mut self) -> StorageResult<()> {
        self.snapshots.push(self.tables.clone());
        Ok(())
    }

    fn commit(&mut self) -> StorageResult<()> {
        self.snapshots
            .pop()
            .map(|_| ())
            .ok_or(StorageError::NoActiveTransaction)
    }

    fn rollback(&mut self) -> StorageResult<()> {
        let snapshot = self
            .snapshots
            .pop()
            .ok_or(StorageError::NoActiveTransaction)?;
        self.restore(snapshot);
        Ok(())
    }

    fn transaction_depth(&self) -> usize {
        self.snapshots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Join;

    fn node_schema() -> TableSchema {
        TableSchema::new("node")
            .column(ColumnSpec::new("nid", ColumnType::Serial).not_null())
            .column(ColumnSpec::new("vid", ColumnType::Integer))
            .column(ColumnSpec::new("uuid", ColumnType::Varchar(128)).not_null())
            .column(
                ColumnSpec::new("status", ColumnType::Boolean)
                    .not_null()
                    .default_value(1_i64),
            )
            .primary_key(["nid"])
            .unique_key("node_field__uuid", ["uuid"])
    }

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    fn backend() -> InMemoryBackend {
        let mut backend = InMemoryBackend::new();
        backend.create_table(&node_schema()).unwrap();
        backend
    }

    #[test]
    fn memory_insert_assigns_serial_and_defaults() {
        let mut b = backend();
        let id = b.insert("node", row(&[("uuid", "a".into())])).unwrap();
        assert_eq!(id, Some(1));
        let rows = b.select(&Select::from("node")).unwrap();
        assert_eq!(rows[0]["status"], Value::Integer(1));
        assert_eq!(rows[0]["vid"], Value::Null);
    }

    #[test]
    fn memory_explicit_serial_advances_counter() {
        let mut b = backend();
        b.insert("node", row(&[("nid", 10_i64.into()), ("uuid", "a".into())]))
            .unwrap();
        let next = b.insert("node", row(&[("uuid", "b".into())])).unwrap();
        assert_eq!(next, Some(11));
    }

    #[test]
    fn memory_rejects_duplicate_unique_key() {
        let mut b = backend();
        b.insert("node", row(&[("uuid", "a".into())])).unwrap();
        let err = b.insert("node", row(&[("uuid", "a".into())])).unwrap_err();
        assert!(matches!(err, StorageError::ConstraintViolation { .. }));
    }

    #[test]
    fn memory_rejects_null_in_not_null_column() {
        let mut b = backend();
        let err = b.insert("node", Row::new()).unwrap_err();
        assert!(matches!(err, StorageError::ConstraintViolation { .. }));
    }

    #[test]
    fn memory_rejects_type_mismatch() {
        let mut b = backend();
        let err = b
            .insert("node", row(&[("uuid", "a".into()), ("vid", "x".into())]))
            .unwrap_err();
        assert!(matches!(err, StorageError::TypeMismatch { .. }));
    }

    #[test]
    fn memory_rejects_unknown_column() {
        let mut b = backend();
        let err = b
            .insert("node", row(&[("uuid", "a".into()), ("nope", 1_i64.into())]))
            .unwrap_err();
        assert!(matches!(err, StorageError::ColumnNotFound { .. }));
    }

    #[test]
    fn memory_update_and_delete_count_rows() {
        let mut b = backend();
        b.insert("node", row(&[("uuid", "a".into())])).unwrap();
        b.insert("node", row(&[("uuid", "b".into())])).unwrap();
        let changed = b
            .update("node", &[], &row(&[("vid", 7_i64.into())]))
            .unwrap();
        assert_eq!(changed, 2);
        let removed = b.delete("node", &[Condition::eq("uuid", "a")]).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(b.count("node", &[]).unwrap(), 1);
    }

    #[test]
    fn memory_select_orders_projects_and_limits() {
        let mut b = backend();
        for uuid in ["c", "a", "b"] {
            b.insert("node", row(&[("uuid", uuid.into())])).unwrap();
        }
        let rows = b
            .select(&Select::from("node").order_by("uuid").columns(["uuid"]).limit(2))
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].len(), 1);
        assert_eq!(rows[0]["uuid"], Value::Text("a".into()));
        assert_eq!(rows[1]["uuid"], Value::Text("b".into()));
    }

    #[test]
    fn memory_join_prefixes_joined_columns() {
        let mut b = backend();
        let rev = TableSchema::new("node_revision")
            .column(ColumnSpec::new("nid", ColumnType::Integer).not_null())
            .column(ColumnSpec::new("vid", ColumnType::Serial).not_null())
            .primary_key(["vid"]);
        b.create_table(&rev).unwrap();
        b.insert("node", row(&[("uuid", "a".into()), ("vid", 1_i64.into())]))
            .unwrap();
        b.insert("node_revision", row(&[("nid", 1_i64.into())])).unwrap();
        b.insert("node_revision", row(&[("nid", 1_i64.into())])).unwrap();

        let rows = b
            .select(
                &Select::from("node")
                    .join(Join::inner("node_revision", "revision", "vid", "vid"))
                    .filter(Condition::eq("revision.nid", 1_i64)),
            )
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["revision.vid"], Value::Integer(1));
    }

    #[test]
    fn memory_distinct_removes_duplicates() {
        let mut b = backend();
        b.insert("node", row(&[("uuid", "a".into())])).unwrap();
        b.insert("node", row(&[("uuid", "b".into())])).unwrap();
        let rows = b
            .select(&Select::from("node").columns(["status"]).distinct())
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn memory_nested_rollback_restores_inner_scope_only() {
        let mut b = backend();
        b.begin().unwrap();
        b.insert("node", row(&[("uuid", "a".into())])).unwrap();
        b.begin().unwrap();
        b.insert("node", row(&[("uuid", "b".into())])).unwrap();
        b.rollback().unwrap();
        assert_eq!(b.transaction_depth(), 1);
        b.commit().unwrap();
        assert_eq!(b.count("node", &[]).unwrap(), 1);
    }

    #[test]
    fn memory_rollback_reverts_ddl() {
        let mut b = backend();
        b.begin().unwrap();
        b.drop_table("node").unwrap();
        b.rollback().unwrap();
        assert!(b.table_exists("node"));
    }

    #[test]
    fn memory_non_transactional_ddl_survives_rollback() {
        let mut b = InMemoryBackend::without_transactional_ddl();
        assert!(!b.supports_transactional_ddl());
        b.begin().unwrap();
        b.create_table(&node_schema()).unwrap();
        b.rollback().unwrap();
        assert!(b.table_exists("node"));
    }

    #[test]
    fn memory_commit_without_transaction_fails() {
        let mut b = backend();
        assert!(matches!(b.commit(), Err(StorageError::NoActiveTransaction)));
    }

    #[test]
    fn memory_rename_keeps_rows() {
        let mut b = backend();
        b.insert("node", row(&[("uuid", "a".into())])).unwrap();
        b.rename_table("node", "old_node").unwrap();
        assert!(!b.table_exists("node"));
        assert_eq!(b.count("old_node", &[]).unwrap(), 1);
        assert_eq!(b.table_schema("old_node").unwrap().name, "old_node");
    }

    #[test]
    fn memory_index_lifecycle() {
        let mut b = backend();
        b.add_index("node", "vid", &["vid".to_string()]).unwrap();
        assert!(b.index_exists("node", "vid"));
        assert!(b.add_index("node", "vid", &["vid".to_string()]).is_err());
        b.drop_index("node", "vid").unwrap();
        assert!(!b.index_exists("node", "vid"));
    }
}
