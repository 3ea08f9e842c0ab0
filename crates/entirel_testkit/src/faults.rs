//! Fault injection for rollback tests.
//!
//! [`FaultyBackend`] wraps an [`InMemoryBackend`] and fails the next
//! operation that matches an armed [`Fault`]. The [`FaultHandle`] stays
//! with the test so faults can be armed after the backend has been moved
//! into a connection.

use entirel_storage::{
    Condition, InMemoryBackend, RelationalBackend, Row, Select, StorageError, StorageResult,
    TableSchema,
};
use parking_lot::Mutex;
use std::sync::Arc;

/// Backend operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultOp {
    /// `select`
    Select,
    /// `insert`
    Insert,
    /// `update`
    Update,
    /// `delete`
    Delete,
    /// `create_table`
    CreateTable,
    /// `drop_table`
    DropTable,
    /// `rename_table`
    RenameTable,
    /// `add_index`
    AddIndex,
    /// `drop_index`
    DropIndex,
}

/// A failure waiting for a matching operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    op: FaultOp,
    table: Option<String>,
    skip: usize,
    repeat: bool,
}

impl Fault {
    /// Fails `op` on `table`.
    pub fn on(op: FaultOp, table: impl Into<String>) -> Self {
        Self {
            op,
            table: Some(table.into()),
            skip: 0,
            repeat: false,
        }
    }

    /// Fails `op` on any table.
    pub fn any_table(op: FaultOp) -> Self {
        Self {
            op,
            table: None,
            skip: 0,
            repeat: false,
        }
    }

    /// Lets the first `n` matching operations succeed.
    #[must_use]
    pub fn after(mut self, n: usize) -> Self {
        self.skip = n;
        self
    }

    /// Keeps failing every matching operation until disarmed.
    #[must_use]
    pub fn repeatedly(mut self) -> Self {
        self.repeat = true;
        self
    }

    fn matches(&self, op: FaultOp, table: &str) -> bool {
        self.op == op && self.table.as_deref().map_or(true, |t| t == table)
    }
}

/// Shared control over a [`FaultyBackend`].
#[derive(Debug, Clone, Default)]
pub struct FaultHandle {
    armed: Arc<Mutex<Option<Fault>>>,
    fired: Arc<Mutex<usize>>,
}

impl FaultHandle {
    /// Arms a fault, replacing any armed one.
    pub fn arm(&self, fault: Fault) {
        *self.armed.lock() = Some(fault);
    }

    /// Disarms the pending fault.
    pub fn disarm(&self) {
        *self.armed.lock() = None;
    }

    /// Returns true while a fault is pending.
    pub fn is_armed(&self) -> bool {
        self.armed.lock().is_some()
    }

    /// Number of faults that fired.
    pub fn fired(&self) -> usize {
        *self.fired.lock()
    }

    fn check(&self, op: FaultOp, table: &str) -> StorageResult<()> {
        let mut armed = self.armed.lock();
        let Some(fault) = armed.as_mut() else {
            return Ok(());
        };
        if !fault.matches(op, table) {
            return Ok(());
        }
        if fault.skip > 0 {
            fault.skip -= 1;
            return Ok(());
        }
        if !fault.repeat {
            *armed = None;
        }
        *self.fired.lock() += 1;
        Err(StorageError::injected(format!("{op:?} on '{table}'")))
    }
}

/// An in-memory backend that fails on command.
#[derive(Debug, Default)]
pub struct FaultyBackend {
    inner: InMemoryBackend,
    handle: FaultHandle,
}

impl FaultyBackend {
    /// Wraps a fresh in-memory backend.
    pub fn new() -> Self {
        Self::wrap(InMemoryBackend::new())
    }

    /// Wraps an existing backend.
    pub fn wrap(inner: InMemoryBackend) -> Self {
        Self {
            inner,
            handle: FaultHandle::default(),
        }
    }

    /// A handle for arming faults.
    pub fn handle(&self) -> FaultHandle {
        self.handle.clone()
    }
}

impl RelationalBackend for FaultyBackend {
    fn table_exists(&self, table: &str) -> bool {
        self.inner.table_exists(table)
    }

    fn table_names(&self) -> Vec<String> {
        self.inner.table_names()
    }

    fn table_schema(&self, table: &str) -> StorageResult<TableSchema> {
        self.inner.table_schema(table)
    }

    fn create_table(&mut self, schema: &TableSchema) -> StorageResult<()> {
        self.handle.check(FaultOp::CreateTable, &schema.name)?;
        self.inner.create_table(schema)
    }

    fn drop_table(&mut self, table: &str) -> StorageResult<()> {
        self.handle.check(FaultOp::DropTable, table)?;
        self.inner.drop_table(table)
    }

    fn rename_table(&mut self, from: &str, to: &str) -> StorageResult<()> {
        self.handle.check(FaultOp::RenameTable, from)?;
        self.inner.rename_table(from, to)
    }

    fn index_exists(&self, table: &str, index: &str) -> bool {
        self.inner.index_exists(table, index)
    }

    fn add_index(&mut self, table: &str, index: &str, columns: &[String]) -> StorageResult<()> {
        self.handle.check(FaultOp::AddIndex, table)?;
        self.inner.add_index(table, index, columns)
    }

    fn drop_index(&mut self, table: &str, index: &str) -> StorageResult<()> {
        self.handle.check(FaultOp::DropIndex, table)?;
        self.inner.drop_index(table, index)
    }

    fn supports_transactional_ddl(&self) -> bool {
        self.inner.supports_transactional_ddl()
    }

    fn select(&self, query: &Select) -> StorageResult<Vec<Row>> {
        self.handle.check(FaultOp::Select, &query.table)?;
        self.inner.select(query)
    }

    fn insert(&mut self, table: &str, row: Row) -> StorageResult<Option<i64>> {
        self.handle.check(FaultOp::Insert, table)?;
        self.inner.insert(table, row)
    }

    fn update(
        &mut self,
        table: &str,
        conditions: &[Condition],
        values: &Row,
    ) -> StorageResult<usize> {
        self.handle.check(FaultOp::Update, table)?;
        self.inner.update(table, conditions, values)
    }

    fn delete(&mut self, table: &str, conditions: &[Condition]) -> StorageResult<usize> {
        self.handle.check(FaultOp::Delete, table)?;
        self.inner.delete(table, conditions)
    }

    fn begin(&mut self) -> StorageResult<()> {
        self.inner.begin()
    }

    fn commit(&mut self) -> StorageResult<()> {
        self.inner.commit()
    }

    fn rollback(&mut self) -> StorageResult<()> {
        self.inner.rollback()
    }

    fn transaction_depth(&self) -> usize {
        self.inner.transaction_depth()
    }
}
