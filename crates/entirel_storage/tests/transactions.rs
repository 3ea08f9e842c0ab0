//! Property tests for nested transactions on the in-memory backend.

use entirel_storage::{
    ColumnSpec, ColumnType, InMemoryBackend, RelationalBackend, Select, StorageError, TableSchema,
    Value,
};
use proptest::prelude::*;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy)]
enum Op {
    Insert,
    CreateTable,
    Begin,
    Commit,
    Rollback,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::Insert),
        1 => Just(Op::CreateTable),
        2 => Just(Op::Begin),
        1 => Just(Op::Commit),
        2 => Just(Op::Rollback),
    ]
}

fn table(name: &str) -> TableSchema {
    TableSchema::new(name)
        .column(ColumnSpec::new("id", ColumnType::Serial).not_null())
        .column(ColumnSpec::new("uuid", ColumnType::Varchar(32)).not_null())
        .primary_key(["id"])
}

/// What the backend should hold: rows of `node` and the extra tables.
#[derive(Debug, Clone, Default, PartialEq)]
struct State {
    rows: BTreeSet<String>,
    tables: BTreeSet<String>,
}

fn observed(backend: &InMemoryBackend) -> State {
    let rows = backend
        .select(&Select::from("node").columns(["uuid"]))
        .unwrap()
        .into_iter()
        .map(|row| match &row["uuid"] {
            Value::Text(uuid) => uuid.clone(),
            other => panic!("unexpected uuid {other:?}"),
        })
        .collect();
    let tables = backend
        .table_names()
        .into_iter()
        .filter(|name| name != "node")
        .collect();
    State { rows, tables }
}

/// Replays `ops` against the backend and a stack of expected states.
fn replay(mut backend: InMemoryBackend, ops: &[Op]) -> Result<(), TestCaseError> {
    let transactional_ddl = backend.supports_transactional_ddl();
    backend.create_table(&table("node")).unwrap();
    let mut state = State::default();
    let mut scopes: Vec<State> = Vec::new();

    for (n, op) in ops.iter().enumerate() {
        match op {
            Op::Insert => {
                let uuid = format!("u{n}");
                let row = [("uuid".to_string(), Value::from(uuid.as_str()))]
                    .into_iter()
                    .collect();
                backend.insert("node", row).unwrap();
                state.rows.insert(uuid);
            }
            Op::CreateTable => {
                let name = format!("t{n}");
                backend.create_table(&table(&name)).unwrap();
                state.tables.insert(name);
            }
            Op::Begin => {
                backend.begin().unwrap();
                scopes.push(state.clone());
            }
            Op::Commit => match scopes.pop() {
                Some(_) => backend.commit().unwrap(),
                None => prop_assert!(matches!(
                    backend.commit(),
                    Err(StorageError::NoActiveTransaction)
                )),
            },
            Op::Rollback => match scopes.pop() {
                Some(before) => {
                    backend.rollback().unwrap();
                    state.rows = before.rows;
                    if transactional_ddl {
                        state.tables = before.tables;
                    }
                }
                None => prop_assert!(matches!(
                    backend.rollback(),
                    Err(StorageError::NoActiveTransaction)
                )),
            },
        }
        prop_assert_eq!(backend.transaction_depth(), scopes.len());
        prop_assert_eq!(observed(&backend), state.clone());
    }
    Ok(())
}

proptest! {
    #[test]
    fn nested_rollback_restores_the_matching_scope(
        ops in prop::collection::vec(op_strategy(), 0..40)
    ) {
        replay(InMemoryBackend::new(), &ops)?;
    }

    #[test]
    fn rows_roll_back_while_schema_changes_survive(
        ops in prop::collection::vec(op_strategy(), 0..40)
    ) {
        replay(InMemoryBackend::without_transactional_ddl(), &ops)?;
    }

    #[test]
    fn serials_restart_from_the_restored_scope(inserted in 1_usize..6, discarded in 1_usize..6) {
        let mut backend = InMemoryBackend::new();
        backend.create_table(&table("node")).unwrap();
        let insert = |backend: &mut InMemoryBackend, uuid: String| {
            let row = [("uuid".to_string(), Value::from(uuid.as_str()))]
                .into_iter()
                .collect();
            backend.insert("node", row).unwrap()
        };
        for n in 0..inserted {
            insert(&mut backend, format!("kept{n}"));
        }
        backend.begin().unwrap();
        for n in 0..discarded {
            insert(&mut backend, format!("dropped{n}"));
        }
        backend.rollback().unwrap();
        let next = insert(&mut backend, "after".to_string());
        prop_assert_eq!(next, Some(inserted as i64 + 1));
    }
}
