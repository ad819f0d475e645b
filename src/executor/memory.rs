use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::access::DispatchTarget;
use crate::core::{DbError, Result, Row, Value, column_value};
use crate::routing::{KeyspaceId, OperationKind};
use crate::statement::Statement;

use super::{Executor, TransactionScope};

/// Physical placement of a stored row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowDestination {
    /// The single shard of an unsharded keyspace.
    Unsharded,
    Keyspace(KeyspaceId),
    Shard(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemoryRow {
    pub destination: RowDestination,
    pub values: HashMap<String, Value>,
}

impl MemoryRow {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }
}

/// One dispatched statement, in dispatch order.
#[derive(Debug, Clone, PartialEq)]
pub struct JournalEntry {
    pub table: String,
    pub kind: OperationKind,
    pub target: Option<DispatchTarget>,
    /// Affected row count, or `None` when the statement failed.
    pub rowcount: Option<u64>,
}

#[derive(Debug, Clone, Default)]
struct MemoryTable {
    auto_increment: Option<String>,
    next_id: i64,
    rows: Vec<MemoryRow>,
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: HashMap<String, MemoryTable>,
    journal: Vec<JournalEntry>,
    failures: Vec<(String, OperationKind)>,
}

/// In-process stand-in for the routing tier.
///
/// Rows are tagged with the destination they were routed to, so selects
/// only see rows living on the targeted keyspace ids, ranges or shards.
/// Handles created with [`connect`](Self::connect) share the same data.
pub struct InMemoryExecutor {
    state: Arc<RwLock<MemoryState>>,
    last_rows: Vec<Row>,
    last_insert_id: Option<i64>,
    snapshot: Option<HashMap<String, MemoryTable>>,
}

impl Default for InMemoryExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryExecutor {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(MemoryState::default())),
            last_rows: Vec::new(),
            last_insert_id: None,
            snapshot: None,
        }
    }

    /// Opens another handle on the same data.
    pub fn connect(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            last_rows: Vec::new(),
            last_insert_id: None,
            snapshot: None,
        }
    }

    /// Creates an empty table. `auto_increment` names the column minted on
    /// insert when the caller leaves it out.
    pub fn create_table(&self, name: &str, auto_increment: Option<&str>) -> Result<()> {
        let mut state = self.state.write()?;
        if state.tables.contains_key(name) {
            return Err(DbError::ExecutionError(format!(
                "Table '{}' already exists",
                name
            )));
        }
        state.tables.insert(
            name.to_string(),
            MemoryTable {
                auto_increment: auto_increment.map(str::to_string),
                next_id: 1,
                rows: Vec::new(),
            },
        );
        Ok(())
    }

    /// Makes the next `kind` statement against `table` fail.
    pub fn fail_next(&self, table: &str, kind: OperationKind) -> Result<()> {
        let mut state = self.state.write()?;
        state.failures.push((table.to_string(), kind));
        Ok(())
    }

    pub fn journal(&self) -> Result<Vec<JournalEntry>> {
        Ok(self.state.read()?.journal.clone())
    }

    pub fn clear_journal(&self) -> Result<()> {
        self.state.write()?.journal.clear();
        Ok(())
    }

    pub fn rows(&self, table: &str) -> Result<Vec<MemoryRow>> {
        let state = self.state.read()?;
        let table = state
            .tables
            .get(table)
            .ok_or_else(|| DbError::TableNotFound(table.to_string()))?;
        Ok(table.rows.clone())
    }

    fn run(&mut self, statement: &Statement, target: Option<&DispatchTarget>) -> Result<u64> {
        let mut state = self.state.write()?;

        let injected = state
            .failures
            .iter()
            .position(|(table, kind)| table == &statement.table && *kind == statement.kind);
        let outcome = match injected {
            Some(index) => {
                state.failures.remove(index);
                Err(DbError::ExecutionError(format!(
                    "injected {} failure on '{}'",
                    statement.kind, statement.table
                )))
            }
            None => {
                let table = state
                    .tables
                    .get_mut(&statement.table)
                    .ok_or_else(|| DbError::TableNotFound(statement.table.clone()))?;
                match statement.kind {
                    OperationKind::Select => {
                        self.last_rows = select_rows(table, statement, target)?;
                        Ok(self.last_rows.len() as u64)
                    }
                    OperationKind::Insert => {
                        let minted = insert_row(table, statement, target)?;
                        self.last_insert_id = minted;
                        Ok(1)
                    }
                    OperationKind::Update => update_rows(table, statement, target),
                    OperationKind::Delete => delete_rows(table, statement, target),
                }
            }
        };

        state.journal.push(JournalEntry {
            table: statement.table.clone(),
            kind: statement.kind,
            target: target.cloned(),
            rowcount: outcome.as_ref().ok().copied(),
        });
        outcome
    }
}

fn on_target(row: &MemoryRow, target: Option<&DispatchTarget>) -> bool {
    match (target, &row.destination) {
        (None, _) => true,
        (Some(DispatchTarget::KeyspaceIds(ids)), RowDestination::Keyspace(kid)) => ids.contains(kid),
        (Some(DispatchTarget::KeyRanges(ranges)), RowDestination::Keyspace(kid)) => {
            ranges.iter().any(|range| range.contains(*kid))
        }
        (Some(DispatchTarget::KeyRanges(_)), RowDestination::Unsharded) => true,
        (Some(DispatchTarget::ShardNames(names)), RowDestination::Shard(shard)) => names.contains(shard),
        _ => false,
    }
}

fn matches_predicates(row: &MemoryRow, predicates: &[(String, Value)]) -> bool {
    predicates.iter().all(|(column, expected)| {
        let actual = row.values.get(column).unwrap_or(&Value::Null);
        actual == expected
    })
}

fn matching_indices(table: &MemoryTable, statement: &Statement, target: Option<&DispatchTarget>) -> Vec<usize> {
    table
        .rows
        .iter()
        .enumerate()
        .filter(|(_, row)| on_target(row, target) && matches_predicates(row, &statement.predicates))
        .map(|(index, _)| index)
        .collect()
}

fn select_rows(table: &MemoryTable, statement: &Statement, target: Option<&DispatchTarget>) -> Result<Vec<Row>> {
    if !statement.options.group_by.is_empty() {
        return Err(DbError::ExecutionError(
            "GROUP BY is not supported by the in-memory executor".to_string(),
        ));
    }

    let mut matched: Vec<&MemoryRow> = matching_indices(table, statement, target)
        .into_iter()
        .map(|index| &table.rows[index])
        .collect();

    if !statement.options.order_by.is_empty() {
        let mut sort_error = None;
        matched.sort_by(|a, b| {
            for order in &statement.options.order_by {
                let left = a.values.get(&order.column).unwrap_or(&Value::Null);
                let right = b.values.get(&order.column).unwrap_or(&Value::Null);
                match left.compare(right) {
                    Ok(std::cmp::Ordering::Equal) => continue,
                    Ok(ordering) if order.descending => return ordering.reverse(),
                    Ok(ordering) => return ordering,
                    Err(err) => {
                        sort_error.get_or_insert(err);
                        return std::cmp::Ordering::Equal;
                    }
                }
            }
            std::cmp::Ordering::Equal
        });
        if let Some(err) = sort_error {
            return Err(err);
        }
    }

    let limit = statement.options.limit.unwrap_or(usize::MAX);
    Ok(matched
        .into_iter()
        .take(limit)
        .map(|row| {
            statement
                .columns
                .iter()
                .map(|column| row.values.get(column).cloned().unwrap_or(Value::Null))
                .collect()
        })
        .collect())
}

fn insert_destination(target: Option<&DispatchTarget>) -> Result<RowDestination> {
    match target {
        None => Ok(RowDestination::Unsharded),
        Some(DispatchTarget::KeyspaceIds(ids)) if ids.len() == 1 => Ok(RowDestination::Keyspace(ids[0])),
        Some(DispatchTarget::KeyRanges(ranges)) if ranges.len() == 1 && ranges[0].is_full() => {
            Ok(RowDestination::Unsharded)
        }
        Some(DispatchTarget::ShardNames(names)) if names.len() == 1 => {
            Ok(RowDestination::Shard(names[0].clone()))
        }
        Some(other) => Err(DbError::ExecutionError(format!(
            "insert must target exactly one destination, got {:?}",
            other
        ))),
    }
}

fn insert_row(table: &mut MemoryTable, statement: &Statement, target: Option<&DispatchTarget>) -> Result<Option<i64>> {
    let destination = insert_destination(target)?;
    let mut values: HashMap<String, Value> = statement.assignments.iter().cloned().collect();

    let mut minted = None;
    if let Some(column) = table.auto_increment.clone() {
        match column_value(&statement.assignments, &column) {
            None | Some(Value::Null) => {
                let id = table.next_id;
                table.next_id += 1;
                values.insert(column, Value::Integer(id));
                minted = Some(id);
            }
            Some(Value::Integer(id)) => {
                if *id >= table.next_id {
                    table.next_id = id + 1;
                }
                minted = Some(*id);
            }
            Some(other) => {
                return Err(DbError::ExecutionError(format!(
                    "auto-increment column '{}' must be an integer, got {}",
                    column,
                    other.type_name()
                )));
            }
        }
    }

    table.rows.push(MemoryRow { destination, values });
    Ok(minted)
}

fn update_rows(table: &mut MemoryTable, statement: &Statement, target: Option<&DispatchTarget>) -> Result<u64> {
    let indices = matching_indices(table, statement, target);
    for &index in &indices {
        let row = &mut table.rows[index];
        for (column, value) in &statement.assignments {
            row.values.insert(column.clone(), value.clone());
        }
    }
    Ok(indices.len() as u64)
}

fn delete_rows(table: &mut MemoryTable, statement: &Statement, target: Option<&DispatchTarget>) -> Result<u64> {
    let mut indices = matching_indices(table, statement, target);
    if let Some(limit) = statement.options.limit {
        indices.truncate(limit);
    }
    for &index in indices.iter().rev() {
        table.rows.remove(index);
    }
    Ok(indices.len() as u64)
}

impl Executor for InMemoryExecutor {
    fn execute(&mut self, statement: &Statement) -> Result<u64> {
        self.run(statement, None)
    }

    fn execute_with_routing(&mut self, statement: &Statement, target: &DispatchTarget) -> Result<u64> {
        self.run(statement, Some(target))
    }

    fn fetch_all(&mut self) -> Result<Vec<Row>> {
        Ok(std::mem::take(&mut self.last_rows))
    }

    fn last_insert_id(&self) -> Option<i64> {
        self.last_insert_id
    }
}

impl TransactionScope for InMemoryExecutor {
    fn begin(&mut self) -> Result<()> {
        if self.snapshot.is_some() {
            return Err(DbError::ExecutionError("Transaction already active".into()));
        }
        let state = self.state.read()?;
        self.snapshot = Some(state.tables.clone());
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        if self.snapshot.take().is_none() {
            return Err(DbError::ExecutionError("No active transaction".into()));
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        let snapshot = self
            .snapshot
            .take()
            .ok_or_else(|| DbError::ExecutionError("No active transaction".into()))?;
        let mut state = self.state.write()?;
        state.tables = snapshot;
        Ok(())
    }
}
