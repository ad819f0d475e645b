//! Boundary to the query-routing tier.
//!
//! The resolution layer never talks to the network itself: it hands
//! statements plus routing targets to an [`Executor`] supplied by the
//! caller. Transport, retries and connection state belong to the executor.

pub mod memory;

pub use memory::{InMemoryExecutor, JournalEntry, MemoryRow, RowDestination};

use crate::access::{DispatchDescriptor, DispatchTarget};
use crate::core::{Result, Row};
use crate::statement::Statement;

pub trait Executor {
    /// Runs a statement without routing hints. Returns the affected row count.
    fn execute(&mut self, statement: &Statement) -> Result<u64>;

    /// Runs a statement against the destinations named by `target`.
    fn execute_with_routing(&mut self, statement: &Statement, target: &DispatchTarget)
    -> Result<u64>;

    /// Rows produced by the last select.
    fn fetch_all(&mut self) -> Result<Vec<Row>>;

    /// Id minted by the last insert, if the table has an auto-increment column.
    fn last_insert_id(&self) -> Option<i64>;

    fn dispatch(&mut self, descriptor: &DispatchDescriptor) -> Result<u64> {
        self.execute_with_routing(&descriptor.statement, &descriptor.target)
    }
}

/// Transaction boundary offered by executors that can provide one.
///
/// Coordinated lookup/primary writes are two dispatches; wrapping them in
/// [`with_transaction`] is the only way to make them atomic.
pub trait TransactionScope {
    fn begin(&mut self) -> Result<()>;
    fn commit(&mut self) -> Result<()>;
    fn rollback(&mut self) -> Result<()>;
}

/// Runs `f` inside a transaction: commits on `Ok`, rolls back on `Err`.
///
/// A rollback failure is logged and the original error is returned.
pub fn with_transaction<E, T, F>(executor: &mut E, f: F) -> Result<T>
where
    E: TransactionScope + ?Sized,
    F: FnOnce(&mut E) -> Result<T>,
{
    executor.begin()?;
    match f(executor) {
        Ok(value) => {
            executor.commit()?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = executor.rollback() {
                log::warn!("rollback after failed transaction also failed: {}", rollback_err);
            }
            Err(err)
        }
    }
}
