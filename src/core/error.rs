use std::fmt;
use thiserror::Error;

use super::Value;

/// Step of a coordinated lookup/primary write.
///
/// Coordinated writes are two sequential dispatches with no shared
/// transaction, so a failure is always reported together with the step
/// that did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStep {
    /// Secondary lookup-row insert after an earlier lookup row was created.
    CreateLookup,
    /// Primary-row insert after the lookup entry was created.
    PrimaryInsert,
    /// Lookup-row update after the primary row was updated.
    UpdateLookup,
    /// Lookup-row delete after the primary row was deleted.
    DeleteLookup,
}

impl fmt::Display for WriteStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateLookup => write!(f, "lookup insert"),
            Self::PrimaryInsert => write!(f, "primary insert"),
            Self::UpdateLookup => write!(f, "lookup update"),
            Self::DeleteLookup => write!(f, "lookup delete"),
        }
    }
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Write routing error: {0}")]
    WriteRoutingError(String),

    #[error("Not found: {0}")]
    NotFoundError(String),

    #[error("Precondition failed: {0}")]
    PreconditionError(String),

    #[error("Format error: {0}")]
    FormatError(String),

    #[error(
        "Partial write on table '{table}' for shard key {shard_key}: {step} failed, earlier step already committed: {source}"
    )]
    PartialWriteError {
        table: String,
        shard_key: Value,
        step: WriteStep,
        #[source]
        source: Box<DbError>,
    },

    #[error("Table '{0}' not found")]
    TableNotFound(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl DbError {
    /// Wraps a failed step of a coordinated write.
    pub fn partial_write(
        table: impl Into<String>,
        shard_key: Value,
        step: WriteStep,
        source: DbError,
    ) -> Self {
        Self::PartialWriteError {
            table: table.into(),
            shard_key,
            step,
            source: Box::new(source),
        }
    }

    pub fn is_partial_write(&self) -> bool {
        matches!(self, Self::PartialWriteError { .. })
    }
}

pub type Result<T> = std::result::Result<T, DbError>;


impl<T> From<std::sync::PoisonError<T>> for DbError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}
