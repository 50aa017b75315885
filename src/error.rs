//! Errors reported by the statement executor.

use crate::access::{Identifier, RelationError};
use crate::storage::StorageError;
use crate::transaction::TransactionError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Table '{0}' does not exist")]
    UnknownTable(Identifier),

    #[error("Table '{0}' already exists")]
    TableExists(Identifier),

    #[error("Row already exists in table '{0}'")]
    DuplicateRow(Identifier),

    #[error("Invalid table name '{0}'")]
    InvalidTableName(Identifier),

    #[error("'{0}' is a system table")]
    SystemTable(Identifier),

    #[error(transparent)]
    Relation(#[from] RelationError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Transaction(#[from] TransactionError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DbError {
    /// Lock contention: the same statement may succeed if retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DbError::Transaction(e) if e.is_retryable())
    }
}

pub type DbResult<T> = Result<T, DbError>;
