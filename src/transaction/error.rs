//! Transaction layer error types.

use crate::access::Identifier;
use crate::concurrency::LockMode;
use crate::transaction::id::TransactionId;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("No transaction is active")]
    NoActiveTransaction,

    #[error("Transaction {0} is not active")]
    UnknownTransaction(TransactionId),

    /// Lock contention. The statement can be retried.
    #[error("Table {table} is locked, {mode} access would block")]
    WouldBlock { table: Identifier, mode: LockMode },

    #[error("Timed out after {waited:?} waiting for a {mode} lock on {table}")]
    LockTimeout {
        table: Identifier,
        mode: LockMode,
        waited: Duration,
    },

    #[error("Invalid file descriptor for table {0}")]
    InvalidDescriptor(Identifier),

    #[error("Lock I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Checkpoint snapshot error: {0}")]
    Snapshot(#[from] bincode::Error),
}

impl TransactionError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransactionError::WouldBlock { .. } | TransactionError::LockTimeout { .. }
        )
    }
}

pub type TransactionResult<T> = Result<T, TransactionError>;
