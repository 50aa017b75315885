//! Relation layer error types.

use crate::access::value::{DataType, Identifier};
use crate::storage::StorageError;
use thiserror::Error;

/// Errors raised while validating, encoding or accessing rows.
#[derive(Error, Debug)]
pub enum RelationError {
    #[error("Row is missing a value for column '{0}'")]
    Incomplete(Identifier),

    #[error("Unknown column '{0}'")]
    UnknownColumn(Identifier),

    #[error("Duplicate column '{0}'")]
    DuplicateColumn(Identifier),

    #[error("Column '{column}' expects {expected} but got {found}")]
    TypeMismatch {
        column: Identifier,
        expected: DataType,
        found: DataType,
    },

    #[error("Text field '{column}' is {len} bytes, longer than {max}")]
    TextTooLong {
        column: Identifier,
        len: usize,
        max: usize,
    },

    #[error("Row too big to marshal: {size} bytes (max {max})")]
    RowTooLarge { size: usize, max: usize },

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Result type for relation operations.
pub type RelationResult<T> = Result<T, RelationError>;
