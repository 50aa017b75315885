//! Storage layer error types.

use crate::storage::page::{BlockId, RecordId};
use thiserror::Error;

/// Errors that can occur in the storage layer.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Not enough room in block: requires {required} bytes but only {available} available")]
    NoRoom { required: usize, available: usize },

    #[error("Record {record_id} not found in block {block_id}")]
    SlotNotFound { block_id: BlockId, record_id: RecordId },

    #[error("Block {block_id} out of range (last block: {last})")]
    BlockOutOfRange { block_id: BlockId, last: u32 },

    #[error("Corrupt page header in block {block_id}: {reason}")]
    CorruptPage { block_id: BlockId, reason: String },

    #[error("Corrupt record: {0}")]
    CorruptRecord(String),

    #[error("File already exists: {0}")]
    AlreadyExists(String),

    #[error("File is not open: {0}")]
    NotOpen(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
