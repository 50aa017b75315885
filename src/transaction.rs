//! Transaction management module.
//!
//! - Nested transactions as a stack (begin, commit, rollback)
//! - An append-only log of begins, statements, commits, rollbacks and
//!   checkpoints
//! - Per-statement table locks requested on behalf of a transaction

pub mod error;
pub mod id;
pub mod log;
pub mod manager;

pub use error::{TransactionError, TransactionResult};
pub use id::{TransactionId, TransactionIdGenerator};
pub use log::{Checkpoint, LogEvent, Snapshot, TableSnapshot, TransactionLog, TransactionRecord};
pub use manager::{RolledBack, TransactionManager};
