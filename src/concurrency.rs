//! Concurrency control module.
//!
//! Table-granularity shared/exclusive locks, held for one statement at a
//! time. See [`lock`] for how in-process and cross-process exclusion combine.

pub mod lock;

pub use lock::{LockHandle, LockMode, LockTable, TableLatch};
