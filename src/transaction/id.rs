//! Transaction identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of one (possibly nested) transaction. Ids start at 1 and are
/// never reused within a manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransactionId(pub u64);

impl TransactionId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Txn{}", self.0)
    }
}

/// Monotonic id source owned by a transaction manager.
#[derive(Debug)]
pub struct TransactionIdGenerator {
    next_id: u64,
}

impl TransactionIdGenerator {
    pub fn new() -> Self {
        Self { next_id: 1 }
    }

    pub fn next(&mut self) -> TransactionId {
        let id = TransactionId(self.next_id);
        self.next_id += 1;
        id
    }

    /// The most recently issued id, `Txn0` before the first.
    pub fn last(&self) -> TransactionId {
        TransactionId(self.next_id - 1)
    }
}

impl Default for TransactionIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
