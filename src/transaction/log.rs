//! In-memory, append-only transaction log.

use crate::access::{ColumnSchema, Identifier, Row};
use crate::executor::StatementKind;
use crate::transaction::error::TransactionResult;
use crate::transaction::id::TransactionId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

/// Contents of one table at a checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSnapshot {
    pub name: Identifier,
    pub schema: ColumnSchema,
    pub rows: Vec<Row>,
}

/// Every table of the database at a checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub tables: Vec<TableSnapshot>,
}

impl Snapshot {
    pub fn table(&self, name: &str) -> Option<&TableSnapshot> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }
}

/// A snapshot frozen into bytes when it is logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    image: Vec<u8>,
}

impl Checkpoint {
    pub fn capture(snapshot: &Snapshot) -> TransactionResult<Self> {
        Ok(Self {
            image: bincode::serialize(snapshot)?,
        })
    }

    pub fn restore(&self) -> TransactionResult<Snapshot> {
        Ok(bincode::deserialize(&self.image)?)
    }

    /// Encoded size in bytes.
    pub fn len(&self) -> usize {
        self.image.len()
    }

    pub fn is_empty(&self) -> bool {
        self.image.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEvent {
    Begin,
    /// A table statement run inside the transaction.
    Statement {
        kind: StatementKind,
        table: Option<Identifier>,
    },
    Commit,
    Rollback,
    Checkpoint(Checkpoint),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRecord {
    pub lsn: u64,
    pub transaction_id: TransactionId,
    pub event: LogEvent,
}

#[derive(Debug, Default)]
pub struct TransactionLog {
    records: Vec<TransactionRecord>,
}

impl TransactionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record and returns its log sequence number.
    pub fn append(&mut self, transaction_id: TransactionId, event: LogEvent) -> u64 {
        let lsn = self.records.len() as u64 + 1;
        self.records.push(TransactionRecord {
            lsn,
            transaction_id,
            event,
        });
        lsn
    }

    pub fn records(&self) -> &[TransactionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Most recent checkpoint logged for `transaction_id`.
    pub fn last_checkpoint(&self, transaction_id: TransactionId) -> Option<&Checkpoint> {
        self.records
            .iter()
            .rev()
            .find_map(|record| match &record.event {
                LogEvent::Checkpoint(checkpoint) if record.transaction_id == transaction_id => {
                    Some(checkpoint)
                }
                _ => None,
            })
    }

    /// Tables written since `transaction_id` began, by it or by nested
    /// transactions that did not roll back on their own.
    pub fn tables_written(&self, transaction_id: TransactionId) -> BTreeSet<Identifier> {
        let Some(start) = self.records.iter().rposition(|record| {
            record.transaction_id == transaction_id && matches!(record.event, LogEvent::Begin)
        }) else {
            return BTreeSet::new();
        };
        let tail = &self.records[start..];

        let rolled_back: HashSet<TransactionId> = tail
            .iter()
            .filter(|record| {
                record.transaction_id != transaction_id
                    && matches!(record.event, LogEvent::Rollback)
            })
            .map(|record| record.transaction_id)
            .collect();

        tail.iter()
            .filter(|record| !rolled_back.contains(&record.transaction_id))
            .filter_map(|record| match &record.event {
                LogEvent::Statement {
                    kind,
                    table: Some(table),
                } if !kind.is_read_only() => Some(table.clone()),
                _ => None,
            })
            .collect()
    }
}
