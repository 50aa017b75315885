//! Transaction manager: nested transaction stack, log and table locks.

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::access::Identifier;
use crate::concurrency::{LockHandle, LockMode, LockTable};
use crate::executor::StatementKind;
use crate::storage::BlockStore;

use super::error::{TransactionError, TransactionResult};
use super::id::{TransactionId, TransactionIdGenerator};
use super::log::{Checkpoint, LogEvent, Snapshot, TransactionLog};

/// Outcome of a rollback.
#[derive(Debug)]
pub struct RolledBack {
    pub transaction_id: TransactionId,
    /// State to restore, captured when the transaction began. `None` if no
    /// checkpoint was ever logged for it.
    pub restore_point: Option<Snapshot>,
    /// Tables the transaction wrote. Only these are restored.
    pub tables: BTreeSet<Identifier>,
}

/// Tracks nested transactions as a stack: `commit` and `rollback` always act
/// on the most recently begun one.
pub struct TransactionManager {
    data_dir: PathBuf,
    locks: Arc<LockTable>,
    ids: TransactionIdGenerator,
    active: Vec<TransactionId>,
    log: TransactionLog,
}

impl TransactionManager {
    pub fn new(data_dir: impl Into<PathBuf>, locks: Arc<LockTable>) -> Self {
        Self {
            data_dir: data_dir.into(),
            locks,
            ids: TransactionIdGenerator::new(),
            active: Vec::new(),
            log: TransactionLog::new(),
        }
    }

    /// Begins a new transaction nested inside the current one, if any.
    pub fn begin(&mut self) -> TransactionId {
        let id = self.ids.next();
        self.active.push(id);
        self.log.append(id, LogEvent::Begin);
        log::debug!("begin {} (depth {})", id, self.active.len());
        id
    }

    /// Logs a checkpoint of `snapshot` tagged with `transaction_id`.
    pub fn checkpoint(
        &mut self,
        transaction_id: TransactionId,
        snapshot: &Snapshot,
    ) -> TransactionResult<u64> {
        if transaction_id.0 == 0 || transaction_id > self.ids.last() {
            return Err(TransactionError::UnknownTransaction(transaction_id));
        }
        let checkpoint = Checkpoint::capture(snapshot)?;
        log::debug!(
            "checkpoint for {}: {} tables, {} bytes",
            transaction_id,
            snapshot.tables.len(),
            checkpoint.len()
        );
        Ok(self
            .log
            .append(transaction_id, LogEvent::Checkpoint(checkpoint)))
    }

    /// Logs a statement executed by the current transaction.
    pub fn record_statement(
        &mut self,
        kind: StatementKind,
        table: Option<&str>,
    ) -> TransactionResult<()> {
        let id = self
            .current_transaction_id()
            .ok_or(TransactionError::NoActiveTransaction)?;
        self.log.append(
            id,
            LogEvent::Statement {
                kind,
                table: table.map(str::to_string),
            },
        );
        Ok(())
    }

    /// Commits the current transaction and returns its id.
    pub fn commit(&mut self) -> TransactionResult<TransactionId> {
        let id = self
            .active
            .pop()
            .ok_or(TransactionError::NoActiveTransaction)?;
        self.log.append(id, LogEvent::Commit);
        log::debug!("commit {}", id);
        Ok(id)
    }

    /// Rolls back the current transaction and returns the state it started
    /// from.
    pub fn rollback(&mut self) -> TransactionResult<RolledBack> {
        let id = self
            .active
            .pop()
            .ok_or(TransactionError::NoActiveTransaction)?;

        let restore_point = match self.log.last_checkpoint(id) {
            Some(checkpoint) => Some(checkpoint.restore()?),
            None => {
                log::warn!("no checkpoint logged for {}, nothing to restore", id);
                None
            }
        };
        let tables = self.log.tables_written(id);
        self.log.append(id, LogEvent::Rollback);
        log::debug!("rollback {} ({} tables written)", id, tables.len());

        Ok(RolledBack {
            transaction_id: id,
            restore_point,
            tables,
        })
    }

    /// Requests a table lock without waiting. Contention is reported as
    /// [`TransactionError::WouldBlock`].
    pub fn request_lock(
        &self,
        transaction_id: TransactionId,
        kind: StatementKind,
        table: &str,
    ) -> TransactionResult<LockHandle> {
        self.check_active(transaction_id)?;
        let mode = LockMode::for_statement(kind);
        let path = self.table_path(table);

        self.locks
            .try_lock(transaction_id, table, &path, mode)
            .map_err(|e| lock_io_error(table, e))?
            .ok_or_else(|| TransactionError::WouldBlock {
                table: table.to_string(),
                mode,
            })
    }

    /// Requests a table lock, waiting up to `timeout` for conflicting holders.
    pub fn request_lock_timeout(
        &self,
        transaction_id: TransactionId,
        kind: StatementKind,
        table: &str,
        timeout: Duration,
    ) -> TransactionResult<LockHandle> {
        self.check_active(transaction_id)?;
        let mode = LockMode::for_statement(kind);
        let path = self.table_path(table);
        let deadline = Instant::now() + timeout;

        self.locks
            .lock_until(transaction_id, table, &path, mode, deadline)
            .map_err(|e| lock_io_error(table, e))?
            .ok_or_else(|| TransactionError::LockTimeout {
                table: table.to_string(),
                mode,
                waited: timeout,
            })
    }

    /// Unlocks and closes the descriptor.
    pub fn release_lock(&self, handle: LockHandle) -> TransactionResult<()> {
        let table = handle.table().to_string();
        handle.release().map_err(|e| lock_io_error(&table, e))
    }

    pub fn current_transaction_id(&self) -> Option<TransactionId> {
        self.active.last().copied()
    }

    /// Active transactions, outermost first.
    pub fn active_transactions(&self) -> &[TransactionId] {
        &self.active
    }

    pub fn in_transaction(&self) -> bool {
        !self.active.is_empty()
    }

    pub fn log(&self) -> &TransactionLog {
        &self.log
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn table_path(&self, table: &str) -> PathBuf {
        BlockStore::file_path(&self.data_dir, table)
    }

    fn check_active(&self, transaction_id: TransactionId) -> TransactionResult<()> {
        if self.active.contains(&transaction_id) {
            Ok(())
        } else {
            Err(TransactionError::UnknownTransaction(transaction_id))
        }
    }
}

fn lock_io_error(table: &str, e: io::Error) -> TransactionError {
    if e.raw_os_error() == Some(libc::EBADF) {
        TransactionError::InvalidDescriptor(table.to_string())
    } else {
        TransactionError::Io(e)
    }
}
