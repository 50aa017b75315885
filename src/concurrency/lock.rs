//! Table-level locking.
//!
//! A table lock has two layers: an in-process reader/writer latch, shared by
//! every session holding the same [`LockTable`], and an advisory `flock` on the
//! table's block file, which excludes other processes. Both are always taken in
//! that order and released together.

use crate::access::Identifier;
use crate::executor::StatementKind;
use crate::transaction::TransactionId;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How often a waiter re-checks an advisory lock held by another process.
pub const FLOCK_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Lock modes supported by the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    /// Shared lock for read operations.
    Shared,
    /// Exclusive lock for write operations.
    Exclusive,
}

impl LockMode {
    /// Whether a request in this mode can be granted while `held` is held.
    pub fn is_compatible_with(self, held: LockMode) -> bool {
        self == LockMode::Shared && held == LockMode::Shared
    }

    pub fn for_statement(kind: StatementKind) -> Self {
        if kind.is_read_only() {
            LockMode::Shared
        } else {
            LockMode::Exclusive
        }
    }

    fn flock_operation(self) -> libc::c_int {
        match self {
            LockMode::Shared => libc::LOCK_SH,
            LockMode::Exclusive => libc::LOCK_EX,
        }
    }
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockMode::Shared => write!(f, "shared"),
            LockMode::Exclusive => write!(f, "exclusive"),
        }
    }
}

#[derive(Debug, Default)]
struct LatchState {
    readers: usize,
    writer: bool,
}

impl LatchState {
    fn held(&self) -> Option<LockMode> {
        if self.writer {
            Some(LockMode::Exclusive)
        } else if self.readers > 0 {
            Some(LockMode::Shared)
        } else {
            None
        }
    }

    fn can_grant(&self, mode: LockMode) -> bool {
        match self.held() {
            Some(held) => mode.is_compatible_with(held),
            None => true,
        }
    }

    fn grant(&mut self, mode: LockMode) {
        match mode {
            LockMode::Shared => self.readers += 1,
            LockMode::Exclusive => self.writer = true,
        }
    }

    fn release(&mut self, mode: LockMode) {
        match mode {
            LockMode::Shared => self.readers = self.readers.saturating_sub(1),
            LockMode::Exclusive => self.writer = false,
        }
    }
}

/// Reader/writer latch for one table.
#[derive(Debug, Default)]
pub struct TableLatch {
    state: Mutex<LatchState>,
    released: Condvar,
}

impl TableLatch {
    pub fn try_acquire(&self, mode: LockMode) -> bool {
        let mut state = self.state.lock();
        if state.can_grant(mode) {
            state.grant(mode);
            true
        } else {
            false
        }
    }

    /// Blocks until the latch is granted or `deadline` passes.
    pub fn acquire_until(&self, mode: LockMode, deadline: Instant) -> bool {
        let mut state = self.state.lock();
        while !state.can_grant(mode) {
            if self.released.wait_until(&mut state, deadline).timed_out() && !state.can_grant(mode)
            {
                return false;
            }
        }
        state.grant(mode);
        true
    }

    pub fn release(&self, mode: LockMode) {
        self.state.lock().release(mode);
        self.released.notify_all();
    }

    pub fn is_held(&self) -> bool {
        self.state.lock().held().is_some()
    }
}

/// Table name to latch map, shared by every session of a process.
#[derive(Debug, Default)]
pub struct LockTable {
    latches: DashMap<Identifier, Arc<TableLatch>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latch(&self, table: &str) -> Arc<TableLatch> {
        let entry = self.latches.entry(table.to_string()).or_default();
        Arc::clone(entry.value())
    }

    /// Tries once to lock `table`, whose block file is at `path`.
    ///
    /// Returns `Ok(None)` when either layer is held in a conflicting mode.
    pub fn try_lock(
        &self,
        owner: TransactionId,
        table: &str,
        path: &Path,
        mode: LockMode,
    ) -> io::Result<Option<LockHandle>> {
        let latch = self.latch(table);
        if !latch.try_acquire(mode) {
            log::warn!("{} lock on {} is held within this process", mode, table);
            return Ok(None);
        }

        let file = match open_lock_file(path) {
            Ok(file) => file,
            Err(e) => {
                latch.release(mode);
                return Err(e);
            }
        };
        match try_flock(&file, mode) {
            Ok(true) => Ok(Some(LockHandle::new(owner, table, mode, latch, file))),
            Ok(false) => {
                latch.release(mode);
                log::warn!("{} lock on {} is held by another process", mode, table);
                Ok(None)
            }
            Err(e) => {
                latch.release(mode);
                Err(e)
            }
        }
    }

    /// Like [`try_lock`](Self::try_lock), but waits for conflicting holders
    /// until `deadline`.
    pub fn lock_until(
        &self,
        owner: TransactionId,
        table: &str,
        path: &Path,
        mode: LockMode,
        deadline: Instant,
    ) -> io::Result<Option<LockHandle>> {
        let latch = self.latch(table);
        if !latch.acquire_until(mode, deadline) {
            return Ok(None);
        }

        let file = match open_lock_file(path) {
            Ok(file) => file,
            Err(e) => {
                latch.release(mode);
                return Err(e);
            }
        };
        loop {
            match try_flock(&file, mode) {
                Ok(true) => return Ok(Some(LockHandle::new(owner, table, mode, latch, file))),
                Ok(false) => {
                    let now = Instant::now();
                    if now >= deadline {
                        latch.release(mode);
                        return Ok(None);
                    }
                    std::thread::sleep(FLOCK_POLL_INTERVAL.min(deadline - now));
                }
                Err(e) => {
                    latch.release(mode);
                    return Err(e);
                }
            }
        }
    }
}

/// A granted table lock. Dropping the handle releases it.
#[derive(Debug)]
pub struct LockHandle {
    owner: TransactionId,
    table: Identifier,
    mode: LockMode,
    latch: Arc<TableLatch>,
    file: Option<File>,
}

impl LockHandle {
    fn new(
        owner: TransactionId,
        table: &str,
        mode: LockMode,
        latch: Arc<TableLatch>,
        file: File,
    ) -> Self {
        log::debug!("{} acquired {} lock on {}", owner, mode, table);
        Self {
            owner,
            table: table.to_string(),
            mode,
            latch,
            file: Some(file),
        }
    }

    pub fn owner(&self) -> TransactionId {
        self.owner
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }

    /// Descriptor of the locked file, `None` once released.
    pub fn fd(&self) -> Option<RawFd> {
        self.file.as_ref().map(|f| f.as_raw_fd())
    }

    /// Unlocks and closes the descriptor.
    pub fn release(mut self) -> io::Result<()> {
        self.unlock()
    }

    fn unlock(&mut self) -> io::Result<()> {
        let Some(file) = self.file.take() else {
            return Ok(());
        };
        // SAFETY: `file` owns a valid open descriptor until it is dropped below.
        let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_UN) };
        let result = if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        };
        drop(file);
        self.latch.release(self.mode);
        log::debug!("{} released {} lock on {}", self.owner, self.mode, self.table);
        result
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        if let Err(e) = self.unlock() {
            log::warn!("failed to unlock {}: {}", self.table, e);
        }
    }
}

fn open_lock_file(path: &Path) -> io::Result<File> {
    OpenOptions::new().read(true).open(path)
}

/// Non-blocking `flock`. `Ok(false)` means another descriptor holds a
/// conflicting lock.
fn try_flock(file: &File, mode: LockMode) -> io::Result<bool> {
    // SAFETY: the descriptor is valid for the lifetime of `file`.
    let rc = unsafe { libc::flock(file.as_raw_fd(), mode.flock_operation() | libc::LOCK_NB) };
    if rc == 0 {
        return Ok(true);
    }
    let err = io::Error::last_os_error();
    if err.kind() == io::ErrorKind::WouldBlock {
        Ok(false)
    } else {
        Err(err)
    }
}
