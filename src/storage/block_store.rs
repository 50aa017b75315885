//! Block file: fixed-size blocks numbered from 1, one slotted page each.

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::{BlockId, SlottedPage, PAGE_SIZE};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// File extension of block files inside the data directory.
pub const BLOCK_FILE_EXTENSION: &str = "db";

pub struct BlockStore {
    name: String,
    path: PathBuf,
    file: Option<File>,
    last: u32,
}

impl BlockStore {
    /// Describes the block file for `name` inside `dir`. Nothing is touched on
    /// disk until `create` or `open`.
    pub fn new(dir: &Path, name: &str) -> Self {
        Self {
            name: name.to_string(),
            path: Self::file_path(dir, name),
            file: None,
            last: 0,
        }
    }

    /// Path of the block file backing `name`.
    pub fn file_path(dir: &Path, name: &str) -> PathBuf {
        dir.join(format!("{}.{}", name, BLOCK_FILE_EXTENSION))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Creates the file, failing if it already exists, and allocates block 1.
    pub fn create(&mut self) -> StorageResult<()> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&self.path)
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => {
                    StorageError::AlreadyExists(self.path.display().to_string())
                }
                _ => StorageError::Io(e),
            })?;

        self.file = Some(file);
        self.last = 0;
        self.get_new()?;
        log::debug!("created block file {}", self.path.display());
        Ok(())
    }

    /// Opens an existing file. Opening an already open store is a no-op.
    pub fn open(&mut self) -> StorageResult<()> {
        if self.file.is_some() {
            return Ok(());
        }

        let file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        self.last = Self::get_block_count(&file)?;
        self.file = Some(file);
        log::debug!(
            "opened block file {} with {} blocks",
            self.path.display(),
            self.last
        );
        Ok(())
    }

    pub fn close(&mut self) -> StorageResult<()> {
        if let Some(file) = self.file.take() {
            file.sync_all()?;
        }
        Ok(())
    }

    /// Closes the store and removes its file.
    pub fn drop(&mut self) -> StorageResult<()> {
        self.close()?;
        fs::remove_file(&self.path)?;
        self.last = 0;
        log::debug!("dropped block file {}", self.path.display());
        Ok(())
    }

    /// Allocates the next block, writes it out as a fresh page and reads it back.
    pub fn get_new(&mut self) -> StorageResult<SlottedPage> {
        let block_id = BlockId(self.last + 1);
        let page = SlottedPage::new(block_id, Box::new([0u8; PAGE_SIZE]));
        self.write_block(block_id, page.data())?;
        self.last = block_id.0;
        log::debug!("allocated block {} in {}", block_id, self.name);
        self.get(block_id)
    }

    pub fn get(&mut self, block_id: BlockId) -> StorageResult<SlottedPage> {
        self.check_range(block_id)?;

        let mut data = Box::new([0u8; PAGE_SIZE]);
        let file = self.file_mut()?;
        file.seek(SeekFrom::Start(Self::block_offset(block_id)))?;
        file.read_exact(&mut data[..])?;

        SlottedPage::from_data(block_id, data)
    }

    /// Writes a page back at its own block id.
    pub fn put(&mut self, page: &SlottedPage) -> StorageResult<()> {
        self.check_range(page.block_id())?;
        self.write_block(page.block_id(), page.data())
    }

    /// All block ids, ascending.
    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> {
        (1..=self.last).map(BlockId)
    }

    pub fn last_block_id(&self) -> BlockId {
        BlockId(self.last)
    }

    pub fn block_count(&self) -> u32 {
        self.last
    }

    fn write_block(&mut self, block_id: BlockId, data: &[u8; PAGE_SIZE]) -> StorageResult<()> {
        let file = self.file_mut()?;
        file.seek(SeekFrom::Start(Self::block_offset(block_id)))?;
        file.write_all(data)?;
        Ok(())
    }

    fn get_block_count(file: &File) -> StorageResult<u32> {
        let len = file.metadata()?.len();
        if len % PAGE_SIZE as u64 != 0 {
            log::warn!("block file length {} is not a multiple of {}", len, PAGE_SIZE);
        }
        Ok((len / PAGE_SIZE as u64) as u32)
    }

    fn check_range(&self, block_id: BlockId) -> StorageResult<()> {
        if block_id.0 == 0 || block_id.0 > self.last {
            return Err(StorageError::BlockOutOfRange {
                block_id,
                last: self.last,
            });
        }
        Ok(())
    }

    fn file_mut(&mut self) -> StorageResult<&mut File> {
        match self.file.as_mut() {
            Some(file) => Ok(file),
            None => Err(StorageError::NotOpen(self.path.display().to_string())),
        }
    }

    fn block_offset(block_id: BlockId) -> u64 {
        (block_id.0 as u64 - 1) * PAGE_SIZE as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::tempdir;

    #[test]
    fn test_create_allocates_first_block() -> Result<()> {
        let dir = tempdir()?;
        let mut store = BlockStore::new(dir.path(), "test");
        store.create()?;

        assert!(dir.path().join("test.db").exists());
        assert_eq!(store.block_count(), 1);
        assert_eq!(store.block_ids().collect::<Vec<_>>(), vec![BlockId(1)]);

        let page = store.get(BlockId(1))?;
        assert_eq!(page.record_count(), 0);
        assert_eq!(page.end_free(), (PAGE_SIZE - 1) as u16);
        Ok(())
    }

    #[test]
    fn test_create_is_exclusive() -> Result<()> {
        let dir = tempdir()?;
        let mut store = BlockStore::new(dir.path(), "test");
        store.create()?;

        let mut again = BlockStore::new(dir.path(), "test");
        assert!(matches!(again.create(), Err(StorageError::AlreadyExists(_))));
        Ok(())
    }

    #[test]
    fn test_get_new_and_put() -> Result<()> {
        let dir = tempdir()?;
        let mut store = BlockStore::new(dir.path(), "test");
        store.create()?;

        let mut page = store.get_new()?;
        assert_eq!(page.block_id(), BlockId(2));
        page.add(b"block two")?;
        store.put(&page)?;

        let page = store.get(BlockId(2))?;
        assert_eq!(page.get(1), Some(&b"block two"[..]));
        assert_eq!(
            store.block_ids().collect::<Vec<_>>(),
            vec![BlockId(1), BlockId(2)]
        );
        Ok(())
    }

    #[test]
    fn test_get_out_of_range() -> Result<()> {
        let dir = tempdir()?;
        let mut store = BlockStore::new(dir.path(), "test");
        store.create()?;

        assert!(matches!(
            store.get(BlockId(0)),
            Err(StorageError::BlockOutOfRange { .. })
        ));
        assert!(matches!(
            store.get(BlockId(2)),
            Err(StorageError::BlockOutOfRange { last: 1, .. })
        ));
        Ok(())
    }

    #[test]
    fn test_persistence_and_block_count() -> Result<()> {
        let dir = tempdir()?;
        {
            let mut store = BlockStore::new(dir.path(), "test");
            store.create()?;
            for _ in 0..3 {
                let mut page = store.get_new()?;
                page.add(&[page.block_id().0 as u8; 16])?;
                store.put(&page)?;
            }
            store.close()?;
        }

        let mut store = BlockStore::new(dir.path(), "test");
        store.open()?;
        assert_eq!(store.block_count(), 4);
        for block_id in 2..=4u32 {
            let page = store.get(BlockId(block_id))?;
            assert_eq!(page.get(1), Some(&[block_id as u8; 16][..]));
        }
        Ok(())
    }

    #[test]
    fn test_closed_store() -> Result<()> {
        let dir = tempdir()?;
        let mut store = BlockStore::new(dir.path(), "test");
        store.create()?;
        store.close()?;

        assert!(!store.is_open());
        assert!(matches!(store.get(BlockId(1)), Err(StorageError::NotOpen(_))));
        Ok(())
    }

    #[test]
    fn test_open_nonexistent_file() -> Result<()> {
        let dir = tempdir()?;
        let mut store = BlockStore::new(dir.path(), "missing");
        assert!(matches!(store.open(), Err(StorageError::Io(_))));
        Ok(())
    }

    #[test]
    fn test_drop_removes_file() -> Result<()> {
        let dir = tempdir()?;
        let mut store = BlockStore::new(dir.path(), "test");
        store.create()?;
        store.drop()?;

        assert!(!dir.path().join("test.db").exists());
        assert!(!store.is_open());
        Ok(())
    }
}
