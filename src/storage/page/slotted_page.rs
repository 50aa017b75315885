//! Slotted page holding variable-length records in one fixed-size block.
//!
//! Layout (all integers little-endian u16):
//!
//! ```text
//! +--------------+----------------------+ ... +-----------------------+
//! | count | free | size_1 | loc_1 | ...  free  | record_n | .. | rec_1 |
//! +--------------+----------------------+ ... +-----------------------+
//! 0      2      4                       ^end_free                 PAGE_SIZE
//! ```
//!
//! The directory entry for record `i` lives at offset `4 * i`. Payloads are
//! packed from the end of the page downward and never leave gaps: deleting or
//! resizing a record slides every payload stored below it.

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::{BlockId, RecordId, PAGE_SIZE};
use byteorder::{ByteOrder, LittleEndian};

const RECORD_COUNT_OFFSET: usize = 0;
const END_FREE_OFFSET: usize = 2;

// Slot size (4 bytes: 2 for size, 2 for location)
const SLOT_SIZE: usize = 4;

pub struct SlottedPage {
    block_id: BlockId,
    data: Box<[u8; PAGE_SIZE]>,
    num_records: u16,
    end_free: u16,
}

impl SlottedPage {
    /// Initializes a fresh page over `data`.
    pub fn new(block_id: BlockId, data: Box<[u8; PAGE_SIZE]>) -> Self {
        let mut page = Self {
            block_id,
            data,
            num_records: 0,
            end_free: (PAGE_SIZE - 1) as u16,
        };
        page.put_header();
        page
    }

    /// Parses a page previously written by [`SlottedPage::new`], checking the
    /// header and every directory entry.
    pub fn from_data(block_id: BlockId, data: Box<[u8; PAGE_SIZE]>) -> StorageResult<Self> {
        let num_records = LittleEndian::read_u16(&data[RECORD_COUNT_OFFSET..]);
        let end_free = LittleEndian::read_u16(&data[END_FREE_OFFSET..]);

        if end_free as usize >= PAGE_SIZE {
            return Err(StorageError::CorruptPage {
                block_id,
                reason: format!("free boundary {} beyond page end", end_free),
            });
        }
        if SLOT_SIZE * (num_records as usize + 1) > end_free as usize + 1 {
            return Err(StorageError::CorruptPage {
                block_id,
                reason: format!(
                    "directory of {} records overlaps payload at {}",
                    num_records, end_free
                ),
            });
        }

        let page = Self {
            block_id,
            data,
            num_records,
            end_free,
        };
        for record_id in 1..=num_records {
            let (size, location) = page.get_slot(record_id);
            let (size, location) = (size as usize, location as usize);
            let tombstone = size == 0 && location == 0;
            let in_payload = location > end_free as usize && location + size <= PAGE_SIZE;
            if !tombstone && !in_payload {
                return Err(StorageError::CorruptPage {
                    block_id,
                    reason: format!(
                        "record {} at {} with size {} lies outside the payload",
                        record_id, location, size
                    ),
                });
            }
        }
        Ok(page)
    }

    /// Largest record a fresh page can hold.
    pub const fn max_record_size() -> usize {
        PAGE_SIZE - 1 - 2 * SLOT_SIZE
    }

    pub fn block_id(&self) -> BlockId {
        self.block_id
    }

    pub fn data(&self) -> &[u8; PAGE_SIZE] {
        &self.data
    }

    pub fn record_count(&self) -> u16 {
        self.num_records
    }

    /// Offset of the last free byte; payloads start right after it.
    pub fn end_free(&self) -> u16 {
        self.end_free
    }

    /// End of the directory, counting the entry the next `add` would claim.
    pub fn directory_end(&self) -> usize {
        SLOT_SIZE * (self.num_records as usize + 2)
    }

    pub fn free_space(&self) -> usize {
        (self.end_free as usize).saturating_sub(self.directory_end())
    }

    pub fn has_room(&self, size: usize) -> bool {
        size <= self.free_space()
    }

    /// Adds a record and returns its id.
    pub fn add(&mut self, data: &[u8]) -> StorageResult<RecordId> {
        if !self.has_room(data.len()) {
            return Err(StorageError::NoRoom {
                required: data.len(),
                available: self.free_space(),
            });
        }

        self.num_records += 1;
        let record_id = self.num_records;
        let size = data.len() as u16;
        self.end_free -= size;
        let location = self.end_free + 1;

        self.put_header();
        self.put_slot(record_id, size, location);
        let start = location as usize;
        self.data[start..start + data.len()].copy_from_slice(data);

        Ok(record_id)
    }

    /// Returns the record payload, or `None` for a deleted or unknown id.
    pub fn get(&self, record_id: RecordId) -> Option<&[u8]> {
        if record_id == 0 || record_id > self.num_records {
            return None;
        }
        let (size, location) = self.get_slot(record_id);
        if location == 0 {
            return None;
        }
        let start = location as usize;
        Some(&self.data[start..start + size as usize])
    }

    /// Replaces a record, growing or shrinking its payload in place.
    pub fn put(&mut self, record_id: RecordId, data: &[u8]) -> StorageResult<()> {
        let (size, location) = self.live_slot(record_id)?;
        let size = size as usize;
        let location = location as usize;
        let new_size = data.len();

        if new_size > size {
            let extra = new_size - size;
            if !self.has_room(extra) {
                return Err(StorageError::NoRoom {
                    required: extra,
                    available: self.free_space(),
                });
            }
            self.slide(location, location - extra);
            let new_location = location - extra;
            self.data[new_location..new_location + new_size].copy_from_slice(data);
        } else {
            self.data[location..location + new_size].copy_from_slice(data);
            self.slide(location + new_size, location + size);
        }

        // slide() already moved this record's location
        let (_, new_location) = self.get_slot(record_id);
        self.put_slot(record_id, new_size as u16, new_location);
        Ok(())
    }

    /// Deletes a record. The id stays allocated as a tombstone.
    pub fn del(&mut self, record_id: RecordId) -> StorageResult<()> {
        let (size, location) = self.live_slot(record_id)?;
        self.put_slot(record_id, 0, 0);
        self.slide(location as usize, location as usize + size as usize);
        Ok(())
    }

    /// Ids of all live records, ascending.
    pub fn ids(&self) -> Vec<RecordId> {
        (1..=self.num_records)
            .filter(|&record_id| self.get_slot(record_id).1 != 0)
            .collect()
    }

    pub fn into_data(self) -> Box<[u8; PAGE_SIZE]> {
        self.data
    }

    /// Moves the payload stored between the free boundary and `start` by
    /// `end - start` bytes, then fixes every live location at or below `start`.
    fn slide(&mut self, start: usize, end: usize) {
        let shift = end as isize - start as isize;
        if shift == 0 {
            return;
        }

        let free_start = self.end_free as usize + 1;
        let dest = (free_start as isize + shift) as usize;
        self.data.copy_within(free_start..start, dest);

        for record_id in self.ids() {
            let (size, location) = self.get_slot(record_id);
            if location as usize <= start {
                let moved = (location as isize + shift) as u16;
                self.put_slot(record_id, size, moved);
            }
        }

        self.end_free = (self.end_free as isize + shift) as u16;
        self.put_header();
    }

    fn live_slot(&self, record_id: RecordId) -> StorageResult<(u16, u16)> {
        let not_found = StorageError::SlotNotFound {
            block_id: self.block_id,
            record_id,
        };
        if record_id == 0 || record_id > self.num_records {
            return Err(not_found);
        }
        let (size, location) = self.get_slot(record_id);
        if location == 0 {
            return Err(not_found);
        }
        Ok((size, location))
    }

    fn get_slot(&self, record_id: RecordId) -> (u16, u16) {
        let offset = SLOT_SIZE * record_id as usize;
        (self.get_n(offset), self.get_n(offset + 2))
    }

    fn put_slot(&mut self, record_id: RecordId, size: u16, location: u16) {
        let offset = SLOT_SIZE * record_id as usize;
        self.put_n(offset, size);
        self.put_n(offset + 2, location);
    }

    fn put_header(&mut self) {
        self.put_n(RECORD_COUNT_OFFSET, self.num_records);
        self.put_n(END_FREE_OFFSET, self.end_free);
    }

    fn get_n(&self, offset: usize) -> u16 {
        LittleEndian::read_u16(&self.data[offset..offset + 2])
    }

    fn put_n(&mut self, offset: usize, n: u16) {
        LittleEndian::write_u16(&mut self.data[offset..offset + 2], n);
    }
}
