pub mod slotted_page;

use std::fmt;

/// Size of a block on disk, and of the page held in memory for it.
pub const PAGE_SIZE: usize = 4096;

/// Identifier of a block within a block file. Blocks are numbered from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Page-local record identifier. Ids start at 1 and are never reused.
pub type RecordId = u16;

pub use slotted_page::SlottedPage;
