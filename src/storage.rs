//! Storage layer implementation for slotdb.
//!
//! - **SlottedPage**: a fixed-size (4KB) page packing variable-length records,
//!   compacted in place on every delete or resize
//! - **BlockStore**: a file of pages addressed by 1-based block ids
//!
//! Nothing here knows about tables or rows; records are plain byte strings.

pub mod block_store;
pub mod error;
pub mod page;

pub use block_store::BlockStore;
pub use error::{StorageError, StorageResult};
pub use page::{BlockId, RecordId, SlottedPage, PAGE_SIZE};
