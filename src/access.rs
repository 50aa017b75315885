//! Relation layer: typed rows on top of the storage layer.
//!
//! - **Value / Row**: column values and name-keyed rows
//! - **ColumnSchema**: ordered column declarations fixing the record layout
//! - **codec**: the row wire format
//! - **HeapTable**: a [`Relation`] backed by one block file per table

pub mod codec;
pub mod error;
pub mod schema;
pub mod table;
pub mod value;

pub use error::{RelationError, RelationResult};
pub use schema::{Column, ColumnSchema};
pub use table::{Handle, HeapTable, Relation};
pub use value::{row, DataType, Identifier, Row, Value};
