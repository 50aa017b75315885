//! Heap tables: rows stored as records in a block file.

use crate::access::codec;
use crate::access::error::{RelationError, RelationResult};
use crate::access::schema::ColumnSchema;
use crate::access::value::{Identifier, Row};
use crate::storage::{BlockId, BlockStore, RecordId, SlottedPage, StorageError};
use std::fmt;
use std::io::ErrorKind;
use std::path::Path;

/// Location of a stored row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle {
    pub block_id: BlockId,
    pub record_id: RecordId,
}

impl Handle {
    pub fn new(block_id: BlockId, record_id: RecordId) -> Self {
        Self {
            block_id,
            record_id,
        }
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.block_id, self.record_id)
    }
}

/// A named, schema'd collection of rows.
pub trait Relation {
    fn name(&self) -> &str;

    fn schema(&self) -> &ColumnSchema;

    fn create(&mut self) -> RelationResult<()>;

    fn create_if_not_exists(&mut self) -> RelationResult<()>;

    fn open(&mut self) -> RelationResult<()>;

    fn close(&mut self) -> RelationResult<()>;

    fn drop(&mut self) -> RelationResult<()>;

    /// Stores a row. Every schema column must be present.
    fn insert(&mut self, row: &Row) -> RelationResult<Handle>;

    /// Merges `new_values` into the stored row. The returned handle differs
    /// from `handle` when the row had to move to another block.
    fn update(&mut self, handle: Handle, new_values: &Row) -> RelationResult<Handle>;

    fn del(&mut self, handle: Handle) -> RelationResult<()>;

    /// Handles of the rows equal to `predicate` on every column it names, in
    /// storage order. `None` selects everything.
    fn select(&mut self, predicate: Option<&Row>) -> RelationResult<Vec<Handle>>;

    /// Reads one row, restricted to `columns` when given.
    fn project(&mut self, handle: Handle, columns: Option<&[Identifier]>) -> RelationResult<Row>;

    fn project_all(
        &mut self,
        handles: &[Handle],
        columns: Option<&[Identifier]>,
    ) -> RelationResult<Vec<Row>> {
        handles
            .iter()
            .map(|handle| self.project(*handle, columns))
            .collect()
    }
}

/// Relation backed by a [`BlockStore`]. Rows are appended to the last block;
/// a new block is allocated when it fills up.
pub struct HeapTable {
    name: Identifier,
    schema: ColumnSchema,
    file: BlockStore,
}

impl HeapTable {
    pub fn new(dir: &Path, name: &str, schema: ColumnSchema) -> Self {
        Self {
            name: name.to_string(),
            schema,
            file: BlockStore::new(dir, name),
        }
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn block_ids(&self) -> Vec<BlockId> {
        self.file.block_ids().collect()
    }

    /// Checks a row against the schema: every column present with a value of
    /// the declared type. Returns the row restricted to schema columns.
    pub fn validate(&self, row: &Row) -> RelationResult<Row> {
        let mut full = Row::new();
        for column in &self.schema {
            let value = row
                .get(&column.name)
                .ok_or_else(|| RelationError::Incomplete(column.name.clone()))?;
            if !value.is_compatible_with(column.data_type) {
                return Err(RelationError::TypeMismatch {
                    column: column.name.clone(),
                    expected: column.data_type,
                    found: value.data_type(),
                });
            }
            full.insert(column.name.clone(), value.clone());
        }
        Ok(full)
    }

    fn check_columns<'a, I>(&self, names: I) -> RelationResult<()>
    where
        I: IntoIterator<Item = &'a Identifier>,
    {
        for name in names {
            if !self.schema.contains(name) {
                return Err(RelationError::UnknownColumn(name.clone()));
            }
        }
        Ok(())
    }

    fn append(&mut self, data: &[u8]) -> RelationResult<Handle> {
        let mut block = if self.file.block_count() == 0 {
            self.file.get_new()?
        } else {
            self.file.get(self.file.last_block_id())?
        };

        let record_id = match block.add(data) {
            Ok(record_id) => record_id,
            Err(StorageError::NoRoom { .. }) => {
                log::debug!(
                    "block {} of {} is full, allocating a new block",
                    block.block_id(),
                    self.name
                );
                block = self.file.get_new()?;
                block.add(data)?
            }
            Err(e) => return Err(e.into()),
        };

        self.file.put(&block)?;
        Ok(Handle::new(block.block_id(), record_id))
    }

    fn read_row(&self, block: &SlottedPage, record_id: RecordId) -> RelationResult<Row> {
        let data = block
            .get(record_id)
            .ok_or(StorageError::SlotNotFound {
                block_id: block.block_id(),
                record_id,
            })?;
        codec::unmarshal(&self.schema, data)
    }
}

impl Relation for HeapTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> &ColumnSchema {
        &self.schema
    }

    fn create(&mut self) -> RelationResult<()> {
        self.file.create()?;
        log::info!("created table {}", self.name);
        Ok(())
    }

    fn create_if_not_exists(&mut self) -> RelationResult<()> {
        match self.file.open() {
            Ok(()) => Ok(()),
            Err(StorageError::Io(e)) if e.kind() == ErrorKind::NotFound => self.create(),
            Err(e) => Err(e.into()),
        }
    }

    fn open(&mut self) -> RelationResult<()> {
        Ok(self.file.open()?)
    }

    fn close(&mut self) -> RelationResult<()> {
        Ok(self.file.close()?)
    }

    fn drop(&mut self) -> RelationResult<()> {
        self.file.drop()?;
        log::info!("dropped table {}", self.name);
        Ok(())
    }

    fn insert(&mut self, row: &Row) -> RelationResult<Handle> {
        self.open()?;
        let full = self.validate(row)?;
        let data = codec::marshal(&self.schema, &full)?;
        self.append(&data)
    }

    fn update(&mut self, handle: Handle, new_values: &Row) -> RelationResult<Handle> {
        self.open()?;
        self.check_columns(new_values.keys())?;

        let mut block = self.file.get(handle.block_id)?;
        let mut row = self.read_row(&block, handle.record_id)?;
        row.extend(new_values.iter().map(|(k, v)| (k.clone(), v.clone())));
        let full = self.validate(&row)?;
        let data = codec::marshal(&self.schema, &full)?;

        match block.put(handle.record_id, &data) {
            Ok(()) => {
                self.file.put(&block)?;
                Ok(handle)
            }
            Err(StorageError::NoRoom { .. }) => {
                // does not fit in place, move it to the end of the table
                block.del(handle.record_id)?;
                self.file.put(&block)?;
                let moved = self.append(&data)?;
                log::debug!("row {} of {} moved to {}", handle, self.name, moved);
                Ok(moved)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn del(&mut self, handle: Handle) -> RelationResult<()> {
        self.open()?;
        let mut block = self.file.get(handle.block_id)?;
        block.del(handle.record_id)?;
        self.file.put(&block)?;
        Ok(())
    }

    fn select(&mut self, predicate: Option<&Row>) -> RelationResult<Vec<Handle>> {
        self.open()?;
        if let Some(predicate) = predicate {
            self.check_columns(predicate.keys())?;
        }

        let mut handles = Vec::new();
        for block_id in self.file.block_ids() {
            let block = self.file.get(block_id)?;
            for record_id in block.ids() {
                if let Some(predicate) = predicate.filter(|p| !p.is_empty()) {
                    let row = self.read_row(&block, record_id)?;
                    if !predicate.iter().all(|(k, v)| row.get(k) == Some(v)) {
                        continue;
                    }
                }
                handles.push(Handle::new(block_id, record_id));
            }
        }
        Ok(handles)
    }

    fn project(&mut self, handle: Handle, columns: Option<&[Identifier]>) -> RelationResult<Row> {
        self.open()?;
        let block = self.file.get(handle.block_id)?;
        let row = self.read_row(&block, handle.record_id)?;

        match columns {
            Some(columns) if !columns.is_empty() => columns
                .iter()
                .map(|name| match row.get(name) {
                    Some(value) => Ok((name.clone(), value.clone())),
                    None => Err(RelationError::UnknownColumn(name.clone())),
                })
                .collect(),
            _ => Ok(row),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::value::{row, DataType, Value};
    use anyhow::Result;
    use tempfile::tempdir;

    fn ab_schema() -> Result<ColumnSchema> {
        Ok(ColumnSchema::from_pairs([
            ("a", DataType::Int),
            ("b", DataType::Text),
        ])?)
    }

    fn names(columns: &[&str]) -> Vec<Identifier> {
        columns.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_insert_select_project() -> Result<()> {
        let dir = tempdir()?;
        let mut table = HeapTable::new(dir.path(), "_test", ab_schema()?);
        table.create()?;

        let r = row([("a", Value::Int(12)), ("b", Value::from("Hello!"))]);
        let handle = table.insert(&r)?;
        assert_eq!(handle, Handle::new(BlockId(1), 1));

        let handles = table.select(None)?;
        assert_eq!(handles, vec![handle]);

        let rows = table.project_all(&handles, None)?;
        assert_eq!(rows, vec![r]);

        table.drop()?;
        assert!(!dir.path().join("_test.db").exists());
        Ok(())
    }

    #[test]
    fn test_insert_validates_row() -> Result<()> {
        let dir = tempdir()?;
        let mut table = HeapTable::new(dir.path(), "t", ab_schema()?);
        table.create()?;

        let missing = row([("a", Value::Int(1))]);
        assert!(matches!(
            table.insert(&missing),
            Err(RelationError::Incomplete(name)) if name == "b"
        ));

        let wrong = row([("a", Value::Boolean(true)), ("b", Value::from("x"))]);
        assert!(matches!(
            table.insert(&wrong),
            Err(RelationError::TypeMismatch { .. })
        ));

        assert!(table.select(None)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_extra_keys_are_dropped() -> Result<()> {
        let dir = tempdir()?;
        let mut table = HeapTable::new(dir.path(), "t", ab_schema()?);
        table.create()?;

        let handle = table.insert(&row([
            ("a", Value::Int(1)),
            ("b", Value::from("x")),
            ("z", Value::Boolean(true)),
        ]))?;
        let stored = table.project(handle, None)?;
        assert_eq!(stored, row([("a", Value::Int(1)), ("b", Value::from("x"))]));
        Ok(())
    }

    #[test]
    fn test_select_with_predicate() -> Result<()> {
        let dir = tempdir()?;
        let mut table = HeapTable::new(dir.path(), "t", ab_schema()?);
        table.create()?;

        for (a, b) in [(1, "x"), (2, "y"), (3, "x")] {
            table.insert(&row([("a", Value::Int(a)), ("b", Value::from(b))]))?;
        }

        let where_x = row([("b", Value::from("x"))]);
        let handles = table.select(Some(&where_x))?;
        let rows = table.project_all(&handles, Some(names(&["a"]).as_slice()))?;
        assert_eq!(
            rows,
            vec![row([("a", Value::Int(1))]), row([("a", Value::Int(3))])]
        );

        // empty predicate matches everything
        assert_eq!(table.select(Some(&Row::new()))?.len(), 3);

        let unknown = row([("c", Value::Int(0))]);
        assert!(matches!(
            table.select(Some(&unknown)),
            Err(RelationError::UnknownColumn(_))
        ));
        Ok(())
    }

    #[test]
    fn test_project_columns() -> Result<()> {
        let dir = tempdir()?;
        let mut table = HeapTable::new(dir.path(), "t", ab_schema()?);
        table.create()?;
        let handle = table.insert(&row([("a", Value::Int(7)), ("b", Value::from("seven"))]))?;

        assert_eq!(
            table.project(handle, Some(names(&["b"]).as_slice()))?,
            row([("b", Value::from("seven"))])
        );
        // an empty column list means every column
        assert_eq!(table.project(handle, Some(&[] as &[Identifier]))?.len(), 2);
        assert!(matches!(
            table.project(handle, Some(names(&["nope"]).as_slice())),
            Err(RelationError::UnknownColumn(_))
        ));
        Ok(())
    }

    #[test]
    fn test_delete() -> Result<()> {
        let dir = tempdir()?;
        let mut table = HeapTable::new(dir.path(), "t", ab_schema()?);
        table.create()?;

        let first = table.insert(&row([("a", Value::Int(1)), ("b", Value::from("one"))]))?;
        let second = table.insert(&row([("a", Value::Int(2)), ("b", Value::from("two"))]))?;
        table.del(first)?;

        assert_eq!(table.select(None)?, vec![second]);
        assert!(matches!(
            table.project(first, None),
            Err(RelationError::Storage(StorageError::SlotNotFound { .. }))
        ));
        assert!(table.del(first).is_err());

        // ids are not reused after a delete
        let third = table.insert(&row([("a", Value::Int(3)), ("b", Value::from("three"))]))?;
        assert_eq!(third.record_id, 3);
        Ok(())
    }

    #[test]
    fn test_update_in_place() -> Result<()> {
        let dir = tempdir()?;
        let mut table = HeapTable::new(dir.path(), "t", ab_schema()?);
        table.create()?;

        let handle = table.insert(&row([("a", Value::Int(1)), ("b", Value::from("short"))]))?;
        let other = table.insert(&row([("a", Value::Int(2)), ("b", Value::from("other"))]))?;

        let updated = table.update(handle, &row([("b", Value::from("a much longer value"))]))?;
        assert_eq!(updated, handle);
        assert_eq!(
            table.project(handle, None)?,
            row([("a", Value::Int(1)), ("b", Value::from("a much longer value"))])
        );
        assert_eq!(
            table.project(other, None)?,
            row([("a", Value::Int(2)), ("b", Value::from("other"))])
        );

        assert!(matches!(
            table.update(handle, &row([("c", Value::Int(0))])),
            Err(RelationError::UnknownColumn(_))
        ));
        assert!(matches!(
            table.update(handle, &row([("a", Value::from("x"))])),
            Err(RelationError::TypeMismatch { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_update_moves_row_when_block_is_full() -> Result<()> {
        let dir = tempdir()?;
        let mut table = HeapTable::new(dir.path(), "t", ab_schema()?);
        table.create()?;

        let handle = table.insert(&row([("a", Value::Int(1)), ("b", Value::from("x"))]))?;
        // fill the rest of block 1
        let filler_len = codec::MAX_ROW_SIZE - 6 - (6 + 1) - 4;
        table.insert(&row([
            ("a", Value::Int(2)),
            ("b", Value::Text("f".repeat(filler_len))),
        ]))?;
        assert_eq!(table.block_ids(), vec![BlockId(1)]);

        let moved = table.update(handle, &row([("b", Value::Text("y".repeat(100)))]))?;
        assert_eq!(moved.block_id, BlockId(2));
        assert_eq!(table.select(None)?.len(), 2);
        assert_eq!(
            table.project(moved, None)?,
            row([("a", Value::Int(1)), ("b", Value::Text("y".repeat(100)))])
        );
        assert!(table.project(handle, None).is_err());
        Ok(())
    }

    #[test]
    fn test_overflow_allocates_one_block() -> Result<()> {
        let dir = tempdir()?;
        let mut table = HeapTable::new(dir.path(), "t", ab_schema()?);
        table.create()?;

        // each row is 4 + 2 + 1000 bytes plus a 4 byte slot; four fit in a block
        let mut handles = Vec::new();
        for i in 0..5 {
            handles.push(table.insert(&row([
                ("a", Value::Int(i)),
                ("b", Value::Text("r".repeat(1000))),
            ]))?);
        }

        assert_eq!(table.block_ids(), vec![BlockId(1), BlockId(2)]);
        assert_eq!(handles[3], Handle::new(BlockId(1), 4));
        assert_eq!(handles[4], Handle::new(BlockId(2), 1));
        assert_eq!(table.select(None)?, handles);
        Ok(())
    }

    #[test]
    fn test_reopen_and_create_if_not_exists() -> Result<()> {
        let dir = tempdir()?;
        {
            let mut table = HeapTable::new(dir.path(), "t", ab_schema()?);
            table.create_if_not_exists()?;
            table.insert(&row([("a", Value::Int(1)), ("b", Value::from("kept"))]))?;
            table.close()?;
        }

        let mut table = HeapTable::new(dir.path(), "t", ab_schema()?);
        table.create_if_not_exists()?;
        let handles = table.select(None)?;
        assert_eq!(handles.len(), 1);
        let b = names(&["b"]);
        assert_eq!(
            table.project(handles[0], Some(b.as_slice()))?["b"],
            Value::from("kept")
        );

        let mut duplicate = HeapTable::new(dir.path(), "t", ab_schema()?);
        assert!(matches!(
            duplicate.create(),
            Err(RelationError::Storage(StorageError::AlreadyExists(_)))
        ));
        Ok(())
    }
}
