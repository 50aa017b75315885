//! Schema catalog.
//!
//! Table names and column declarations are themselves stored in two heap
//! tables, `_tables (table_name TEXT)` and
//! `_columns (table_name TEXT, column_name TEXT, data_type TEXT)`. Columns of a
//! table are kept in declaration order because they are appended together and
//! never updated.

use crate::access::{
    row, Column, ColumnSchema, DataType, HeapTable, Identifier, Relation, RelationResult, Row,
    Value,
};
use crate::storage::StorageError;
use std::path::Path;

pub const TABLES_TABLE: &str = "_tables";
pub const COLUMNS_TABLE: &str = "_columns";

pub struct Catalog {
    tables: HeapTable,
    columns: HeapTable,
}

impl Catalog {
    /// Opens the catalog in `dir`, creating its tables on first use.
    pub fn open(dir: &Path) -> RelationResult<Self> {
        let mut catalog = Self {
            tables: HeapTable::new(dir, TABLES_TABLE, tables_schema()?),
            columns: HeapTable::new(dir, COLUMNS_TABLE, columns_schema()?),
        };
        catalog.tables.create_if_not_exists()?;
        catalog.columns.create_if_not_exists()?;
        catalog.close()?;
        Ok(catalog)
    }

    pub fn is_system_table(name: &str) -> bool {
        name == TABLES_TABLE || name == COLUMNS_TABLE
    }

    /// Names of user tables, in creation order.
    pub fn table_names(&mut self) -> RelationResult<Vec<Identifier>> {
        let handles = self.tables.select(None)?;
        self.tables
            .project_all(&handles, None)?
            .iter()
            .map(|r| text(r, "table_name"))
            .collect()
    }

    pub fn contains(&mut self, name: &str) -> RelationResult<bool> {
        Ok(!self.tables.select(Some(&by_table(name)))?.is_empty())
    }

    /// Declared schema of `name`, `None` if no such table is registered.
    pub fn schema(&mut self, name: &str) -> RelationResult<Option<ColumnSchema>> {
        match name {
            TABLES_TABLE => return tables_schema().map(Some),
            COLUMNS_TABLE => return columns_schema().map(Some),
            _ => {}
        }
        if !self.contains(name)? {
            return Ok(None);
        }

        let handles = self.columns.select(Some(&by_table(name)))?;
        let mut columns = Vec::with_capacity(handles.len());
        for r in self.columns.project_all(&handles, None)? {
            let type_name = text(&r, "data_type")?;
            let data_type = DataType::parse(&type_name).ok_or_else(|| {
                StorageError::CorruptRecord(format!(
                    "unknown data type '{}' in catalog for {}",
                    type_name, name
                ))
            })?;
            columns.push(Column::new(text(&r, "column_name")?, data_type));
        }
        ColumnSchema::new(columns).map(Some)
    }

    pub fn register(&mut self, name: &str, schema: &ColumnSchema) -> RelationResult<()> {
        self.tables.insert(&by_table(name))?;
        for column in schema {
            self.columns.insert(&row([
                ("table_name", Value::from(name)),
                ("column_name", Value::from(column.name.as_str())),
                ("data_type", Value::Text(column.data_type.to_string())),
            ]))?;
        }
        log::debug!("registered {} with {} columns", name, schema.len());
        Ok(())
    }

    /// Removes every catalog row of `name`.
    pub fn unregister(&mut self, name: &str) -> RelationResult<()> {
        let key = by_table(name);
        for handle in self.columns.select(Some(&key))? {
            self.columns.del(handle)?;
        }
        for handle in self.tables.select(Some(&key))? {
            self.tables.del(handle)?;
        }
        log::debug!("unregistered {}", name);
        Ok(())
    }

    /// Closes the catalog files. They are reopened on next use, picking up
    /// blocks appended by other sessions.
    pub fn close(&mut self) -> RelationResult<()> {
        self.tables.close()?;
        self.columns.close()
    }
}

fn tables_schema() -> RelationResult<ColumnSchema> {
    ColumnSchema::from_pairs([("table_name", DataType::Text)])
}

fn columns_schema() -> RelationResult<ColumnSchema> {
    ColumnSchema::from_pairs([
        ("table_name", DataType::Text),
        ("column_name", DataType::Text),
        ("data_type", DataType::Text),
    ])
}

fn by_table(name: &str) -> Row {
    row([("table_name", Value::from(name))])
}

fn text(r: &Row, column: &str) -> RelationResult<String> {
    match r.get(column) {
        Some(Value::Text(s)) => Ok(s.clone()),
        _ => Err(StorageError::CorruptRecord(format!("catalog row without {}", column)).into()),
    }
}
