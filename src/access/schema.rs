use crate::access::error::{RelationError, RelationResult};
use crate::access::value::{DataType, Identifier};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One declared column of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: Identifier,
    pub data_type: DataType,
}

impl Column {
    pub fn new(name: impl Into<Identifier>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// Ordered column declarations of a table.
///
/// The order fixes the on-disk record layout; records written under one
/// schema cannot be read back under another.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ColumnSchema {
    columns: Vec<Column>,
}

impl ColumnSchema {
    pub fn new(columns: Vec<Column>) -> RelationResult<Self> {
        let mut seen = HashSet::new();
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(RelationError::DuplicateColumn(column.name.clone()));
            }
        }
        Ok(Self { columns })
    }

    /// Builds a schema from `(name, type)` pairs.
    pub fn from_pairs<S, I>(pairs: I) -> RelationResult<Self>
    where
        S: Into<Identifier>,
        I: IntoIterator<Item = (S, DataType)>,
    {
        Self::new(
            pairs
                .into_iter()
                .map(|(name, data_type)| Column::new(name, data_type))
                .collect(),
        )
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Column> {
        self.columns.iter()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn names(&self) -> Vec<Identifier> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn data_type(&self, name: &str) -> Option<DataType> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.data_type)
    }

    /// Data types of the named columns, in the order given.
    pub fn get_column_attributes(&self, names: &[Identifier]) -> RelationResult<Vec<DataType>> {
        names
            .iter()
            .map(|name| {
                self.data_type(name)
                    .ok_or_else(|| RelationError::UnknownColumn(name.clone()))
            })
            .collect()
    }
}

impl<'a> IntoIterator for &'a ColumnSchema {
    type Item = &'a Column;
    type IntoIter = std::slice::Iter<'a, Column>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.iter()
    }
}
