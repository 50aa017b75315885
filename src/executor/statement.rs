//! Statements accepted by the database and the results they produce.

use crate::access::{Column, Identifier, Row};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    CreateTable {
        name: Identifier,
        columns: Vec<Column>,
        if_not_exists: bool,
    },
    DropTable {
        name: Identifier,
    },
    /// Insert one complete row.
    Insert {
        table: Identifier,
        row: Row,
    },
    /// Set `values` on every row matching `predicate`.
    Update {
        table: Identifier,
        values: Row,
        predicate: Option<Row>,
    },
    Delete {
        table: Identifier,
        predicate: Option<Row>,
    },
    Select {
        table: Identifier,
        columns: Option<Vec<Identifier>>,
        predicate: Option<Row>,
    },
    ShowTables,
    /// Column declarations of one table.
    ShowColumns {
        table: Identifier,
    },
    Begin,
    Commit,
    Rollback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    CreateTable,
    DropTable,
    Insert,
    Update,
    Delete,
    Select,
    ShowTables,
    ShowColumns,
    Begin,
    Commit,
    Rollback,
}

impl StatementKind {
    /// Read-only statements only need a shared lock.
    pub fn is_read_only(self) -> bool {
        matches!(
            self,
            StatementKind::Select | StatementKind::ShowTables | StatementKind::ShowColumns
        )
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StatementKind::CreateTable => "CREATE TABLE",
            StatementKind::DropTable => "DROP TABLE",
            StatementKind::Insert => "INSERT",
            StatementKind::Update => "UPDATE",
            StatementKind::Delete => "DELETE",
            StatementKind::Select => "SELECT",
            StatementKind::ShowTables => "SHOW TABLES",
            StatementKind::ShowColumns => "SHOW COLUMNS",
            StatementKind::Begin => "BEGIN",
            StatementKind::Commit => "COMMIT",
            StatementKind::Rollback => "ROLLBACK",
        };
        write!(f, "{}", s)
    }
}

impl Statement {
    pub fn kind(&self) -> StatementKind {
        match self {
            Statement::CreateTable { .. } => StatementKind::CreateTable,
            Statement::DropTable { .. } => StatementKind::DropTable,
            Statement::Insert { .. } => StatementKind::Insert,
            Statement::Update { .. } => StatementKind::Update,
            Statement::Delete { .. } => StatementKind::Delete,
            Statement::Select { .. } => StatementKind::Select,
            Statement::ShowTables => StatementKind::ShowTables,
            Statement::ShowColumns { .. } => StatementKind::ShowColumns,
            Statement::Begin => StatementKind::Begin,
            Statement::Commit => StatementKind::Commit,
            Statement::Rollback => StatementKind::Rollback,
        }
    }

    /// The table a statement touches, if any.
    pub fn table_name(&self) -> Option<&str> {
        match self {
            Statement::CreateTable { name, .. } | Statement::DropTable { name } => Some(name),
            Statement::Insert { table, .. }
            | Statement::Update { table, .. }
            | Statement::Delete { table, .. }
            | Statement::Select { table, .. }
            | Statement::ShowColumns { table } => Some(table),
            Statement::ShowTables | Statement::Begin | Statement::Commit | Statement::Rollback => {
                None
            }
        }
    }
}

/// Outcome of one statement: optional result rows plus a status message.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryResult {
    pub column_names: Vec<Identifier>,
    pub rows: Vec<Row>,
    pub message: String,
}

impl QueryResult {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn rows(column_names: Vec<Identifier>, rows: Vec<Row>) -> Self {
        let message = format!("successfully returned {} rows", rows.len());
        Self {
            column_names,
            rows,
            message,
        }
    }
}

impl fmt::Display for QueryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.column_names.is_empty() {
            writeln!(f, "{}", self.column_names.join(" "))?;
            writeln!(f, "{}", "+".repeat(self.column_names.len() * 10))?;
            for row in &self.rows {
                let values: Vec<String> = self
                    .column_names
                    .iter()
                    .map(|name| row.get(name).map(|v| v.to_string()).unwrap_or_default())
                    .collect();
                writeln!(f, "{}", values.join(" "))?;
            }
        }
        write!(f, "{}", self.message)
    }
}
