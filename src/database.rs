//! Statement execution context.
//!
//! A [`Database`] is one session over a data directory: it owns the catalog
//! handle and the transaction manager, and runs [`Statement`]s one at a time.
//! Table files are opened per statement and closed afterwards, so sessions
//! sharing a directory always see each other's committed blocks.

use crate::access::{row, Column, ColumnSchema, HeapTable, Identifier, Relation, Row, Value};
use crate::catalog::{Catalog, COLUMNS_TABLE, TABLES_TABLE};
use crate::concurrency::{LockHandle, LockTable};
use crate::config::Config;
use crate::error::{DbError, DbResult};
use crate::executor::{EvalPlan, QueryResult, Statement, StatementKind};
use crate::transaction::{RolledBack, Snapshot, TableSnapshot, TransactionManager};
use std::collections::BTreeSet;
use std::fs;
use std::sync::Arc;

pub struct Database {
    config: Config,
    catalog: Catalog,
    locks: Arc<LockTable>,
    transactions: TransactionManager,
}

impl Database {
    /// Opens a session with its own in-process lock table.
    pub fn open(config: Config) -> DbResult<Self> {
        Self::with_lock_table(config, Arc::new(LockTable::new()))
    }

    /// Opens a session sharing `locks` with other sessions of this process.
    pub fn with_lock_table(config: Config, locks: Arc<LockTable>) -> DbResult<Self> {
        fs::create_dir_all(config.data_dir())?;
        let catalog = Catalog::open(config.data_dir())?;
        let transactions = TransactionManager::new(config.data_dir(), Arc::clone(&locks));
        log::info!("opened database at {}", config.data_dir().display());

        Ok(Self {
            config,
            catalog,
            locks,
            transactions,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn lock_table(&self) -> Arc<LockTable> {
        Arc::clone(&self.locks)
    }

    pub fn transactions(&self) -> &TransactionManager {
        &self.transactions
    }

    pub fn table_names(&mut self) -> DbResult<Vec<Identifier>> {
        let names = self.catalog.table_names();
        self.catalog.close()?;
        Ok(names?)
    }

    pub fn execute(&mut self, statement: Statement) -> DbResult<QueryResult> {
        let kind = statement.kind();
        log::debug!("execute {}", kind);

        let result = match statement {
            Statement::CreateTable {
                name,
                columns,
                if_not_exists,
            } => self.create_table(&name, columns, if_not_exists),
            Statement::DropTable { name } => self.drop_table(&name),
            Statement::Insert { table, row } => self.insert(&table, &row),
            Statement::Update {
                table,
                values,
                predicate,
            } => self.update(&table, &values, predicate.as_ref()),
            Statement::Delete { table, predicate } => self.delete(&table, predicate.as_ref()),
            Statement::Select {
                table,
                columns,
                predicate,
            } => self.select(&table, columns, predicate),
            Statement::ShowTables => self.show_tables(),
            Statement::ShowColumns { table } => self.show_columns(&table),
            Statement::Begin => self.begin(),
            Statement::Commit => self.commit(),
            Statement::Rollback => self.rollback(),
        };

        if let Err(e) = self.catalog.close() {
            log::warn!("failed to close catalog: {}", e);
        }
        if let Err(e) = &result {
            log::debug!("{} failed: {}", kind, e);
        }
        result
    }

    fn create_table(
        &mut self,
        name: &str,
        columns: Vec<Column>,
        if_not_exists: bool,
    ) -> DbResult<QueryResult> {
        if !is_valid_table_name(name) {
            return Err(DbError::InvalidTableName(name.to_string()));
        }
        if Catalog::is_system_table(name) {
            return Err(DbError::SystemTable(name.to_string()));
        }
        let schema = ColumnSchema::new(columns)?;
        if self.catalog.contains(name)? {
            if if_not_exists {
                return Ok(QueryResult::message(format!("table {} already exists", name)));
            }
            return Err(DbError::TableExists(name.to_string()));
        }

        self.catalog.register(name, &schema)?;
        let mut table = HeapTable::new(self.config.data_dir(), name, schema);
        if let Err(e) = table.create().and_then(|()| table.close()) {
            if let Err(undo) = self.catalog.unregister(name) {
                log::warn!("could not undo catalog entries for {}: {}", name, undo);
            }
            return Err(e.into());
        }

        if self.transactions.in_transaction() {
            self.transactions
                .record_statement(StatementKind::CreateTable, Some(name))?;
        }
        Ok(QueryResult::message(format!("created {}", name)))
    }

    fn drop_table(&mut self, name: &str) -> DbResult<QueryResult> {
        check_writable(name)?;
        let mut table = self.open_table(name)?;
        let lock = self.lock(StatementKind::DropTable, name)?;

        let result = match table.drop() {
            Ok(()) => self.catalog.unregister(name).map_err(DbError::from),
            Err(e) => Err(e.into()),
        };
        self.release(lock, result)?;
        Ok(QueryResult::message(format!("dropped {}", name)))
    }

    fn insert(&mut self, name: &str, new_row: &Row) -> DbResult<QueryResult> {
        check_writable(name)?;
        self.with_table(StatementKind::Insert, name, |table| {
            let full = table.validate(new_row)?;
            if !table.select(Some(&full))?.is_empty() {
                return Err(DbError::DuplicateRow(name.to_string()));
            }
            let handle = table.insert(&full)?;
            log::debug!("inserted {} into {}", handle, name);
            Ok(QueryResult::message(format!(
                "successfully inserted 1 row into {}",
                name
            )))
        })
    }

    fn update(
        &mut self,
        name: &str,
        values: &Row,
        predicate: Option<&Row>,
    ) -> DbResult<QueryResult> {
        check_writable(name)?;
        self.with_table(StatementKind::Update, name, |table| {
            let handles = table.select(predicate)?;
            for handle in &handles {
                table.update(*handle, values)?;
            }
            Ok(QueryResult::message(format!(
                "successfully updated {} rows in {}",
                handles.len(),
                name
            )))
        })
    }

    fn delete(&mut self, name: &str, predicate: Option<&Row>) -> DbResult<QueryResult> {
        check_writable(name)?;
        self.with_table(StatementKind::Delete, name, |table| {
            let handles = table.select(predicate)?;
            for handle in &handles {
                table.del(*handle)?;
            }
            Ok(QueryResult::message(format!(
                "successfully deleted {} rows from {}",
                handles.len(),
                name
            )))
        })
    }

    fn select(
        &mut self,
        name: &str,
        columns: Option<Vec<Identifier>>,
        predicate: Option<Row>,
    ) -> DbResult<QueryResult> {
        self.with_table(StatementKind::Select, name, |table| {
            let column_names = match &columns {
                Some(columns) if !columns.is_empty() => {
                    table.schema().get_column_attributes(columns)?;
                    columns.clone()
                }
                _ => table.schema().names(),
            };
            let rows = EvalPlan::table_scan(table)
                .filter(predicate)
                .project(columns)
                .evaluate()?;
            Ok(QueryResult::rows(column_names, rows))
        })
    }

    fn show_tables(&mut self) -> DbResult<QueryResult> {
        let lock = self.lock(StatementKind::ShowTables, TABLES_TABLE)?;
        let result = self.catalog.table_names().map_err(DbError::from);
        let names = self.release(lock, result)?;

        let rows = names
            .into_iter()
            .map(|name| row([("table_name", Value::Text(name))]))
            .collect();
        Ok(QueryResult::rows(vec!["table_name".to_string()], rows))
    }

    fn show_columns(&mut self, name: &str) -> DbResult<QueryResult> {
        let lock = self.lock(StatementKind::ShowColumns, COLUMNS_TABLE)?;
        let result = self.catalog.schema(name).map_err(DbError::from);
        let schema = self
            .release(lock, result)?
            .ok_or_else(|| DbError::UnknownTable(name.to_string()))?;

        let rows = schema
            .iter()
            .map(|column| {
                row([
                    ("table_name", Value::from(name)),
                    ("column_name", Value::from(column.name.as_str())),
                    ("data_type", Value::Text(column.data_type.to_string())),
                ])
            })
            .collect();
        let column_names = ["table_name", "column_name", "data_type"]
            .map(String::from)
            .to_vec();
        Ok(QueryResult::rows(column_names, rows))
    }

    fn begin(&mut self) -> DbResult<QueryResult> {
        let snapshot = self.snapshot()?;
        let id = self.transactions.begin();
        self.transactions.checkpoint(id, &snapshot)?;
        log::info!("begin {}", id);
        Ok(QueryResult::message(format!("begin transaction {}", id)))
    }

    fn commit(&mut self) -> DbResult<QueryResult> {
        let id = self.transactions.commit()?;
        let snapshot = self.snapshot()?;
        self.transactions.checkpoint(id, &snapshot)?;
        log::info!("commit {}", id);
        Ok(QueryResult::message(format!("committed transaction {}", id)))
    }

    fn rollback(&mut self) -> DbResult<QueryResult> {
        let RolledBack {
            transaction_id,
            restore_point,
            tables,
        } = self.transactions.rollback()?;
        if let Some(snapshot) = restore_point {
            self.restore(&snapshot, &tables)?;
        }
        log::info!("rollback {}", transaction_id);
        Ok(QueryResult::message(format!(
            "rolled back transaction {}",
            transaction_id
        )))
    }

    /// Every user table with its schema and live rows.
    fn snapshot(&mut self) -> DbResult<Snapshot> {
        let mut tables = Vec::new();
        for name in self.catalog.table_names()? {
            let mut table = self.open_table(&name)?;
            let handles = table.select(None)?;
            let rows = table.project_all(&handles, None)?;
            table.close()?;
            tables.push(TableSnapshot {
                name,
                schema: table.schema().clone(),
                rows,
            });
        }
        Ok(Snapshot { tables })
    }

    /// Brings each of `written` back to its state in `snapshot`: tables the
    /// snapshot lacks are dropped, missing ones recreated and rows replaced.
    /// Other tables are left alone. Row handles are not preserved.
    fn restore(&mut self, snapshot: &Snapshot, written: &BTreeSet<Identifier>) -> DbResult<()> {
        for name in written {
            let saved = snapshot.table(name);
            let current = self.catalog.schema(name)?;
            let replace = match (saved, &current) {
                (Some(saved), Some(current)) => saved.schema != *current,
                (_, current) => current.is_some(),
            };
            if replace {
                let mut table = self.open_table(name)?;
                table.drop()?;
                self.catalog.unregister(name)?;
                log::debug!("rollback dropped {}", name);
            }

            let Some(saved) = saved else {
                continue;
            };
            if replace || current.is_none() {
                self.catalog.register(&saved.name, &saved.schema)?;
                log::debug!("rollback recreated {}", saved.name);
            }
            let mut table = HeapTable::new(self.config.data_dir(), name, saved.schema.clone());
            table.create_if_not_exists()?;

            let handles = table.select(None)?;
            if table.project_all(&handles, None)? != saved.rows {
                for handle in handles {
                    table.del(handle)?;
                }
                for r in &saved.rows {
                    table.insert(r)?;
                }
            }
            table.close()?;
        }
        Ok(())
    }

    fn open_table(&mut self, name: &str) -> DbResult<HeapTable> {
        let schema = self
            .catalog
            .schema(name)?
            .ok_or_else(|| DbError::UnknownTable(name.to_string()))?;
        Ok(HeapTable::new(self.config.data_dir(), name, schema))
    }

    /// Runs `f` against `name` under the statement's lock.
    fn with_table<T, F>(&mut self, kind: StatementKind, name: &str, f: F) -> DbResult<T>
    where
        F: FnOnce(&mut HeapTable) -> DbResult<T>,
    {
        let mut table = self.open_table(name)?;
        let lock = self.lock(kind, name)?;

        let result = f(&mut table);
        let closed = table.close();
        let result = result.and_then(|value| closed.map(|()| value).map_err(DbError::from));
        self.release(lock, result)
    }

    /// Takes the table lock for one statement when a transaction is active.
    fn lock(&mut self, kind: StatementKind, table: &str) -> DbResult<Option<LockHandle>> {
        let Some(id) = self.transactions.current_transaction_id() else {
            return Ok(None);
        };

        let handle = match self.config.lock_timeout {
            Some(timeout) => self
                .transactions
                .request_lock_timeout(id, kind, table, timeout),
            None => self.transactions.request_lock(id, kind, table),
        }
        .map_err(|e| {
            if e.is_retryable() {
                log::warn!("{} on {} must be retried: {}", kind, table, e);
            }
            e
        })?;

        self.transactions.record_statement(kind, Some(table))?;
        Ok(Some(handle))
    }

    /// Releases a statement lock. An error from the statement wins over an
    /// error from the unlock.
    fn release<T>(&self, lock: Option<LockHandle>, result: DbResult<T>) -> DbResult<T> {
        if let Some(lock) = lock {
            if let Err(e) = self.transactions.release_lock(lock) {
                if result.is_ok() {
                    return Err(e.into());
                }
                log::warn!("failed to release lock: {}", e);
            }
        }
        result
    }
}

/// Table names become file names inside the data directory.
fn is_valid_table_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}

fn check_writable(name: &str) -> DbResult<()> {
    if Catalog::is_system_table(name) {
        Err(DbError::SystemTable(name.to_string()))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{DataType, RelationError};
    use crate::transaction::LogEvent;
    use crate::storage::StorageError;
    use anyhow::Result;
    use std::fs::File;
    use tempfile::tempdir;

    fn create_ab(name: &str) -> Statement {
        Statement::CreateTable {
            name: name.to_string(),
            columns: vec![Column::new("a", DataType::Int), Column::new("b", DataType::Text)],
            if_not_exists: false,
        }
    }

    fn insert_ab(table: &str, a: i32, b: &str) -> Statement {
        Statement::Insert {
            table: table.to_string(),
            row: row([("a", Value::Int(a)), ("b", Value::from(b))]),
        }
    }

    fn select_all(table: &str) -> Statement {
        Statement::Select {
            table: table.to_string(),
            columns: None,
            predicate: None,
        }
    }

    #[test]
    fn test_create_insert_select() -> Result<()> {
        let dir = tempdir()?;
        let mut db = Database::open(Config::new(dir.path()))?;

        db.execute(create_ab("t"))?;
        db.execute(insert_ab("t", 12, "Hello!"))?;

        let result = db.execute(select_all("t"))?;
        assert_eq!(result.column_names, vec!["a", "b"]);
        assert_eq!(
            result.rows,
            vec![row([("a", Value::Int(12)), ("b", Value::from("Hello!"))])]
        );
        assert!(dir.path().join("t.db").exists());
        Ok(())
    }

    #[test]
    fn test_create_existing_table() -> Result<()> {
        let dir = tempdir()?;
        let mut db = Database::open(Config::new(dir.path()))?;
        db.execute(create_ab("t"))?;

        assert!(matches!(
            db.execute(create_ab("t")),
            Err(DbError::TableExists(name)) if name == "t"
        ));

        let again = Statement::CreateTable {
            name: "t".to_string(),
            columns: vec![],
            if_not_exists: true,
        };
        assert_eq!(
            db.execute(again)?.message,
            "table t already exists".to_string()
        );
        Ok(())
    }

    #[test]
    fn test_failed_create_is_undone() -> Result<()> {
        let dir = tempdir()?;
        let mut db = Database::open(Config::new(dir.path()))?;
        // a stray file blocks the physical create after the catalog insert
        File::create(dir.path().join("t.db"))?;

        assert!(matches!(
            db.execute(create_ab("t")),
            Err(DbError::Relation(RelationError::Storage(
                StorageError::AlreadyExists(_)
            )))
        ));
        assert!(db.table_names()?.is_empty());
        Ok(())
    }

    #[test]
    fn test_invalid_table_names() -> Result<()> {
        let dir = tempdir()?;
        let data_dir = dir.path().join("data");
        let mut db = Database::open(Config::new(&data_dir))?;

        for name in ["", ".", "..", "../escaped", "a/b", "a\\b", "nul\0"] {
            assert!(
                matches!(db.execute(create_ab(name)), Err(DbError::InvalidTableName(_))),
                "{:?} accepted",
                name
            );
        }
        assert!(!dir.path().join("escaped.db").exists());
        assert!(db.table_names()?.is_empty());

        db.execute(create_ab("with.dots-and_more"))?;
        assert!(data_dir.join("with.dots-and_more.db").exists());
        Ok(())
    }

    #[test]
    fn test_duplicate_row_rejected() -> Result<()> {
        let dir = tempdir()?;
        let mut db = Database::open(Config::new(dir.path()))?;
        db.execute(create_ab("t"))?;
        db.execute(insert_ab("t", 1, "x"))?;

        assert!(matches!(
            db.execute(insert_ab("t", 1, "x")),
            Err(DbError::DuplicateRow(_))
        ));
        db.execute(insert_ab("t", 1, "y"))?;
        assert_eq!(db.execute(select_all("t"))?.rows.len(), 2);
        Ok(())
    }

    #[test]
    fn test_unknown_table_and_system_tables() -> Result<()> {
        let dir = tempdir()?;
        let mut db = Database::open(Config::new(dir.path()))?;

        assert!(matches!(
            db.execute(select_all("missing")),
            Err(DbError::UnknownTable(_))
        ));
        assert!(matches!(
            db.execute(Statement::DropTable {
                name: TABLES_TABLE.to_string()
            }),
            Err(DbError::SystemTable(_))
        ));
        assert!(matches!(
            db.execute(create_ab(TABLES_TABLE)),
            Err(DbError::SystemTable(_))
        ));

        db.execute(create_ab("t"))?;
        let tables = db.execute(select_all(TABLES_TABLE))?;
        assert_eq!(tables.rows, vec![row([("table_name", Value::from("t"))])]);
        Ok(())
    }

    #[test]
    fn test_show_columns() -> Result<()> {
        let dir = tempdir()?;
        let mut db = Database::open(Config::new(dir.path()))?;
        db.execute(create_ab("t"))?;

        let show = |table: &str| Statement::ShowColumns {
            table: table.to_string(),
        };
        let result = db.execute(show("t"))?;
        assert_eq!(result.column_names, vec!["table_name", "column_name", "data_type"]);
        assert_eq!(
            result.rows,
            vec![
                row([
                    ("table_name", Value::from("t")),
                    ("column_name", Value::from("a")),
                    ("data_type", Value::from("INT")),
                ]),
                row([
                    ("table_name", Value::from("t")),
                    ("column_name", Value::from("b")),
                    ("data_type", Value::from("TEXT")),
                ]),
            ]
        );

        assert!(matches!(
            db.execute(show("missing")),
            Err(DbError::UnknownTable(name)) if name == "missing"
        ));

        // shared lock on the column catalog, logged as a read
        db.execute(Statement::Begin)?;
        assert_eq!(db.execute(show("t"))?.rows.len(), 2);
        assert!(db.transactions().log().records().iter().any(|r| matches!(
            &r.event,
            LogEvent::Statement { kind: StatementKind::ShowColumns, table: Some(t) }
                if t == COLUMNS_TABLE
        )));
        db.execute(Statement::Commit)?;
        Ok(())
    }

    #[test]
    fn test_rollback_restores_rows() -> Result<()> {
        let dir = tempdir()?;
        let mut db = Database::open(Config::new(dir.path()))?;
        db.execute(create_ab("t"))?;
        db.execute(insert_ab("t", 1, "kept"))?;

        db.execute(Statement::Begin)?;
        db.execute(insert_ab("t", 2, "discarded"))?;
        db.execute(Statement::Delete {
            table: "t".to_string(),
            predicate: Some(row([("a", Value::Int(1))])),
        })?;
        db.execute(Statement::Rollback)?;

        assert_eq!(
            db.execute(select_all("t"))?.rows,
            vec![row([("a", Value::Int(1)), ("b", Value::from("kept"))])]
        );
        assert!(!db.transactions().in_transaction());
        Ok(())
    }
}
