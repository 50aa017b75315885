//! slotdb - runs a scripted session against a data directory

use anyhow::{Context, Result};
use clap::Parser as ClapParser;
use slotdb::access::{row, Column, DataType, Value};
use slotdb::executor::Statement;
use slotdb::{Config, Database, DbError};
use std::path::PathBuf;
use std::time::Duration;

/// slotdb - a small slotted-page relational store
#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Data directory
    #[arg(short = 'D', long, default_value = slotdb::config::DEFAULT_DATA_DIR)]
    data_dir: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Wait up to this many milliseconds for a table lock instead of failing
    #[arg(short = 't', long)]
    lock_timeout_ms: Option<u64>,
}

impl Args {
    fn config(&self) -> Config {
        let config = Config::new(&self.data_dir);
        match self.lock_timeout_ms {
            Some(ms) => config.with_lock_timeout(Duration::from_millis(ms)),
            None => config,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let mut db = Database::open(args.config())
        .with_context(|| format!("Failed to open database at {}", args.data_dir.display()))?;
    println!("📁 Data directory: {}", args.data_dir.display());

    for statement in demo_session() {
        let kind = statement.kind();
        match db.execute(statement) {
            Ok(result) => println!("{}\n{}\n", kind, result),
            // rerunning the demo finds its rows already there
            Err(e @ DbError::DuplicateRow(_)) => println!("{}\n{}\n", kind, e),
            Err(e) if e.is_retryable() => {
                println!("{}\n{} (try again later)\n", kind, e);
            }
            Err(e) => return Err(e).with_context(|| format!("{} failed", kind)),
        }
    }

    Ok(())
}

fn demo_session() -> Vec<Statement> {
    let users = "users".to_string();
    let user = |id: i32, name: &str, active: bool| Statement::Insert {
        table: users.clone(),
        row: row([
            ("id", Value::Int(id)),
            ("name", Value::from(name)),
            ("active", Value::Boolean(active)),
        ]),
    };

    vec![
        Statement::CreateTable {
            name: users.clone(),
            columns: vec![
                Column::new("id", DataType::Int),
                Column::new("name", DataType::Text),
                Column::new("active", DataType::Boolean),
            ],
            if_not_exists: true,
        },
        user(1, "Alice", true),
        user(2, "Bob", false),
        Statement::ShowTables,
        Statement::ShowColumns {
            table: users.clone(),
        },
        Statement::Begin,
        Statement::Select {
            table: users.clone(),
            columns: Some(vec!["id".to_string(), "name".to_string()]),
            predicate: Some(row([("active", Value::Boolean(true))])),
        },
        user(3, "Carol", true),
        Statement::Update {
            table: users.clone(),
            values: row([("active", Value::Boolean(true))]),
            predicate: Some(row([("name", Value::from("Bob"))])),
        },
        Statement::Rollback,
        Statement::Select {
            table: users.clone(),
            columns: None,
            predicate: None,
        },
    ]
}
