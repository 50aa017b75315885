use crate::storage::BlockStore;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_DATA_DIR: &str = "./slotdb_data";

/// Settings for a [`Database`](crate::database::Database) session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Directory holding one block file per table.
    pub data_dir: PathBuf,
    /// How long a statement waits for a table lock. `None` fails at once with
    /// a retryable error.
    pub lock_timeout: Option<Duration>,
}

impl Config {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            lock_timeout: None,
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn table_path(&self, table: &str) -> PathBuf {
        BlockStore::file_path(&self.data_dir, table)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(DEFAULT_DATA_DIR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.data_dir(), Path::new(DEFAULT_DATA_DIR));
        assert_eq!(config.lock_timeout, None);
        assert_eq!(
            config.table_path("users"),
            Path::new(DEFAULT_DATA_DIR).join("users.db")
        );
    }

    #[test]
    fn test_lock_timeout() {
        let config = Config::new("/tmp/db").with_lock_timeout(Duration::from_millis(250));
        assert_eq!(config.lock_timeout, Some(Duration::from_millis(250)));
    }
}
