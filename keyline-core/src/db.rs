/// Database handle
///
/// A database is a directory of table files. Handles are cheap to clone
/// and share one interior state; tables are loaded lazily on the first
/// transaction that names them.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::error::{Error, Result};
use crate::table::Table;
use crate::tx::Transaction;

#[derive(Clone)]
pub struct Database {
    inner: Arc<DbInner>,
}

struct DbInner {
    path: PathBuf,
    tables: RwLock<HashMap<String, Arc<Table>>>,
    next_tx_id: AtomicU64,
}

impl Database {
    /// Open the database directory at `path`, creating it when
    /// `create` is set. Fails with `NotFound` for a missing directory
    /// without `create`.
    pub fn open(path: impl AsRef<Path>, create: bool) -> Result<Database> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            if !create {
                return Err(Error::NotFound(format!(
                    "database {} does not exist",
                    path.display()
                )));
            }
            fs::create_dir_all(&path)?;
        } else if !path.is_dir() {
            return Err(Error::InvalidArgument(format!(
                "{} is not a database directory",
                path.display()
            )));
        }
        debug!(path = %path.display(), "opened database");
        Ok(Database {
            inner: Arc::new(DbInner {
                path,
                tables: RwLock::new(HashMap::new()),
                next_tx_id: AtomicU64::new(1),
            }),
        })
    }

    /// Delete the on-disk database at `path`.
    pub fn remove(path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::NotFound(format!(
                "database {} does not exist",
                path.display()
            )));
        }
        fs::remove_dir_all(path)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Begin a transaction on `table`, loading the table if needed.
    pub fn begin(&self, table: &str) -> Result<Transaction> {
        if !valid_table_name(table) {
            return Err(Error::InvalidArgument(format!(
                "invalid table name: {:?}",
                table
            )));
        }
        let table = self.table(table)?;
        let id = self.inner.next_tx_id.fetch_add(1, Ordering::SeqCst);
        Ok(Transaction::new(id, table))
    }

    /// Flush every dirty table. Returns the first flush error but keeps
    /// flushing the remaining tables.
    pub fn close(&self) -> Result<()> {
        let tables = self.inner.tables.read();
        let mut first_err = None;
        for table in tables.values() {
            if let Err(e) = table.flush() {
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }
        debug!(path = %self.inner.path.display(), "closed database");
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn table(&self, name: &str) -> Result<Arc<Table>> {
        if let Some(table) = self.inner.tables.read().get(name) {
            return Ok(table.clone());
        }
        let mut tables = self.inner.tables.write();
        // raced load
        if let Some(table) = tables.get(name) {
            return Ok(table.clone());
        }
        let table = Arc::new(Table::load(&self.inner.path, name)?);
        tables.insert(name.to_string(), table.clone());
        Ok(table)
    }
}

/// Table names become file names, so restrict them to a safe alphabet.
fn valid_table_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
