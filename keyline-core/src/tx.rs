/// Transactions and range cursors
///
/// A transaction buffers its writes in a private overlay; `commit`
/// applies the overlay to the table atomically, `commit_sync` also
/// flushes the table file. Reads consult the overlay before the
/// committed rows, so a transaction always sees its own writes.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::table::{range_of, Table};

pub struct Transaction {
    id: u64,
    table: Arc<Table>,
    writes: BTreeMap<Bytes, Bytes>,
}

impl Transaction {
    pub(crate) fn new(id: u64, table: Arc<Table>) -> Transaction {
        Transaction {
            id,
            table,
            writes: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Read `key`, preferring this transaction's uncommitted writes.
    pub fn get(&self, key: &[u8]) -> Result<Bytes> {
        if let Some(value) = self.writes.get(key) {
            return Ok(value.clone());
        }
        self.table
            .get(key)
            .ok_or_else(|| Error::NotFound(String::from_utf8_lossy(key).into_owned()))
    }

    /// Buffer a write. Nothing reaches the table until `commit`.
    pub fn put(&mut self, key: Bytes, value: Bytes) -> Result<()> {
        if key.is_empty() {
            return Err(Error::InvalidArgument("empty key".to_string()));
        }
        self.writes.insert(key, value);
        Ok(())
    }

    /// Apply the write set. The transaction is consumed; its id must not
    /// be reused.
    pub fn commit(self) -> Result<()> {
        self.table.apply(self.writes);
        Ok(())
    }

    /// Apply the write set and flush the table file.
    pub fn commit_sync(self) -> Result<()> {
        self.table.apply(self.writes);
        self.table.flush()
    }

    /// Discard the write set.
    pub fn rollback(self) -> Result<()> {
        Ok(())
    }

    /// Open a cursor over `[lower, upper)` (unbounded where `None`),
    /// merging committed rows with this transaction's overlay. The
    /// cursor captures a snapshot of the range at this point.
    pub fn lookup(&self, lower: Option<Bytes>, upper: Option<Bytes>) -> Result<Cursor> {
        let mut merged = self
            .table
            .snapshot_range(lower.as_ref(), upper.as_ref());
        merged.extend(range_of(&self.writes, lower.as_ref(), upper.as_ref()));
        Ok(Cursor {
            iter: merged.into_iter(),
        })
    }
}

/// Ascending cursor over one key range.
pub struct Cursor {
    iter: std::collections::btree_map::IntoIter<Bytes, Bytes>,
}

impl Cursor {
    /// The next pair, or `None` once the range is exhausted.
    pub fn next(&mut self) -> Option<(Bytes, Bytes)> {
        self.iter.next()
    }
}
