/// On-disk table representation
///
/// Each table is one bincode file of its ordered rows. Mutations happen in
/// memory and mark the table dirty; `flush` rewrites the file through a
/// temporary sibling and an atomic rename.

use std::collections::BTreeMap;
use std::fs;
use std::ops::Bound;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use parking_lot::RwLock;

use crate::error::{Error, Result};

pub(crate) const TABLE_EXT: &str = "tbl";

pub(crate) struct Table {
    path: PathBuf,
    state: RwLock<TableState>,
}

struct TableState {
    rows: BTreeMap<Bytes, Bytes>,
    dirty: bool,
}

impl Table {
    /// Load the table file under `dir`, or start empty if none exists yet.
    pub(crate) fn load(dir: &Path, name: &str) -> Result<Table> {
        let path = dir.join(format!("{}.{}", name, TABLE_EXT));
        let rows = if path.exists() {
            let data = fs::read(&path)?;
            bincode::deserialize(&data).map_err(|e| {
                Error::Corruption(format!("table file {}: {}", path.display(), e))
            })?
        } else {
            BTreeMap::new()
        };
        Ok(Table {
            path,
            state: RwLock::new(TableState { rows, dirty: false }),
        })
    }

    pub(crate) fn get(&self, key: &[u8]) -> Option<Bytes> {
        self.state.read().rows.get(key).cloned()
    }

    /// Apply a committed write set atomically.
    pub(crate) fn apply(&self, writes: BTreeMap<Bytes, Bytes>) {
        let mut state = self.state.write();
        state.rows.extend(writes);
        state.dirty = true;
    }

    /// Clone the committed rows within `[lower, upper)`.
    pub(crate) fn snapshot_range(
        &self,
        lower: Option<&Bytes>,
        upper: Option<&Bytes>,
    ) -> BTreeMap<Bytes, Bytes> {
        let state = self.state.read();
        range_of(&state.rows, lower, upper)
    }

    #[cfg(test)]
    fn is_dirty(&self) -> bool {
        self.state.read().dirty
    }

    /// Persist the rows if dirty. Writes a temporary sibling file and
    /// renames it over the table file so readers never see a torn write.
    pub(crate) fn flush(&self) -> Result<()> {
        let mut state = self.state.write();
        if !state.dirty {
            return Ok(());
        }
        let data = bincode::serialize(&state.rows)
            .map_err(|e| Error::Internal(format!("table encode: {}", e)))?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, &data)?;
        fs::rename(&tmp, &self.path)?;
        state.dirty = false;
        Ok(())
    }
}

/// Clone the entries of `rows` within `[lower, upper)`.
///
/// An inverted range (lower >= upper) is empty rather than a panic, which
/// is what `BTreeMap::range` would do with reversed bounds.
pub(crate) fn range_of(
    rows: &BTreeMap<Bytes, Bytes>,
    lower: Option<&Bytes>,
    upper: Option<&Bytes>,
) -> BTreeMap<Bytes, Bytes> {
    if let (Some(l), Some(u)) = (lower, upper) {
        if l >= u {
            return BTreeMap::new();
        }
    }
    let lo = match lower {
        Some(l) => Bound::Included(l.clone()),
        None => Bound::Unbounded,
    };
    let hi = match upper {
        Some(u) => Bound::Excluded(u.clone()),
        None => Bound::Unbounded,
    };
    rows.range((lo, hi))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}
