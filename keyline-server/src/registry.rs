/// Database registry
///
/// Process-wide map from canonical database path to one shared engine
/// handle with a reference count. At most one handle exists per path;
/// every mutation happens under a single lock. Open and close are rare
/// next to read/write traffic, so one coarse mutex is enough.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use keyline_core::{Database, Error, Result};
use parking_lot::Mutex;
use tracing::{debug, info};

pub struct Registry {
    root: PathBuf,
    entries: Mutex<HashMap<PathBuf, Entry>>,
}

struct Entry {
    refcount: usize,
    db: Database,
}

impl Registry {
    pub fn new(root: impl Into<PathBuf>) -> Registry {
        Registry {
            root: root.into(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve a client-supplied database name against the root
    /// directory. Names must stay inside the root.
    fn resolve(&self, dbname: &str) -> Result<PathBuf> {
        if dbname.is_empty() {
            return Err(Error::InvalidArgument("empty database name".to_string()));
        }
        let name = Path::new(dbname);
        for component in name.components() {
            match component {
                Component::Normal(_) => {}
                _ => {
                    return Err(Error::InvalidArgument(format!(
                        "invalid database name: {:?}",
                        dbname
                    )))
                }
            }
        }
        Ok(self.root.join(name))
    }

    /// Share the existing handle for `dbname`, or open a new one with
    /// refcount 1. Engine open failures propagate verbatim.
    pub fn acquire(&self, dbname: &str, create: bool) -> Result<(PathBuf, Database)> {
        let path = self.resolve(dbname)?;
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(&path) {
            entry.refcount += 1;
            debug!(path = %path.display(), refcount = entry.refcount, "sharing open database");
            return Ok((path.clone(), entry.db.clone()));
        }
        let db = Database::open(&path, create)?;
        info!(path = %path.display(), "opened database");
        entries.insert(
            path.clone(),
            Entry {
                refcount: 1,
                db: db.clone(),
            },
        );
        Ok((path, db))
    }

    /// Drop one reference to `path`. The last reference physically
    /// closes the handle; the entry leaves the map even when that close
    /// fails, and the failure is returned to the caller.
    pub fn release(&self, path: &Path) -> Result<()> {
        let mut entries = self.entries.lock();
        match entries.get_mut(path) {
            None => Err(Error::Internal(format!(
                "database {} is not open",
                path.display()
            ))),
            Some(entry) if entry.refcount > 1 => {
                entry.refcount -= 1;
                debug!(path = %path.display(), refcount = entry.refcount, "released database reference");
                Ok(())
            }
            Some(_) => match entries.remove(path) {
                Some(entry) => {
                    info!(path = %path.display(), "closing database");
                    entry.db.close()
                }
                None => Ok(()),
            },
        }
    }

    /// Delete the on-disk database. Refused while any session holds a
    /// reference to it.
    pub fn remove(&self, dbname: &str) -> Result<()> {
        let path = self.resolve(dbname)?;
        let entries = self.entries.lock();
        if entries.contains_key(&path) {
            return Err(Error::InUse(path.display().to_string()));
        }
        info!(path = %path.display(), "removing database");
        Database::remove(&path)
    }

    #[cfg(test)]
    fn refcount(&self, dbname: &str) -> Option<usize> {
        let path = self.resolve(dbname).ok()?;
        self.entries.lock().get(&path).map(|e| e.refcount)
    }

    #[cfg(test)]
    fn open_count(&self) -> usize {
        self.entries.lock().len()
    }
}
