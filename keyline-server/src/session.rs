/// Remote session
///
/// One session per client connection. Requests are processed strictly
/// one at a time to completion, so replies correlate to requests by
/// stream order alone. The session owns at most one registry reference,
/// its open transactions, and its open range cursors; all of it is torn
/// down when the stream ends, with open transactions rolled back before
/// the database reference is released.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use keyline_core::{Cursor, Database, Error};
use keyline_proto::{
    read_frame, write_frame, KeyValue, Reply, Request, END_OF_DATA, SCAN_BATCH_SIZE,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use crate::registry::Registry;

const ERR_NO_DATABASE: &str = "no database open";
const ERR_ALREADY_OPEN: &str = "database already open";
const ERR_INVALID_TX: &str = "invalid transaction id";
const ERR_INVALID_ITERATOR: &str = "invalid iterator id";
const ERR_TX_OUTSTANDING: &str = "transactions outstanding";

pub struct Session {
    registry: Arc<Registry>,
    peer: String,
    db: Option<OpenDb>,
    txs: HashMap<u64, TxHandle>,
    cursors: HashMap<u64, Cursor>,
    // Monotonic; iterator ids are never reused within a session.
    next_iterator_id: u64,
}

struct OpenDb {
    path: PathBuf,
    db: Database,
}

struct TxHandle {
    tx: keyline_core::Transaction,
    /// First unreported fire-and-forget put failure. Surfaces at the
    /// next `Commit` and blocks `Get` until then.
    poisoned: Option<String>,
}

impl Session {
    pub fn new(registry: Arc<Registry>, peer: String) -> Session {
        Session {
            registry,
            peer,
            db: None,
            txs: HashMap::new(),
            cursors: HashMap::new(),
            next_iterator_id: 0,
        }
    }

    /// Serve the session until the stream ends, then force cleanup.
    pub async fn run<S>(mut self, stream: S)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        info!(peer = %self.peer, "session opened");
        let (mut reader, mut writer) = tokio::io::split(stream);
        loop {
            let request = match read_frame::<_, Request>(&mut reader).await {
                Ok(Some(request)) => request,
                Ok(None) => {
                    debug!(peer = %self.peer, "peer disconnected");
                    break;
                }
                Err(e) => {
                    warn!(peer = %self.peer, error = %e, "request read failed");
                    break;
                }
            };
            if let Some(reply) = self.dispatch(request) {
                if let Err(e) = write_frame(&mut writer, &reply).await {
                    warn!(peer = %self.peer, error = %e, "reply write failed");
                    break;
                }
            }
        }
        self.teardown();
        info!(peer = %self.peer, "session closed");
    }

    /// Handle one request. `None` means no reply goes on the wire
    /// (fire-and-forget put).
    fn dispatch(&mut self, request: Request) -> Option<Reply> {
        match request {
            Request::Open { dbname, create } => Some(self.handle_open(dbname, create)),
            Request::Close => Some(Reply::Close {
                error: err_string(self.close_db(false)),
            }),
            Request::Begin { table } => Some(self.handle_begin(table)),
            Request::Get { txid, key } => Some(self.handle_get(txid, key)),
            Request::Put {
                txid,
                key,
                value,
                sync,
            } => self.handle_put(txid, key, value, sync),
            Request::Commit { txid, sync } => Some(self.handle_commit(txid, sync)),
            Request::Rollback { txid } => Some(self.handle_rollback(txid)),
            Request::Lookup { txid, lower, upper } => Some(self.handle_lookup(txid, lower, upper)),
            Request::Next { iterator_id } => Some(self.handle_next(iterator_id)),
            Request::Remove { dbname } => Some(Reply::Remove {
                error: err_string(self.registry.remove(&dbname)),
            }),
        }
    }

    fn handle_open(&mut self, dbname: String, create: bool) -> Reply {
        if self.db.is_some() {
            return Reply::Open {
                error: ERR_ALREADY_OPEN.to_string(),
            };
        }
        match self.registry.acquire(&dbname, create) {
            Ok((path, db)) => {
                debug!(peer = %self.peer, db = %dbname, "database opened");
                self.db = Some(OpenDb { path, db });
                Reply::Open {
                    error: String::new(),
                }
            }
            Err(e) => Reply::Open {
                error: e.to_string(),
            },
        }
    }

    fn handle_begin(&mut self, table: String) -> Reply {
        let open = match &self.db {
            None => {
                return Reply::Begin {
                    txid: 0,
                    error: ERR_NO_DATABASE.to_string(),
                }
            }
            Some(open) => open,
        };
        match open.db.begin(&table) {
            Ok(tx) => {
                let txid = tx.id();
                self.txs.insert(txid, TxHandle { tx, poisoned: None });
                Reply::Begin {
                    txid,
                    error: String::new(),
                }
            }
            Err(e) => Reply::Begin {
                txid: 0,
                error: e.to_string(),
            },
        }
    }

    fn handle_get(&mut self, txid: u64, key: Bytes) -> Reply {
        let (value, error) = match self.txs.get(&txid) {
            None => (Bytes::new(), ERR_INVALID_TX.to_string()),
            Some(handle) => match &handle.poisoned {
                Some(msg) => (Bytes::new(), deferred_put_error(msg)),
                None => match handle.tx.get(&key) {
                    Ok(value) => (value, String::new()),
                    Err(e) => (Bytes::new(), e.to_string()),
                },
            },
        };
        Reply::Get { value, error }
    }

    fn handle_put(&mut self, txid: u64, key: Bytes, value: Bytes, sync: bool) -> Option<Reply> {
        let result = match self.txs.get_mut(&txid) {
            None => Err(ERR_INVALID_TX.to_string()),
            Some(handle) => handle.tx.put(key, value).map_err(|e| e.to_string()),
        };
        if sync {
            return Some(Reply::Put {
                error: result.err().unwrap_or_default(),
            });
        }
        // Fire-and-forget: no reply; a failure poisons the transaction
        // and surfaces at its next commit.
        if let Err(msg) = result {
            if let Some(handle) = self.txs.get_mut(&txid) {
                if handle.poisoned.is_none() {
                    handle.poisoned = Some(msg);
                }
            }
        }
        None
    }

    /// Commit is terminal for the handle whatever happens: the id is
    /// gone after this call, success or failure.
    fn handle_commit(&mut self, txid: u64, sync: bool) -> Reply {
        let error = match self.txs.remove(&txid) {
            None => ERR_INVALID_TX.to_string(),
            Some(handle) => match handle.poisoned {
                Some(msg) => {
                    let _ = handle.tx.rollback();
                    deferred_put_error(&msg)
                }
                None => {
                    let result = if sync {
                        handle.tx.commit_sync()
                    } else {
                        handle.tx.commit()
                    };
                    err_string(result)
                }
            },
        };
        Reply::Commit { error }
    }

    fn handle_rollback(&mut self, txid: u64) -> Reply {
        let error = match self.txs.remove(&txid) {
            None => ERR_INVALID_TX.to_string(),
            Some(handle) => err_string(handle.tx.rollback()),
        };
        Reply::Rollback { error }
    }

    fn handle_lookup(&mut self, txid: u64, lower: Option<Bytes>, upper: Option<Bytes>) -> Reply {
        let handle = match self.txs.get(&txid) {
            None => {
                return Reply::Lookup {
                    iterator_id: 0,
                    error: ERR_INVALID_TX.to_string(),
                }
            }
            Some(handle) => handle,
        };
        match handle.tx.lookup(lower, upper) {
            Ok(cursor) => {
                self.next_iterator_id += 1;
                let iterator_id = self.next_iterator_id;
                self.cursors.insert(iterator_id, cursor);
                Reply::Lookup {
                    iterator_id,
                    error: String::new(),
                }
            }
            Err(e) => Reply::Lookup {
                iterator_id: 0,
                error: e.to_string(),
            },
        }
    }

    fn handle_next(&mut self, iterator_id: u64) -> Reply {
        let cursor = match self.cursors.get_mut(&iterator_id) {
            None => {
                return Reply::Next {
                    entries: Vec::new(),
                    error: ERR_INVALID_ITERATOR.to_string(),
                }
            }
            Some(cursor) => cursor,
        };
        let mut entries = Vec::with_capacity(SCAN_BATCH_SIZE);
        let mut exhausted = false;
        while entries.len() < SCAN_BATCH_SIZE {
            match cursor.next() {
                Some((key, value)) => entries.push(KeyValue { key, value }),
                None => {
                    exhausted = true;
                    break;
                }
            }
        }
        if entries.is_empty() {
            // Nothing produced on this call: the cursor is spent and its
            // id becomes invalid.
            self.cursors.remove(&iterator_id);
            return Reply::Next {
                entries,
                error: END_OF_DATA.to_string(),
            };
        }
        if exhausted {
            // A short batch without error tells the client this was the
            // last one; keeping the id around would only turn the next
            // call into an invalid-iterator error.
            self.cursors.remove(&iterator_id);
        }
        Reply::Next {
            entries,
            error: String::new(),
        }
    }

    /// Close the database reference. The forced path (stream teardown)
    /// rolls back open transactions first; the explicit path refuses to
    /// close over them so the client can decide.
    fn close_db(&mut self, force: bool) -> keyline_core::Result<()> {
        let open = match self.db.take() {
            None => return Ok(()), // already closed or never opened
            Some(open) => open,
        };
        if !force && !self.txs.is_empty() {
            self.db = Some(open);
            return Err(Error::InvalidArgument(ERR_TX_OUTSTANDING.to_string()));
        }
        for (_, handle) in self.txs.drain() {
            let _ = handle.tx.rollback();
        }
        self.cursors.clear();
        self.registry.release(&open.path)
    }

    /// Forced cleanup on every exit path. Release errors are
    /// best-effort only; there is nobody left to report them to.
    fn teardown(&mut self) {
        if let Err(e) = self.close_db(true) {
            warn!(peer = %self.peer, error = %e, "session cleanup failed");
        }
        self.txs.clear();
        self.cursors.clear();
    }
}

fn err_string(result: keyline_core::Result<()>) -> String {
    match result {
        Ok(()) => String::new(),
        Err(e) => e.to_string(),
    }
}

fn deferred_put_error(msg: &str) -> String {
    format!("asynchronous put failed: {}", msg)
}
