/// Keyline remote client implementation
///
/// One connection serves one database at a time. Calls are strictly
/// request/reply in lockstep over the stream, except `put_nowait`,
/// which writes a frame and expects nothing back; a failed asynchronous
/// put surfaces as an error on that transaction's `commit`.
use std::collections::HashSet;
use std::time::Duration;

use bytes::Bytes;
use keyline_proto::{read_frame, write_frame, Reply, Request, END_OF_DATA, SCAN_BATCH_SIZE};
use tokio::net::TcpStream;

use crate::error::{ClientError, Result};

/// Handle to one database opened on a remote server.
pub struct RemoteDatabase {
    stream: TcpStream,
    /// Iterators that delivered their final batch. The server forgets
    /// the id with the last batch, so exhaustion is remembered here.
    exhausted: HashSet<u64>,
}

impl RemoteDatabase {
    /// Connect to `addr` and open the named database.
    ///
    /// With `create` set, a missing database is created on the server;
    /// without it, opening a missing database fails.
    pub async fn open(addr: &str, dbname: &str, create: bool) -> Result<RemoteDatabase> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| ClientError::Connection(e.to_string()))?;
        let mut db = RemoteDatabase {
            stream,
            exhausted: HashSet::new(),
        };
        match db
            .call(Request::Open {
                dbname: dbname.to_string(),
                create,
            })
            .await?
        {
            Reply::Open { error } => check(error)?,
            other => return Err(unexpected(other)),
        }
        Ok(db)
    }

    /// Like [`open`](RemoteDatabase::open), but give up after `timeout`
    /// if the server cannot be reached.
    pub async fn open_with_timeout(
        addr: &str,
        dbname: &str,
        create: bool,
        timeout: Duration,
    ) -> Result<RemoteDatabase> {
        match tokio::time::timeout(timeout, RemoteDatabase::open(addr, dbname, create)).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Timeout),
        }
    }

    /// Delete a database on the server. Uses its own connection; fails
    /// while any client holds the database open.
    pub async fn remove(addr: &str, dbname: &str) -> Result<()> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| ClientError::Connection(e.to_string()))?;
        let mut db = RemoteDatabase {
            stream,
            exhausted: HashSet::new(),
        };
        match db
            .call(Request::Remove {
                dbname: dbname.to_string(),
            })
            .await?
        {
            Reply::Remove { error } => check(error),
            other => Err(unexpected(other)),
        }
    }

    /// Close the database. Fails with transactions outstanding; roll
    /// them back (or commit) first.
    pub async fn close(&mut self) -> Result<()> {
        match self.call(Request::Close).await? {
            Reply::Close { error } => check(error),
            other => Err(unexpected(other)),
        }
    }

    /// Start a transaction on `table` and return its id.
    pub async fn begin(&mut self, table: &str) -> Result<u64> {
        match self
            .call(Request::Begin {
                table: table.to_string(),
            })
            .await?
        {
            Reply::Begin { txid, error } => {
                check(error)?;
                Ok(txid)
            }
            other => Err(unexpected(other)),
        }
    }

    /// Read `key` through the transaction, uncommitted writes included.
    pub async fn get(&mut self, txid: u64, key: &[u8]) -> Result<Bytes> {
        match self
            .call(Request::Get {
                txid,
                key: Bytes::copy_from_slice(key),
            })
            .await?
        {
            Reply::Get { value, error } => {
                check(error)?;
                Ok(value)
            }
            other => Err(unexpected(other)),
        }
    }

    /// Write a key/value pair and wait for the server to acknowledge.
    pub async fn put(&mut self, txid: u64, key: &[u8], value: &[u8]) -> Result<()> {
        match self.put_request(txid, key, value, true).await? {
            Reply::Put { error } => check(error),
            other => Err(unexpected(other)),
        }
    }

    /// Write a key/value pair without waiting for a reply. A failure is
    /// reported by the transaction's `commit` instead.
    pub async fn put_nowait(&mut self, txid: u64, key: &[u8], value: &[u8]) -> Result<()> {
        write_frame(
            &mut self.stream,
            &Request::Put {
                txid,
                key: Bytes::copy_from_slice(key),
                value: Bytes::copy_from_slice(value),
                sync: false,
            },
        )
        .await?;
        Ok(())
    }

    async fn put_request(&mut self, txid: u64, key: &[u8], value: &[u8], sync: bool) -> Result<Reply> {
        self.call(Request::Put {
            txid,
            key: Bytes::copy_from_slice(key),
            value: Bytes::copy_from_slice(value),
            sync,
        })
        .await
    }

    /// Commit the transaction. The id is invalid afterwards whether or
    /// not the commit succeeded. Reports any earlier `put_nowait`
    /// failure.
    pub async fn commit(&mut self, txid: u64) -> Result<()> {
        self.commit_request(txid, false).await
    }

    /// Commit and wait until the data is durable on disk.
    pub async fn commit_sync(&mut self, txid: u64) -> Result<()> {
        self.commit_request(txid, true).await
    }

    async fn commit_request(&mut self, txid: u64, sync: bool) -> Result<()> {
        match self.call(Request::Commit { txid, sync }).await? {
            Reply::Commit { error } => check(error),
            other => Err(unexpected(other)),
        }
    }

    /// Discard the transaction. The id is invalid afterwards.
    pub async fn rollback(&mut self, txid: u64) -> Result<()> {
        match self.call(Request::Rollback { txid }).await? {
            Reply::Rollback { error } => check(error),
            other => Err(unexpected(other)),
        }
    }

    /// Open an ascending range scan over `[lower, upper)` and return an
    /// iterator id for `next`. `None` bounds are unbounded.
    pub async fn lookup(
        &mut self,
        txid: u64,
        lower: Option<&[u8]>,
        upper: Option<&[u8]>,
    ) -> Result<u64> {
        match self
            .call(Request::Lookup {
                txid,
                lower: lower.map(Bytes::copy_from_slice),
                upper: upper.map(Bytes::copy_from_slice),
            })
            .await?
        {
            Reply::Lookup { iterator_id, error } => {
                check(error)?;
                Ok(iterator_id)
            }
            other => Err(unexpected(other)),
        }
    }

    /// Fetch the next batch from an iterator. `Ok(None)` means the scan
    /// is exhausted. A batch shorter than the server's batch size is
    /// the final one; the call after it returns `None` without going to
    /// the server.
    pub async fn next(&mut self, iterator_id: u64) -> Result<Option<Vec<(Bytes, Bytes)>>> {
        if self.exhausted.remove(&iterator_id) {
            return Ok(None);
        }
        match self.call(Request::Next { iterator_id }).await? {
            Reply::Next { entries, error } => {
                if error == END_OF_DATA {
                    return Ok(None);
                }
                check(error)?;
                if entries.len() < SCAN_BATCH_SIZE {
                    self.exhausted.insert(iterator_id);
                }
                Ok(Some(
                    entries.into_iter().map(|kv| (kv.key, kv.value)).collect(),
                ))
            }
            other => Err(unexpected(other)),
        }
    }

    async fn call(&mut self, request: Request) -> Result<Reply> {
        write_frame(&mut self.stream, &request).await?;
        match read_frame(&mut self.stream).await? {
            Some(reply) => Ok(reply),
            None => Err(ClientError::Connection(
                "server closed the connection".to_string(),
            )),
        }
    }
}

fn check(error: String) -> Result<()> {
    if error.is_empty() {
        Ok(())
    } else {
        Err(ClientError::Server(error))
    }
}

fn unexpected(reply: Reply) -> ClientError {
    ClientError::Protocol(format!("reply does not match request: {:?}", reply))
}
