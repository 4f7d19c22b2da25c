use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// One request variant per client call. `Remove` stands alone and is
/// valid outside an open database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Request {
    Open {
        dbname: String,
        create: bool,
    },
    Close,
    Begin {
        table: String,
    },
    Get {
        txid: u64,
        key: Bytes,
    },
    /// `sync = false` is fire-and-forget: the server sends no reply and
    /// defers any failure to the transaction's next `Commit`.
    Put {
        txid: u64,
        key: Bytes,
        value: Bytes,
        sync: bool,
    },
    Commit {
        txid: u64,
        sync: bool,
    },
    Rollback {
        txid: u64,
    },
    Lookup {
        txid: u64,
        lower: Option<Bytes>,
        upper: Option<Bytes>,
    },
    Next {
        iterator_id: u64,
    },
    Remove {
        dbname: String,
    },
}

/// Replies mirror the request variants. An empty `error` means success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Reply {
    Open { error: String },
    Close { error: String },
    Begin { txid: u64, error: String },
    Get { value: Bytes, error: String },
    Put { error: String },
    Commit { error: String },
    Rollback { error: String },
    Lookup { iterator_id: u64, error: String },
    Next { entries: Vec<KeyValue>, error: String },
    Remove { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: Bytes,
    pub value: Bytes,
}
