/// End-to-end client tests
///
/// Each test starts a real server on an ephemeral port with a
/// throwaway root directory and drives it through `RemoteDatabase`.

use std::time::Duration;

use bytes::Bytes;
use keyline_client::{ClientError, RemoteDatabase};
use keyline_server::Server;
use tempfile::TempDir;
use tokio::net::TcpListener;

async fn start_server() -> (TempDir, String) {
    let dir = TempDir::new().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let server = Server::new(dir.path());
    tokio::spawn(async move { server.serve(listener).await });
    (dir, addr)
}

#[tokio::test]
async fn test_write_then_scan() {
    let (_dir, addr) = start_server().await;

    let mut db = RemoteDatabase::open(&addr, "main", true).await.unwrap();
    let txid = db.begin("test").await.unwrap();
    db.put(txid, b"mykey", b"myvalue").await.unwrap();
    assert_eq!(db.get(txid, b"mykey").await.unwrap(), Bytes::from("myvalue"));
    db.commit(txid).await.unwrap();
    db.close().await.unwrap();

    // Reopen and read back through a full-range scan.
    let mut db = RemoteDatabase::open(&addr, "main", false).await.unwrap();
    let txid = db.begin("test").await.unwrap();
    let iterator_id = db.lookup(txid, None, None).await.unwrap();
    let entries = db.next(iterator_id).await.unwrap().unwrap();
    assert_eq!(
        entries,
        vec![(Bytes::from("mykey"), Bytes::from("myvalue"))]
    );
    assert!(db.next(iterator_id).await.unwrap().is_none());
    db.rollback(txid).await.unwrap();
    db.close().await.unwrap();
}

#[tokio::test]
async fn test_open_missing_database_fails() {
    let (_dir, addr) = start_server().await;
    let result = RemoteDatabase::open(&addr, "nope", false).await;
    assert!(matches!(result, Err(ClientError::Server(_))));
}

#[tokio::test]
async fn test_open_with_timeout_unreachable() {
    // A reserved TEST-NET address that will not answer.
    let result = RemoteDatabase::open_with_timeout(
        "192.0.2.1:8501",
        "main",
        false,
        Duration::from_millis(200),
    )
    .await;
    assert!(matches!(result, Err(ClientError::Timeout | ClientError::Connection(_))));
}

#[tokio::test]
async fn test_close_refused_with_open_transaction() {
    let (_dir, addr) = start_server().await;

    let mut db = RemoteDatabase::open(&addr, "main", true).await.unwrap();
    let txid = db.begin("test").await.unwrap();
    db.put(txid, b"k", b"v").await.unwrap();

    match db.close().await {
        Err(ClientError::Server(msg)) => assert_eq!(msg, "transactions outstanding"),
        other => panic!("unexpected result: {:?}", other),
    }

    db.rollback(txid).await.unwrap();
    db.close().await.unwrap();
}

#[tokio::test]
async fn test_concurrent_clients_share_database() {
    let (_dir, addr) = start_server().await;

    let mut writer = RemoteDatabase::open(&addr, "main", true).await.unwrap();
    let mut reader = RemoteDatabase::open(&addr, "main", false).await.unwrap();

    let txid = writer.begin("test").await.unwrap();
    writer.put(txid, b"shared", b"1").await.unwrap();

    // Uncommitted writes stay invisible to the other client.
    let rtx = reader.begin("test").await.unwrap();
    assert!(matches!(
        reader.get(rtx, b"shared").await,
        Err(ClientError::Server(_))
    ));
    reader.rollback(rtx).await.unwrap();

    writer.commit(txid).await.unwrap();

    let rtx = reader.begin("test").await.unwrap();
    assert_eq!(reader.get(rtx, b"shared").await.unwrap(), Bytes::from("1"));
    reader.rollback(rtx).await.unwrap();

    writer.close().await.unwrap();
    reader.close().await.unwrap();
}

#[tokio::test]
async fn test_async_put_failure_surfaces_at_commit() {
    let (_dir, addr) = start_server().await;

    let mut db = RemoteDatabase::open(&addr, "main", true).await.unwrap();
    let txid = db.begin("test").await.unwrap();
    // Empty keys are rejected, but only the commit hears about it.
    db.put_nowait(txid, b"", b"v").await.unwrap();
    db.put_nowait(txid, b"ok", b"v").await.unwrap();

    match db.commit(txid).await {
        Err(ClientError::Server(msg)) => {
            assert!(msg.contains("asynchronous put failed"), "got: {}", msg)
        }
        other => panic!("unexpected result: {:?}", other),
    }
    db.close().await.unwrap();
}

#[tokio::test]
async fn test_dropped_client_rolls_back() {
    let (_dir, addr) = start_server().await;

    {
        let mut db = RemoteDatabase::open(&addr, "main", true).await.unwrap();
        let txid = db.begin("test").await.unwrap();
        db.put(txid, b"ghost", b"v").await.unwrap();
        // Connection dropped with the transaction open.
    }

    // Give the server a moment to tear the session down.
    let mut db = loop {
        match RemoteDatabase::open(&addr, "main", false).await {
            Ok(db) => break db,
            Err(_) => tokio::time::sleep(Duration::from_millis(10)).await,
        }
    };
    let txid = db.begin("test").await.unwrap();
    assert!(matches!(
        db.get(txid, b"ghost").await,
        Err(ClientError::Server(_))
    ));
    db.rollback(txid).await.unwrap();
    db.close().await.unwrap();
}

#[tokio::test]
async fn test_remove_in_use_then_after_close() {
    let (_dir, addr) = start_server().await;

    let mut db = RemoteDatabase::open(&addr, "main", true).await.unwrap();
    match RemoteDatabase::remove(&addr, "main").await {
        Err(ClientError::Server(msg)) => assert!(msg.contains("in use"), "got: {}", msg),
        other => panic!("unexpected result: {:?}", other),
    }

    db.close().await.unwrap();
    RemoteDatabase::remove(&addr, "main").await.unwrap();
    assert!(RemoteDatabase::open(&addr, "main", false).await.is_err());
}

#[tokio::test]
async fn test_range_bounds() {
    let (_dir, addr) = start_server().await;

    let mut db = RemoteDatabase::open(&addr, "main", true).await.unwrap();
    let txid = db.begin("test").await.unwrap();
    for key in ["a", "b", "c", "d"] {
        db.put(txid, key.as_bytes(), b"v").await.unwrap();
    }
    db.commit(txid).await.unwrap();

    // [b, d): inclusive lower, exclusive upper.
    let txid = db.begin("test").await.unwrap();
    let iterator_id = db.lookup(txid, Some(b"b"), Some(b"d")).await.unwrap();
    let entries = db.next(iterator_id).await.unwrap().unwrap();
    let keys: Vec<Bytes> = entries.into_iter().map(|(k, _)| k).collect();
    assert_eq!(keys, vec![Bytes::from("b"), Bytes::from("c")]);

    // Empty range reports exhaustion immediately.
    let iterator_id = db.lookup(txid, Some(b"x"), Some(b"z")).await.unwrap();
    assert!(db.next(iterator_id).await.unwrap().is_none());

    db.rollback(txid).await.unwrap();
    db.close().await.unwrap();
}
