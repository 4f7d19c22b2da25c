/// Engine behavior tests
///
/// Exercises transaction visibility, range lookups, and persistence
/// across reopen against real on-disk databases.

use bytes::Bytes;
use keyline_core::{Database, Error};
use tempfile::TempDir;

fn b(s: &str) -> Bytes {
    Bytes::copy_from_slice(s.as_bytes())
}

#[test]
fn test_read_your_writes() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(dir.path().join("db"), true).unwrap();

    let mut tx = db.begin("main").unwrap();
    tx.put(b("k"), b("v1")).unwrap();
    assert_eq!(tx.get(b"k").unwrap(), b("v1"));
    tx.put(b("k"), b("v2")).unwrap();
    assert_eq!(tx.get(b"k").unwrap(), b("v2"));
}

#[test]
fn test_get_missing_key() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(dir.path().join("db"), true).unwrap();

    let tx = db.begin("main").unwrap();
    assert!(matches!(tx.get(b"nope"), Err(Error::NotFound(_))));
}

#[test]
fn test_commit_visible_to_new_transaction() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(dir.path().join("db"), true).unwrap();

    let mut tx = db.begin("main").unwrap();
    tx.put(b("k"), b("v")).unwrap();

    // Uncommitted writes are invisible to a concurrent transaction.
    let other = db.begin("main").unwrap();
    assert!(other.get(b"k").is_err());
    other.rollback().unwrap();

    tx.commit().unwrap();
    let tx2 = db.begin("main").unwrap();
    assert_eq!(tx2.get(b"k").unwrap(), b("v"));
}

#[test]
fn test_rollback_discards_writes() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(dir.path().join("db"), true).unwrap();

    let mut tx = db.begin("main").unwrap();
    tx.put(b("k"), b("v")).unwrap();
    tx.rollback().unwrap();

    let tx2 = db.begin("main").unwrap();
    assert!(tx2.get(b"k").is_err());
}

#[test]
fn test_lookup_full_range_ascending() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(dir.path().join("db"), true).unwrap();

    let mut tx = db.begin("main").unwrap();
    for key in ["c", "a", "b"] {
        tx.put(b(key), b("v")).unwrap();
    }
    tx.commit().unwrap();

    let tx = db.begin("main").unwrap();
    let mut cursor = tx.lookup(None, None).unwrap();
    let mut keys = Vec::new();
    while let Some((k, _)) = cursor.next() {
        keys.push(k);
    }
    assert_eq!(keys, vec![b("a"), b("b"), b("c")]);
}

#[test]
fn test_lookup_half_open_bounds() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(dir.path().join("db"), true).unwrap();

    let mut tx = db.begin("main").unwrap();
    for key in ["a", "b", "c", "d"] {
        tx.put(b(key), b("v")).unwrap();
    }
    tx.commit().unwrap();

    // Lower bound inclusive, upper exclusive.
    let tx = db.begin("main").unwrap();
    let mut cursor = tx.lookup(Some(b("b")), Some(b("d"))).unwrap();
    assert_eq!(cursor.next().unwrap().0, b("b"));
    assert_eq!(cursor.next().unwrap().0, b("c"));
    assert!(cursor.next().is_none());
}

#[test]
fn test_lookup_empty_and_inverted_ranges() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(dir.path().join("db"), true).unwrap();

    let mut tx = db.begin("main").unwrap();
    tx.put(b("m"), b("v")).unwrap();
    tx.commit().unwrap();

    let tx = db.begin("main").unwrap();
    let mut empty = tx.lookup(Some(b("x")), Some(b("z"))).unwrap();
    assert!(empty.next().is_none());
    let mut inverted = tx.lookup(Some(b("z")), Some(b("a"))).unwrap();
    assert!(inverted.next().is_none());
}

#[test]
fn test_lookup_merges_uncommitted_overlay() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(dir.path().join("db"), true).unwrap();

    let mut setup = db.begin("main").unwrap();
    setup.put(b("a"), b("old")).unwrap();
    setup.put(b("b"), b("keep")).unwrap();
    setup.commit().unwrap();

    let mut tx = db.begin("main").unwrap();
    tx.put(b("a"), b("new")).unwrap();
    tx.put(b("c"), b("added")).unwrap();

    let mut cursor = tx.lookup(None, None).unwrap();
    assert_eq!(cursor.next().unwrap(), (b("a"), b("new")));
    assert_eq!(cursor.next().unwrap(), (b("b"), b("keep")));
    assert_eq!(cursor.next().unwrap(), (b("c"), b("added")));
    assert!(cursor.next().is_none());
}

#[test]
fn test_persistence_across_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("db");

    let db = Database::open(&path, true).unwrap();
    let mut tx = db.begin("main").unwrap();
    tx.put(b("k"), b("v")).unwrap();
    tx.commit_sync().unwrap();
    db.close().unwrap();
    drop(db);

    let db = Database::open(&path, false).unwrap();
    let tx = db.begin("main").unwrap();
    assert_eq!(tx.get(b"k").unwrap(), b("v"));
}

#[test]
fn test_close_flushes_buffered_commit() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("db");

    let db = Database::open(&path, true).unwrap();
    let mut tx = db.begin("main").unwrap();
    tx.put(b("k"), b("v")).unwrap();
    tx.commit().unwrap();
    db.close().unwrap();
    drop(db);

    let db = Database::open(&path, false).unwrap();
    let tx = db.begin("main").unwrap();
    assert_eq!(tx.get(b"k").unwrap(), b("v"));
}

#[test]
fn test_open_missing_without_create_fails() {
    let dir = TempDir::new().unwrap();
    let result = Database::open(dir.path().join("absent"), false);
    assert!(matches!(result, Err(Error::NotFound(_))));
}

#[test]
fn test_begin_rejects_bad_table_name() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(dir.path().join("db"), true).unwrap();
    assert!(db.begin("../escape").is_err());
    assert!(db.begin("").is_err());
}

#[test]
fn test_remove_deletes_database() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("db");
    Database::open(&path, true).unwrap();
    assert!(path.exists());
    Database::remove(&path).unwrap();
    assert!(!path.exists());
    assert!(matches!(Database::remove(&path), Err(Error::NotFound(_))));
}
