/// Keyline storage engine
///
/// An embedded store of named tables, each an ordered map of byte keys to
/// byte values. Transactions are snapshot overlays applied atomically on
/// commit; cursors yield half-open key ranges in ascending order.

pub mod db;
pub mod error;
mod table;
pub mod tx;

pub use db::Database;
pub use error::{Error, Result};
pub use tx::{Cursor, Transaction};
