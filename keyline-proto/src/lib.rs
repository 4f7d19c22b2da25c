/// Keyline wire protocol
///
/// One duplex stream per client carries length-prefixed bincode frames.
/// Requests and replies are closed tagged unions with one variant per
/// call; replies correlate to requests purely by stream order, so there
/// is no request id anywhere on the wire. Every reply carries an error
/// string where empty means success.

pub mod codec;
pub mod message;

pub use codec::{read_frame, write_frame, WireError, MAX_FRAME_SIZE};
pub use message::{KeyValue, Reply, Request};

/// Upper bound on key/value pairs returned by one `Next` reply.
pub const SCAN_BATCH_SIZE: usize = 64;

/// Error string a `Next` reply carries once its range is exhausted
/// before producing a row. Both sides treat it as a condition, not a
/// failure.
pub const END_OF_DATA: &str = "end of data";
