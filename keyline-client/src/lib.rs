/// Keyline client library
///
/// Connects to a Keyline server over TCP and drives the framed
/// request/reply protocol from `keyline-proto`.

pub mod client;
pub mod error;

pub use client::RemoteDatabase;
pub use error::{ClientError, Result};
