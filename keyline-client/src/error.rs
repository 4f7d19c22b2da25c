/// Error types for the Keyline client
use keyline_proto::WireError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("request timeout")]
    Timeout,

    #[error("protocol error: {0}")]
    Protocol(String),

    /// An error string the server put in a reply, verbatim.
    #[error("{0}")]
    Server(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;

impl From<WireError> for ClientError {
    fn from(e: WireError) -> Self {
        match e {
            WireError::Io(e) => ClientError::Connection(e.to_string()),
            other => ClientError::Protocol(other.to_string()),
        }
    }
}
