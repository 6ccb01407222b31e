//! Error types for the wire protocol.

use thiserror::Error;

/// Protocol operation result type.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors that can occur while parsing or validating protocol frames.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("unknown message type: {0}")]
    UnknownType(String),

    #[error("planet_id does not match [A-Za-z0-9_-]{{1,100}}: {0}")]
    InvalidPlanetId(String),

    #[error("worker_id must not be empty")]
    EmptyWorkerId,
}
