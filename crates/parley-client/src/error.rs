//! Error types for the parley terminal client.

use std::io;
use thiserror::Error;

/// Client errors.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Failed to reach the server.
    ///
    /// Usually the server is not running or is listening on another port.
    #[error("Failed to connect to {addr}: {error}. Is the server running?")]
    Connect { addr: String, error: String },

    /// I/O error passthrough for socket or terminal operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Convenience Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
