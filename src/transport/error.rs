//! Upstream transport error types.

use std::path::PathBuf;

/// Errors on the session socket.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// No host is listening on the socket path.
    #[error("Host not running (no socket at {})", .0.display())]
    NotRunning(PathBuf),

    /// Socket I/O failed.
    #[error("Transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The operation timed out.
    #[error("Transport timeout after {0}ms")]
    Timeout(u64),

    /// The peer closed the connection.
    #[error("Connection closed")]
    Closed,

    /// Failed to serialize or deserialize a frame.
    #[error("Failed to serialize frame: {0}")]
    SerializationError(#[from] serde_json::Error),
}
