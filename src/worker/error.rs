//! Worker lifecycle errors.

use std::path::PathBuf;

use crate::ipc::ChannelError;

/// Error type for starting a worker.
#[derive(thiserror::Error, Debug)]
pub enum SpawnError {
    /// The run request did not name a script.
    #[error("No script name given")]
    EmptyName,
    /// The script (or its interpreter) was not found.
    #[error("Script not found: {}", .path.display())]
    NotFound { path: PathBuf },
    /// Permission denied when spawning.
    #[error("Permission denied: {}", .path.display())]
    PermissionDenied { path: PathBuf },
    /// The process exited before it could be identified.
    #[error("Script exited during startup: {}", .path.display())]
    ExitedEarly { path: PathBuf },
    /// Other I/O error.
    #[error("Failed to spawn {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The private channel could not be set up.
    #[error("Failed to open worker channel: {0}")]
    Channel(#[from] ChannelError),
}

impl SpawnError {
    /// Create a `SpawnError` from an I/O error, classifying common cases.
    pub(crate) fn from_io(path: PathBuf, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            _ => Self::Io { path, source: err },
        }
    }
}

/// Error type for stopping a worker.
#[derive(thiserror::Error, Debug)]
pub enum StopError {
    /// No registered worker carries this id.
    #[error("{0} process no longer valid for termination")]
    UnknownWorker(u32),
    /// The worker survived every escalation step.
    #[error("Worker {id} did not terminate: {reason}")]
    StillRunning { id: u32, reason: String },
}
