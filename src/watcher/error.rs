//! Watcher error types.

use std::path::PathBuf;

/// Errors that can occur while watching a script file.
#[derive(thiserror::Error, Debug)]
pub enum WatchError {
    /// The script could not be read to compute its digest.
    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Notify watcher error.
    #[error("File watcher error: {0}")]
    Notify(#[from] notify::Error),

    /// The hashing task did not finish.
    #[error("Digest task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl WatchError {
    pub(crate) fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_error_names_path() {
        let err = WatchError::read(
            "/scripts/a.js",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(err.to_string(), "Failed to read /scripts/a.js: gone");
    }

    #[test]
    fn test_from_notify_error() {
        let notify_err = notify::Error::generic("test error");
        let watch_err: WatchError = notify_err.into();
        assert!(matches!(watch_err, WatchError::Notify(_)));
        assert!(watch_err.to_string().contains("File watcher error"));
    }
}
