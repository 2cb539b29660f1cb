//! Worker side of the channel.
//!
//! Used by worker programs to receive events from the host and emit events
//! back to it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;

use crate::ipc::ChannelError;
use crate::protocol::{ChannelFrame, FrameLines, CHANNEL_ENV};

/// Default timeout for connecting to the host (4 seconds).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(4);

/// Connection from a worker process to its host.
#[derive(Debug)]
pub struct WorkerClient {
    socket_path: PathBuf,
    lines: FrameLines<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl WorkerClient {
    /// Connect using the socket path the host put in the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::NotConfigured`] when the process was not
    /// started by a host, or a connection error.
    pub async fn connect_from_env() -> Result<Self, ChannelError> {
        let path = std::env::var_os(CHANNEL_ENV).ok_or(ChannelError::NotConfigured(CHANNEL_ENV))?;
        Self::connect(Path::new(&path)).await
    }

    /// Connect to a channel socket.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails or times out.
    pub async fn connect(path: &Path) -> Result<Self, ChannelError> {
        // Safe: timeout values are never going to exceed u64::MAX milliseconds
        #[allow(clippy::cast_possible_truncation)]
        let timeout_ms = DEFAULT_CONNECT_TIMEOUT.as_millis() as u64;

        let stream = tokio::time::timeout(DEFAULT_CONNECT_TIMEOUT, UnixStream::connect(path))
            .await
            .map_err(|_| ChannelError::Timeout(timeout_ms))??;

        let (reader, writer) = stream.into_split();

        Ok(Self {
            socket_path: path.to_path_buf(),
            lines: FrameLines::new(reader),
            writer,
        })
    }

    /// Returns the socket path.
    #[must_use]
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Emit a named event with positional arguments.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be written.
    pub async fn emit(&mut self, event: &str, args: Vec<Value>) -> Result<(), ChannelError> {
        let mut json = serde_json::to_string(&ChannelFrame::new(event, args))?;
        json.push('\n');
        self.writer.write_all(json.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Wait for the next event from the host.
    ///
    /// Returns `None` once the host disconnects. Malformed frames are
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if reading from the socket fails.
    pub async fn next_event(&mut self) -> Result<Option<(String, Vec<Value>)>, ChannelError> {
        while let Some(line) = self.lines.next_line().await? {
            if line.is_empty() {
                continue;
            }
            match serde_json::from_slice::<ChannelFrame>(line) {
                Ok(frame) => {
                    if let Some(parts) = frame.into_parts() {
                        return Ok(Some(parts));
                    }
                    tracing::warn!("Channel frame without an event name");
                }
                Err(e) => tracing::warn!(error = %e, "Malformed frame from host"),
            }
        }
        Ok(None)
    }
}
