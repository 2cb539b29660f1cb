//! Session side of the host socket.
//!
//! Used by the `run` command and by anything else that wants to drive a
//! host from Rust.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;

use crate::protocol::{FrameLines, InboundFrame, OutboundFrame};
use crate::transport::TransportError;

/// Default timeout for connecting to the host (4 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(4);

/// One session connected to a host.
#[derive(Debug)]
pub struct HostClient {
    socket_path: PathBuf,
    lines: FrameLines<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    next_ack: u64,
}

impl HostClient {
    /// Connect to the host listening on `path`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NotRunning`] if there is no socket, or a
    /// connection error.
    pub async fn connect<P: AsRef<Path>>(path: P) -> Result<Self, TransportError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(TransportError::NotRunning(path.to_path_buf()));
        }

        // Safe: timeout values are never going to exceed u64::MAX milliseconds
        #[allow(clippy::cast_possible_truncation)]
        let timeout_ms = DEFAULT_TIMEOUT.as_millis() as u64;

        let stream = tokio::time::timeout(DEFAULT_TIMEOUT, UnixStream::connect(path))
            .await
            .map_err(|_| TransportError::Timeout(timeout_ms))??;
        let (reader, writer) = stream.into_split();

        Ok(Self {
            socket_path: path.to_path_buf(),
            lines: FrameLines::new(reader),
            writer,
            next_ack: 1,
        })
    }

    /// Returns the socket path.
    #[must_use]
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Send a raw frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be written.
    pub async fn send(&mut self, frame: &InboundFrame) -> Result<(), TransportError> {
        let mut json = serde_json::to_string(frame)?;
        json.push('\n');
        self.writer.write_all(json.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Send an event without asking for an acknowledgement.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be written.
    pub async fn emit(&mut self, event: &str, payload: Value) -> Result<(), TransportError> {
        self.send(&InboundFrame::new(event, payload)).await
    }

    /// Send an event and return the ack id its replies will carry.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be written.
    pub async fn emit_with_ack(
        &mut self,
        event: &str,
        payload: Value,
    ) -> Result<u64, TransportError> {
        let ack = self.next_ack;
        self.next_ack += 1;
        self.send(&InboundFrame::new(event, payload).with_ack(ack)).await?;
        Ok(ack)
    }

    /// Read the next frame. Returns `None` once the host closes the session.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails or a frame is malformed.
    pub async fn next_frame(&mut self) -> Result<Option<OutboundFrame>, TransportError> {
        while let Some(line) = self.lines.next_line().await? {
            if line.is_empty() {
                continue;
            }
            return Ok(Some(serde_json::from_slice(line)?));
        }
        Ok(None)
    }

    /// Read the next frame, giving up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Timeout`] if nothing arrives in time.
    pub async fn next_frame_timeout(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<OutboundFrame>, TransportError> {
        #[allow(clippy::cast_possible_truncation)]
        let timeout_ms = timeout.as_millis() as u64;
        tokio::time::timeout(timeout, self.next_frame())
            .await
            .map_err(|_| TransportError::Timeout(timeout_ms))?
    }

    /// Skip frames until one matches `predicate`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Timeout`] if no match arrives within
    /// `timeout`, or [`TransportError::Closed`] if the session ends first.
    pub async fn wait_for<F>(
        &mut self,
        timeout: Duration,
        mut predicate: F,
    ) -> Result<OutboundFrame, TransportError>
    where
        F: FnMut(&OutboundFrame) -> bool,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            match self.next_frame_timeout(remaining).await? {
                Some(frame) if predicate(&frame) => return Ok(frame),
                Some(_) => {}
                None => return Err(TransportError::Closed),
            }
        }
    }

    /// Wait for the reply to `ack`.
    ///
    /// # Errors
    ///
    /// Same as [`Self::wait_for`].
    pub async fn wait_for_ack(
        &mut self,
        ack: u64,
        timeout: Duration,
    ) -> Result<Vec<Value>, TransportError> {
        match self
            .wait_for(timeout, |frame| {
                matches!(frame, OutboundFrame::Ack { ack: id, .. } if *id == ack)
            })
            .await?
        {
            OutboundFrame::Ack { args, .. } => Ok(args),
            OutboundFrame::Event { .. } => Err(TransportError::Closed),
        }
    }
}
