//! Supervisor side of a worker channel.
//!
//! Each worker gets its own Unix socket. The socket is bound before the
//! worker is spawned so its path can be handed over in the environment;
//! the worker connects once, after which the socket file is removed.

use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::UnixListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::ipc::ChannelError;
use crate::protocol::{ChannelFrame, FrameLines};

/// A bound but not yet connected worker channel.
#[derive(Debug)]
pub struct ChannelEndpoint {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
}

impl ChannelEndpoint {
    /// Bind a fresh channel socket inside `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be bound.
    pub fn bind(dir: &Path) -> Result<Self, ChannelError> {
        let socket_path = dir.join(format!("script-host-{}.sock", uuid::Uuid::new_v4().simple()));

        if socket_path.exists() {
            std::fs::remove_file(&socket_path)?;
        }

        let listener = UnixListener::bind(&socket_path)?;

        Ok(Self {
            socket_path,
            listener: Some(listener),
        })
    }

    /// Returns the socket path handed to the worker.
    #[must_use]
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Start serving the channel for worker `id`.
    ///
    /// Frames the worker emits are pushed to `inbound`. The returned handle
    /// is the only way to write to the worker.
    #[must_use]
    pub fn serve(mut self, id: u32, inbound: mpsc::UnboundedSender<ChannelFrame>) -> ChannelHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        if let Some(listener) = self.listener.take() {
            let socket_path = std::mem::take(&mut self.socket_path);
            tokio::spawn(run_channel(
                id,
                listener,
                socket_path,
                rx,
                inbound,
                cancel.clone(),
            ));
        }

        ChannelHandle::new(id, tx, cancel)
    }
}

impl Drop for ChannelEndpoint {
    fn drop(&mut self) {
        if self.listener.is_some() && self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                tracing::warn!(
                    path = %self.socket_path.display(),
                    error = %e,
                    "Failed to remove channel socket"
                );
            }
        }
    }
}

/// Write half of a worker's channel, owned by its record.
#[derive(Debug)]
pub struct ChannelHandle {
    id: u32,
    tx: mpsc::UnboundedSender<ChannelFrame>,
    cancel: CancellationToken,
}

impl ChannelHandle {
    pub(crate) fn new(
        id: u32,
        tx: mpsc::UnboundedSender<ChannelFrame>,
        cancel: CancellationToken,
    ) -> Self {
        Self { id, tx, cancel }
    }

    /// Queue a frame for the worker.
    ///
    /// Frames queued before the worker connects are delivered once it does.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] if the channel was disconnected.
    pub fn send(&self, frame: ChannelFrame) -> Result<(), ChannelError> {
        if self.cancel.is_cancelled() {
            return Err(ChannelError::Closed(self.id));
        }
        self.tx.send(frame).map_err(|_| ChannelError::Closed(self.id))
    }

    /// Returns true while frames can still be queued.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.cancel.is_cancelled() && !self.tx.is_closed()
    }

    /// Close the channel. Frames already queued are flushed first.
    pub fn disconnect(&self) {
        self.cancel.cancel();
    }
}

async fn run_channel(
    id: u32,
    listener: UnixListener,
    socket_path: PathBuf,
    mut outgoing: mpsc::UnboundedReceiver<ChannelFrame>,
    inbound: mpsc::UnboundedSender<ChannelFrame>,
    cancel: CancellationToken,
) {
    let accepted = tokio::select! {
        biased;

        () = cancel.cancelled() => None,

        result = listener.accept() => match result {
            Ok((stream, _addr)) => Some(stream),
            Err(e) => {
                tracing::warn!(id, error = %e, "Failed to accept worker channel");
                None
            }
        },
    };

    drop(listener);
    if let Err(e) = std::fs::remove_file(&socket_path) {
        tracing::debug!(id, path = %socket_path.display(), error = %e, "Channel socket already gone");
    }

    let Some(stream) = accepted else {
        tracing::debug!(id, "Channel closed before the worker connected");
        return;
    };

    tracing::debug!(id, "Worker channel connected");

    let (reader, mut writer) = stream.into_split();
    let mut lines = FrameLines::new(reader);

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                flush_pending(id, &mut outgoing, &mut writer).await;
                break;
            }

            frame = outgoing.recv() => {
                let Some(frame) = frame else { break };
                if let Err(e) = write_frame(&mut writer, &frame).await {
                    tracing::debug!(id, error = %e, "Worker channel write failed");
                    break;
                }
            }

            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if line.is_empty() {
                        continue;
                    }
                    match serde_json::from_slice::<ChannelFrame>(line) {
                        Ok(frame) => {
                            if inbound.send(frame).is_err() {
                                break;
                            }
                        }
                        Err(e) => tracing::warn!(id, error = %e, "Malformed frame from worker"),
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!(id, error = %e, "Worker channel read failed");
                    break;
                }
            },
        }
    }

    cancel.cancel();
    let _ = writer.shutdown().await;
    tracing::debug!(id, "Worker channel closed");
}

async fn flush_pending(
    id: u32,
    outgoing: &mut mpsc::UnboundedReceiver<ChannelFrame>,
    writer: &mut OwnedWriteHalf,
) {
    while let Ok(frame) = outgoing.try_recv() {
        if let Err(e) = write_frame(writer, &frame).await {
            tracing::debug!(id, error = %e, "Dropped queued frame on disconnect");
            return;
        }
    }
}

async fn write_frame(writer: &mut OwnedWriteHalf, frame: &ChannelFrame) -> Result<(), ChannelError> {
    let mut json = serde_json::to_string(frame)?;
    json.push('\n');
    writer.write_all(json.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}
