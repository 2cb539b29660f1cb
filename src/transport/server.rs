//! Host side of the session socket.
//!
//! Every accepted connection is one session with its own controller,
//! workers and watches.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::config::HostConfig;
use crate::protocol::{FrameLines, InboundFrame, OutboundFrame};
use crate::session::{SessionController, SessionExit};
use crate::transport::{TransportError, UpstreamSink};

/// Listens for sessions on a Unix domain socket.
#[derive(Debug)]
pub struct HostServer {
    socket_path: PathBuf,
    config: Arc<HostConfig>,
}

impl HostServer {
    /// Creates a server on a custom socket path.
    #[must_use]
    pub fn new<P: AsRef<Path>>(socket_path: P, config: HostConfig) -> Self {
        Self {
            socket_path: socket_path.as_ref().to_path_buf(),
            config: Arc::new(config),
        }
    }

    /// Creates a server on the configured socket path.
    #[must_use]
    pub fn from_config(config: HostConfig) -> Self {
        let socket_path = config.session.socket_path.clone();
        Self::new(socket_path, config)
    }

    /// Returns the socket path.
    #[must_use]
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Bind the socket and start accepting sessions.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind to the socket.
    pub fn start(&self) -> Result<ServerHandle, TransportError> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;
        tracing::info!(path = %self.socket_path.display(), "Host listening");

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let config = Arc::clone(&self.config);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;

                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::info!("Host shutting down");
                            break;
                        }
                    }

                    accept_result = listener.accept() => {
                        match accept_result {
                            Ok((stream, _addr)) => {
                                let config = Arc::clone(&config);
                                tokio::spawn(async move {
                                    if let Err(e) = handle_connection(stream, &config).await {
                                        tracing::warn!(error = %e, "Session ended with error");
                                    }
                                });
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "Failed to accept connection");
                            }
                        }
                    }
                }
            }
        });

        Ok(ServerHandle {
            socket_path: self.socket_path.clone(),
            shutdown_tx,
        })
    }
}

/// Handle for a running host server.
///
/// When dropped, the socket file is cleaned up.
#[derive(Debug)]
pub struct ServerHandle {
    socket_path: PathBuf,
    shutdown_tx: watch::Sender<bool>,
}

impl ServerHandle {
    /// Signals the server to stop accepting sessions.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Returns the socket path.
    #[must_use]
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);

        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                tracing::warn!(
                    path = %self.socket_path.display(),
                    error = %e,
                    "Failed to remove socket file"
                );
            }
        }
    }
}

/// Run one session over one connection.
async fn handle_connection(stream: UnixStream, config: &HostConfig) -> Result<(), TransportError> {
    let (reader, writer) = stream.into_split();
    let (sink, outbound) = UpstreamSink::channel();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let close = CancellationToken::new();

    let writer_task = tokio::spawn(write_frames(writer, outbound, close.clone()));
    let reader_task = tokio::spawn(read_frames(reader, inbound_tx, sink.clone()));

    let controller = SessionController::new(config, sink);
    let session_id = controller.id().to_string();
    tracing::info!(session = %session_id, "Session connected");

    let exit = controller.run(inbound_rx).await;
    reader_task.abort();
    close.cancel();
    let written = writer_task.await.unwrap_or(Ok(()));

    match exit {
        SessionExit::Stopped { reason } => {
            tracing::info!(session = %session_id, %reason, "Session stopped");
        }
        SessionExit::Disconnected => {
            tracing::info!(session = %session_id, "Session disconnected");
        }
    }
    written
}

async fn read_frames(
    reader: OwnedReadHalf,
    inbound: mpsc::UnboundedSender<InboundFrame>,
    sink: UpstreamSink,
) -> Result<(), TransportError> {
    let mut lines = FrameLines::new(reader);
    while let Some(line) = lines.next_line().await? {
        if line.is_empty() {
            continue;
        }
        match serde_json::from_slice::<InboundFrame>(line) {
            Ok(frame) => {
                tracing::trace!(event = %frame.event, "Inbound frame");
                if inbound.send(frame).is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Malformed frame from session");
                sink.log(format!("Malformed frame: {e}"));
            }
        }
    }
    Ok(())
}

async fn write_frames(
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::UnboundedReceiver<OutboundFrame>,
    close: CancellationToken,
) -> Result<(), TransportError> {
    loop {
        tokio::select! {
            biased;

            () = close.cancelled() => {
                while let Ok(frame) = outbound.try_recv() {
                    write_frame(&mut writer, &frame).await?;
                }
                break;
            }

            frame = outbound.recv() => {
                let Some(frame) = frame else { break };
                write_frame(&mut writer, &frame).await?;
            }
        }
    }
    writer.shutdown().await?;
    Ok(())
}

async fn write_frame(writer: &mut OwnedWriteHalf, frame: &OutboundFrame) -> Result<(), TransportError> {
    let mut json = serde_json::to_string(frame)?;
    json.push('\n');
    writer.write_all(json.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}
