//! Worker process supervision.
//!
//! The supervisor spawns workers with captured output and a private
//! channel, reaps them when they exit, and stops them with a staged
//! escalation: graceful exit event, channel disconnect, kill.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::{HostConfig, StopConfig};
use crate::ipc::{ChannelEndpoint, ChannelError};
use crate::protocol::{ChannelFrame, CHANNEL_ENV, KILL_EVENT, QUIT_EVENT};
use crate::worker::output::{pump_stderr, pump_stdout};
use crate::worker::{
    ScriptCommand, SpawnError, StopError, WorkerEvent, WorkerEventSender, WorkerRecord,
    WorkerState,
};

/// How long the reaper waits for output pumps after the process exits.
const DRAIN_TIMEOUT: Duration = Duration::from_millis(250);

/// Spawns, stops and reaps worker processes.
#[derive(Debug, Clone)]
pub struct WorkerSupervisor {
    channel_dir: PathBuf,
    interpreter: Option<PathBuf>,
    stop: StopConfig,
}

impl WorkerSupervisor {
    /// Create a supervisor with explicit settings.
    #[must_use]
    pub fn new(channel_dir: impl Into<PathBuf>, stop: StopConfig) -> Self {
        Self {
            channel_dir: channel_dir.into(),
            interpreter: None,
            stop,
        }
    }

    /// Create a supervisor from host configuration.
    #[must_use]
    pub fn from_config(config: &HostConfig) -> Self {
        Self::new(config.scripts.channel_dir.clone(), config.stop.clone())
            .with_interpreter(config.scripts.interpreter.clone())
    }

    /// Run scripts through an interpreter.
    #[must_use]
    pub fn with_interpreter(mut self, interpreter: Option<PathBuf>) -> Self {
        self.interpreter = interpreter;
        self
    }

    #[must_use]
    pub fn stop_config(&self) -> &StopConfig {
        &self.stop
    }

    /// Start `script_name` from `base_path` with the given parameters.
    ///
    /// Everything the worker does is reported on `events`, ending with
    /// exactly one [`WorkerEvent::Ended`].
    ///
    /// # Errors
    ///
    /// Returns [`SpawnError`] naming the path if the process cannot be
    /// started.
    pub fn start(
        &self,
        script_name: &str,
        launch_parameters: Vec<String>,
        base_path: &Path,
        events: WorkerEventSender,
    ) -> Result<Arc<WorkerRecord>, SpawnError> {
        if script_name.trim().is_empty() {
            return Err(SpawnError::EmptyName);
        }
        let command = ScriptCommand::new(script_name, base_path.join(script_name))
            .parameters(launch_parameters)
            .interpreter(self.interpreter.clone());
        self.start_command(command, events)
    }

    /// Start a fully built command.
    ///
    /// # Errors
    ///
    /// Returns [`SpawnError`] if the process cannot be started.
    pub fn start_command(
        &self,
        command: ScriptCommand,
        events: WorkerEventSender,
    ) -> Result<Arc<WorkerRecord>, SpawnError> {
        let endpoint = ChannelEndpoint::bind(&self.channel_dir)?;

        let mut cmd = command.to_command();
        cmd.env(CHANNEL_ENV, endpoint.socket_path());

        let mut child = cmd
            .spawn()
            .map_err(|e| SpawnError::from_io(command.program().to_path_buf(), e))?;

        let Some(id) = child.id() else {
            return Err(SpawnError::ExitedEarly {
                path: command.script_path().to_path_buf(),
            });
        };

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let channel = endpoint.serve(id, inbound_tx);

        tracing::info!(id, command = %command.display(), "Started worker");

        let record = Arc::new(WorkerRecord::new(id, command, channel));
        record.transition(WorkerState::Running);

        let stdout = child
            .stdout
            .take()
            .map(|out| tokio::spawn(pump_stdout(out, id, events.clone())));
        let stderr = child
            .stderr
            .take()
            .map(|err| tokio::spawn(pump_stderr(err, Arc::clone(&record))));
        let emits = tokio::spawn(forward_emits(id, inbound_rx, events.clone()));

        tokio::spawn(reap(
            child,
            Arc::clone(&record),
            Pumps {
                stdout,
                stderr,
                emits,
            },
            events,
        ));

        Ok(record)
    }

    /// Write one event to the worker's private channel.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] if the channel is already closed.
    pub fn send(
        &self,
        record: &WorkerRecord,
        event: &str,
        payload: Option<Value>,
    ) -> Result<(), ChannelError> {
        record.channel().send(ChannelFrame::with_payload(event, payload))
    }

    /// Stop a worker, escalating until it exits.
    ///
    /// Stopping an exited worker succeeds immediately. A second stop while
    /// one is in flight waits for the same exit.
    ///
    /// # Errors
    ///
    /// Returns [`StopError::StillRunning`] if the worker survives the kill.
    pub async fn stop(&self, record: &WorkerRecord) -> Result<u32, StopError> {
        let id = record.id();
        let total = self.stop.graceful() + self.stop.disconnect() + self.stop.kill_confirm();

        if record.state() == WorkerState::Exited {
            return Ok(id);
        }

        if !record.transition(WorkerState::StoppingGraceful) {
            tracing::debug!(id, state = ?record.state(), "Stop already in progress");
            return if record.wait_exited(total).await {
                Ok(id)
            } else {
                Err(StopError::StillRunning {
                    id,
                    reason: "concurrent stop did not complete".to_string(),
                })
            };
        }

        self.escalate(record).await
    }

    /// Stop `record` only if no stop has been requested yet.
    ///
    /// Returns `Ok(None)` when another caller already owns the stop (or the
    /// worker is gone), so exactly one caller acts on each worker's exit.
    ///
    /// # Errors
    ///
    /// Returns [`StopError::StillRunning`] if the worker survives the kill.
    pub async fn stop_exclusive(&self, record: &WorkerRecord) -> Result<Option<u32>, StopError> {
        if !record.transition(WorkerState::StoppingGraceful) {
            tracing::debug!(id = record.id(), state = ?record.state(), "Stop already claimed");
            return Ok(None);
        }
        self.escalate(record).await.map(Some)
    }

    /// Run the stop tiers for a record already in `StoppingGraceful`.
    async fn escalate(&self, record: &WorkerRecord) -> Result<u32, StopError> {
        let id = record.id();

        // Tier 1: ask nicely.
        if let Err(e) = record.send(QUIT_EVENT, None) {
            tracing::debug!(id, error = %e, "Graceful exit event not delivered");
        }
        if record.wait_exited(self.stop.graceful()).await {
            tracing::debug!(id, "Worker exited gracefully");
            return Ok(id);
        }

        // Tier 2: drop the channel.
        if record.transition(WorkerState::StoppingForced) {
            let _ = record.send(KILL_EVENT, None);
            record.channel().disconnect();
        }
        if record.wait_exited(self.stop.disconnect()).await {
            tracing::debug!(id, "Worker exited after disconnect");
            return Ok(id);
        }

        // Tier 3: kill.
        tracing::info!(id, "Still running, forcefully ending worker");
        record.request_kill();
        if record.wait_exited(self.stop.kill_confirm()).await {
            Ok(id)
        } else {
            Err(StopError::StillRunning {
                id,
                reason: "no exit observed after kill".to_string(),
            })
        }
    }
}

struct Pumps {
    stdout: Option<JoinHandle<()>>,
    stderr: Option<JoinHandle<()>>,
    emits: JoinHandle<()>,
}

async fn forward_emits(
    id: u32,
    mut inbound: mpsc::UnboundedReceiver<ChannelFrame>,
    events: WorkerEventSender,
) {
    while let Some(frame) = inbound.recv().await {
        let Some((event, args)) = frame.into_parts() else {
            tracing::warn!(id, "Worker emitted a frame without an event name");
            continue;
        };
        if events.send(WorkerEvent::Emit { id, event, args }).is_err() {
            break;
        }
    }
}

/// Wait for the process to exit, then report it.
async fn reap(mut child: Child, record: Arc<WorkerRecord>, pumps: Pumps, events: WorkerEventSender) {
    let id = record.id();
    let kill = record.kill_token();

    let status = tokio::select! {
        status = child.wait() => status,
        () = kill.cancelled() => {
            if let Err(e) = child.start_kill() {
                tracing::warn!(id, error = %e, "Failed to kill worker");
            }
            child.wait().await
        }
    };

    let code = match status {
        Ok(status) => status.code(),
        Err(e) => {
            tracing::warn!(id, error = %e, "Failed to wait for worker");
            None
        }
    };

    record.transition(WorkerState::Exited);
    tracing::info!(id, ?code, "Worker exited");

    // Output still in the pipes belongs before the end event.
    for handle in [pumps.stdout, pumps.stderr].into_iter().flatten() {
        drain(handle).await;
    }
    record.channel().disconnect();
    drain(pumps.emits).await;

    if matches!(code, Some(c) if c != 0) {
        let text = record.take_error_text();
        let _ = events.send(WorkerEvent::Error { id, text });
    } else {
        let leftover = record.take_error_text();
        if !leftover.is_empty() {
            tracing::debug!(id, stderr = %leftover, "Discarding stderr of clean exit");
        }
    }

    let _ = events.send(WorkerEvent::Ended { id, code });
}

async fn drain(mut handle: JoinHandle<()>) {
    if tokio::time::timeout(DRAIN_TIMEOUT, &mut handle).await.is_err() {
        handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::worker_events;

    #[test]
    fn from_config_copies_settings() {
        let mut config = HostConfig::default();
        config.scripts.interpreter = Some(PathBuf::from("node"));
        config.stop.graceful_ms = 10;
        let supervisor = WorkerSupervisor::from_config(&config);
        assert_eq!(supervisor.interpreter, Some(PathBuf::from("node")));
        assert_eq!(supervisor.stop_config().graceful_ms, 10);
    }

    #[tokio::test]
    async fn start_missing_script_fails_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = WorkerSupervisor::new(dir.path(), StopConfig::default());
        let (tx, _rx) = worker_events();

        let err = supervisor
            .start("missing.sh", Vec::new(), dir.path(), tx)
            .unwrap_err();
        assert!(matches!(err, SpawnError::NotFound { .. }));
        assert!(err.to_string().contains("missing.sh"));

        // No channel socket is left behind.
        let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn start_empty_name_fails() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = WorkerSupervisor::new(dir.path(), StopConfig::default());
        let (tx, _rx) = worker_events();
        let err = supervisor.start("  ", Vec::new(), dir.path(), tx).unwrap_err();
        assert!(matches!(err, SpawnError::EmptyName));
    }
}
