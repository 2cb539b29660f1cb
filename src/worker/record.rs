//! Worker records and their lifecycle state machine.

use std::path::Path;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::ipc::{ChannelError, ChannelHandle};
use crate::protocol::ChannelFrame;
use crate::worker::ScriptCommand;

/// Lifecycle state of a worker process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    #[default]
    Starting,
    Running,
    StoppingGraceful,
    StoppingForced,
    Exited,
}

impl WorkerState {
    /// Whether the state machine may move from `self` to `next`.
    ///
    /// States only move forward; `Exited` is terminal and reachable from
    /// every other state.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        use WorkerState::{Exited, Running, Starting, StoppingForced, StoppingGraceful};

        matches!(
            (self, next),
            (Starting, Running | StoppingGraceful)
                | (Running, StoppingGraceful)
                | (StoppingGraceful, StoppingForced)
                | (Starting | Running | StoppingGraceful | StoppingForced, Exited)
        )
    }

    /// True once a stop has been requested or the process is gone.
    #[must_use]
    pub fn is_stopping_or_exited(self) -> bool {
        matches!(
            self,
            Self::StoppingGraceful | Self::StoppingForced | Self::Exited
        )
    }
}

/// One supervised worker process.
///
/// Records are shared between the registry, the routing path and the
/// tasks that pump the worker's output; all mutable parts are internally
/// synchronized.
#[derive(Debug)]
pub struct WorkerRecord {
    id: u32,
    command: ScriptCommand,
    started_at: DateTime<Utc>,
    channel: ChannelHandle,
    state: watch::Sender<WorkerState>,
    last_error: Mutex<Vec<u8>>,
    kill: CancellationToken,
}

impl WorkerRecord {
    /// Create a record in the `Starting` state.
    #[must_use]
    pub fn new(id: u32, command: ScriptCommand, channel: ChannelHandle) -> Self {
        let (state, _) = watch::channel(WorkerState::Starting);
        Self {
            id,
            command,
            started_at: Utc::now(),
            channel,
            state,
            last_error: Mutex::new(Vec::new()),
            kill: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[must_use]
    pub fn command(&self) -> &ScriptCommand {
        &self.command
    }

    #[must_use]
    pub fn script_name(&self) -> &str {
        self.command.script_name()
    }

    #[must_use]
    pub fn script_path(&self) -> &Path {
        self.command.script_path()
    }

    #[must_use]
    pub fn launch_parameters(&self) -> &[String] {
        self.command.launch_parameters()
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    /// Subscribe to state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    /// Move to `next` if the state machine allows it.
    ///
    /// Returns false (and leaves the state alone) for disallowed moves, so
    /// concurrent callers race safely: exactly one wins each transition.
    pub fn transition(&self, next: WorkerState) -> bool {
        let id = self.id;
        self.state.send_if_modified(|current| {
            if current.can_transition_to(next) {
                tracing::debug!(id, from = ?*current, to = ?next, "Worker state transition");
                *current = next;
                true
            } else {
                false
            }
        })
    }

    /// Wait until the worker reaches `Exited` or `timeout` elapses.
    ///
    /// Returns true if the worker exited.
    pub async fn wait_exited(&self, timeout: std::time::Duration) -> bool {
        let mut rx = self.subscribe();
        let exited = matches!(
            tokio::time::timeout(timeout, rx.wait_for(|s| *s == WorkerState::Exited)).await,
            Ok(Ok(_))
        );
        exited
    }

    #[must_use]
    pub fn channel(&self) -> &ChannelHandle {
        &self.channel
    }

    /// Queue an event for the worker.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] once the channel is gone.
    pub fn send(&self, event: &str, payload: Option<Value>) -> Result<(), ChannelError> {
        self.channel.send(ChannelFrame::with_payload(event, payload))
    }

    /// Append a raw stderr fragment.
    pub fn append_error(&self, fragment: &[u8]) {
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(fragment);
    }

    /// Take the accumulated stderr text, leaving the buffer empty.
    #[must_use]
    pub fn take_error_text(&self) -> String {
        let bytes = std::mem::take(
            &mut *self
                .last_error
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        String::from_utf8_lossy(&bytes).trim().to_string()
    }

    /// Ask the process reaper to kill the worker.
    pub fn request_kill(&self) {
        self.kill.cancel();
    }

    pub(crate) fn kill_token(&self) -> CancellationToken {
        self.kill.clone()
    }

    /// Serializable view of the record.
    #[must_use]
    pub fn snapshot(&self) -> WorkerSnapshot {
        WorkerSnapshot {
            id: self.id,
            script_name: self.script_name().to_string(),
            parameters: self.launch_parameters().to_vec(),
            state: self.state(),
            started_at: self.started_at,
        }
    }
}

/// Point-in-time view of a worker, as reported to the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerSnapshot {
    pub id: u32,
    pub script_name: String,
    pub parameters: Vec<String>,
    pub state: WorkerState,
    pub started_at: DateTime<Utc>,
}
