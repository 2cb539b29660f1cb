//! Events a supervised worker produces for its owner.

use serde_json::Value;
use tokio::sync::mpsc;

/// Something a worker did, in the order it happened.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    /// One line written to stdout.
    Log { id: u32, message: String },
    /// An event emitted over the private channel.
    Emit {
        id: u32,
        event: String,
        args: Vec<Value>,
    },
    /// Accumulated stderr, sent only on abnormal exit.
    Error { id: u32, text: String },
    /// The process terminated. Always the last event for a worker.
    Ended { id: u32, code: Option<i32> },
}

impl WorkerEvent {
    #[must_use]
    pub fn id(&self) -> u32 {
        match self {
            Self::Log { id, .. }
            | Self::Emit { id, .. }
            | Self::Error { id, .. }
            | Self::Ended { id, .. } => *id,
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ended { .. })
    }
}

pub type WorkerEventSender = mpsc::UnboundedSender<WorkerEvent>;
pub type WorkerEventReceiver = mpsc::UnboundedReceiver<WorkerEvent>;

/// Create the event stream for one worker.
#[must_use]
pub fn worker_events() -> (WorkerEventSender, WorkerEventReceiver) {
    mpsc::unbounded_channel()
}
