//! Worker process lifecycle.
//!
//! A worker is one spawned script with captured stdout/stderr and a private
//! event channel. [`WorkerSupervisor`] starts and stops workers; everything a
//! worker does comes back as a stream of [`WorkerEvent`]s.

mod command;
mod error;
mod event;
pub mod output;
pub(crate) mod record;
mod supervisor;

pub use command::{parse_parameters, split_run_request, ScriptCommand};
pub use error::{SpawnError, StopError};
pub use event::{worker_events, WorkerEvent, WorkerEventReceiver, WorkerEventSender};
pub use record::{WorkerRecord, WorkerSnapshot, WorkerState};
pub use supervisor::WorkerSupervisor;
