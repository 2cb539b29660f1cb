//! Event routing and the per-session worker registry.

mod registry;
#[allow(clippy::module_inception)]
mod router;

pub use registry::WorkerRegistry;
pub use router::EventRouter;

use crate::worker::{SpawnError, StopError};

/// Errors from routing-level worker operations.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("{0}")]
    Spawn(#[from] SpawnError),

    #[error("{0}")]
    Stop(#[from] StopError),

    /// A live worker already holds this id.
    #[error("Worker {0} is already registered")]
    Duplicate(u32),
}
