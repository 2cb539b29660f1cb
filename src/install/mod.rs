//! Dependency installation for script directories.
//!
//! The host never runs the package manager itself. It starts a one-shot
//! install worker, sends it an [`InstallRequest`] and waits for the single
//! [`InstallResult`] the worker emits back.

mod coordinator;
mod manager;
mod types;

pub use coordinator::InstallCoordinator;
pub use manager::PackageManager;
pub use types::{resolve_target, InstallError, InstallRequest, InstallResult, PathError};
