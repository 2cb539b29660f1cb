//! Watcher for script file content changes.
//!
//! Provides content digests and a debounced per-script watch.

mod change_watcher;
mod digest;
mod error;

pub use change_watcher::{ChangeWatcher, WatchEvent};
pub use digest::ContentDigest;
pub use error::WatchError;
