//! script-host - supervise script worker processes for one controlling
//! session per connection.

pub mod config;
pub mod display;
pub mod install;
pub mod ipc;
pub mod programs;
pub mod protocol;
pub mod router;
pub mod session;
pub mod transport;
pub mod watcher;
pub mod worker;
