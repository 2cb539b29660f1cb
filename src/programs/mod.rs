//! Worker programs built into the `script-host` binary.

pub mod echo;
pub mod install;

pub use echo::EchoOptions;
