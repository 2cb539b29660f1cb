//! Private channels between the host and each worker.
//!
//! # Architecture
//!
//! ```text
//! Host (WorkerSupervisor)              Worker process
//!     |                                      |
//!     |-- bind <channel_dir>/<uuid>.sock     |
//!     |-- spawn (SCRIPT_HOST_CHANNEL=...) -->|
//!     |<------------------------- connect ---|
//!     |-- {"emit":["echo",{...}]} ---------->|
//!     |<---------- {"emit":["echo",{...}]} --|
//! ```
//!
//! # Protocol
//!
//! JSON-line frames over a Unix domain socket, one `{"emit": [event,
//! args...]}` object per line in both directions. Stdout and stderr stay
//! free for the worker's diagnostics.

pub mod client;
pub mod server;
pub mod types;

pub use client::WorkerClient;
pub use server::{ChannelEndpoint, ChannelHandle};
pub use types::ChannelError;
