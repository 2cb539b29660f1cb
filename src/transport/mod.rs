//! Upstream session transport.
//!
//! # Architecture
//!
//! ```text
//! Session (HostClient)                  Host (HostServer)
//!     |                                      |
//!     |-- connect /tmp/script-host.sock ---->|-- SessionController
//!     |<---- {"type":"event","event":"log"} -|
//!     |-- {"event":"run-script",             |
//!     |    "payload":"a.js|x","ack":1} ----->|
//!     |<------ {"type":"ack","ack":1,        |
//!     |         "args":[4312]} --------------|
//!     |<------ {"type":"event",              |
//!     |         "event":"4312@ready",...} ---|
//! ```
//!
//! # Protocol
//!
//! JSON-line frames over a Unix domain socket. One connection is one
//! session; closing it stops the session's workers.

pub mod client;
mod error;
pub mod server;
mod sink;

pub use client::HostClient;
pub use error::TransportError;
pub use server::{HostServer, ServerHandle};
pub use sink::UpstreamSink;

/// Default socket path for the host.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/script-host.sock";
