//! Session control.

mod controller;

pub use controller::{SessionController, SessionExit};
