//! Configuration module.

mod loader;
mod stop;
mod types;

pub use loader::*;
pub use stop::*;
pub use types::*;
