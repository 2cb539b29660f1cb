//! Wire protocol shared by the session transport and worker channels.

mod address;
mod frames;
mod lines;
mod names;

pub use address::*;
pub use frames::*;
pub use lines::FrameLines;
pub use names::*;
