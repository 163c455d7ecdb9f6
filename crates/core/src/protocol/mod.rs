//! Wire protocol: line parsing and streaming frame assembly
//!
//! The device speaks a newline-delimited text protocol. `START` and `END`
//! bracket one full matrix refresh; the payload encoding between them is
//! not known until the first recognizable data line arrives.

pub mod decoder;
pub mod line;

pub use decoder::FrameDecoder;
pub use line::{detect_format, Detection, PointUpdate};
