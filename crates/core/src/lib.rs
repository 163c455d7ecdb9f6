//! Capmon Core - Shared logic for the 16x16 sensor-matrix monitor
//!
//! This crate provides:
//! - Domain types (commands, events, frames, samples)
//! - Serial transport (receiver, liveness monitor, send/dispatch coordinator)
//! - Streaming frame decoder with runtime format detection
//! - Batched SQLite persistence engine
//! - Error types

/// Matrix side length; the device scans a fixed 16x16 grid.
pub const MATRIX_DIM: usize = 16;
/// Total cell count per frame.
pub const MATRIX_CELLS: usize = MATRIX_DIM * MATRIX_DIM;

pub mod error;
pub mod matrix;
pub mod protocol;
pub mod storage;
pub mod transport;
pub mod types;

// Re-export common types
pub use error::{CoreError, Result};
pub use matrix::{MatrixState, OutputMode, Quantizer};
pub use protocol::FrameDecoder;
pub use storage::{StorageConfig, StorageEngine};
pub use transport::{available_ports, LineAssembler, PortInfo, SerialLink, TransportConfig};
pub use types::{DeviceCommand, FrameFormat, LinkEvent, LinkStatus, MatrixFrame, PointSample};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matrix_constants() {
        assert_eq!(MATRIX_DIM, 16);
        assert_eq!(MATRIX_CELLS, 256);
    }
}
