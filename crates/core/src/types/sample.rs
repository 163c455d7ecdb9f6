//! Point samples bound for durable storage

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One (row, col) observation owned by the persistence engine until written
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PointSample {
    pub timestamp: DateTime<Utc>,
    pub row: u8,
    pub col: u8,
    /// Value after display-side scaling; equals `raw_value` in raw mode
    pub value: i64,
    /// Reading as the device reported it
    pub raw_value: i64,
    /// Frame the sample was cut from, if any
    pub frame_id: Option<u64>,
}

impl PointSample {
    /// Create a sample stamped with the current time.
    pub fn new(row: u8, col: u8, value: i64, raw_value: i64) -> Self {
        Self {
            timestamp: Utc::now(),
            row,
            col,
            value,
            raw_value,
            frame_id: None,
        }
    }

    /// Attach the originating frame id.
    pub fn with_frame(mut self, frame_id: u64) -> Self {
        self.frame_id = Some(frame_id);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_creation() {
        let sample = PointSample::new(2, 7, 128, 54321);
        assert_eq!(sample.row, 2);
        assert_eq!(sample.col, 7);
        assert_eq!(sample.value, 128);
        assert_eq!(sample.raw_value, 54321);
        assert_eq!(sample.frame_id, None);
    }

    #[test]
    fn test_with_frame() {
        let sample = PointSample::new(0, 0, 1, 1).with_frame(42);
        assert_eq!(sample.frame_id, Some(42));
    }
}
