//! Live matrix state and value quantization

use serde::{Deserialize, Serialize};

use crate::MATRIX_DIM;

/// Device output scaling mode
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OutputMode {
    /// Raw sensor readings
    Raw,
    /// Readings quantized into a bounded display range
    Quant,
}

/// Linear quantizer mapping raw readings onto `0..=level`
///
/// Readings below `min` clamp to 0, above `max` clamp to `level`; in
/// between the mapping is linear. `level` is 255 or 1023 on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quantizer {
    pub min: i64,
    pub max: i64,
    pub level: i64,
}

impl Default for Quantizer {
    fn default() -> Self {
        Self {
            min: 0,
            max: 100_000,
            level: 255,
        }
    }
}

impl Quantizer {
    /// Quantize one raw reading. An inverted range yields 0.
    pub fn quantize(&self, raw: i64) -> i64 {
        if self.min >= self.max {
            return 0;
        }
        if raw < self.min {
            return 0;
        }
        if raw > self.max {
            return self.level;
        }
        let range = self.max - self.min;
        ((raw - self.min) * self.level / range).min(self.level)
    }

    /// Apply the given mode: raw passthrough or quantized.
    pub fn display_value(&self, mode: OutputMode, raw: i64) -> i64 {
        match mode {
            OutputMode::Raw => raw,
            OutputMode::Quant => self.quantize(raw),
        }
    }
}

/// Persistent 16x16 value grid mutated by the frame decoder
///
/// Values survive across frames; a frame that skips a cell leaves its
/// last-known value in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixState {
    values: [[i64; MATRIX_DIM]; MATRIX_DIM],
}

impl Default for MatrixState {
    fn default() -> Self {
        Self::new()
    }
}

impl MatrixState {
    /// All-zero grid.
    pub fn new() -> Self {
        Self {
            values: [[0; MATRIX_DIM]; MATRIX_DIM],
        }
    }

    /// Read one cell; out-of-range coordinates read as 0.
    pub fn get(&self, row: usize, col: usize) -> i64 {
        if row < MATRIX_DIM && col < MATRIX_DIM {
            self.values[row][col]
        } else {
            0
        }
    }

    /// Write one cell. Returns false (and writes nothing) when the
    /// coordinates are out of range.
    pub fn set(&mut self, row: usize, col: usize, value: i64) -> bool {
        if row < MATRIX_DIM && col < MATRIX_DIM {
            self.values[row][col] = value;
            true
        } else {
            false
        }
    }

    /// Copy of the full grid.
    pub fn snapshot(&self) -> [[i64; MATRIX_DIM]; MATRIX_DIM] {
        self.values
    }
}
