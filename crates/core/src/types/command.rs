//! Outbound command types for the sensor device

use serde::{Deserialize, Serialize};

use crate::matrix::OutputMode;

/// Command sent to the device over the serial link
///
/// The wire encoding is free text; these variants cover the verbs the
/// firmware understands, plus a passthrough for anything else.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum DeviceCommand {
    /// Frame transmission period in milliseconds
    SetRate(u32),
    /// Restrict scanning to a single row
    SetRow(u8),
    /// Restrict scanning to a single column
    SetCol(u8),
    /// Scan one point once
    ScanPoint { row: u8, col: u8 },
    /// Switch between raw and quantized device output
    SetMode(OutputMode),
    /// Quantization input range
    SetRange { min: i64, max: i64 },
    /// Quantization level count (255 or 1023)
    SetLevel(u16),
    /// Free-text passthrough
    Raw(String),
}

impl DeviceCommand {
    /// Encode as the wire text understood by the device, without terminator.
    pub fn to_wire(&self) -> String {
        match self {
            Self::SetRate(ms) => format!("SET_RATE:{ms}"),
            Self::SetRow(n) => format!("SET_ROW:{n}"),
            Self::SetCol(n) => format!("SET_COL:{n}"),
            Self::ScanPoint { row, col } => format!("SCAN_POINT:{row}:{col}"),
            Self::SetMode(OutputMode::Raw) => "SET_MODE:raw".to_string(),
            Self::SetMode(OutputMode::Quant) => "SET_MODE:quant".to_string(),
            Self::SetRange { min, max } => format!("SET_RANGE:{min}:{max}"),
            Self::SetLevel(level) => format!("SET_LEVEL:{level}"),
            Self::Raw(text) => text.trim().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_wire_encoding() {
        assert_eq!(DeviceCommand::SetRate(100).to_wire(), "SET_RATE:100");
        assert_eq!(DeviceCommand::SetRow(3).to_wire(), "SET_ROW:3");
        assert_eq!(DeviceCommand::SetCol(15).to_wire(), "SET_COL:15");
        assert_eq!(
            DeviceCommand::ScanPoint { row: 2, col: 7 }.to_wire(),
            "SCAN_POINT:2:7"
        );
        assert_eq!(
            DeviceCommand::SetMode(OutputMode::Quant).to_wire(),
            "SET_MODE:quant"
        );
        assert_eq!(
            DeviceCommand::SetRange { min: 0, max: 100_000 }.to_wire(),
            "SET_RANGE:0:100000"
        );
        assert_eq!(DeviceCommand::SetLevel(1023).to_wire(), "SET_LEVEL:1023");
    }

    #[test]
    fn test_raw_command_trimmed() {
        let cmd = DeviceCommand::Raw("  TEST_MODE \r\n".to_string());
        assert_eq!(cmd.to_wire(), "TEST_MODE");
    }
}
