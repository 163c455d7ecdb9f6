//! Error types for capmon-core

use thiserror::Error;

/// Core error type
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Storage busy after {attempts} attempts")]
    StorageBusy { attempts: u32 },

    #[error("Not connected")]
    NotConnected,

    #[error("Channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("Invalid port: {0}")]
    InvalidPort(String),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, CoreError>;
