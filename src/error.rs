use std::path::PathBuf;
use thiserror::Error;

/// Every failure the station pipeline can run into.
///
/// None of these are fatal to the background tasks: the acquisition loop
/// defaults the affected sensor and the writer drops the affected row.
#[derive(Debug, Error)]
pub enum StationError {
    #[error("Modbus connection to '{port}' failed: {reason}")]
    Connection { port: String, reason: String },

    #[error("Read of slave {slave} at {address:#06x} failed: {reason}")]
    Read {
        slave: u8,
        address: u16,
        reason: String,
    },

    #[error("Read of slave {slave} timed out")]
    Timeout { slave: u8 },

    #[error("Slave {slave} returned {got} registers, expected {expected}")]
    ShortRead {
        slave: u8,
        expected: usize,
        got: usize,
    },

    #[error("Failed to parse {what}: {reason}")]
    Parse { what: String, reason: String },

    #[error("I/O error for '{0}': {1}")]
    Filesystem(PathBuf, #[source] std::io::Error),

    #[error("Failed to process CSV file '{0}': {1}")]
    Csv(PathBuf, #[source] csv::Error),

    #[error("Invalid value '{value}' for {key}")]
    Config { key: String, value: String },
}

pub type Result<T> = std::result::Result<T, StationError>;
