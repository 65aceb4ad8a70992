//! Error types for Linux MTD operations

use std::io;
use thiserror::Error;

/// Linux MTD-specific errors
#[derive(Debug, Error)]
pub enum LinuxMtdError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// MTD device not found
    #[error("MTD device not found: {0}")]
    DeviceNotFound(String),

    /// MTD device type is not NAND flash
    #[error("MTD device type is not NAND: {0}")]
    NotNandFlash(String),

    /// Failed to open the character device
    #[error("Failed to open '{path}': {source}")]
    Open {
        path: String,
        #[source]
        source: io::Error,
    },

    /// Failed to read sysfs attribute
    #[error("Failed to read sysfs attribute '{path}': {source}")]
    SysfsRead {
        path: String,
        #[source]
        source: io::Error,
    },

    /// Failed to parse sysfs attribute
    #[error("Failed to parse sysfs attribute '{path}': {value}")]
    SysfsParse { path: String, value: String },

    /// MTD erase size is not a power of 2
    #[error("MTD erase size is not a power of 2: {0}")]
    InvalidEraseSize(u64),

    /// MTD page size does not divide the erase size
    #[error("MTD write size {write_size} does not divide erase size {erase_size}")]
    InvalidWriteSize { write_size: u64, erase_size: u64 },

    /// Non-uniform erase regions are not supported
    #[error("MTD device has non-uniform erase regions (count: {0}), which is not supported")]
    NonUniformEraseRegions(u64),

    /// Missing required parameter
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    /// Invalid parameter value
    #[error("Invalid parameter '{name}': {message}")]
    InvalidParameter { name: &'static str, message: String },
}

/// Result type for Linux MTD operations
pub type Result<T> = std::result::Result<T, LinuxMtdError>;
