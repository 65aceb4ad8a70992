//! Error types for rftl-core
//!
//! This module provides a no_std compatible error type shared by the MTD
//! trait, the translation layer and the block-device adapter. MTD
//! implementations return these errors directly so the layer above can
//! surface them verbatim.

use core::fmt;

/// Details about a failed MTD transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoFailure {
    /// Driver-level read failure
    Read {
        /// First physical sector of the failed read
        sector: u32,
    },
    /// Driver-level write failure
    Write {
        /// First physical sector of the failed write
        sector: u32,
    },
    /// Driver-level erase failure
    Erase {
        /// Physical erase block that failed to erase
        block: u32,
    },
    /// The driver transferred a different number of sectors than requested
    ShortTransfer {
        /// Sectors requested
        expected: u32,
        /// Sectors actually transferred
        actual: u32,
    },
}

/// Core error type - no_std compatible, Copy for efficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    // Construction errors
    /// The MTD could not report its geometry
    GeometryUnavailable,
    /// The reported geometry cannot back a block device
    InvalidGeometry,
    /// The map or the staging buffer could not be allocated
    OutOfMemory,

    // Addressing errors
    /// The logical erase block has no good physical block behind it (ENXIO)
    NoSuchPhysicalBlock,

    // I/O errors
    /// An MTD read, write or erase failed
    IoError(IoFailure),

    // Caller errors
    /// Invalid argument (short buffer, missing control argument, ...)
    InvalidArgument,
    /// The medium is not writable
    WriteProtected,
    /// The control command is not recognised by the MTD
    NotSupported,
}

impl fmt::Display for IoFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read { sector } => write!(f, "read failed at sector {}", sector),
            Self::Write { sector } => write!(f, "write failed at sector {}", sector),
            Self::Erase { block } => write!(f, "erase failed at block {}", block),
            Self::ShortTransfer { expected, actual } => write!(
                f,
                "short transfer: expected {} sectors, got {}",
                expected, actual
            ),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GeometryUnavailable => write!(f, "MTD geometry unavailable"),
            Self::InvalidGeometry => write!(f, "invalid MTD geometry"),
            Self::OutOfMemory => write!(f, "out of memory"),
            Self::NoSuchPhysicalBlock => write!(f, "no such physical block"),
            Self::IoError(failure) => write!(f, "I/O error: {}", failure),
            Self::InvalidArgument => write!(f, "invalid argument"),
            Self::WriteProtected => write!(f, "medium is write protected"),
            Self::NotSupported => write!(f, "command not supported"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
