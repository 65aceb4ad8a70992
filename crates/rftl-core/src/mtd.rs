//! MTD collaborator trait
//!
//! The translation layer never touches flash directly. Every physical
//! operation goes through an implementation of [`Mtd`], which may be a
//! kernel MTD device, an in-memory emulator or a test double.
//!
//! All calls are synchronous: a call that has to wait for flash timing
//! blocks the caller until the operation finishes.

use crate::error::{Error, Result};
use alloc::boxed::Box;
use bitflags::bitflags;

/// Control commands understood by the block adapter and MTD implementations
///
/// Command numbers are opaque to the translation layer except for
/// [`BLK_XIP_BASE`](cmd::BLK_XIP_BASE), which it rewrites to its MTD
/// equivalent.
pub mod cmd {
    /// Block-level: get the execute-in-place base address
    pub const BLK_XIP_BASE: u32 = 0x0201;

    /// MTD-level: get the execute-in-place base address
    pub const MTD_XIP_BASE: u32 = 0x0d01;
    /// MTD-level: erase every good block on the medium
    pub const MTD_BULK_ERASE: u32 = 0x0d03;
}

bitflags! {
    /// MTD capability flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MtdFlags: u32 {
        /// Medium accepts writes and erases
        const WRITEABLE = 1 << 0;
        /// Medium can report per-block bad status
        const BAD_BLOCKS = 1 << 1;
    }
}

impl Default for MtdFlags {
    fn default() -> Self {
        MtdFlags::WRITEABLE
    }
}

/// Geometry reported by an MTD
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MtdGeometry {
    /// Bytes per sector (the unit read and written by block consumers)
    pub block_size: u32,
    /// Bytes per physical erase block
    pub erase_size: u32,
    /// Number of physical erase blocks on the medium
    pub erase_block_count: u32,
}

impl MtdGeometry {
    /// Check the geometry and return the number of sectors per erase block
    ///
    /// Fails with `InvalidGeometry` if any field is zero, if the erase size
    /// is not a whole number of sectors, or if the total sector count does
    /// not fit in 32 bits.
    pub fn validate(&self) -> Result<u32> {
        if self.block_size == 0 || self.erase_size == 0 || self.erase_block_count == 0 {
            return Err(Error::InvalidGeometry);
        }
        if self.erase_size % self.block_size != 0 {
            return Err(Error::InvalidGeometry);
        }
        let blocks_per_erase = self.erase_size / self.block_size;
        self.erase_block_count
            .checked_mul(blocks_per_erase)
            .ok_or(Error::InvalidGeometry)?;
        Ok(blocks_per_erase)
    }

    /// Sectors per erase block (assumes a validated geometry)
    pub fn blocks_per_erase(&self) -> u32 {
        self.erase_size / self.block_size
    }

    /// Total size of the medium in bytes
    pub fn total_size(&self) -> u64 {
        self.erase_size as u64 * self.erase_block_count as u64
    }
}

/// Memory Technology Device trait
///
/// Sector indices are physical: sector `n` lives in erase block
/// `n / blocks_per_erase`. Implementations must not translate or skip bad
/// blocks themselves.
pub trait Mtd {
    /// Query the device geometry
    ///
    /// Fails with `GeometryUnavailable` if the driver cannot report it.
    fn geometry(&mut self) -> Result<MtdGeometry>;

    /// Capability flags
    fn flags(&self) -> MtdFlags {
        MtdFlags::default()
    }

    /// Whether a physical erase block is marked bad
    fn is_bad(&mut self, block: u32) -> bool;

    /// Read `count` sectors starting at physical sector `sector`
    ///
    /// Returns the number of sectors actually read.
    fn read(&mut self, sector: u32, count: u32, buf: &mut [u8]) -> Result<u32>;

    /// Write `count` sectors starting at physical sector `sector`
    ///
    /// The target sectors must have been erased. Returns the number of
    /// sectors actually written.
    fn write(&mut self, sector: u32, count: u32, buf: &[u8]) -> Result<u32>;

    /// Erase `count` physical erase blocks starting at `block`
    fn erase(&mut self, block: u32, count: u32) -> Result<()>;

    /// Device-specific control command
    ///
    /// `arg` is an in/out word whose meaning depends on `cmd`.
    fn control(&mut self, _cmd: u32, _arg: Option<&mut u64>) -> Result<()> {
        Err(Error::NotSupported)
    }
}

// Blanket impl for boxed MTDs to allow trait objects
impl Mtd for Box<dyn Mtd + Send> {
    fn geometry(&mut self) -> Result<MtdGeometry> {
        (**self).geometry()
    }

    fn flags(&self) -> MtdFlags {
        (**self).flags()
    }

    fn is_bad(&mut self, block: u32) -> bool {
        (**self).is_bad(block)
    }

    fn read(&mut self, sector: u32, count: u32, buf: &mut [u8]) -> Result<u32> {
        (**self).read(sector, count, buf)
    }

    fn write(&mut self, sector: u32, count: u32, buf: &[u8]) -> Result<u32> {
        (**self).write(sector, count, buf)
    }

    fn erase(&mut self, block: u32, count: u32) -> Result<()> {
        (**self).erase(block, count)
    }

    fn control(&mut self, cmd: u32, arg: Option<&mut u64>) -> Result<()> {
        (**self).control(cmd, arg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geo(block_size: u32, erase_size: u32, erase_block_count: u32) -> MtdGeometry {
        MtdGeometry {
            block_size,
            erase_size,
            erase_block_count,
        }
    }

    #[test]
    fn test_validate_ok() {
        assert_eq!(geo(512, 2048, 4).validate(), Ok(4));
        assert_eq!(geo(2048, 2048, 1).validate(), Ok(1));
    }

    #[test]
    fn test_validate_rejects_partial_sectors() {
        assert_eq!(geo(512, 1000, 4).validate(), Err(Error::InvalidGeometry));
    }

    #[test]
    fn test_validate_rejects_zero() {
        assert_eq!(geo(0, 2048, 4).validate(), Err(Error::InvalidGeometry));
        assert_eq!(geo(512, 0, 4).validate(), Err(Error::InvalidGeometry));
        assert_eq!(geo(512, 2048, 0).validate(), Err(Error::InvalidGeometry));
    }

    #[test]
    fn test_validate_rejects_overflow() {
        assert_eq!(
            geo(1, 1 << 20, 1 << 16).validate(),
            Err(Error::InvalidGeometry)
        );
    }

    #[test]
    fn test_total_size() {
        assert_eq!(geo(512, 2048, 4).total_size(), 8192);
    }
}
