//! rftl-dummy - In-memory NAND emulator for testing
//!
//! This crate provides a dummy MTD that emulates a NAND medium in memory,
//! including factory bad blocks. It's useful for testing and development
//! without real hardware.
//!
//! The emulator behaves like real flash: erasing sets a whole erase block
//! to 0xFF, and programming can only clear bits. Every call is recorded so
//! tests can assert exactly which operations the translation layer issued,
//! and erase or write failures can be injected per block.
//!
//! With the `std` feature the medium can be backed by an image file and
//! configured from TOML (see [`config`]).

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(feature = "alloc")]
use alloc::vec;
#[cfg(feature = "alloc")]
use alloc::vec::Vec;

#[cfg(feature = "std")]
pub mod config;

#[cfg(feature = "std")]
pub use config::{parse_options, DummyError, DummySetup};

#[cfg(feature = "alloc")]
use log::{debug, trace};
#[cfg(feature = "alloc")]
use rftl_core::error::{Error, IoFailure, Result};
#[cfg(feature = "alloc")]
use rftl_core::mtd::{cmd, Mtd, MtdFlags, MtdGeometry};

/// Configuration for the dummy NAND
#[cfg(feature = "alloc")]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DummyConfig {
    /// Bytes per sector
    pub block_size: u32,
    /// Bytes per erase block
    pub erase_size: u32,
    /// Number of physical erase blocks
    pub erase_blocks: u32,
    /// Factory bad blocks
    pub bad_blocks: Vec<u32>,
    /// Whether the medium accepts writes and erases
    pub writable: bool,
    /// Execute-in-place base address, if the medium is memory mapped
    pub xip_base: Option<u64>,
}

#[cfg(feature = "alloc")]
impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            block_size: 512,
            erase_size: 16 * 1024,
            erase_blocks: 64,
            bad_blocks: Vec::new(),
            writable: true,
            xip_base: None,
        }
    }
}

#[cfg(feature = "alloc")]
impl DummyConfig {
    /// Geometry this configuration describes
    pub fn geometry(&self) -> MtdGeometry {
        MtdGeometry {
            block_size: self.block_size,
            erase_size: self.erase_size,
            erase_block_count: self.erase_blocks,
        }
    }

    /// Total medium size in bytes
    pub fn size(&self) -> usize {
        self.geometry().total_size() as usize
    }
}

/// One MTD call recorded by the emulator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DummyOp {
    /// Sector read
    Read {
        /// First physical sector
        sector: u32,
        /// Number of sectors
        count: u32,
    },
    /// Sector write
    Write {
        /// First physical sector
        sector: u32,
        /// Number of sectors
        count: u32,
    },
    /// Erase of one physical block
    Erase {
        /// Physical erase block
        block: u32,
    },
}

/// Dummy NAND MTD
///
/// Emulates a NAND medium in memory for testing purposes.
#[cfg(feature = "alloc")]
pub struct DummyNand {
    config: DummyConfig,
    data: Vec<u8>,
    ops: Vec<DummyOp>,
    fail_erase: Option<u32>,
    fail_write: Option<u32>,
    #[cfg(feature = "std")]
    image: Option<std::fs::File>,
}

#[cfg(feature = "alloc")]
impl DummyNand {
    /// Create a new, fully erased dummy NAND with the given configuration
    pub fn new(config: DummyConfig) -> Self {
        let data = vec![0xFF; config.size()];
        Self {
            config,
            data,
            ops: Vec::new(),
            fail_erase: None,
            fail_write: None,
            #[cfg(feature = "std")]
            image: None,
        }
    }

    /// Create a dummy NAND with the default configuration (64 x 16 KiB)
    pub fn new_default() -> Self {
        Self::new(DummyConfig::default())
    }

    /// Create a dummy NAND with pre-filled data
    pub fn with_data(config: DummyConfig, initial_data: &[u8]) -> Self {
        let mut nand = Self::new(config);
        let len = core::cmp::min(initial_data.len(), nand.data.len());
        nand.data[..len].copy_from_slice(&initial_data[..len]);
        nand
    }

    /// Get a reference to the raw medium contents
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Get a mutable reference to the raw medium contents
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Raw contents of one physical erase block
    pub fn block(&self, physical: u32) -> &[u8] {
        let range = self.block_range(physical);
        &self.data[range]
    }

    /// Get the configuration
    pub fn config(&self) -> &DummyConfig {
        &self.config
    }

    /// Operations recorded since creation or the last `clear_ops`
    pub fn ops(&self) -> &[DummyOp] {
        &self.ops
    }

    /// Forget recorded operations
    pub fn clear_ops(&mut self) {
        self.ops.clear();
    }

    /// Number of recorded erase calls
    pub fn erase_count(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, DummyOp::Erase { .. }))
            .count()
    }

    /// Number of recorded write calls
    pub fn write_count(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, DummyOp::Write { .. }))
            .count()
    }

    /// Make the next erases of `block` fail (or stop failing with `None`)
    pub fn fail_erase(&mut self, block: Option<u32>) {
        self.fail_erase = block;
    }

    /// Make the next writes into `block` fail (or stop failing with `None`)
    pub fn fail_write(&mut self, block: Option<u32>) {
        self.fail_write = block;
    }

    fn blocks_per_erase(&self) -> u32 {
        self.config.erase_size / self.config.block_size
    }

    fn block_range(&self, physical: u32) -> core::ops::Range<usize> {
        let erase_size = self.config.erase_size as usize;
        let start = physical as usize * erase_size;
        start..start + erase_size
    }

    /// Byte range of a sector span, or `None` if it runs past the medium
    fn sector_range(&self, sector: u32, count: u32) -> Option<core::ops::Range<usize>> {
        let bs = self.config.block_size as usize;
        let start = (sector as usize).checked_mul(bs)?;
        let end = start.checked_add((count as usize).checked_mul(bs)?)?;
        if end > self.data.len() {
            return None;
        }
        Some(start..end)
    }

    /// Whether any erase block touched by a sector span is bad
    fn touches_bad(&self, sector: u32, count: u32) -> bool {
        if count == 0 {
            return false;
        }
        let bpe = self.blocks_per_erase();
        let first = sector / bpe;
        let last = (sector + count - 1) / bpe;
        (first..=last).any(|b| self.config.bad_blocks.contains(&b))
    }

    #[cfg(feature = "std")]
    fn persist(&mut self, range: core::ops::Range<usize>) -> std::io::Result<()> {
        use std::io::{Seek, SeekFrom, Write};

        if let Some(file) = self.image.as_mut() {
            file.seek(SeekFrom::Start(range.start as u64))?;
            file.write_all(&self.data[range])?;
        }
        Ok(())
    }

    #[cfg(not(feature = "std"))]
    fn persist(&mut self, _range: core::ops::Range<usize>) -> core::result::Result<(), ()> {
        Ok(())
    }
}

#[cfg(feature = "alloc")]
impl Mtd for DummyNand {
    fn geometry(&mut self) -> Result<MtdGeometry> {
        Ok(self.config.geometry())
    }

    fn flags(&self) -> MtdFlags {
        if self.config.writable {
            MtdFlags::WRITEABLE | MtdFlags::BAD_BLOCKS
        } else {
            MtdFlags::BAD_BLOCKS
        }
    }

    fn is_bad(&mut self, block: u32) -> bool {
        self.config.bad_blocks.contains(&block)
    }

    fn read(&mut self, sector: u32, count: u32, buf: &mut [u8]) -> Result<u32> {
        self.ops.push(DummyOp::Read { sector, count });
        trace!("dummy: read {} sectors at {}", count, sector);

        let range = self
            .sector_range(sector, count)
            .ok_or(Error::IoError(IoFailure::Read { sector }))?;
        if self.touches_bad(sector, count) || buf.len() < range.len() {
            return Err(Error::IoError(IoFailure::Read { sector }));
        }

        let len = range.len();
        buf[..len].copy_from_slice(&self.data[range]);
        Ok(count)
    }

    fn write(&mut self, sector: u32, count: u32, buf: &[u8]) -> Result<u32> {
        self.ops.push(DummyOp::Write { sector, count });
        trace!("dummy: write {} sectors at {}", count, sector);

        if !self.config.writable {
            return Err(Error::WriteProtected);
        }
        let range = self
            .sector_range(sector, count)
            .ok_or(Error::IoError(IoFailure::Write { sector }))?;
        if self.touches_bad(sector, count) || buf.len() < range.len() {
            return Err(Error::IoError(IoFailure::Write { sector }));
        }
        if self.fail_write == Some(sector / self.blocks_per_erase()) {
            debug!("dummy: injected write failure at sector {}", sector);
            return Err(Error::IoError(IoFailure::Write { sector }));
        }

        // Flash programming: can only change 1 -> 0
        for (dst, src) in self.data[range.clone()].iter_mut().zip(buf) {
            *dst &= *src;
        }

        self.persist(range)
            .map_err(|_| Error::IoError(IoFailure::Write { sector }))?;
        Ok(count)
    }

    fn erase(&mut self, block: u32, count: u32) -> Result<()> {
        if !self.config.writable {
            return Err(Error::WriteProtected);
        }

        for physical in block..block.saturating_add(count) {
            self.ops.push(DummyOp::Erase { block: physical });
            trace!("dummy: erase block {}", physical);

            if physical >= self.config.erase_blocks
                || self.config.bad_blocks.contains(&physical)
                || self.fail_erase == Some(physical)
            {
                return Err(Error::IoError(IoFailure::Erase { block: physical }));
            }

            let range = self.block_range(physical);
            self.data[range.clone()].fill(0xFF);
            self.persist(range)
                .map_err(|_| Error::IoError(IoFailure::Erase { block: physical }))?;
        }
        Ok(())
    }

    fn control(&mut self, command: u32, arg: Option<&mut u64>) -> Result<()> {
        match command {
            cmd::MTD_XIP_BASE => {
                let base = self.config.xip_base.ok_or(Error::NotSupported)?;
                let out = arg.ok_or(Error::InvalidArgument)?;
                *out = base;
                Ok(())
            }
            cmd::MTD_BULK_ERASE => {
                debug!("dummy: bulk erase");
                for physical in 0..self.config.erase_blocks {
                    if !self.config.bad_blocks.contains(&physical) {
                        self.erase(physical, 1)?;
                    }
                }
                Ok(())
            }
            _ => Err(Error::NotSupported),
        }
    }
}

#[cfg(all(test, feature = "alloc"))]
mod tests {
    use super::*;

    fn small() -> DummyConfig {
        DummyConfig {
            block_size: 512,
            erase_size: 2048,
            erase_blocks: 4,
            bad_blocks: vec![1],
            ..Default::default()
        }
    }

    #[test]
    fn test_geometry() {
        let mut nand = DummyNand::new(small());
        let geo = nand.geometry().unwrap();
        assert_eq!(geo.block_size, 512);
        assert_eq!(geo.erase_size, 2048);
        assert_eq!(geo.erase_block_count, 4);
        assert!(nand.is_bad(1));
        assert!(!nand.is_bad(2));
    }

    #[test]
    fn test_read_write() {
        let mut nand = DummyNand::new(small());

        let data = [0x12u8; 512];
        assert_eq!(nand.write(8, 1, &data), Ok(1));

        let mut buf = [0u8; 512];
        assert_eq!(nand.read(8, 1, &mut buf), Ok(1));
        assert_eq!(buf, data);
    }

    #[test]
    fn test_programming_only_clears_bits() {
        let mut nand = DummyNand::new(small());
        nand.write(0, 1, &[0xF0u8; 512]).unwrap();
        nand.write(0, 1, &[0x0Fu8; 512]).unwrap();

        let mut buf = [0u8; 512];
        nand.read(0, 1, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0x00));
    }

    #[test]
    fn test_erase() {
        let mut nand = DummyNand::new(small());
        nand.write(12, 4, &[0u8; 2048]).unwrap();
        nand.erase(3, 1).unwrap();
        assert!(nand.block(3).iter().all(|&b| b == 0xFF));
        assert_eq!(nand.erase_count(), 1);
        assert_eq!(nand.write_count(), 1);
    }

    #[test]
    fn test_bad_block_io_fails() {
        let mut nand = DummyNand::new(small());
        let mut buf = [0u8; 512];
        assert_eq!(
            nand.read(4, 1, &mut buf),
            Err(Error::IoError(IoFailure::Read { sector: 4 }))
        );
        assert_eq!(
            nand.erase(1, 1),
            Err(Error::IoError(IoFailure::Erase { block: 1 }))
        );
    }

    #[test]
    fn test_out_of_range_fails() {
        let mut nand = DummyNand::new(small());
        let mut buf = [0u8; 512];
        assert!(nand.read(16, 1, &mut buf).is_err());
        assert!(nand.erase(4, 1).is_err());
    }

    #[test]
    fn test_read_only() {
        let mut nand = DummyNand::new(DummyConfig {
            writable: false,
            ..small()
        });
        assert_eq!(nand.flags(), MtdFlags::BAD_BLOCKS);
        assert_eq!(nand.write(0, 1, &[0u8; 512]), Err(Error::WriteProtected));
        assert_eq!(nand.erase(0, 1), Err(Error::WriteProtected));
    }

    #[test]
    fn test_injected_failures() {
        let mut nand = DummyNand::new(small());
        nand.fail_erase(Some(2));
        nand.fail_write(Some(3));
        assert!(nand.erase(2, 1).is_err());
        assert!(nand.write(12, 1, &[0u8; 512]).is_err());
        nand.fail_erase(None);
        assert!(nand.erase(2, 1).is_ok());
    }

    #[test]
    fn test_control() {
        let mut nand = DummyNand::new(DummyConfig {
            xip_base: Some(0x1000_0000),
            ..small()
        });
        let mut base = 0u64;
        nand.control(cmd::MTD_XIP_BASE, Some(&mut base)).unwrap();
        assert_eq!(base, 0x1000_0000);
        assert_eq!(nand.control(0xdead, None), Err(Error::NotSupported));

        nand.write(0, 1, &[0u8; 512]).unwrap();
        nand.clear_ops();
        nand.control(cmd::MTD_BULK_ERASE, None).unwrap();
        assert_eq!(nand.erase_count(), 3);
        assert!(nand.data().iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_default_medium() {
        let mut nand = DummyNand::new_default();
        let geo = nand.geometry().unwrap();
        assert_eq!(geo.erase_block_count, 64);
        assert_eq!(geo.erase_size, 16 * 1024);
        assert_eq!(nand.data().len(), 1024 * 1024);
        assert!(nand
            .flags()
            .contains(MtdFlags::WRITEABLE | MtdFlags::BAD_BLOCKS));
    }

    #[test]
    fn test_with_data() {
        let nand = DummyNand::with_data(small(), &[0xAB; 100]);
        assert!(nand.data()[..100].iter().all(|&b| b == 0xAB));
        assert!(nand.data()[100..].iter().all(|&b| b == 0xFF));
    }
}
