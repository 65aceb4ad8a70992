//! Block-device adapter
//!
//! This module provides the `BlockDriver` trait, the sector-addressed
//! interface a filesystem or raw block client talks to, and
//! `FtlBlockDevice`, which implements it on top of an [`FtlDevice`].

use alloc::format;
use alloc::string::String;
use log::{debug, error};

use crate::error::{Error, Result};
use crate::ftl::FtlDevice;
use crate::mtd::{cmd, Mtd, MtdFlags};

/// Geometry reported to block consumers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockGeometry {
    /// Device is present and usable
    pub available: bool,
    /// Media changed since the last geometry query (never, for flash)
    pub media_changed: bool,
    /// Writes are accepted
    pub write_enabled: bool,
    /// Advertised number of sectors
    pub sector_count: u32,
    /// Bytes per sector
    pub sector_size: u32,
}

/// Sector-addressed block driver
///
/// # Example
///
/// ```ignore
/// use rftl_core::blockdev::BlockDriver;
///
/// fn first_sector<D: BlockDriver>(dev: &mut D) -> rftl_core::Result<Vec<u8>> {
///     let mut buf = vec![0u8; dev.geometry().sector_size as usize];
///     dev.read(0, 1, &mut buf)?;
///     Ok(buf)
/// }
/// ```
pub trait BlockDriver {
    /// Take an open reference
    fn open(&mut self) -> Result<()>;

    /// Drop an open reference
    fn close(&mut self) -> Result<()>;

    /// Read `sector_count` sectors starting at `start_sector`
    ///
    /// Returns the number of sectors read.
    fn read(&mut self, start_sector: u32, sector_count: u32, buf: &mut [u8]) -> Result<u32>;

    /// Write `sector_count` sectors starting at `start_sector`
    ///
    /// Returns the number of sectors written.
    fn write(&mut self, start_sector: u32, sector_count: u32, buf: &[u8]) -> Result<u32>;

    /// Report the device geometry
    fn geometry(&self) -> BlockGeometry;

    /// Device-specific control command
    fn control(&mut self, cmd: u32, arg: Option<&mut u64>) -> Result<()>;

    /// Size of the advertised capacity in bytes
    fn capacity(&self) -> u64 {
        let geo = self.geometry();
        geo.sector_count as u64 * geo.sector_size as u64
    }
}

/// Block device backed by the flash translation layer
pub struct FtlBlockDevice<M: Mtd> {
    minor: u32,
    ftl: FtlDevice<M>,
    write_enabled: bool,
    open_count: u32,
}

impl<M: Mtd> FtlBlockDevice<M> {
    /// Mount the translation layer on `mtd` as block device `minor`
    ///
    /// # Errors
    /// Any error from [`FtlDevice::new`].
    pub fn new(minor: u32, mtd: M) -> Result<Self> {
        let write_enabled = mtd.flags().contains(MtdFlags::WRITEABLE);
        let ftl = FtlDevice::new(mtd)?;
        debug!(
            "Created /dev/mtdblock{} (write_enabled={})",
            minor, write_enabled
        );
        Ok(Self {
            minor,
            ftl,
            write_enabled,
            open_count: 0,
        })
    }

    /// Minor device number
    pub fn minor(&self) -> u32 {
        self.minor
    }

    /// Device path, e.g. `/dev/mtdblock0`
    pub fn path(&self) -> String {
        format!("/dev/mtdblock{}", self.minor)
    }

    /// Number of open references
    pub fn open_count(&self) -> u32 {
        self.open_count
    }

    /// Get a reference to the translation layer
    pub fn ftl(&self) -> &FtlDevice<M> {
        &self.ftl
    }

    /// Get a mutable reference to the translation layer
    pub fn ftl_mut(&mut self) -> &mut FtlDevice<M> {
        &mut self.ftl
    }

    /// Tear down the device, returning the MTD
    pub fn into_inner(self) -> M {
        self.ftl.into_inner()
    }
}

impl<M: Mtd> BlockDriver for FtlBlockDevice<M> {
    fn open(&mut self) -> Result<()> {
        self.open_count = self
            .open_count
            .checked_add(1)
            .ok_or(Error::InvalidArgument)?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.open_count == 0 {
            error!("{}: close without matching open", self.path());
            return Err(Error::InvalidArgument);
        }
        self.open_count -= 1;
        Ok(())
    }

    fn read(&mut self, start_sector: u32, sector_count: u32, buf: &mut [u8]) -> Result<u32> {
        self.ftl.read(start_sector, sector_count, buf)
    }

    fn write(&mut self, start_sector: u32, sector_count: u32, buf: &[u8]) -> Result<u32> {
        if !self.write_enabled {
            return Err(Error::WriteProtected);
        }
        self.ftl.write(start_sector, sector_count, buf)
    }

    fn geometry(&self) -> BlockGeometry {
        BlockGeometry {
            available: true,
            media_changed: false,
            write_enabled: self.write_enabled,
            sector_count: self.ftl.sector_count(),
            sector_size: self.ftl.geometry().block_size,
        }
    }

    fn control(&mut self, command: u32, arg: Option<&mut u64>) -> Result<()> {
        match command {
            cmd::BLK_XIP_BASE => {
                let Some(arg) = arg else {
                    error!("{}: XIP base request without an argument", self.path());
                    return Err(Error::InvalidArgument);
                };
                self.ftl.mtd_mut().control(cmd::MTD_XIP_BASE, Some(arg))
            }
            _ => self.ftl.mtd_mut().control(command, arg),
        }
    }
}
