//! FTL device: read path and read-erase-modify-write engine
//!
//! A write request is split into up to three phases:
//!
//! 1. A leading partial erase block (start not erase-block aligned):
//!    read the whole block into the staging buffer, erase it, patch the
//!    requested sectors and write the whole block back.
//! 2. Whole erase blocks: erase and write directly from the caller's
//!    buffer, no staging needed.
//! 3. A trailing partial erase block: same as phase 1, but the patch always
//!    starts at the beginning of the block.
//!
//! Nothing here is atomic. If the write-back after an erase fails, the
//! block is left erased and its old contents are gone. If a multi-block
//! write fails part way, blocks already rewritten stay rewritten.

use alloc::boxed::Box;
use alloc::vec::Vec;
use log::{debug, error, info, trace};

use crate::error::{Error, IoFailure, Result};
use crate::ftl::map::BlockMap;
use crate::ftl::translate::{translate, SectorAddress};
use crate::mtd::{Mtd, MtdGeometry};

/// Counters accumulated by an [`FtlDevice`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FtlStats {
    /// Logical sectors returned to callers
    pub sectors_read: u64,
    /// Logical sectors accepted from callers
    pub sectors_written: u64,
    /// Erase calls issued to the MTD
    pub erases: u64,
    /// Partial erase blocks rewritten through the staging buffer
    pub rmw_cycles: u64,
    /// Whole erase blocks rewritten directly
    pub full_block_writes: u64,
}

/// Flash translation layer over an MTD
///
/// Owns the MTD, the bad-block map and a staging buffer of exactly one
/// erase block. Every I/O method takes `&mut self`, so one device instance
/// can only ever have a single operation in flight. Callers that share a
/// device between threads must put it behind their own lock.
pub struct FtlDevice<M: Mtd> {
    mtd: M,
    geometry: MtdGeometry,
    blocks_per_erase: u32,
    map: BlockMap,
    staging: Box<[u8]>,
    stats: FtlStats,
}

impl<M: Mtd> FtlDevice<M> {
    /// Mount the translation layer on an MTD
    ///
    /// Queries the geometry once, builds the bad-block map and allocates
    /// the staging buffer. Flash contents are not modified.
    ///
    /// # Errors
    /// * `GeometryUnavailable` - If the MTD cannot report its geometry
    /// * `InvalidGeometry` - If the geometry cannot back a block device
    /// * `OutOfMemory` - If the map or the staging buffer cannot be allocated
    pub fn new(mut mtd: M) -> Result<Self> {
        let geometry = mtd.geometry().map_err(|e| {
            error!("Failed to query MTD geometry: {}", e);
            e
        })?;
        let blocks_per_erase = geometry.validate().map_err(|e| {
            error!("Unusable MTD geometry {:?}", geometry);
            e
        })?;

        debug!(
            "MTD geometry: block_size={}, erase_size={}, erase_blocks={}, blocks_per_erase={}",
            geometry.block_size, geometry.erase_size, geometry.erase_block_count, blocks_per_erase
        );

        let map = BlockMap::scan(&mut mtd, geometry.erase_block_count)?;
        let staging = alloc_staging(geometry.erase_size as usize)?;

        info!(
            "FTL mounted: {} sectors of {} bytes, {} of {} erase blocks usable",
            geometry.erase_block_count * blocks_per_erase,
            geometry.block_size,
            map.good_blocks(),
            geometry.erase_block_count
        );

        Ok(Self {
            mtd,
            geometry,
            blocks_per_erase,
            map,
            staging,
            stats: FtlStats::default(),
        })
    }

    /// Geometry reported by the MTD at mount time
    pub fn geometry(&self) -> &MtdGeometry {
        &self.geometry
    }

    /// Sectors per erase block
    pub fn blocks_per_erase(&self) -> u32 {
        self.blocks_per_erase
    }

    /// Advertised capacity in sectors
    ///
    /// This is `erase_block_count * blocks_per_erase` and does not shrink
    /// for bad blocks: the last `bad * blocks_per_erase` sectors are
    /// advertised but fail with `NoSuchPhysicalBlock`.
    pub fn sector_count(&self) -> u32 {
        self.geometry.erase_block_count * self.blocks_per_erase
    }

    /// The bad-block map
    pub fn map(&self) -> &BlockMap {
        &self.map
    }

    /// Accumulated counters
    pub fn stats(&self) -> FtlStats {
        self.stats
    }

    /// Reset the counters to zero
    pub fn reset_stats(&mut self) {
        self.stats = FtlStats::default();
    }

    /// Get a reference to the underlying MTD
    pub fn mtd(&self) -> &M {
        &self.mtd
    }

    /// Get a mutable reference to the underlying MTD
    pub fn mtd_mut(&mut self) -> &mut M {
        &mut self.mtd
    }

    /// Unmount, returning the MTD
    pub fn into_inner(self) -> M {
        self.mtd
    }

    /// Translate a logical sector to its physical location
    pub fn translate(&self, sector: u32) -> Result<SectorAddress> {
        translate(&self.map, self.blocks_per_erase, sector)
    }

    /// Read `count` sectors starting at logical sector `start`
    ///
    /// Sectors are read one at a time in increasing order. The first
    /// failure stops the read and is returned as-is; sectors copied before
    /// it are left in `buf`.
    ///
    /// # Errors
    /// * `InvalidArgument` - If `buf` is shorter than `count` sectors
    /// * `NoSuchPhysicalBlock` - If a sector lies in an unmapped block
    /// * `IoError` - If the MTD read fails or returns a short count
    pub fn read(&mut self, start: u32, count: u32, buf: &mut [u8]) -> Result<u32> {
        let block_size = self.geometry.block_size as usize;
        let len = self.request_len(count, buf.len())?;

        for (i, chunk) in buf[..len].chunks_exact_mut(block_size).enumerate() {
            let sector = start
                .checked_add(i as u32)
                .ok_or(Error::NoSuchPhysicalBlock)?;
            let addr = translate(&self.map, self.blocks_per_erase, sector)?;
            let physical = addr.physical_sector(self.blocks_per_erase);

            trace!("Read sector {} from physical sector {}", sector, physical);
            let n = self.mtd.read(physical, 1, chunk).map_err(|e| {
                error!("MTD read of sector {} failed: {}", physical, e);
                e
            })?;
            check_count(1, n)?;
            self.stats.sectors_read += 1;
        }

        Ok(count)
    }

    /// Write `count` sectors starting at logical sector `start`
    ///
    /// # Errors
    /// * `InvalidArgument` - If `buf` is shorter than `count` sectors
    /// * `NoSuchPhysicalBlock` - If an erase block in the span is unmapped
    /// * `IoError` - If any MTD read, erase or write fails
    ///
    /// On error the affected erase block may already have been erased,
    /// and earlier erase blocks of the same request stay rewritten.
    pub fn write(&mut self, start: u32, count: u32, buf: &[u8]) -> Result<u32> {
        let block_size = self.geometry.block_size as usize;
        let erase_size = self.geometry.erase_size as usize;
        let bpe = self.blocks_per_erase;
        let len = self.request_len(count, buf.len())?;
        let mut data = &buf[..len];
        let mut sector = start;
        let mut remaining = count;

        // Leading partial erase block
        let offset = sector % bpe;
        if offset != 0 && remaining > 0 {
            let physical = self.map.physical(sector / bpe)?;
            let to_boundary = bpe - offset;
            let short_write = remaining < to_boundary;
            let nsectors = if short_write { remaining } else { to_boundary };

            debug!(
                "Leading partial block: logical {} -> physical {}, {} sectors at offset {}",
                sector / bpe,
                physical,
                nsectors,
                offset
            );

            let (head, rest) = data.split_at(nsectors as usize * block_size);
            self.read_modify_write(physical, offset as usize * block_size, head)?;

            data = rest;
            remaining -= nsectors;
            sector = sector.wrapping_add(nsectors);
            self.stats.sectors_written += nsectors as u64;
        }

        // Whole erase blocks
        while remaining >= bpe {
            let physical = self.map.physical(sector / bpe)?;

            debug!(
                "Full block: logical {} -> physical {}",
                sector / bpe,
                physical
            );

            let (block, rest) = data.split_at(erase_size);
            self.erase_block(physical)?;
            let first = physical * bpe;
            let n = self.mtd.write(first, bpe, block).map_err(|e| {
                error!("MTD write of block {} failed: {}", physical, e);
                e
            })?;
            check_count(bpe, n)?;

            data = rest;
            remaining -= bpe;
            sector = sector.wrapping_add(bpe);
            self.stats.full_block_writes += 1;
            self.stats.sectors_written += bpe as u64;
        }

        // Trailing partial erase block
        if remaining > 0 {
            let physical = self.map.physical(sector / bpe)?;

            debug!(
                "Trailing partial block: logical {} -> physical {}, {} sectors",
                sector / bpe,
                physical,
                remaining
            );

            self.read_modify_write(physical, 0, data)?;
            self.stats.sectors_written += remaining as u64;
        }

        Ok(count)
    }

    /// Rewrite part of one erase block through the staging buffer
    fn read_modify_write(&mut self, physical: u32, offset: usize, data: &[u8]) -> Result<()> {
        let bpe = self.blocks_per_erase;
        let first = physical * bpe;

        let n = self.mtd.read(first, bpe, &mut self.staging).map_err(|e| {
            error!("MTD read of block {} failed: {}", physical, e);
            e
        })?;
        check_count(bpe, n)?;

        self.erase_block(physical)?;

        self.staging[offset..offset + data.len()].copy_from_slice(data);

        let n = self.mtd.write(first, bpe, &self.staging).map_err(|e| {
            error!(
                "MTD write-back of block {} failed after erase, block contents lost: {}",
                physical, e
            );
            e
        })?;
        check_count(bpe, n)?;

        self.stats.rmw_cycles += 1;
        Ok(())
    }

    fn erase_block(&mut self, physical: u32) -> Result<()> {
        self.mtd.erase(physical, 1).map_err(|e| {
            error!("MTD erase of block {} failed: {}", physical, e);
            e
        })?;
        self.stats.erases += 1;
        Ok(())
    }

    /// Byte length of a `count`-sector request, checked against the buffer
    fn request_len(&self, count: u32, buf_len: usize) -> Result<usize> {
        let len = (count as usize)
            .checked_mul(self.geometry.block_size as usize)
            .ok_or(Error::InvalidArgument)?;
        if buf_len < len {
            return Err(Error::InvalidArgument);
        }
        Ok(len)
    }
}

fn alloc_staging(size: usize) -> Result<Box<[u8]>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(size).map_err(|_| Error::OutOfMemory)?;
    buf.resize(size, 0xFF);
    Ok(buf.into_boxed_slice())
}

fn check_count(expected: u32, actual: u32) -> Result<()> {
    if actual != expected {
        error!("MTD transferred {} sectors, expected {}", actual, expected);
        return Err(Error::IoError(IoFailure::ShortTransfer { expected, actual }));
    }
    Ok(())
}
