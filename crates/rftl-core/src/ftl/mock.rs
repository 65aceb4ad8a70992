//! Recording MTD double for unit tests

use alloc::vec;
use alloc::vec::Vec;

use crate::error::{Error, IoFailure, Result};
use crate::mtd::{cmd, Mtd, MtdFlags, MtdGeometry};

/// One MTD call as seen by the mock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MockOp {
    Read { sector: u32, count: u32 },
    Write { sector: u32, count: u32 },
    Erase { block: u32 },
}

pub(crate) struct MockMtd {
    geometry: MtdGeometry,
    memory: Vec<u8>,
    bad: Vec<u32>,
    ops: Vec<MockOp>,
    flags: MtdFlags,
    pub geometry_fails: bool,
    pub fail_erase: Option<u32>,
    pub fail_write: Option<u32>,
    pub fail_read: bool,
    pub short_read: bool,
    pub short_write: bool,
    pub xip_base: Option<u64>,
    pub last_control: Option<(u32, Option<u64>)>,
}

impl MockMtd {
    pub fn new(block_size: u32, erase_size: u32, erase_block_count: u32) -> Self {
        let geometry = MtdGeometry {
            block_size,
            erase_size,
            erase_block_count,
        };
        Self {
            memory: vec![0xFF; geometry.total_size() as usize],
            geometry,
            bad: Vec::new(),
            ops: Vec::new(),
            flags: MtdFlags::WRITEABLE,
            geometry_fails: false,
            fail_erase: None,
            fail_write: None,
            fail_read: false,
            short_read: false,
            short_write: false,
            xip_base: None,
            last_control: None,
        }
    }

    pub fn with_bad(mut self, bad: &[u32]) -> Self {
        self.bad = bad.to_vec();
        self
    }

    pub fn read_only(mut self) -> Self {
        self.flags = MtdFlags::empty();
        self
    }

    /// Fill every byte of each physical erase block with its block number
    pub fn with_pattern(mut self) -> Self {
        let erase_size = self.geometry.erase_size as usize;
        for (block, chunk) in self.memory.chunks_mut(erase_size).enumerate() {
            chunk.fill(block as u8);
        }
        self
    }

    pub fn ops(&self) -> &[MockOp] {
        &self.ops
    }

    pub fn erase_count(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, MockOp::Erase { .. }))
            .count()
    }

    pub fn write_count(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, MockOp::Write { .. }))
            .count()
    }

    pub fn block(&self, physical: u32) -> &[u8] {
        let erase_size = self.geometry.erase_size as usize;
        let start = physical as usize * erase_size;
        &self.memory[start..start + erase_size]
    }

    fn byte_range(&self, sector: u32, count: u32) -> core::ops::Range<usize> {
        let bs = self.geometry.block_size as usize;
        let start = sector as usize * bs;
        start..start + count as usize * bs
    }
}

impl Mtd for MockMtd {
    fn geometry(&mut self) -> Result<MtdGeometry> {
        if self.geometry_fails {
            return Err(Error::GeometryUnavailable);
        }
        Ok(self.geometry)
    }

    fn flags(&self) -> MtdFlags {
        self.flags
    }

    fn is_bad(&mut self, block: u32) -> bool {
        self.bad.contains(&block)
    }

    fn read(&mut self, sector: u32, count: u32, buf: &mut [u8]) -> Result<u32> {
        self.ops.push(MockOp::Read { sector, count });
        if self.fail_read {
            return Err(Error::IoError(IoFailure::Read { sector }));
        }
        let range = self.byte_range(sector, count);
        let len = range.len();
        buf[..len].copy_from_slice(&self.memory[range]);
        if self.short_read {
            return Ok(count - 1);
        }
        Ok(count)
    }

    fn write(&mut self, sector: u32, count: u32, buf: &[u8]) -> Result<u32> {
        self.ops.push(MockOp::Write { sector, count });
        if self.fail_write == Some(sector / self.geometry.blocks_per_erase()) {
            return Err(Error::IoError(IoFailure::Write { sector }));
        }
        let range = self.byte_range(sector, count);
        let len = range.len();
        // Programming can only clear bits
        for (dst, src) in self.memory[range].iter_mut().zip(&buf[..len]) {
            *dst &= *src;
        }
        if self.short_write {
            return Ok(count - 1);
        }
        Ok(count)
    }

    fn erase(&mut self, block: u32, count: u32) -> Result<()> {
        for b in block..block + count {
            self.ops.push(MockOp::Erase { block: b });
            if self.fail_erase == Some(b) {
                return Err(Error::IoError(IoFailure::Erase { block: b }));
            }
            let erase_size = self.geometry.erase_size as usize;
            let start = b as usize * erase_size;
            self.memory[start..start + erase_size].fill(0xFF);
        }
        Ok(())
    }

    fn control(&mut self, command: u32, arg: Option<&mut u64>) -> Result<()> {
        self.last_control = Some((command, arg.as_deref().copied()));
        match command {
            cmd::MTD_XIP_BASE => {
                let base = self.xip_base.ok_or(Error::NotSupported)?;
                let out = arg.ok_or(Error::InvalidArgument)?;
                *out = base;
                Ok(())
            }
            cmd::MTD_BULK_ERASE => Ok(()),
            _ => Err(Error::NotSupported),
        }
    }
}
