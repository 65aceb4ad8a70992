//! Bad-block map
//!
//! The map is indexed by logical erase block. Good physical blocks are
//! assigned to consecutive logical slots in ascending physical order; the
//! slots left over once the good blocks run out are [`MapEntry::Unmapped`].
//! The map never changes after it is built.

use alloc::vec::Vec;
use log::{debug, warn};

use crate::error::{Error, Result};
use crate::mtd::{Mtd, MtdFlags};

/// One slot of the logical to physical map
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapEntry {
    /// Logical block backed by this physical erase block
    Mapped(u32),
    /// No good physical block left for this logical block
    Unmapped,
}

impl MapEntry {
    /// Physical erase block, if mapped
    pub fn physical(self) -> Option<u32> {
        match self {
            MapEntry::Mapped(block) => Some(block),
            MapEntry::Unmapped => None,
        }
    }
}

/// Logical to physical erase-block map
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockMap {
    entries: Vec<MapEntry>,
    bad_blocks: Vec<u32>,
}

impl BlockMap {
    /// Build the map by querying every physical block for bad status
    ///
    /// The scan visits physical blocks `0..erase_block_count` in order and
    /// does not touch flash contents. A medium where every block is bad
    /// still yields a map (with every slot unmapped).
    ///
    /// # Errors
    /// * `OutOfMemory` - If the map or the bad-block list cannot be allocated
    pub fn scan<M: Mtd + ?Sized>(mtd: &mut M, erase_block_count: u32) -> Result<Self> {
        let count = erase_block_count as usize;
        let mut entries = Vec::new();
        entries
            .try_reserve_exact(count)
            .map_err(|_| Error::OutOfMemory)?;

        let mut bad_blocks = Vec::new();
        bad_blocks
            .try_reserve_exact(count)
            .map_err(|_| Error::OutOfMemory)?;

        if !mtd.flags().contains(MtdFlags::BAD_BLOCKS) {
            debug!("MTD does not report bad-block markers");
        }
        for physical in 0..erase_block_count {
            if mtd.is_bad(physical) {
                warn!("Erase block {} is marked bad, skipping", physical);
                bad_blocks.push(physical);
            } else {
                entries.push(MapEntry::Mapped(physical));
            }
        }

        let good = entries.len();
        entries.resize(count, MapEntry::Unmapped);

        if good == 0 && count > 0 {
            warn!(
                "All {} erase blocks are bad, every logical block is unmapped",
                count
            );
        }
        debug!(
            "Bad-block scan: {} good, {} bad of {} erase blocks",
            good,
            bad_blocks.len(),
            count
        );

        Ok(Self {
            entries,
            bad_blocks,
        })
    }

    /// Number of logical slots (equal to the physical erase block count)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map has no slots at all
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Slot for a logical erase block, or `None` past the end of the map
    pub fn get(&self, logical: u32) -> Option<MapEntry> {
        self.entries.get(logical as usize).copied()
    }

    /// Physical erase block behind a logical one
    ///
    /// Fails with `NoSuchPhysicalBlock` for unmapped or out-of-range slots.
    pub fn physical(&self, logical: u32) -> Result<u32> {
        self.get(logical)
            .and_then(MapEntry::physical)
            .ok_or(Error::NoSuchPhysicalBlock)
    }

    /// Iterate over all slots in logical order
    pub fn iter(&self) -> impl Iterator<Item = MapEntry> + '_ {
        self.entries.iter().copied()
    }

    /// Number of logical blocks backed by a good physical block
    pub fn good_blocks(&self) -> u32 {
        (self.entries.len() - self.bad_blocks.len()) as u32
    }

    /// Physical blocks found bad during the scan, ascending
    pub fn bad_blocks(&self) -> &[u32] {
        &self.bad_blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ftl::mock::MockMtd;
    use alloc::vec;

    #[test]
    fn test_identity_map_without_bad_blocks() {
        let mut mtd = MockMtd::new(512, 2048, 8);
        let map = BlockMap::scan(&mut mtd, 8).unwrap();

        assert_eq!(map.len(), 8);
        assert_eq!(map.good_blocks(), 8);
        assert!(map.bad_blocks().is_empty());
        for logical in 0..8 {
            assert_eq!(map.get(logical), Some(MapEntry::Mapped(logical)));
        }
    }

    #[test]
    fn test_bad_block_skipped() {
        let mut mtd = MockMtd::new(512, 2048, 4).with_bad(&[1]);
        let map = BlockMap::scan(&mut mtd, 4).unwrap();

        let entries: Vec<_> = map.iter().collect();
        assert_eq!(
            entries,
            vec![
                MapEntry::Mapped(0),
                MapEntry::Mapped(2),
                MapEntry::Mapped(3),
                MapEntry::Unmapped,
            ]
        );
        assert_eq!(map.bad_blocks(), &[1]);
        assert_eq!(map.good_blocks(), 3);
    }

    #[test]
    fn test_density_with_scattered_bad_blocks() {
        let bad = [0, 3, 4, 9];
        let mut mtd = MockMtd::new(512, 2048, 10).with_bad(&bad);
        let map = BlockMap::scan(&mut mtd, 10).unwrap();

        let good: Vec<u32> = (0..10).filter(|b| !bad.contains(b)).collect();
        for (logical, physical) in good.iter().enumerate() {
            assert_eq!(map.physical(logical as u32), Ok(*physical));
        }
        for logical in good.len() as u32..10 {
            assert_eq!(map.get(logical), Some(MapEntry::Unmapped));
            assert_eq!(map.physical(logical), Err(Error::NoSuchPhysicalBlock));
        }
    }

    #[test]
    fn test_all_bad_still_builds() {
        let mut mtd = MockMtd::new(512, 2048, 3).with_bad(&[0, 1, 2]);
        let map = BlockMap::scan(&mut mtd, 3).unwrap();

        assert_eq!(map.len(), 3);
        assert_eq!(map.good_blocks(), 0);
        assert!(map.iter().all(|e| e == MapEntry::Unmapped));
        assert_eq!(map.bad_blocks(), &[0, 1, 2]);
        // Room for every block was reserved before the scan
        assert!(map.bad_blocks.capacity() >= 3);
    }

    #[test]
    fn test_out_of_range_is_no_such_block() {
        let mut mtd = MockMtd::new(512, 2048, 2);
        let map = BlockMap::scan(&mut mtd, 2).unwrap();
        assert_eq!(map.get(2), None);
        assert_eq!(map.physical(2), Err(Error::NoSuchPhysicalBlock));
    }

    #[test]
    fn test_scan_does_not_touch_flash() {
        let mut mtd = MockMtd::new(512, 2048, 4).with_bad(&[2]);
        BlockMap::scan(&mut mtd, 4).unwrap();
        assert!(mtd.ops().is_empty());
    }
}
