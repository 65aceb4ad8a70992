//! Sector address translation

use crate::error::Result;
use crate::ftl::map::BlockMap;

/// Physical location of a logical sector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectorAddress {
    /// Logical erase block containing the sector
    pub logical_block: u32,
    /// Physical erase block backing the logical one
    pub physical_block: u32,
    /// Sector offset within the erase block
    pub offset: u32,
}

impl SectorAddress {
    /// Physical sector index on the MTD
    pub fn physical_sector(&self, blocks_per_erase: u32) -> u32 {
        self.physical_block * blocks_per_erase + self.offset
    }
}

/// Translate a logical sector to its physical erase block and offset
///
/// Fails with `NoSuchPhysicalBlock` if the containing logical erase block
/// is unmapped or lies past the end of the map. No I/O is performed.
pub fn translate(map: &BlockMap, blocks_per_erase: u32, sector: u32) -> Result<SectorAddress> {
    let logical_block = sector / blocks_per_erase;
    let offset = sector % blocks_per_erase;
    let physical_block = map.physical(logical_block)?;
    Ok(SectorAddress {
        logical_block,
        physical_block,
        offset,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::ftl::mock::MockMtd;
    use crate::ftl::MapEntry;

    #[test]
    fn test_translate_matches_map() {
        let mut mtd = MockMtd::new(512, 2048, 6).with_bad(&[1, 4]);
        let map = BlockMap::scan(&mut mtd, 6).unwrap();
        let bpe = 4;

        for sector in 0..6 * bpe {
            let result = translate(&map, bpe, sector);
            match map.get(sector / bpe).unwrap() {
                MapEntry::Mapped(physical) => {
                    let addr = result.unwrap();
                    assert_eq!(addr.logical_block, sector / bpe);
                    assert_eq!(addr.physical_block, physical);
                    assert_eq!(addr.offset, sector % bpe);
                }
                MapEntry::Unmapped => assert_eq!(result, Err(Error::NoSuchPhysicalBlock)),
            }
        }
    }

    #[test]
    fn test_physical_sector() {
        let mut mtd = MockMtd::new(512, 2048, 4).with_bad(&[1]);
        let map = BlockMap::scan(&mut mtd, 4).unwrap();

        // Logical sector 5 is offset 1 of logical block 1, which is physical block 2
        let addr = translate(&map, 4, 5).unwrap();
        assert_eq!(addr.physical_block, 2);
        assert_eq!(addr.physical_sector(4), 9);
    }

    #[test]
    fn test_translate_past_capacity() {
        let mut mtd = MockMtd::new(512, 2048, 2);
        let map = BlockMap::scan(&mut mtd, 2).unwrap();
        assert_eq!(translate(&map, 4, 8), Err(Error::NoSuchPhysicalBlock));
        assert_eq!(translate(&map, 4, u32::MAX), Err(Error::NoSuchPhysicalBlock));
    }
}
