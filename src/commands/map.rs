//! Map command implementation

use super::Device;
use rftl_core::ftl::MapEntry;

/// Print the logical to physical erase block map
pub fn run_map(dev: &Device) {
    let ftl = dev.ftl();
    let bpe = ftl.blocks_per_erase();

    println!("{:>8} {:>10} {:>10}", "Logical", "Physical", "Sectors");
    println!("{}", "-".repeat(30));

    for (logical, entry) in ftl.map().iter().enumerate() {
        let first = logical as u64 * bpe as u64;
        let sectors = format!("{}-{}", first, first + bpe as u64 - 1);
        match entry {
            MapEntry::Mapped(physical) => {
                println!("{:>8} {:>10} {:>10}", logical, physical, sectors)
            }
            MapEntry::Unmapped => println!("{:>8} {:>10} {:>10}", logical, "-", sectors),
        }
    }

    println!();
    println!(
        "{} of {} erase blocks mapped, bad: {:?}",
        ftl.map().good_blocks(),
        ftl.map().len(),
        ftl.map().bad_blocks()
    );
}
