//! Info command implementation

use super::{format_size, Device};
use rftl_core::blockdev::BlockDriver;
use rftl_core::mtd::cmd;
use rftl_core::Error;

/// Print geometry and bad-block summary
pub fn run_info(dev: &mut Device) -> Result<(), Box<dyn std::error::Error>> {
    let geo = dev.geometry();
    let ftl = dev.ftl();
    let mtd = *ftl.geometry();
    let bad = ftl.map().bad_blocks().len() as u32;
    let usable = ftl.map().good_blocks() as u64 * ftl.blocks_per_erase() as u64;

    println!("Block Device Information");
    println!("========================");
    println!();
    println!("Device:          {}", dev.path());
    println!(
        "Sectors:         {} x {} bytes ({})",
        geo.sector_count,
        geo.sector_size,
        format_size(dev.capacity())
    );
    println!(
        "Usable sectors:  {} ({})",
        usable,
        format_size(usable * geo.sector_size as u64)
    );
    println!("Writable:        {}", if geo.write_enabled { "yes" } else { "no" });
    println!();
    println!(
        "Erase blocks:    {} x {} ({} sectors each)",
        mtd.erase_block_count,
        format_size(mtd.erase_size as u64),
        ftl.blocks_per_erase()
    );
    println!("Bad blocks:      {}", bad);
    if bad > 0 {
        let list: Vec<String> = ftl.map().bad_blocks().iter().map(|b| b.to_string()).collect();
        println!("                 {}", list.join(", "));
        println!(
            "                 the last {} advertised sectors are unmapped",
            bad as u64 * ftl.blocks_per_erase() as u64
        );
    }

    let mut base = 0u64;
    match dev.control(cmd::BLK_XIP_BASE, Some(&mut base)) {
        Ok(()) => println!("XIP base:        0x{:08X}", base),
        Err(Error::NotSupported) => println!("XIP base:        not supported"),
        Err(e) => return Err(e.into()),
    }

    Ok(())
}
