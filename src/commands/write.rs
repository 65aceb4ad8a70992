//! Write and erase command implementations

use super::{create_progress_bar, print_stats, Device};
use rftl_core::blockdev::BlockDriver;
use rftl_core::mtd::cmd;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Read file contents into a Vec
fn read_file(path: &Path) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let mut file = File::open(path)?;
    let mut data = Vec::new();
    file.read_to_end(&mut data)?;
    println!("Read {} bytes from {:?}", data.len(), path);
    Ok(data)
}

/// Write a file to the block device starting at sector `start`
///
/// A file that is not a whole number of sectors is padded with 0xFF.
pub fn run_write(
    dev: &mut Device,
    input: &Path,
    start: u32,
    verify: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let geo = dev.geometry();
    if !geo.write_enabled {
        return Err(format!("{} is read-only", dev.path()).into());
    }
    let sector_size = geo.sector_size as usize;
    let chunk_sectors = dev.ftl().blocks_per_erase();

    let mut data = read_file(input)?;
    let remainder = data.len() % sector_size;
    if remainder != 0 {
        log::warn!(
            "Input is not a multiple of {} bytes, padding {} bytes with 0xFF",
            sector_size,
            sector_size - remainder
        );
        data.resize(data.len() + sector_size - remainder, 0xFF);
    }

    let count = u32::try_from(data.len() / sector_size)?;
    let end = start
        .checked_add(count)
        .filter(|&end| end <= geo.sector_count)
        .ok_or_else(|| {
            format!(
                "{} sectors at {} do not fit in {} sectors",
                count, start, geo.sector_count
            )
        })?;
    log::info!("Writing sectors {}..{}", start, end);

    let pb = create_progress_bar(data.len() as u64, "Writing")?;
    let mut done = 0u32;
    while done < count {
        // Keep chunks aligned to erase blocks so each one is a single rewrite
        let sector = start + done;
        let n = (chunk_sectors - sector % chunk_sectors).min(count - done);
        let offset = done as usize * sector_size;
        dev.write(sector, n, &data[offset..offset + n as usize * sector_size])?;
        done += n;
        pb.set_position(done as u64 * sector_size as u64);
    }
    pb.finish_with_message("Write complete");

    if verify {
        let mut back = vec![0u8; data.len()];
        dev.read(start, count, &mut back)?;
        if let Some(pos) = back.iter().zip(&data).position(|(a, b)| a != b) {
            return Err(format!(
                "Verification failed at sector {} (byte offset {})",
                start as usize + pos / sector_size,
                pos
            )
            .into());
        }
        println!("Verified {} sectors", count);
    }

    println!("Wrote {} sectors starting at sector {}", count, start);
    print_stats(&dev.ftl().stats());
    Ok(())
}

/// Erase every good block through the MTD bulk-erase command
pub fn run_erase_all(dev: &mut Device) -> Result<(), Box<dyn std::error::Error>> {
    if !dev.geometry().write_enabled {
        return Err(format!("{} is read-only", dev.path()).into());
    }
    log::info!("Erasing all good blocks behind {}", dev.path());
    dev.control(cmd::MTD_BULK_ERASE, None)?;
    println!("Erase complete");
    Ok(())
}
