//! Read command implementation

use super::{create_progress_bar, print_stats, Device};
use rftl_core::blockdev::BlockDriver;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Read sectors from the block device to a file
///
/// Without `count`, reads every mapped sector from `start` on. The
/// advertised tail beyond the good blocks is never mapped and would fail.
pub fn run_read(
    dev: &mut Device,
    output: &Path,
    start: u32,
    count: Option<u32>,
) -> Result<(), Box<dyn std::error::Error>> {
    let (chunk_sectors, usable) = {
        let ftl = dev.ftl();
        (
            ftl.blocks_per_erase(),
            ftl.map().good_blocks() * ftl.blocks_per_erase(),
        )
    };
    let count = count.unwrap_or_else(|| usable.saturating_sub(start));
    let sector_size = dev.geometry().sector_size as usize;

    log::info!(
        "Reading {} sectors from sector {} to {:?}",
        count,
        start,
        output
    );

    let total = count as u64 * sector_size as u64;
    let pb = create_progress_bar(total, "Reading")?;
    let mut data = Vec::with_capacity(total as usize);
    let mut chunk = vec![0u8; chunk_sectors as usize * sector_size];

    let mut done = 0u32;
    while done < count {
        let n = chunk_sectors.min(count - done);
        let len = n as usize * sector_size;
        dev.read(start + done, n, &mut chunk[..len])?;
        data.extend_from_slice(&chunk[..len]);
        done += n;
        pb.set_position(done as u64 * sector_size as u64);
    }
    pb.finish_with_message("Read complete");

    let mut file = File::create(output)?;
    file.write_all(&data)?;

    println!("Read {} bytes to {:?}", data.len(), output);
    print_stats(&dev.ftl().stats());
    Ok(())
}
