//! CLI command implementations
//!
//! Every command except the list commands mounts the translation layer on
//! the selected MTD backend as an [`FtlBlockDevice`] and talks to it only
//! through the [`BlockDriver`](rftl_core::blockdev::BlockDriver) interface
//! plus the map and counters the device exposes.

mod info;
mod list;
mod map;
mod read;
mod write;

pub use info::run_info;
pub use list::list_backends;
#[cfg(feature = "linux-mtd")]
pub use list::list_mtds;
pub use map::run_map;
pub use read::run_read;
pub use write::{run_erase_all, run_write};

use indicatif::{ProgressBar, ProgressStyle};
use rftl_core::blockdev::FtlBlockDevice;
use rftl_core::ftl::FtlStats;
use rftl_core::mtd::Mtd;

/// Block device over whichever backend the user picked
pub type Device = FtlBlockDevice<Box<dyn Mtd + Send>>;

/// Create a standard progress bar for a transfer of `total` bytes
fn create_progress_bar(total: u64, phase: &str) -> Result<ProgressBar, Box<dyn std::error::Error>> {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&format!(
                "{{spinner:.green}} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{bytes}}/{{total_bytes}} ({{bytes_per_sec}}, {{eta}}) {}",
                phase
            ))?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

/// Format a byte count with a binary unit
fn format_size(bytes: u64) -> String {
    if bytes >= 1024 * 1024 {
        format!("{} MiB", bytes / (1024 * 1024))
    } else if bytes >= 1024 {
        format!("{} KiB", bytes / 1024)
    } else {
        format!("{} B", bytes)
    }
}

/// Print the translation layer counters
fn print_stats(stats: &FtlStats) {
    println!(
        "FTL: {} sectors read, {} sectors written, {} erases ({} read-modify-write, {} full-block)",
        stats.sectors_read,
        stats.sectors_written,
        stats.erases,
        stats.rmw_cycles,
        stats.full_block_writes
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(16 * 1024), "16 KiB");
        assert_eq!(format_size(128 * 1024 * 1024), "128 MiB");
    }
}
